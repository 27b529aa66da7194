// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A submission queue that hands commands to the GPU from a background thread.

use super::pool::{Command, CommandPool, PoolStats};
use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tessel_core::config::SubmissionConfig;
use tessel_core::renderer::{
    BufferDescriptor, BufferId, CommandKind, FenceId, FenceSignal, FenceStatus, GraphicsDevice,
    ResourceError, SubmissionError,
};

/// Identifies one submission by the fence value it signals.
///
/// Values grow in submission order, so a ticket is complete once the queue's
/// fence has reached it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubmissionTicket(u64);

impl SubmissionTicket {
    /// The fence value of the submission.
    pub fn value(&self) -> u64 {
        self.0
    }
}

#[derive(Debug)]
struct QueueState {
    pending: VecDeque<(u64, Command)>,
    in_flight: BTreeMap<u64, Command>,
    next_value: u64,
    last_handed_off: u64,
    handing_off: bool,
    shutdown: bool,
    stopped: bool,
    last_error: Option<SubmissionError>,
}

struct QueueShared {
    label: String,
    device: Arc<dyn GraphicsDevice>,
    pool: CommandPool,
    fence: FenceId,
    pipeline_depth: usize,
    fence_timeout: Option<Duration>,
    state: Mutex<QueueState>,
    /// Signalled when work is queued or shutdown is requested.
    work_ready: Condvar,
    /// Signalled when a hand-off finishes.
    idle: Condvar,
}

impl QueueShared {
    fn hand_off(&self, command: &mut Command, value: u64) -> Result<(), SubmissionError> {
        command.mark_submitted();
        let kind = command.kind();
        let signal = FenceSignal {
            fence: self.fence,
            value,
        };
        self.device
            .submit(kind, command.encoder(), Some(signal))
            .map_err(|e| SubmissionError::SubmissionFailure {
                kind,
                label: command.label().map(str::to_owned),
                details: e.to_string(),
            })
    }

    fn wait_for(&self, value: u64) -> Result<(), SubmissionError> {
        match self.device.wait_fence(self.fence, value, self.fence_timeout)? {
            FenceStatus::Signaled => Ok(()),
            FenceStatus::TimedOut => {
                let err = SubmissionError::FenceTimeout {
                    awaited: value,
                    completed: self.device.fence_value(self.fence)?,
                    timeout: self.fence_timeout.unwrap_or_default(),
                };
                log::error!("SubmissionQueue '{}': {}", self.label, err);
                Err(err)
            }
        }
    }

    /// Moves the fence past a rejected submission once all earlier work is done.
    fn retire(&self, value: u64) {
        if let Err(e) = self.wait_for(value - 1) {
            log::warn!(
                "SubmissionQueue '{}': Cannot retire fence value {}: {}",
                self.label,
                value,
                e
            );
            return;
        }
        if let Err(e) = self.device.signal_fence(self.fence, value) {
            log::warn!(
                "SubmissionQueue '{}': Failed to signal fence value {}: {:?}",
                self.label,
                value,
                e
            );
        }
    }

    fn release(&self, mut command: Command) {
        for buffer in command.transient_buffers.drain(..) {
            if let Err(e) = self.device.destroy_buffer(buffer) {
                log::warn!(
                    "SubmissionQueue '{}': Failed to destroy one-time buffer {:?}: {:?}",
                    self.label,
                    buffer,
                    e
                );
            }
        }
        self.pool.recycle(command);
    }

    fn reclaim_completed(&self) -> Result<usize, SubmissionError> {
        let completed = self.device.fence_value(self.fence)?;
        let done = {
            let mut state = self.state.lock();
            let running = state.in_flight.split_off(&completed.saturating_add(1));
            std::mem::replace(&mut state.in_flight, running)
        };
        let count = done.len();
        for command in done.into_values() {
            self.release(command);
        }
        if count > 0 {
            log::trace!(
                "SubmissionQueue '{}': Reclaimed {} commands (fence at {})",
                self.label,
                count,
                completed
            );
        }
        Ok(count)
    }

    /// Blocks until another hand-off keeps at most `pipeline_depth`
    /// submissions outstanding.
    fn throttle(&self) -> Result<(), SubmissionError> {
        loop {
            let oldest = {
                let state = self.state.lock();
                if state.in_flight.len() < self.pipeline_depth {
                    break;
                }
                state.in_flight.keys().next().copied()
            };
            if let Some(value) = oldest {
                self.wait_for(value)?;
            }
            self.reclaim_completed()?;
        }
        self.reclaim_completed().map(|_| ())
    }

    fn record_error(&self, err: SubmissionError) {
        self.state.lock().last_error.get_or_insert(err);
    }

    fn take_error(&self) -> Option<SubmissionError> {
        self.state.lock().last_error.take()
    }

    fn run(&self) {
        log::info!("SubmissionQueue '{}': Worker thread started.", self.label);
        loop {
            let (value, mut command) = {
                let mut state = self.state.lock();
                while state.pending.is_empty() && !state.shutdown {
                    self.work_ready.wait(&mut state);
                }
                if state.shutdown {
                    break;
                }
                let Some(next) = state.pending.pop_front() else {
                    continue;
                };
                state.handing_off = true;
                next
            };

            let accepted = match self.hand_off(&mut command, value) {
                Ok(()) => Ok(command),
                Err(e) => {
                    log::error!("SubmissionQueue '{}': {}", self.label, e);
                    self.retire(value);
                    // Back in the pool before the hand-off is published as finished.
                    self.release(command);
                    Err(e)
                }
            };

            {
                let mut state = self.state.lock();
                match accepted {
                    Ok(command) => {
                        state.in_flight.insert(value, command);
                    }
                    Err(e) => {
                        state.last_error.get_or_insert(e);
                    }
                }
                state.handing_off = false;
                state.last_handed_off = value;
                self.idle.notify_all();
            }

            if let Err(e) = self.throttle() {
                self.record_error(e);
            }
        }
        log::info!("SubmissionQueue '{}': Worker thread stopped.", self.label);
    }
}

/// Submits recorded [`Command`]s to the GPU in FIFO order.
///
/// Deferred submissions are queued and handed to the device by a background
/// thread, which keeps at most `pipeline_depth` of them outstanding and
/// recycles each command once the queue's timeline fence passes its value.
/// Immediate submissions wait for the queue to drain, submit on the calling
/// thread and block until the GPU is done.
///
/// Errors hit by the background thread are logged and returned by the next
/// call to [`end`](Self::end), [`wait`](Self::wait) or
/// [`wait_idle`](Self::wait_idle).
pub struct SubmissionQueue {
    shared: Arc<QueueShared>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl fmt::Debug for SubmissionQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("SubmissionQueue")
            .field("label", &self.shared.label)
            .field("pending", &state.pending.len())
            .field("in_flight", &state.in_flight.len())
            .field("next_value", &state.next_value)
            .field("stopped", &state.stopped)
            .finish()
    }
}

impl SubmissionQueue {
    /// Creates the queue's fence and starts its worker thread.
    pub fn new(
        device: Arc<dyn GraphicsDevice>,
        config: &SubmissionConfig,
        label: &str,
    ) -> Result<Self, SubmissionError> {
        let fence = device.create_fence(0)?;
        let shared = Arc::new(QueueShared {
            label: label.to_owned(),
            pool: CommandPool::new(device.clone()),
            device,
            fence,
            pipeline_depth: config.pipeline_depth.max(1) as usize,
            fence_timeout: config.fence_timeout_ms.map(Duration::from_millis),
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                in_flight: BTreeMap::new(),
                next_value: 1,
                last_handed_off: 0,
                handing_off: false,
                shutdown: false,
                stopped: false,
                last_error: None,
            }),
            work_ready: Condvar::new(),
            idle: Condvar::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(format!("tessel-submit-{label}"))
            .spawn(move || worker_shared.run());
        match handle {
            Ok(handle) => Ok(Self {
                shared,
                worker: Mutex::new(Some(handle)),
            }),
            Err(e) => {
                let _ = shared.device.destroy_fence(fence);
                Err(ResourceError::BackendError(format!("failed to spawn worker thread: {e}")).into())
            }
        }
    }

    /// Takes a command from the pool and starts recording.
    pub fn begin(&self, kind: CommandKind, label: Option<&str>) -> Result<Command, SubmissionError> {
        if self.shared.state.lock().shutdown {
            return Err(SubmissionError::Stopped);
        }
        Ok(self.shared.pool.begin(kind, label)?)
    }

    /// Submits a recorded command.
    ///
    /// With `immediate`, everything queued before is handed off first, then
    /// the command is submitted on this thread and the call returns once the
    /// GPU has finished it and it is back in the pool. Otherwise the command
    /// is queued and the call returns at once.
    ///
    /// If an earlier background error is pending, it is returned instead and
    /// the command is recycled without being submitted.
    pub fn end(&self, command: Command, immediate: bool) -> Result<SubmissionTicket, SubmissionError> {
        if immediate {
            self.submit_immediate(command)
        } else {
            self.enqueue(command)
        }
    }

    fn enqueue(&self, mut command: Command) -> Result<SubmissionTicket, SubmissionError> {
        let mut state = self.shared.state.lock();
        let refused = if state.shutdown {
            Some(SubmissionError::Stopped)
        } else {
            state.last_error.take()
        };
        if let Some(err) = refused {
            drop(state);
            self.shared.release(command);
            return Err(err);
        }

        let value = state.next_value;
        state.next_value += 1;
        command.mark_submitted();
        log::trace!(
            "SubmissionQueue '{}': Queued '{}' as value {}",
            self.shared.label,
            command.label().unwrap_or("Unnamed"),
            value
        );
        state.pending.push_back((value, command));
        self.shared.work_ready.notify_one();
        Ok(SubmissionTicket(value))
    }

    fn submit_immediate(&self, mut command: Command) -> Result<SubmissionTicket, SubmissionError> {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        let refused = loop {
            if state.shutdown {
                break Some(SubmissionError::Stopped);
            }
            if let Some(err) = state.last_error.take() {
                break Some(err);
            }
            if state.pending.is_empty() && !state.handing_off {
                break None;
            }
            shared.idle.wait(&mut state);
        };
        if let Some(err) = refused {
            drop(state);
            shared.release(command);
            return Err(err);
        }

        let value = state.next_value;
        state.next_value += 1;
        let submitted = shared.hand_off(&mut command, value);
        state.last_handed_off = value;
        drop(state);

        if let Err(e) = submitted {
            log::error!("SubmissionQueue '{}': {}", shared.label, e);
            shared.retire(value);
            shared.release(command);
            return Err(e);
        }
        if let Err(e) = shared.wait_for(value) {
            // Still owned by the GPU; reclaimed once the fence gets there.
            shared.state.lock().in_flight.insert(value, command);
            return Err(e);
        }
        shared.release(command);
        shared.reclaim_completed()?;
        Ok(SubmissionTicket(value))
    }

    /// Returns a command to the pool without submitting it.
    pub fn discard(&self, command: Command) {
        log::debug!(
            "SubmissionQueue '{}': Discarding '{}' unsubmitted",
            self.shared.label,
            command.label().unwrap_or("Unnamed")
        );
        self.shared.release(command);
    }

    /// Blocks until the submission behind `ticket` has completed.
    pub fn wait(&self, ticket: SubmissionTicket) -> Result<(), SubmissionError> {
        if let Some(err) = self.shared.take_error() {
            return Err(err);
        }
        self.check_not_discarded(ticket)?;
        self.shared.wait_for(ticket.0)?;
        self.check_not_discarded(ticket)?;
        self.shared.reclaim_completed()?;
        Ok(())
    }

    fn check_not_discarded(&self, ticket: SubmissionTicket) -> Result<(), SubmissionError> {
        let state = self.shared.state.lock();
        if state.stopped && ticket.0 > state.last_handed_off {
            return Err(SubmissionError::Stopped);
        }
        Ok(())
    }

    /// `true` once the GPU has finished the submission behind `ticket`.
    pub fn is_complete(&self, ticket: SubmissionTicket) -> bool {
        self.completed_value() >= ticket.0
    }

    /// Blocks until every queued and in-flight submission has completed.
    pub fn wait_idle(&self) -> Result<(), SubmissionError> {
        let target = {
            let mut state = self.shared.state.lock();
            while (!state.pending.is_empty() || state.handing_off) && !state.shutdown {
                self.shared.idle.wait(&mut state);
            }
            state.last_handed_off
        };
        let waited = self.shared.wait_for(target);
        self.shared.reclaim_completed()?;
        if let Some(err) = self.shared.take_error() {
            return Err(err);
        }
        waited
    }

    /// Creates a buffer that lives until `command` is reclaimed.
    pub fn create_one_time_buffer(
        &self,
        command: &mut Command,
        descriptor: &BufferDescriptor<'_>,
        data: &[u8],
    ) -> Result<BufferId, SubmissionError> {
        let buffer = self.shared.device.create_buffer_with_data(descriptor, data)?;
        command.transient_buffers.push(buffer);
        Ok(buffer)
    }

    /// Pool counters for `kind`.
    pub fn pool_stats(&self, kind: CommandKind) -> PoolStats {
        self.shared.pool.stats(kind)
    }

    /// The last fence value the GPU completed.
    pub fn completed_value(&self) -> u64 {
        self.shared
            .device
            .fence_value(self.shared.fence)
            .unwrap_or_default()
    }

    /// Commands queued but not yet handed to the device.
    pub fn pending_count(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    /// Commands handed to the device and not yet reclaimed.
    pub fn in_flight_count(&self) -> usize {
        self.shared.state.lock().in_flight.len()
    }

    /// Stops the worker thread.
    ///
    /// Queued commands that were never handed off are discarded. In-flight
    /// work is waited for, then every pooled command is destroyed. Later
    /// calls to `begin` and `end` fail with [`SubmissionError::Stopped`].
    pub fn stop(&self) {
        let shared = &self.shared;
        {
            let mut state = shared.state.lock();
            if state.shutdown {
                return;
            }
            state.shutdown = true;
            shared.work_ready.notify_all();
            shared.idle.notify_all();
        }
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                log::error!("SubmissionQueue '{}': Worker thread panicked.", shared.label);
            }
        }

        let (discarded, last_handed_off, last_assigned) = {
            let mut state = shared.state.lock();
            let discarded: Vec<Command> = state.pending.drain(..).map(|(_, c)| c).collect();
            (discarded, state.last_handed_off, state.next_value - 1)
        };
        if !discarded.is_empty() {
            log::warn!(
                "SubmissionQueue '{}': Discarding {} queued commands.",
                shared.label,
                discarded.len()
            );
        }
        for command in discarded {
            shared.release(command);
        }

        match shared.wait_for(last_handed_off) {
            Ok(()) => {
                if last_assigned > last_handed_off {
                    // Wake anyone still waiting on a discarded ticket.
                    let _ = shared.device.signal_fence(shared.fence, last_assigned);
                }
                if let Err(e) = shared.reclaim_completed() {
                    log::warn!("SubmissionQueue '{}': {}", shared.label, e);
                }
            }
            Err(e) => log::error!(
                "SubmissionQueue '{}': In-flight work did not complete: {}",
                shared.label,
                e
            ),
        }

        let abandoned = std::mem::take(&mut shared.state.lock().in_flight);
        if !abandoned.is_empty() {
            log::warn!(
                "SubmissionQueue '{}': Abandoning {} commands the GPU never finished.",
                shared.label,
                abandoned.len()
            );
        }
        for command in abandoned.into_values() {
            shared.release(command);
        }
        shared.pool.destroy_free();

        let mut state = shared.state.lock();
        state.stopped = true;
        shared.idle.notify_all();
        log::info!("SubmissionQueue '{}': Stopped.", shared.label);
    }
}

impl Drop for SubmissionQueue {
    fn drop(&mut self) {
        self.stop();
        if let Err(e) = self.shared.device.destroy_fence(self.shared.fence) {
            log::warn!(
                "SubmissionQueue '{}': Failed to destroy fence: {:?}",
                self.shared.label,
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tessel_core::renderer::BufferUsage;
    use tessel_infra::SoftwareDevice;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn queue(device: &SoftwareDevice, depth: u32, timeout_ms: Option<u64>) -> SubmissionQueue {
        SubmissionQueue::new(
            Arc::new(device.clone()),
            &SubmissionConfig {
                pipeline_depth: depth,
                fence_timeout_ms: timeout_ms,
            },
            "test",
        )
        .unwrap()
    }

    fn buffers(device: &SoftwareDevice) -> (BufferId, BufferId) {
        let source = device
            .create_buffer_with_data(
                &BufferDescriptor::new("source", 8, BufferUsage::COPY_SRC | BufferUsage::MAP_WRITE),
                &[1, 2, 3, 4, 5, 6, 7, 8],
            )
            .unwrap();
        let destination = device
            .create_buffer(&BufferDescriptor::new(
                "destination",
                8,
                BufferUsage::COPY_DST | BufferUsage::MAP_READ,
            ))
            .unwrap();
        (source, destination)
    }

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn deferred_submission_executes_on_the_worker() {
        init_logger();
        let device = SoftwareDevice::new();
        let queue = queue(&device, 2, Some(1000));
        let (source, destination) = buffers(&device);

        let mut command = queue.begin(CommandKind::Transfer, Some("copy")).unwrap();
        command
            .encoder()
            .copy_buffer_to_buffer(&source, 0, &destination, 0, 8);
        let ticket = queue.end(command, false).unwrap();
        queue.wait(ticket).unwrap();

        assert!(queue.is_complete(ticket));
        assert_eq!(
            device.snapshot_buffer(destination).unwrap(),
            vec![1, 2, 3, 4, 5, 6, 7, 8]
        );
    }

    #[test]
    fn immediate_submission_returns_the_command_to_the_pool() {
        init_logger();
        let device = SoftwareDevice::new();
        let queue = queue(&device, 2, Some(1000));
        let (source, destination) = buffers(&device);

        let mut command = queue.begin(CommandKind::Graphics, None).unwrap();
        command
            .encoder()
            .copy_buffer_to_buffer(&source, 4, &destination, 0, 4);
        assert_eq!(queue.pool_stats(CommandKind::Graphics).in_use, 1);
        let ticket = queue.end(command, true).unwrap();

        assert!(queue.is_complete(ticket));
        let stats = queue.pool_stats(CommandKind::Graphics);
        assert_eq!(stats.created, stats.free);
        assert_eq!(&device.snapshot_buffer(destination).unwrap()[..4], &[5, 6, 7, 8]);
    }

    #[test]
    fn submissions_run_in_fifo_order() {
        init_logger();
        let device = SoftwareDevice::new();
        let queue = queue(&device, 1, Some(1000));
        let (source, destination) = buffers(&device);

        let mut tickets = Vec::new();
        for offset in [0u64, 4] {
            let mut command = queue.begin(CommandKind::Transfer, None).unwrap();
            command
                .encoder()
                .copy_buffer_to_buffer(&source, offset, &destination, 0, 4);
            tickets.push(queue.end(command, false).unwrap());
        }
        // The immediate copy must land after both deferred ones.
        let mut command = queue.begin(CommandKind::Transfer, None).unwrap();
        command
            .encoder()
            .copy_buffer_to_buffer(&source, 0, &destination, 4, 4);
        let last = queue.end(command, true).unwrap();

        assert!(tickets[0] < tickets[1] && tickets[1] < last);
        queue.wait_idle().unwrap();
        assert_eq!(
            device.snapshot_buffer(destination).unwrap(),
            vec![5, 6, 7, 8, 1, 2, 3, 4]
        );
        let stats = queue.pool_stats(CommandKind::Transfer);
        assert_eq!(stats.created, stats.free);
    }

    #[test]
    fn background_failure_is_reported_by_the_next_call() {
        init_logger();
        let device = SoftwareDevice::new();
        let queue = queue(&device, 2, Some(1000));

        device.fail_next_submission();
        let command = queue.begin(CommandKind::Graphics, Some("doomed")).unwrap();
        let ticket = queue.end(command, false).unwrap();

        let err = queue.wait_idle().unwrap_err();
        assert!(matches!(
            err,
            SubmissionError::SubmissionFailure {
                kind: CommandKind::Graphics,
                ..
            }
        ));
        assert!(!err.is_fatal());
        // The rejected command is already back in the pool.
        let stats = queue.pool_stats(CommandKind::Graphics);
        assert_eq!(stats.created, stats.free);
        assert_eq!(stats.in_use, 0);

        // The rejected value is retired, so waiting on it does not block.
        queue.wait(ticket).unwrap();
        queue.wait_idle().unwrap();
        let stats = queue.pool_stats(CommandKind::Graphics);
        assert_eq!(stats.created, stats.free);
    }

    #[test]
    fn immediate_failure_is_returned_directly() {
        init_logger();
        let device = SoftwareDevice::new();
        let queue = queue(&device, 2, Some(1000));

        device.fail_next_submission();
        let command = queue.begin(CommandKind::Transfer, None).unwrap();
        assert!(matches!(
            queue.end(command, true),
            Err(SubmissionError::SubmissionFailure { .. })
        ));

        let command = queue.begin(CommandKind::Transfer, None).unwrap();
        let ticket = queue.end(command, true).unwrap();
        assert_eq!(ticket.value(), 2);
        assert_eq!(queue.pool_stats(CommandKind::Transfer).created, 1);
    }

    #[test]
    fn hung_gpu_trips_the_fence_watchdog() {
        init_logger();
        let device = SoftwareDevice::new();
        let queue = queue(&device, 2, Some(30));

        device.set_hung(true);
        let command = queue.begin(CommandKind::Graphics, None).unwrap();
        let err = queue.end(command, true).unwrap_err();
        assert!(matches!(
            err,
            SubmissionError::FenceTimeout {
                awaited: 1,
                completed: 0,
                ..
            }
        ));
        assert!(err.is_fatal());
        assert_eq!(queue.in_flight_count(), 1);

        device.set_hung(false);
        queue.wait_idle().unwrap();
        assert_eq!(queue.in_flight_count(), 0);
        assert_eq!(queue.pool_stats(CommandKind::Graphics).in_use, 0);
    }

    #[test]
    fn pipeline_depth_bounds_outstanding_work() {
        init_logger();
        let device = SoftwareDevice::new();
        let queue = queue(&device, 1, None);

        device.set_hung(true);
        for _ in 0..3 {
            let command = queue.begin(CommandKind::Transfer, None).unwrap();
            queue.end(command, false).unwrap();
        }
        // One handed off, the worker blocks on it before the second.
        wait_until(|| queue.in_flight_count() == 1);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(queue.in_flight_count(), 1);
        assert_eq!(queue.pending_count(), 2);

        device.set_hung(false);
        queue.wait_idle().unwrap();
        assert_eq!(queue.completed_value(), 3);
        let stats = queue.pool_stats(CommandKind::Transfer);
        assert_eq!(stats.created, stats.free);
    }

    #[test]
    fn discard_recycles_without_submitting() {
        init_logger();
        let device = SoftwareDevice::new();
        let queue = queue(&device, 2, Some(1000));
        let submissions = device.stats().submissions;

        let mut command = queue.begin(CommandKind::Transfer, None).unwrap();
        queue
            .create_one_time_buffer(
                &mut command,
                &BufferDescriptor::new("scratch", 4, BufferUsage::COPY_SRC),
                &[0; 4],
            )
            .unwrap();
        let live = device.stats().live_buffers;
        queue.discard(command);

        assert_eq!(device.stats().live_buffers, live - 1);
        assert_eq!(device.stats().submissions, submissions);
        assert_eq!(queue.pool_stats(CommandKind::Transfer).in_use, 0);
    }

    #[test]
    fn one_time_buffers_live_until_reclaim() {
        init_logger();
        let device = SoftwareDevice::new();
        let queue = queue(&device, 2, Some(1000));
        let live_before = device.stats().live_buffers;

        let mut command = queue.begin(CommandKind::Transfer, None).unwrap();
        let scratch = queue
            .create_one_time_buffer(
                &mut command,
                &BufferDescriptor::new("scratch", 4, BufferUsage::COPY_SRC),
                &[0; 4],
            )
            .unwrap();
        assert_eq!(command.transient_buffers(), &[scratch]);
        assert_eq!(device.stats().live_buffers, live_before + 1);

        queue.end(command, true).unwrap();
        assert_eq!(device.stats().live_buffers, live_before);
    }

    #[test]
    fn stop_refuses_new_work_and_releases_everything() {
        init_logger();
        let device = SoftwareDevice::new();
        let queue = queue(&device, 2, Some(1000));

        let command = queue.begin(CommandKind::Graphics, None).unwrap();
        let ticket = queue.end(command, false).unwrap();
        queue.wait(ticket).unwrap();
        let spare = queue.begin(CommandKind::Graphics, None).unwrap();
        queue.stop();
        queue.stop();

        assert!(matches!(
            queue.begin(CommandKind::Graphics, None),
            Err(SubmissionError::Stopped)
        ));
        assert!(matches!(queue.end(spare, false), Err(SubmissionError::Stopped)));
        queue.wait(ticket).unwrap();

        drop(queue);
        assert_eq!(device.stats().live_allocators, 0);
    }

    #[test]
    fn stop_discards_commands_never_handed_off() {
        init_logger();
        let device = SoftwareDevice::new();
        let queue = queue(&device, 1, Some(100));

        device.set_hung(true);
        let tickets: Vec<_> = (0..3)
            .map(|_| {
                let command = queue.begin(CommandKind::Transfer, None).unwrap();
                queue.end(command, false).unwrap()
            })
            .collect();
        wait_until(|| queue.in_flight_count() == 1);
        queue.stop();

        assert_eq!(queue.pending_count(), 0);
        assert_eq!(queue.in_flight_count(), 0);
        let stats = queue.pool_stats(CommandKind::Transfer);
        assert_eq!(stats.in_use, 0);

        // The first call reports the watchdog hit while stopping.
        let _ = queue.wait(tickets[2]);
        assert!(matches!(queue.wait(tickets[2]), Err(SubmissionError::Stopped)));
        device.set_hung(false);
    }
}
