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

//! Recycling of command recording contexts.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tessel_core::renderer::{
    BufferId, CommandAllocatorId, CommandEncoder, CommandKind, GraphicsDevice, ResourceError,
};

/// Where a [`Command`] is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandState {
    /// Sitting in the pool.
    Free,
    /// Handed out by [`CommandPool::begin`], accepting commands.
    Recording,
    /// Handed to a queue; owned by it until its fence value completes.
    Submitted,
}

/// A command allocator and the encoder recording into it.
///
/// Taken from a [`CommandPool`], recorded into, then handed to a
/// [`SubmissionQueue`](super::SubmissionQueue), which gives it back to the
/// pool once the GPU is done with it.
pub struct Command {
    kind: CommandKind,
    allocator: CommandAllocatorId,
    encoder: Box<dyn CommandEncoder>,
    label: Option<String>,
    state: CommandState,
    pub(crate) transient_buffers: Vec<BufferId>,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("state", &self.state)
            .field("commands", &self.encoder.command_count())
            .finish()
    }
}

impl Command {
    /// The queue kind this command records for.
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// Debug label of the current recording.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CommandState {
        self.state
    }

    /// The backing allocator.
    pub fn allocator(&self) -> CommandAllocatorId {
        self.allocator
    }

    /// The encoder to record into.
    pub fn encoder(&mut self) -> &mut dyn CommandEncoder {
        self.encoder.as_mut()
    }

    /// Buffers that will be destroyed when this command is reclaimed.
    pub fn transient_buffers(&self) -> &[BufferId] {
        &self.transient_buffers
    }

    pub(crate) fn mark_submitted(&mut self) {
        self.state = CommandState::Submitted;
    }
}

/// Counters of one command kind in a [`CommandPool`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Allocator/encoder pairs created so far and not destroyed.
    pub created: usize,
    /// Pairs waiting in the pool.
    pub free: usize,
    /// Pairs out of the pool: recording, queued or in flight.
    pub in_use: usize,
}

#[derive(Debug, Default)]
struct PoolState {
    free: HashMap<CommandKind, Vec<Command>>,
    created: HashMap<CommandKind, usize>,
}

/// A pool of reusable [`Command`]s, one free list per [`CommandKind`].
pub struct CommandPool {
    device: Arc<dyn GraphicsDevice>,
    state: Mutex<PoolState>,
}

impl fmt::Debug for CommandPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandPool")
            .field("graphics", &self.stats(CommandKind::Graphics))
            .field("transfer", &self.stats(CommandKind::Transfer))
            .finish()
    }
}

impl CommandPool {
    /// Creates an empty pool.
    pub fn new(device: Arc<dyn GraphicsDevice>) -> Self {
        Self {
            device,
            state: Mutex::new(PoolState::default()),
        }
    }

    /// Takes a free command of `kind`, or creates one, and starts recording.
    pub fn begin(&self, kind: CommandKind, label: Option<&str>) -> Result<Command, ResourceError> {
        let reused = self
            .state
            .lock()
            .free
            .get_mut(&kind)
            .and_then(Vec::pop);

        let mut command = match reused {
            Some(command) => {
                self.device.reset_command_allocator(command.allocator)?;
                command
            }
            None => {
                let allocator = self.device.create_command_allocator(kind)?;
                let encoder = match self.device.create_command_encoder(allocator, label) {
                    Ok(encoder) => encoder,
                    Err(e) => {
                        let _ = self.device.destroy_command_allocator(allocator);
                        return Err(e);
                    }
                };
                *self.state.lock().created.entry(kind).or_default() += 1;
                log::debug!("CommandPool: Created new {kind} command ({allocator:?})");
                Command {
                    kind,
                    allocator,
                    encoder,
                    label: None,
                    state: CommandState::Free,
                    transient_buffers: Vec::new(),
                }
            }
        };

        command.encoder.begin(label);
        command.label = label.map(str::to_owned);
        command.state = CommandState::Recording;
        Ok(command)
    }

    /// Puts a command back in the pool.
    ///
    /// The caller guarantees the GPU no longer uses it and that its transient
    /// buffers are gone.
    pub fn recycle(&self, mut command: Command) {
        debug_assert!(command.transient_buffers.is_empty());
        command.state = CommandState::Free;
        command.label = None;
        self.state
            .lock()
            .free
            .entry(command.kind)
            .or_default()
            .push(command);
    }

    /// Counters for `kind`.
    pub fn stats(&self, kind: CommandKind) -> PoolStats {
        let state = self.state.lock();
        let created = state.created.get(&kind).copied().unwrap_or(0);
        let free = state.free.get(&kind).map_or(0, Vec::len);
        PoolStats {
            created,
            free,
            in_use: created - free,
        }
    }

    /// Destroys every pooled allocator. Commands out of the pool are unaffected.
    pub fn destroy_free(&self) {
        let mut state = self.state.lock();
        let PoolState { free, created } = &mut *state;
        for (kind, commands) in free.drain() {
            let count = commands.len();
            for command in commands {
                if let Err(e) = self.device.destroy_command_allocator(command.allocator) {
                    log::warn!(
                        "CommandPool: Failed to destroy allocator {:?}: {:?}",
                        command.allocator,
                        e
                    );
                }
            }
            if let Some(total) = created.get_mut(&kind) {
                *total -= count;
            }
            log::debug!("CommandPool: Released {count} {kind} commands");
        }
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        self.destroy_free();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessel_infra::SoftwareDevice;

    fn pool() -> (SoftwareDevice, CommandPool) {
        let device = SoftwareDevice::new();
        let pool = CommandPool::new(Arc::new(device.clone()));
        (device, pool)
    }

    #[test]
    fn begin_creates_then_reuses() {
        let (device, pool) = pool();
        let command = pool.begin(CommandKind::Graphics, Some("first")).unwrap();
        assert_eq!(command.state(), CommandState::Recording);
        assert_eq!(command.label(), Some("first"));
        let allocator = command.allocator();
        pool.recycle(command);

        let again = pool.begin(CommandKind::Graphics, Some("second")).unwrap();
        assert_eq!(again.allocator(), allocator);
        assert_eq!(device.allocator_reset_count(allocator), Some(1));
        assert_eq!(again.label(), Some("second"));
        pool.recycle(again);

        assert_eq!(
            pool.stats(CommandKind::Graphics),
            PoolStats {
                created: 1,
                free: 1,
                in_use: 0
            }
        );
    }

    #[test]
    fn reused_command_starts_empty() {
        let (device, pool) = pool();
        let buffer = device
            .create_buffer(&tessel_core::renderer::BufferDescriptor::new(
                "scratch",
                16,
                tessel_core::renderer::BufferUsage::COPY_SRC
                    | tessel_core::renderer::BufferUsage::COPY_DST,
            ))
            .unwrap();
        let mut command = pool.begin(CommandKind::Transfer, None).unwrap();
        command.encoder().copy_buffer_to_buffer(&buffer, 0, &buffer, 8, 8);
        assert_eq!(command.encoder().command_count(), 1);
        pool.recycle(command);

        let mut command = pool.begin(CommandKind::Transfer, None).unwrap();
        assert_eq!(command.encoder().command_count(), 0);
        pool.recycle(command);
    }

    #[test]
    fn kinds_have_separate_free_lists() {
        let (_device, pool) = pool();
        let graphics = pool.begin(CommandKind::Graphics, None).unwrap();
        pool.recycle(graphics);
        let transfer = pool.begin(CommandKind::Transfer, None).unwrap();
        assert_eq!(transfer.kind(), CommandKind::Transfer);
        assert_eq!(pool.stats(CommandKind::Graphics).free, 1);
        assert_eq!(pool.stats(CommandKind::Transfer).in_use, 1);
        pool.recycle(transfer);
    }

    #[test]
    fn destroy_free_releases_allocators() {
        let (device, pool) = pool();
        let a = pool.begin(CommandKind::Graphics, None).unwrap();
        let b = pool.begin(CommandKind::Graphics, None).unwrap();
        pool.recycle(a);
        assert_eq!(device.stats().live_allocators, 2);

        pool.destroy_free();
        assert_eq!(device.stats().live_allocators, 1);
        assert_eq!(pool.stats(CommandKind::Graphics).created, 1);
        assert_eq!(pool.stats(CommandKind::Graphics).in_use, 1);
        pool.recycle(b);
    }
}
