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

use super::command::{RecordedCommand, SoftwareCommandEncoder};
use super::kernels::{builtin_kernel, ComputeKernel, KernelContext};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tessel_core::renderer::api::*;
use tessel_core::renderer::traits::{CommandEncoder, GraphicsDevice};
use tessel_core::renderer::{PipelineError, ResourceError};

#[derive(Debug)]
pub(crate) struct SoftwareBuffer {
    pub(crate) data: Vec<u8>,
    pub(crate) usage: BufferUsage,
    label: Option<String>,
}

#[derive(Debug)]
struct SoftwareShaderModuleEntry {
    label: Option<String>,
    entry_points: Vec<String>,
}

struct SoftwareComputePipelineEntry {
    label: Option<String>,
    entry_point: String,
    kernel: ComputeKernel,
}

impl fmt::Debug for SoftwareComputePipelineEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftwareComputePipelineEntry")
            .field("label", &self.label)
            .field("entry_point", &self.entry_point)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct SoftwareAllocatorEntry {
    kind: CommandKind,
    resets: u64,
}

#[derive(Debug, Default)]
struct FenceTable {
    values: HashMap<FenceId, u64>,
    /// Signals held back while the device simulates a hang.
    withheld: Vec<FenceSignal>,
}

/// Counters describing the device's current load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SoftwareDeviceStats {
    /// Buffers currently alive.
    pub live_buffers: usize,
    /// Bytes held by live buffers.
    pub allocated_bytes: u64,
    /// High-water mark of `allocated_bytes`.
    pub peak_allocated_bytes: u64,
    /// Command allocators currently alive.
    pub live_allocators: usize,
    /// Successful submissions.
    pub submissions: u64,
    /// Rejected submissions.
    pub failed_submissions: u64,
}

/// The internal, non-clonable state of the [`SoftwareDevice`].
#[derive(Debug)]
struct SoftwareDeviceInternal {
    buffers: Mutex<HashMap<BufferId, SoftwareBuffer>>,
    shader_modules: Mutex<HashMap<ShaderModuleId, SoftwareShaderModuleEntry>>,
    pipelines: Mutex<HashMap<ComputePipelineId, SoftwareComputePipelineEntry>>,
    allocators: Mutex<HashMap<CommandAllocatorId, SoftwareAllocatorEntry>>,
    fences: Mutex<FenceTable>,
    fence_signaled: Condvar,

    next_buffer_id: AtomicUsize,
    next_object_id: AtomicU64,

    allocated_bytes: AtomicU64,
    peak_allocated_bytes: AtomicU64,
    submissions: AtomicU64,
    failed_submissions: AtomicU64,

    fail_next_submission: AtomicBool,
    hung: AtomicBool,
}

/// A clonable, thread-safe handle to a CPU-backed graphics device.
///
/// Buffers are plain byte vectors. Recorded commands execute synchronously
/// inside [`GraphicsDevice::submit`], after which the requested fence value
/// is signalled. Two switches simulate faulty hardware:
/// [`fail_next_submission`](Self::fail_next_submission) makes the next
/// submission be rejected, and [`set_hung`](Self::set_hung) withholds fence
/// signals until the hang is cleared.
#[derive(Clone, Debug)]
pub struct SoftwareDevice {
    internal: Arc<SoftwareDeviceInternal>,
}

impl Default for SoftwareDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareDevice {
    /// Creates an empty device.
    pub fn new() -> Self {
        log::info!("SoftwareDevice: created headless CPU device");
        Self {
            internal: Arc::new(SoftwareDeviceInternal {
                buffers: Mutex::new(HashMap::new()),
                shader_modules: Mutex::new(HashMap::new()),
                pipelines: Mutex::new(HashMap::new()),
                allocators: Mutex::new(HashMap::new()),
                fences: Mutex::new(FenceTable::default()),
                fence_signaled: Condvar::new(),
                next_buffer_id: AtomicUsize::new(1),
                next_object_id: AtomicU64::new(1),
                allocated_bytes: AtomicU64::new(0),
                peak_allocated_bytes: AtomicU64::new(0),
                submissions: AtomicU64::new(0),
                failed_submissions: AtomicU64::new(0),
                fail_next_submission: AtomicBool::new(false),
                hung: AtomicBool::new(false),
            }),
        }
    }

    /// Makes the next call to `submit` fail with a backend error.
    pub fn fail_next_submission(&self) {
        self.internal
            .fail_next_submission
            .store(true, Ordering::SeqCst);
    }

    /// Simulates a GPU hang.
    ///
    /// While hung, submissions still execute but their fence signals are held
    /// back. Clearing the hang releases them in submission order.
    pub fn set_hung(&self, hung: bool) {
        let mut fences = self.internal.fences.lock();
        self.internal.hung.store(hung, Ordering::SeqCst);
        if !hung {
            let withheld = std::mem::take(&mut fences.withheld);
            for signal in withheld {
                Self::apply_signal(&mut fences, signal);
            }
            self.internal.fence_signaled.notify_all();
        }
        log::warn!("SoftwareDevice: hang simulation {}", if hung { "on" } else { "off" });
    }

    /// Returns a snapshot of the device counters.
    pub fn stats(&self) -> SoftwareDeviceStats {
        SoftwareDeviceStats {
            live_buffers: self.internal.buffers.lock().len(),
            allocated_bytes: self.internal.allocated_bytes.load(Ordering::Relaxed),
            peak_allocated_bytes: self.internal.peak_allocated_bytes.load(Ordering::Relaxed),
            live_allocators: self.internal.allocators.lock().len(),
            submissions: self.internal.submissions.load(Ordering::Relaxed),
            failed_submissions: self.internal.failed_submissions.load(Ordering::Relaxed),
        }
    }

    /// Copies the full contents of a buffer regardless of its usage flags.
    pub fn snapshot_buffer(&self, id: BufferId) -> Option<Vec<u8>> {
        self.internal.buffers.lock().get(&id).map(|b| b.data.clone())
    }

    /// Number of times the allocator has been reset.
    pub fn allocator_reset_count(&self, id: CommandAllocatorId) -> Option<u64> {
        self.internal.allocators.lock().get(&id).map(|a| a.resets)
    }

    fn next_object_id(&self) -> u64 {
        self.internal.next_object_id.fetch_add(1, Ordering::Relaxed)
    }

    fn apply_signal(fences: &mut FenceTable, signal: FenceSignal) {
        if let Some(value) = fences.values.get_mut(&signal.fence) {
            *value = (*value).max(signal.value);
        }
    }

    fn complete(&self, signal: FenceSignal) {
        let mut fences = self.internal.fences.lock();
        if self.internal.hung.load(Ordering::SeqCst) {
            log::trace!("SoftwareDevice: withholding {signal:?} while hung");
            fences.withheld.push(signal);
            return;
        }
        Self::apply_signal(&mut fences, signal);
        self.internal.fence_signaled.notify_all();
    }

    fn kernel_for(&self, pipeline: ComputePipelineId) -> Result<ComputeKernel, ResourceError> {
        self.internal
            .pipelines
            .lock()
            .get(&pipeline)
            .map(|p| p.kernel)
            .ok_or(ResourceError::Pipeline(
                PipelineError::InvalidComputePipeline { id: pipeline },
            ))
    }

    fn track_allocation(&self, size: u64) {
        let current = self.internal.allocated_bytes.fetch_add(size, Ordering::Relaxed) + size;
        self.internal
            .peak_allocated_bytes
            .fetch_max(current, Ordering::Relaxed);
    }
}

fn check_range(id: BufferId, buffer: &SoftwareBuffer, offset: u64, size: u64) -> Result<(), ResourceError> {
    let capacity = buffer.data.len() as u64;
    match offset.checked_add(size) {
        Some(end) if end <= capacity => Ok(()),
        _ => {
            log::warn!(
                "SoftwareDevice: access of {size} bytes at {offset} overflows buffer {id:?} ({capacity} bytes)"
            );
            Err(ResourceError::OutOfBounds {
                offset,
                size,
                capacity,
            })
        }
    }
}

fn check_usage(id: BufferId, buffer: &SoftwareBuffer, required: BufferUsage) -> Result<(), ResourceError> {
    if buffer.usage.contains(required) {
        Ok(())
    } else {
        Err(ResourceError::MissingUsage {
            buffer: id,
            required,
        })
    }
}

fn validate_copy(
    buffers: &HashMap<BufferId, SoftwareBuffer>,
    source: BufferId,
    source_offset: u64,
    destination: BufferId,
    destination_offset: u64,
    size: u64,
) -> Result<(), ResourceError> {
    let src = buffers.get(&source).ok_or(ResourceError::NotFound)?;
    let dst = buffers.get(&destination).ok_or(ResourceError::NotFound)?;
    check_usage(source, src, BufferUsage::COPY_SRC)?;
    check_usage(destination, dst, BufferUsage::COPY_DST)?;
    check_range(source, src, source_offset, size)?;
    check_range(destination, dst, destination_offset, size)
}

fn copy_range(
    buffers: &mut HashMap<BufferId, SoftwareBuffer>,
    source: BufferId,
    source_offset: u64,
    destination: BufferId,
    destination_offset: u64,
    size: u64,
) -> Result<(), ResourceError> {
    let (so, doff, len) = (source_offset as usize, destination_offset as usize, size as usize);
    if source == destination {
        let buffer = buffers.get_mut(&source).ok_or(ResourceError::NotFound)?;
        buffer.data.copy_within(so..so + len, doff);
        return Ok(());
    }
    let bytes = buffers
        .get(&source)
        .ok_or(ResourceError::NotFound)?
        .data[so..so + len]
        .to_vec();
    let dst = buffers.get_mut(&destination).ok_or(ResourceError::NotFound)?;
    dst.data[doff..doff + len].copy_from_slice(&bytes);
    Ok(())
}

/// Names of the `@compute` functions declared in a WGSL module.
fn compute_entry_points(source: &str) -> Vec<String> {
    let mut entry_points = Vec::new();
    let mut rest = source;
    while let Some(pos) = rest.find("@compute") {
        rest = &rest[pos + "@compute".len()..];
        if let Some(fn_pos) = rest.find("fn ") {
            let name: String = rest[fn_pos + 3..]
                .trim_start()
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_')
                .collect();
            if !name.is_empty() {
                entry_points.push(name);
            }
        }
    }
    entry_points
}

impl SoftwareDevice {
    fn validate(
        &self,
        buffers: &HashMap<BufferId, SoftwareBuffer>,
        commands: &[RecordedCommand],
    ) -> Result<(), ResourceError> {
        for command in commands {
            match command {
                RecordedCommand::CopyBufferToBuffer {
                    source,
                    source_offset,
                    destination,
                    destination_offset,
                    size,
                } => validate_copy(
                    buffers,
                    *source,
                    *source_offset,
                    *destination,
                    *destination_offset,
                    *size,
                )?,
                RecordedCommand::CopyBufferRegions {
                    source,
                    destination,
                    regions,
                } => {
                    for region in regions {
                        validate_copy(
                            buffers,
                            *source,
                            region.source_offset,
                            *destination,
                            region.destination_offset,
                            region.size,
                        )?;
                    }
                }
                RecordedCommand::Dispatch {
                    pipeline, bindings, ..
                } => {
                    self.kernel_for(*pipeline)?;
                    for binding in bindings {
                        let buffer = buffers.get(&binding.buffer).ok_or(ResourceError::NotFound)?;
                        if !buffer
                            .usage
                            .intersects(BufferUsage::STORAGE | BufferUsage::UNIFORM)
                        {
                            return Err(ResourceError::MissingUsage {
                                buffer: binding.buffer,
                                required: BufferUsage::STORAGE,
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn execute(
        &self,
        buffers: &mut HashMap<BufferId, SoftwareBuffer>,
        commands: &[RecordedCommand],
    ) -> Result<(), ResourceError> {
        for command in commands {
            match command {
                RecordedCommand::CopyBufferToBuffer {
                    source,
                    source_offset,
                    destination,
                    destination_offset,
                    size,
                } => copy_range(
                    buffers,
                    *source,
                    *source_offset,
                    *destination,
                    *destination_offset,
                    *size,
                )?,
                RecordedCommand::CopyBufferRegions {
                    source,
                    destination,
                    regions,
                } => {
                    for region in regions {
                        copy_range(
                            buffers,
                            *source,
                            region.source_offset,
                            *destination,
                            region.destination_offset,
                            region.size,
                        )?;
                    }
                }
                RecordedCommand::Dispatch {
                    label,
                    pipeline,
                    bindings,
                    workgroups,
                } => {
                    let kernel = self.kernel_for(*pipeline)?;
                    let mut context = KernelContext::new(buffers, bindings, *workgroups);
                    kernel(&mut context)?;
                    log::trace!(
                        "SoftwareDevice: dispatched '{}' {:?}",
                        label.as_deref().unwrap_or("Unnamed"),
                        workgroups
                    );
                }
            }
        }
        Ok(())
    }
}

impl GraphicsDevice for SoftwareDevice {
    fn adapter_info(&self) -> GraphicsAdapterInfo {
        GraphicsAdapterInfo {
            name: "Tessel CPU Device".to_string(),
            backend_type: GraphicsBackendType::Software,
        }
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError> {
        let id = BufferId(self.internal.next_buffer_id.fetch_add(1, Ordering::Relaxed));
        let size = descriptor.size;
        let buffer = SoftwareBuffer {
            data: vec![0; size as usize],
            usage: descriptor.usage,
            label: descriptor.label.as_deref().map(str::to_owned),
        };
        self.internal.buffers.lock().insert(id, buffer);
        self.track_allocation(size);
        log::debug!(
            "SoftwareDevice: Created buffer {:?} '{}' ({} bytes, {:?})",
            id,
            descriptor.label.as_deref().unwrap_or("Unnamed"),
            size,
            descriptor.usage
        );
        Ok(id)
    }

    fn create_buffer_with_data(
        &self,
        descriptor: &BufferDescriptor,
        data: &[u8],
    ) -> Result<BufferId, ResourceError> {
        if data.len() as u64 > descriptor.size {
            return Err(ResourceError::OutOfBounds {
                offset: 0,
                size: data.len() as u64,
                capacity: descriptor.size,
            });
        }
        let id = self.create_buffer(descriptor)?;
        if let Some(buffer) = self.internal.buffers.lock().get_mut(&id) {
            buffer.data[..data.len()].copy_from_slice(data);
        }
        Ok(id)
    }

    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError> {
        let removed = self.internal.buffers.lock().remove(&id);
        match removed {
            Some(buffer) => {
                self.internal
                    .allocated_bytes
                    .fetch_sub(buffer.data.len() as u64, Ordering::Relaxed);
                log::debug!(
                    "SoftwareDevice: Destroyed buffer {:?} '{}'",
                    id,
                    buffer.label.as_deref().unwrap_or("Unnamed")
                );
                Ok(())
            }
            None => Err(ResourceError::NotFound),
        }
    }

    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError> {
        let mut buffers = self.internal.buffers.lock();
        let buffer = buffers.get_mut(&id).ok_or(ResourceError::NotFound)?;
        check_usage(id, buffer, BufferUsage::MAP_WRITE)?;
        check_range(id, buffer, offset, data.len() as u64)?;
        let start = offset as usize;
        buffer.data[start..start + data.len()].copy_from_slice(data);
        log::trace!(
            "SoftwareDevice: Wrote {} bytes to buffer {:?} at offset {}",
            data.len(),
            id,
            offset
        );
        Ok(())
    }

    fn read_buffer(&self, id: BufferId, offset: u64, out: &mut [u8]) -> Result<(), ResourceError> {
        let buffers = self.internal.buffers.lock();
        let buffer = buffers.get(&id).ok_or(ResourceError::NotFound)?;
        check_usage(id, buffer, BufferUsage::MAP_READ)?;
        check_range(id, buffer, offset, out.len() as u64)?;
        let start = offset as usize;
        out.copy_from_slice(&buffer.data[start..start + out.len()]);
        Ok(())
    }

    fn create_shader_module(
        &self,
        descriptor: &ShaderModuleDescriptor,
    ) -> Result<ShaderModuleId, ResourceError> {
        let ShaderSourceData::Wgsl(source) = &descriptor.source;
        let entry_points = compute_entry_points(source);
        let id = ShaderModuleId(self.next_object_id());
        log::debug!(
            "SoftwareDevice: Created shader module {:?} '{}' with compute entry points {:?}",
            id,
            descriptor.label.unwrap_or("Unnamed"),
            entry_points
        );
        self.internal.shader_modules.lock().insert(
            id,
            SoftwareShaderModuleEntry {
                label: descriptor.label.map(str::to_owned),
                entry_points,
            },
        );
        Ok(id)
    }

    fn destroy_shader_module(&self, id: ShaderModuleId) -> Result<(), ResourceError> {
        self.internal
            .shader_modules
            .lock()
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn create_compute_pipeline(
        &self,
        descriptor: &ComputePipelineDescriptor,
    ) -> Result<ComputePipelineId, ResourceError> {
        let pipeline_label = descriptor.label.as_deref().map(str::to_owned);
        let entry_point = descriptor.entry_point.as_ref();
        {
            let modules = self.internal.shader_modules.lock();
            let module = modules.get(&descriptor.module).ok_or_else(|| {
                PipelineError::InvalidShaderModule {
                    id: descriptor.module,
                    pipeline_label: pipeline_label.clone(),
                }
            })?;
            if !module.entry_points.iter().any(|e| e == entry_point) {
                log::error!(
                    "SoftwareDevice: shader module '{}' has no @compute fn '{}'",
                    module.label.as_deref().unwrap_or("Unnamed"),
                    entry_point
                );
                return Err(PipelineError::UnknownEntryPoint {
                    entry_point: entry_point.to_owned(),
                    pipeline_label,
                }
                .into());
            }
        }
        let kernel = builtin_kernel(entry_point).ok_or_else(|| {
            log::error!("SoftwareDevice: no CPU kernel registered for '{entry_point}'");
            PipelineError::UnknownEntryPoint {
                entry_point: entry_point.to_owned(),
                pipeline_label: pipeline_label.clone(),
            }
        })?;

        let id = ComputePipelineId(self.next_object_id());
        self.internal.pipelines.lock().insert(
            id,
            SoftwareComputePipelineEntry {
                label: pipeline_label,
                entry_point: entry_point.to_owned(),
                kernel,
            },
        );
        log::debug!("SoftwareDevice: Created compute pipeline {id:?} for '{entry_point}'");
        Ok(id)
    }

    fn destroy_compute_pipeline(&self, id: ComputePipelineId) -> Result<(), ResourceError> {
        self.internal
            .pipelines
            .lock()
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn create_command_allocator(
        &self,
        kind: CommandKind,
    ) -> Result<CommandAllocatorId, ResourceError> {
        let id = CommandAllocatorId(self.next_object_id());
        self.internal
            .allocators
            .lock()
            .insert(id, SoftwareAllocatorEntry { kind, resets: 0 });
        log::trace!("SoftwareDevice: Created {kind} command allocator {id:?}");
        Ok(id)
    }

    fn reset_command_allocator(&self, id: CommandAllocatorId) -> Result<(), ResourceError> {
        let mut allocators = self.internal.allocators.lock();
        let entry = allocators.get_mut(&id).ok_or(ResourceError::NotFound)?;
        entry.resets += 1;
        Ok(())
    }

    fn destroy_command_allocator(&self, id: CommandAllocatorId) -> Result<(), ResourceError> {
        self.internal
            .allocators
            .lock()
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn create_command_encoder(
        &self,
        allocator: CommandAllocatorId,
        label: Option<&str>,
    ) -> Result<Box<dyn CommandEncoder>, ResourceError> {
        let kind = self
            .internal
            .allocators
            .lock()
            .get(&allocator)
            .map(|a| a.kind)
            .ok_or(ResourceError::InvalidHandle)?;
        Ok(Box::new(SoftwareCommandEncoder::new(kind, allocator, label)))
    }

    fn create_fence(&self, initial_value: u64) -> Result<FenceId, ResourceError> {
        let id = FenceId(self.next_object_id());
        self.internal.fences.lock().values.insert(id, initial_value);
        Ok(id)
    }

    fn destroy_fence(&self, id: FenceId) -> Result<(), ResourceError> {
        let mut fences = self.internal.fences.lock();
        let removed = fences.values.remove(&id);
        fences.withheld.retain(|s| s.fence != id);
        // Wake waiters so they observe the fence is gone.
        self.internal.fence_signaled.notify_all();
        removed.map(|_| ()).ok_or(ResourceError::NotFound)
    }

    fn fence_value(&self, id: FenceId) -> Result<u64, ResourceError> {
        self.internal
            .fences
            .lock()
            .values
            .get(&id)
            .copied()
            .ok_or(ResourceError::NotFound)
    }

    fn wait_fence(
        &self,
        id: FenceId,
        value: u64,
        timeout: Option<Duration>,
    ) -> Result<FenceStatus, ResourceError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut fences = self.internal.fences.lock();
        loop {
            let current = *fences.values.get(&id).ok_or(ResourceError::NotFound)?;
            if current >= value {
                return Ok(FenceStatus::Signaled);
            }
            match deadline {
                Some(deadline) => {
                    if self
                        .internal
                        .fence_signaled
                        .wait_until(&mut fences, deadline)
                        .timed_out()
                    {
                        let current = *fences.values.get(&id).ok_or(ResourceError::NotFound)?;
                        return Ok(if current >= value {
                            FenceStatus::Signaled
                        } else {
                            FenceStatus::TimedOut
                        });
                    }
                }
                None => self.internal.fence_signaled.wait(&mut fences),
            }
        }
    }

    fn signal_fence(&self, id: FenceId, value: u64) -> Result<(), ResourceError> {
        let mut fences = self.internal.fences.lock();
        let current = fences.values.get_mut(&id).ok_or(ResourceError::NotFound)?;
        *current = (*current).max(value);
        self.internal.fence_signaled.notify_all();
        Ok(())
    }

    fn submit(
        &self,
        kind: CommandKind,
        encoder: &mut dyn CommandEncoder,
        signal: Option<FenceSignal>,
    ) -> Result<(), ResourceError> {
        let encoder = encoder
            .as_any()
            .downcast_ref::<SoftwareCommandEncoder>()
            .ok_or_else(|| {
                ResourceError::BackendError(
                    "command encoder was not created by a SoftwareDevice".to_string(),
                )
            })?;
        if encoder.kind() != kind {
            return Err(ResourceError::BackendError(format!(
                "{} encoder submitted to the {kind} queue",
                encoder.kind()
            )));
        }
        if !self
            .internal
            .allocators
            .lock()
            .contains_key(&encoder.allocator())
        {
            return Err(ResourceError::InvalidHandle);
        }
        if let Some(signal) = signal {
            if !self.internal.fences.lock().values.contains_key(&signal.fence) {
                return Err(ResourceError::NotFound);
            }
        }
        if self
            .internal
            .fail_next_submission
            .swap(false, Ordering::SeqCst)
        {
            self.internal.failed_submissions.fetch_add(1, Ordering::Relaxed);
            log::error!(
                "SoftwareDevice: rejecting submission '{}' (injected failure)",
                encoder.label().unwrap_or("Unnamed")
            );
            return Err(ResourceError::BackendError(
                "injected submission failure".to_string(),
            ));
        }

        {
            let mut buffers = self.internal.buffers.lock();
            let result = self
                .validate(&buffers, encoder.commands())
                .and_then(|()| self.execute(&mut buffers, encoder.commands()));
            if let Err(e) = result {
                self.internal.failed_submissions.fetch_add(1, Ordering::Relaxed);
                log::error!(
                    "SoftwareDevice: submission '{}' failed: {}",
                    encoder.label().unwrap_or("Unnamed"),
                    e
                );
                return Err(e);
            }
        }

        self.internal.submissions.fetch_add(1, Ordering::Relaxed);
        log::trace!(
            "SoftwareDevice: executed '{}' ({} commands) on the {kind} queue",
            encoder.label().unwrap_or("Unnamed"),
            encoder.command_count()
        );
        if let Some(signal) = signal {
            self.complete(signal);
        }
        Ok(())
    }
}
