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

use crate::renderer::api::*;
use crate::renderer::error::ResourceError;
use crate::renderer::traits::CommandEncoder;
use std::fmt::Debug;
use std::time::Duration;

/// The narrow slice of a graphics device that the renderer core consumes.
///
/// Implementations must be thread-safe: the submission queue calls [`submit`]
/// and the fence functions from its background thread while the render thread
/// creates buffers and records commands.
///
/// [`submit`]: GraphicsDevice::submit
pub trait GraphicsDevice: Send + Sync + Debug + 'static {
    /// Returns information about the adapter this device runs on.
    fn adapter_info(&self) -> GraphicsAdapterInfo;

    /// Creates a new GPU buffer.
    /// ## Arguments
    /// * `descriptor` - A reference to a `BufferDescriptor` containing the buffer configuration.
    /// ## Returns
    /// A `Result` containing the ID of the created buffer or an error if the creation fails.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError>;

    /// Creates a new GPU buffer and initializes it with the provided data.
    /// ## Arguments
    /// * `descriptor` - A reference to a `BufferDescriptor` containing the buffer configuration.
    /// * `data` - A slice of bytes containing the initial data for the buffer.
    /// ## Returns
    /// A `Result` containing the ID of the created buffer or an error if the creation fails.
    fn create_buffer_with_data(
        &self,
        descriptor: &BufferDescriptor,
        data: &[u8],
    ) -> Result<BufferId, ResourceError>;

    /// Destroys a GPU buffer.
    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError>;

    /// Writes data into a host-visible buffer.
    /// ## Arguments
    /// * `id` - The ID of the buffer to write to. It must have `MAP_WRITE` usage.
    /// * `offset` - The offset in the buffer where the data will be written.
    /// * `data` - A slice of bytes containing the data to be written.
    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError>;

    /// Reads data back from a host-visible buffer.
    ///
    /// The caller is responsible for waiting on the fence of the submission
    /// that last wrote the range; the read observes whatever has completed.
    /// ## Arguments
    /// * `id` - The ID of the buffer to read. It must have `MAP_READ` usage.
    /// * `offset` - The offset in the buffer to read from.
    /// * `out` - Destination; exactly `out.len()` bytes are read.
    fn read_buffer(&self, id: BufferId, offset: u64, out: &mut [u8]) -> Result<(), ResourceError>;

    /// Creates a shader module from the provided descriptor.
    fn create_shader_module(
        &self,
        descriptor: &ShaderModuleDescriptor,
    ) -> Result<ShaderModuleId, ResourceError>;

    /// Destroys the shader module associated with the given ID.
    fn destroy_shader_module(&self, id: ShaderModuleId) -> Result<(), ResourceError>;

    /// Creates a compute pipeline for an entry point of a shader module.
    /// ## Errors
    /// * `ResourceError::Pipeline` - If the module is unknown or lacks the entry point.
    fn create_compute_pipeline(
        &self,
        descriptor: &ComputePipelineDescriptor,
    ) -> Result<ComputePipelineId, ResourceError>;

    /// Destroys the compute pipeline associated with the given ID.
    fn destroy_compute_pipeline(&self, id: ComputePipelineId) -> Result<(), ResourceError>;

    /// Creates a command allocator for the queue of the given kind.
    fn create_command_allocator(
        &self,
        kind: CommandKind,
    ) -> Result<CommandAllocatorId, ResourceError>;

    /// Resets an allocator, reclaiming the memory of everything recorded from it.
    ///
    /// Must only be called once the GPU has finished with those commands.
    fn reset_command_allocator(&self, id: CommandAllocatorId) -> Result<(), ResourceError>;

    /// Destroys a command allocator.
    fn destroy_command_allocator(&self, id: CommandAllocatorId) -> Result<(), ResourceError>;

    /// Creates a reusable command encoder bound to `allocator`.
    fn create_command_encoder(
        &self,
        allocator: CommandAllocatorId,
        label: Option<&str>,
    ) -> Result<Box<dyn CommandEncoder>, ResourceError>;

    /// Creates a timeline fence starting at `initial_value`.
    fn create_fence(&self, initial_value: u64) -> Result<FenceId, ResourceError>;

    /// Destroys a fence.
    fn destroy_fence(&self, id: FenceId) -> Result<(), ResourceError>;

    /// Returns the last value the fence completed.
    fn fence_value(&self, id: FenceId) -> Result<u64, ResourceError>;

    /// Blocks until the fence reaches `value` or the timeout elapses.
    ///
    /// `None` waits forever.
    fn wait_fence(
        &self,
        id: FenceId,
        value: u64,
        timeout: Option<Duration>,
    ) -> Result<FenceStatus, ResourceError>;

    /// Signals a fence from the host. Values lower than the current one are ignored.
    fn signal_fence(&self, id: FenceId, value: u64) -> Result<(), ResourceError>;

    /// Submits the commands recorded in `encoder` to the queue of `kind`.
    ///
    /// The encoder keeps its recording; it must not be re-begun until the
    /// submission has completed, as signalled through `signal`.
    /// ## Errors
    /// * `ResourceError::BackendError` - If the device rejects the submission.
    fn submit(
        &self,
        kind: CommandKind,
        encoder: &mut dyn CommandEncoder,
        signal: Option<FenceSignal>,
    ) -> Result<(), ResourceError>;
}
