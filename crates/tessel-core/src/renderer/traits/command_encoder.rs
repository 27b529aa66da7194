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

use crate::renderer::api::{BufferCopyRegion, BufferId, CommandKind, ComputeDispatch};
use std::any::Any;
use std::fmt::Debug;

/// A trait for an object that records a sequence of GPU commands.
///
/// Unlike a one-shot encoder, a `CommandEncoder` here is reusable: it is bound
/// to a command allocator for its whole life and re-armed with [`begin`] each
/// time its owning command is taken from a pool. Recording never fails; errors
/// such as out-of-bounds copies are reported when the commands are submitted.
///
/// [`begin`]: CommandEncoder::begin
pub trait CommandEncoder: Send + Debug {
    /// The queue kind this encoder records for.
    fn kind(&self) -> CommandKind;

    /// Discards anything previously recorded and starts a new recording.
    fn begin(&mut self, label: Option<&str>);

    /// The label given to the current recording, if any.
    fn label(&self) -> Option<&str>;

    /// Records a command to copy data from one buffer to another on the GPU.
    fn copy_buffer_to_buffer(
        &mut self,
        source: &BufferId,
        source_offset: u64,
        destination: &BufferId,
        destination_offset: u64,
        size: u64,
    );

    /// Records a batched copy of several disjoint regions between two buffers.
    ///
    /// Recording an empty region list is allowed and records nothing.
    fn copy_buffer_regions(
        &mut self,
        source: &BufferId,
        destination: &BufferId,
        regions: &[BufferCopyRegion],
    );

    /// Records a compute dispatch.
    fn dispatch_compute(&mut self, dispatch: &ComputeDispatch<'_>);

    /// Number of commands recorded since the last [`begin`](CommandEncoder::begin).
    fn command_count(&self) -> usize;

    /// Returns a reference to the underlying trait object as `Any`.
    fn as_any(&self) -> &dyn Any;

    /// Returns a mutable reference to the underlying trait object as `Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
