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

use tessel_core::renderer::api::{
    BufferBinding, BufferCopyRegion, BufferId, CommandAllocatorId, CommandKind, ComputeDispatch,
    ComputePipelineId,
};
use tessel_core::renderer::traits::CommandEncoder;
use std::any::Any;

/// A command captured by a [`SoftwareCommandEncoder`], replayed on submit.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    /// A single buffer-to-buffer copy.
    CopyBufferToBuffer {
        /// Source buffer.
        source: BufferId,
        /// Byte offset in the source.
        source_offset: u64,
        /// Destination buffer.
        destination: BufferId,
        /// Byte offset in the destination.
        destination_offset: u64,
        /// Bytes to copy.
        size: u64,
    },
    /// A batched copy of several regions between the same two buffers.
    CopyBufferRegions {
        /// Source buffer.
        source: BufferId,
        /// Destination buffer.
        destination: BufferId,
        /// The copied ranges.
        regions: Vec<BufferCopyRegion>,
    },
    /// A compute dispatch.
    Dispatch {
        /// Debug label.
        label: Option<String>,
        /// The pipeline to run.
        pipeline: ComputePipelineId,
        /// Bound buffers.
        bindings: Vec<BufferBinding>,
        /// Workgroup counts.
        workgroups: [u32; 3],
    },
}

/// The software backend's [`CommandEncoder`]: a plain list of commands.
#[derive(Debug)]
pub struct SoftwareCommandEncoder {
    kind: CommandKind,
    allocator: CommandAllocatorId,
    label: Option<String>,
    commands: Vec<RecordedCommand>,
}

impl SoftwareCommandEncoder {
    pub(crate) fn new(kind: CommandKind, allocator: CommandAllocatorId, label: Option<&str>) -> Self {
        Self {
            kind,
            allocator,
            label: label.map(str::to_owned),
            commands: Vec::new(),
        }
    }

    /// The allocator this encoder records into.
    pub fn allocator(&self) -> CommandAllocatorId {
        self.allocator
    }

    /// The commands recorded since the last `begin`.
    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }
}

impl CommandEncoder for SoftwareCommandEncoder {
    fn kind(&self) -> CommandKind {
        self.kind
    }

    fn begin(&mut self, label: Option<&str>) {
        self.commands.clear();
        self.label = label.map(str::to_owned);
    }

    fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    fn copy_buffer_to_buffer(
        &mut self,
        source: &BufferId,
        source_offset: u64,
        destination: &BufferId,
        destination_offset: u64,
        size: u64,
    ) {
        self.commands.push(RecordedCommand::CopyBufferToBuffer {
            source: *source,
            source_offset,
            destination: *destination,
            destination_offset,
            size,
        });
    }

    fn copy_buffer_regions(
        &mut self,
        source: &BufferId,
        destination: &BufferId,
        regions: &[BufferCopyRegion],
    ) {
        if regions.is_empty() {
            return;
        }
        self.commands.push(RecordedCommand::CopyBufferRegions {
            source: *source,
            destination: *destination,
            regions: regions.to_vec(),
        });
    }

    fn dispatch_compute(&mut self, dispatch: &ComputeDispatch<'_>) {
        self.commands.push(RecordedCommand::Dispatch {
            label: dispatch.label.map(str::to_owned),
            pipeline: dispatch.pipeline,
            bindings: dispatch.bindings.to_vec(),
            workgroups: dispatch.workgroups,
        });
    }

    fn command_count(&self) -> usize {
        self.commands.len()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
