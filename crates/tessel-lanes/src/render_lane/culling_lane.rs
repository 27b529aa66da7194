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

//! Frustum culling and draw compaction on the GPU.

use super::resources::GraphicsResources;
use std::fmt;
use std::sync::Arc;
use tessel_core::math::{Frustum, Mat4};
use tessel_core::memory::{GpuMemoryArena, MemoryBlock};
use tessel_core::renderer::{
    cull_bindings, BufferBinding, BufferId, CommandEncoder, ComputeDispatch, ComputePipelineId,
    CullUniforms, GraphicsDevice, RenderError, UniformRingBuffer, CULL_WORKGROUP_SIZE,
};
use tessel_data::allocators::{ArenaDescriptor, HostBufferKind, HostVisibleMemoryArena};

const COUNTER_SIZE: u64 = std::mem::size_of::<u32>() as u64;

/// The buffers one culling dispatch reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CullingTargets {
    /// `GpuInstance` array indexed by `first_instance`.
    pub instances: BufferId,
    /// Unculled `IndirectDrawCommand` list.
    pub input: BufferId,
    /// Receives the visible draws, compacted.
    pub output: BufferId,
    /// Atomic `u32` count of visible draws.
    pub counter: BufferId,
}

#[derive(Debug)]
struct Readback {
    block: MemoryBlock,
    /// Serial of the dispatch whose count is on its way, if any.
    serial: Option<u64>,
}

/// Records the culling pass and reads its visible count back.
///
/// Each frame slot has its own uniform block and readback slot, so a slot may
/// be recorded again as soon as the submission that last used it completed.
/// The count lags behind: [`draw_commands_count`](Self::draw_commands_count)
/// only changes when [`resolve_readback`](Self::resolve_readback) is called
/// for a slot whose submission has finished.
pub struct CullingLane {
    device: Arc<dyn GraphicsDevice>,
    pipeline: ComputePipelineId,
    zero_buffer: BufferId,
    uniforms: UniformRingBuffer,
    readback_arena: HostVisibleMemoryArena,
    readbacks: Vec<Readback>,
    view_projection: Option<Mat4>,
    frustum: Option<Frustum>,
    next_serial: u64,
    resolved_serial: u64,
    draw_commands_count: u32,
}

impl fmt::Debug for CullingLane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CullingLane")
            .field("pipeline", &self.pipeline)
            .field("readbacks", &self.readbacks)
            .field("draw_commands_count", &self.draw_commands_count)
            .finish_non_exhaustive()
    }
}

impl CullingLane {
    /// Creates the per-slot uniform blocks and readback slots.
    pub fn new(resources: &GraphicsResources, frames_in_flight: usize) -> Result<Self, RenderError> {
        let device = Arc::clone(resources.device());
        let slot_count = frames_in_flight.max(1);

        let uniforms = UniformRingBuffer::new(
            device.as_ref(),
            slot_count,
            std::mem::size_of::<CullUniforms>() as u64,
            "cull_uniforms",
        )?;

        let readback_arena = match HostVisibleMemoryArena::new(
            Arc::clone(&device),
            &ArenaDescriptor {
                label: "cull_readback".into(),
                element_size: COUNTER_SIZE,
                capacity: slot_count as u32,
            },
            HostBufferKind::Download,
        ) {
            Ok(arena) => arena,
            Err(e) => {
                uniforms.destroy(device.as_ref());
                return Err(e.into());
            }
        };

        let mut readbacks = Vec::with_capacity(slot_count);
        for _ in 0..slot_count {
            match readback_arena.alloc(1) {
                Ok(block) => readbacks.push(Readback { block, serial: None }),
                Err(e) => {
                    uniforms.destroy(device.as_ref());
                    return Err(e.into());
                }
            }
        }

        log::info!("CullingLane: Initialized with {} frame slots", slot_count);
        Ok(Self {
            device,
            pipeline: resources.cull_pipeline(),
            zero_buffer: resources.zero_buffer(),
            uniforms,
            readback_arena,
            readbacks,
            view_projection: None,
            frustum: None,
            next_serial: 1,
            resolved_serial: 0,
            draw_commands_count: 0,
        })
    }

    /// Records the culling pass for `count` input draws into `encoder`.
    ///
    /// Clears the counter, updates the slot's uniforms, dispatches the cull
    /// kernel and copies the counter to the slot's readback buffer. With
    /// `count == 0` the dispatch is skipped and the counter stays zero.
    pub fn dispatch(
        &mut self,
        encoder: &mut dyn CommandEncoder,
        frame_slot: usize,
        count: u32,
        view_projection: &Mat4,
        targets: &CullingTargets,
    ) -> Result<(), RenderError> {
        let frustum = self.update_frustum(view_projection)?;
        let slot = frame_slot % self.readbacks.len();

        encoder.copy_buffer_to_buffer(&self.zero_buffer, 0, &targets.counter, 0, COUNTER_SIZE);

        self.uniforms.select(slot);
        self.uniforms.write(
            self.device.as_ref(),
            bytemuck::bytes_of(&CullUniforms::new(&frustum, count)),
        )?;

        if count > 0 {
            let bindings = [
                BufferBinding {
                    binding: cull_bindings::UNIFORMS,
                    buffer: self.uniforms.current_buffer(),
                },
                BufferBinding {
                    binding: cull_bindings::INSTANCES,
                    buffer: targets.instances,
                },
                BufferBinding {
                    binding: cull_bindings::INPUT_COMMANDS,
                    buffer: targets.input,
                },
                BufferBinding {
                    binding: cull_bindings::OUTPUT_COMMANDS,
                    buffer: targets.output,
                },
                BufferBinding {
                    binding: cull_bindings::COUNTER,
                    buffer: targets.counter,
                },
            ];
            encoder.dispatch_compute(&ComputeDispatch {
                label: Some("cull_instances"),
                pipeline: self.pipeline,
                bindings: &bindings,
                workgroups: [
                    ComputeDispatch::workgroups_for(count, CULL_WORKGROUP_SIZE),
                    1,
                    1,
                ],
            });
        }

        let readback = &mut self.readbacks[slot];
        encoder.copy_buffer_to_buffer(
            &targets.counter,
            0,
            &self.readback_arena.buffer(),
            readback.block.byte_offset(),
            COUNTER_SIZE,
        );
        readback.serial = Some(self.next_serial);
        self.next_serial += 1;

        log::trace!("CullingLane: Recorded cull of {} draws in slot {}", count, slot);
        Ok(())
    }

    /// Reads the count written by the last dispatch recorded in `frame_slot`.
    ///
    /// Only call this once the submission holding that dispatch completed.
    /// Returns `None` if the slot has nothing to read. A count older than
    /// the one already resolved is returned but not kept.
    pub fn resolve_readback(&mut self, frame_slot: usize) -> Result<Option<u32>, RenderError> {
        let slot = frame_slot % self.readbacks.len();
        let readback = &mut self.readbacks[slot];
        let Some(serial) = readback.serial.take() else {
            return Ok(None);
        };

        let mut bytes = [0u8; COUNTER_SIZE as usize];
        self.readback_arena.read(&readback.block, &mut bytes)?;
        let count = u32::from_le_bytes(bytes);
        if serial > self.resolved_serial {
            self.resolved_serial = serial;
            self.draw_commands_count = count;
        }
        log::trace!("CullingLane: Slot {} reports {} visible draws", slot, count);
        Ok(Some(count))
    }

    /// `true` if `frame_slot` holds a dispatch whose count was not read yet.
    pub fn has_pending_readback(&self, frame_slot: usize) -> bool {
        self.readbacks[frame_slot % self.readbacks.len()]
            .serial
            .is_some()
    }

    /// Visible draw count of the newest resolved dispatch.
    pub fn draw_commands_count(&self) -> u32 {
        self.draw_commands_count
    }

    /// The frustum of the last dispatch.
    pub fn frustum(&self) -> Option<&Frustum> {
        self.frustum.as_ref()
    }

    fn update_frustum(&mut self, view_projection: &Mat4) -> Result<Frustum, RenderError> {
        if let (Some(cached), Some(frustum)) = (self.view_projection, self.frustum) {
            if cached == *view_projection {
                return Ok(frustum);
            }
        }
        let frustum = Frustum::from_view_projection(view_projection).ok_or_else(|| {
            RenderError::Internal("degenerate view-projection matrix".to_string())
        })?;
        self.view_projection = Some(*view_projection);
        self.frustum = Some(frustum);
        log::debug!("CullingLane: Frustum planes recomputed");
        Ok(frustum)
    }
}

impl Drop for CullingLane {
    fn drop(&mut self) {
        self.uniforms.destroy(self.device.as_ref());
    }
}
