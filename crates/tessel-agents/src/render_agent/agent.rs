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

//! Defines the RenderAgent, which drives one frame of the renderer core.

use super::frame_scheduler::{FrameScheduler, TickReport};
use std::sync::Arc;
use tessel_core::config::EngineConfig;
use tessel_core::memory::{GpuMemoryArena, MemoryBlock};
use tessel_core::renderer::{
    BufferDescriptor, BufferId, BufferUsage, CommandKind, GpuInstance, GraphicsDevice,
    IndirectDrawCommand, RenderError,
};
use tessel_core::scene::{CameraId, NodeId, SceneGraph};
use tessel_data::allocators::{
    ArenaDescriptor, DeviceMemoryArena, GpuMemoryArenaExt, HostBufferKind, HostVisibleMemoryArena,
};
use tessel_lanes::render_lane::CullingTargets;
use tessel_lanes::{Command, CullingLane, GraphicsResources, SubmissionQueue, SubmissionTicket};

const COUNTER_SIZE: u64 = std::mem::size_of::<u32>() as u64;

/// Buffers owned by one frame slot.
///
/// The cull kernel reads its input from offset zero, so every slot has its
/// own draw-list buffer.
#[derive(Debug)]
struct SlotBuffers {
    draw_list: HostVisibleMemoryArena,
    draw_block: MemoryBlock,
    output: BufferId,
    counter: BufferId,
}

/// Summary of one [`RenderAgent::render_frame`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameReport {
    /// Monotonic index of the frame.
    pub frame_index: u64,
    /// Frame slot the frame was recorded in.
    pub frame_slot: usize,
    /// Scene changes applied for this frame.
    pub tick: TickReport,
    /// Unculled draws handed to the culling pass.
    pub submitted_draws: u32,
    /// Newest visible draw count read back from the GPU.
    ///
    /// Belongs to an earlier frame: a frame's count is only known once
    /// its submission has completed.
    pub visible_draws: u32,
    /// `false` when no camera was active and culling was skipped.
    pub culled: bool,
    /// The submission carrying this frame.
    pub ticket: SubmissionTicket,
}

/// The central orchestrator of the renderer core.
///
/// Each frame it paces against the GPU, applies the scheduled scene changes
/// for the current frame slot, uploads staged instances, writes the slot's
/// draw list and records the culling pass, then hands the command to the
/// submission queue.
pub struct RenderAgent {
    // Declared first so it drains before the buffers it references go away.
    queue: SubmissionQueue,
    // Frustum culling pass and its per-slot readbacks.
    culling: CullingLane,
    // Per-slot pending adds/removes and resident snapshots.
    scheduler: FrameScheduler,
    // GpuInstance records of every resident node, all slots together.
    instance_arena: DeviceMemoryArena,
    // Unculled draw list, cull output and counter of each slot.
    slots: Vec<SlotBuffers>,
    // Submission of the last frame recorded in each slot.
    frame_tickets: Vec<Option<SubmissionTicket>>,
    // Zero buffer and cull pipeline.
    resources: GraphicsResources,
    config: EngineConfig,
    frame_count: u64,
}

impl RenderAgent {
    /// Validates `config` and creates every GPU object the agent needs.
    pub fn new(device: Arc<dyn GraphicsDevice>, config: EngineConfig) -> Result<Self, RenderError> {
        config.validate()?;
        let frames = config.frames_in_flight as usize;
        let instance_count = config.arena.instance_count;
        let instance_capacity = config.instance_capacity().ok_or_else(|| {
            RenderError::Internal("instance capacity overflows u32".to_string())
        })?;

        let resources = GraphicsResources::new(device.clone())?;
        let culling = CullingLane::new(&resources, frames)?;
        let instance_arena = DeviceMemoryArena::new(
            device.clone(),
            &ArenaDescriptor {
                label: "instances".into(),
                element_size: std::mem::size_of::<GpuInstance>() as u64,
                capacity: instance_capacity,
            },
            config.arena.staging_instance_count,
            frames,
        )?;

        let mut slots = Vec::with_capacity(frames);
        for slot in 0..frames {
            match Self::create_slot(&device, slot, instance_count) {
                Ok(buffers) => slots.push(buffers),
                Err(e) => {
                    Self::destroy_slots(device.as_ref(), &slots);
                    return Err(e);
                }
            }
        }

        let queue = match SubmissionQueue::new(device.clone(), &config.submission, "render") {
            Ok(queue) => queue,
            Err(e) => {
                Self::destroy_slots(device.as_ref(), &slots);
                return Err(e.into());
            }
        };

        let adapter = device.adapter_info();
        log::info!(
            "RenderAgent: Running on '{}' ({}), {} frames in flight, {} instances per frame",
            adapter.name,
            adapter.backend_type,
            frames,
            instance_count
        );
        Ok(Self {
            queue,
            culling,
            scheduler: FrameScheduler::new(frames, &config.scheduler),
            instance_arena,
            slots,
            frame_tickets: vec![None; frames],
            resources,
            config,
            frame_count: 0,
        })
    }

    fn create_slot(
        device: &Arc<dyn GraphicsDevice>,
        slot: usize,
        instance_count: u32,
    ) -> Result<SlotBuffers, RenderError> {
        let label = format!("draw_list [slot {slot}]");
        let draw_list = HostVisibleMemoryArena::new(
            device.clone(),
            &ArenaDescriptor {
                label: label.as_str().into(),
                element_size: std::mem::size_of::<IndirectDrawCommand>() as u64,
                capacity: instance_count,
            },
            HostBufferKind::Storage,
        )?;
        let draw_block = draw_list.alloc(instance_count)?;
        let output = device.create_buffer(&BufferDescriptor::new(
            &format!("visible_draws [slot {slot}]"),
            u64::from(instance_count) * std::mem::size_of::<IndirectDrawCommand>() as u64,
            BufferUsage::STORAGE | BufferUsage::INDIRECT,
        ))?;
        let counter = match device.create_buffer(&BufferDescriptor::new(
            &format!("visible_count [slot {slot}]"),
            COUNTER_SIZE,
            BufferUsage::STORAGE | BufferUsage::INDIRECT | BufferUsage::COPY_DST | BufferUsage::COPY_SRC,
        )) {
            Ok(counter) => counter,
            Err(e) => {
                let _ = device.destroy_buffer(output);
                return Err(e.into());
            }
        };
        Ok(SlotBuffers {
            draw_list,
            draw_block,
            output,
            counter,
        })
    }

    fn destroy_slots(device: &dyn GraphicsDevice, slots: &[SlotBuffers]) {
        for slot in slots {
            for buffer in [slot.output, slot.counter] {
                if let Err(e) = device.destroy_buffer(buffer) {
                    log::warn!("RenderAgent: Failed to destroy slot buffer {buffer:?}: {e}");
                }
            }
        }
    }

    /// Queues `node` to be drawn. Async adds are spread over several frames.
    pub fn add_node(&mut self, node: NodeId, is_async: bool) {
        self.scheduler.add_node(node, is_async);
    }

    /// Queues `node` to stop being drawn.
    pub fn remove_node(&mut self, node: NodeId, is_async: bool) {
        self.scheduler.remove_node(node, is_async);
    }

    /// Makes `camera` the one the next frames are culled against.
    pub fn activate_camera(&mut self, camera: CameraId) {
        self.scheduler.activate_camera(camera);
    }

    /// Records and submits one frame.
    pub fn render_frame(&mut self, scene_graph: &dyn SceneGraph) -> Result<FrameReport, RenderError> {
        let frame_index = self.frame_count;
        let slot = (frame_index % self.slots.len() as u64) as usize;

        // The slot's buffers and staging memory are reused below.
        if let Some(ticket) = self.frame_tickets[slot].take() {
            self.queue.wait(ticket)?;
            self.culling.resolve_readback(slot)?;
        }
        for (other, ticket) in self.frame_tickets.iter().enumerate() {
            if let Some(ticket) = ticket {
                if self.culling.has_pending_readback(other) && self.queue.is_complete(*ticket) {
                    self.culling.resolve_readback(other)?;
                }
            }
        }

        let tick = self.scheduler.tick(slot, scene_graph, &self.instance_arena)?;

        let label = format!("frame {frame_index}");
        let mut command = self.queue.begin(CommandKind::Graphics, Some(&label))?;
        let (submitted_draws, culled) = match self.record(&mut command, slot, scene_graph) {
            Ok(recorded) => recorded,
            Err(e) => {
                log::error!("RenderAgent: Failed to record {label}: {e}");
                self.queue.discard(command);
                return Err(e);
            }
        };
        let ticket = self.queue.end(command, false)?;
        self.frame_tickets[slot] = Some(ticket);
        self.frame_count += 1;

        Ok(FrameReport {
            frame_index,
            frame_slot: slot,
            tick,
            submitted_draws,
            visible_draws: self.culling.draw_commands_count(),
            culled,
            ticket,
        })
    }

    fn record(
        &mut self,
        command: &mut Command,
        slot: usize,
        scene_graph: &dyn SceneGraph,
    ) -> Result<(u32, bool), RenderError> {
        self.instance_arena.flush(command.encoder())?;

        let scene = self.scheduler.scene_instance(slot);
        let draws = scene.draw_commands();
        let buffers = &self.slots[slot];
        if !draws.is_empty() {
            buffers.draw_list.write_elements(&buffers.draw_block, &draws)?;
        }
        let count = draws.len() as u32;

        let view_projection = scene
            .active_camera()
            .and_then(|camera| scene_graph.camera_view_projection(camera));
        let Some(view_projection) = view_projection else {
            log::debug!("RenderAgent: No active camera for slot {slot}; culling skipped");
            return Ok((count, false));
        };

        let targets = CullingTargets {
            instances: self.instance_arena.buffer(),
            input: buffers.draw_list.buffer(),
            output: buffers.output,
            counter: buffers.counter,
        };
        self.culling
            .dispatch(command.encoder(), slot, count, &view_projection, &targets)?;
        Ok((count, true))
    }

    /// Blocks until every submitted frame has completed, then reads back
    /// the culling results that are still pending.
    pub fn wait_idle(&mut self) -> Result<(), RenderError> {
        self.queue.wait_idle()?;
        for slot in 0..self.slots.len() {
            if self.culling.has_pending_readback(slot) {
                self.culling.resolve_readback(slot)?;
            }
        }
        Ok(())
    }

    /// Waits for the GPU, then evicts every node from every frame slot.
    pub fn clear_scene(&mut self) -> Result<(), RenderError> {
        self.queue.wait_idle()?;
        self.scheduler.clear(&self.instance_arena)?;
        Ok(())
    }

    /// Visible draw count of the newest completed culling pass.
    pub fn draw_commands_count(&self) -> u32 {
        self.culling.draw_commands_count()
    }

    /// Number of frames submitted so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// The buffers the culling pass of `frame_slot` reads and writes.
    pub fn culling_targets(&self, frame_slot: usize) -> CullingTargets {
        let buffers = &self.slots[frame_slot % self.slots.len()];
        CullingTargets {
            instances: self.instance_arena.buffer(),
            input: buffers.draw_list.buffer(),
            output: buffers.output,
            counter: buffers.counter,
        }
    }

    /// The configuration the agent was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The frame scheduler.
    pub fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }

    /// The submission queue frames are sent to.
    pub fn queue(&self) -> &SubmissionQueue {
        &self.queue
    }

    /// The instance arena.
    pub fn instance_arena(&self) -> &DeviceMemoryArena {
        &self.instance_arena
    }
}

impl Drop for RenderAgent {
    fn drop(&mut self) {
        if let Err(e) = self.queue.wait_idle() {
            log::warn!("RenderAgent: GPU did not drain before shutdown: {e}");
        }
        self.queue.stop();
        Self::destroy_slots(self.resources.device().as_ref(), &self.slots);
        log::info!("RenderAgent: Shut down after {} frames", self.frame_count);
    }
}
