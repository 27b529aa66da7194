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

//! Per-frame queues of scene changes, applied just in time.

use super::scene_instance::SceneInstance;
use std::collections::{BTreeSet, VecDeque};
use tessel_core::config::SchedulerConfig;
use tessel_core::memory::{ArenaError, GpuMemoryArena};
use tessel_core::scene::{CameraId, NodeId, SceneGraph};

/// Pending changes and the resident snapshot of one frame slot.
#[derive(Debug, Default)]
struct FrameData {
    added_immediate: VecDeque<NodeId>,
    added_async: VecDeque<NodeId>,
    removed_immediate: VecDeque<NodeId>,
    removed_async: VecDeque<NodeId>,
    requested_camera: Option<CameraId>,
    camera_changed: bool,
    scene: SceneInstance,
}

impl FrameData {
    fn cancel_add(&mut self, node: NodeId) {
        self.added_immediate.retain(|n| *n != node);
        self.added_async.retain(|n| *n != node);
    }

    fn add_pending(&self, node: NodeId) -> bool {
        self.added_immediate.contains(&node) || self.added_async.contains(&node)
    }

    fn remove_pending(&self, node: NodeId) -> bool {
        self.removed_immediate.contains(&node) || self.removed_async.contains(&node)
    }
}

/// What one [`FrameScheduler::tick`] applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Nodes made resident or refreshed.
    pub added: Vec<NodeId>,
    /// Nodes evicted.
    pub removed: Vec<NodeId>,
    /// Adds skipped because the scene graph did not know the node.
    pub missing: Vec<NodeId>,
    /// Set when the active camera changed this tick.
    pub camera: Option<CameraId>,
    /// Async adds left for later ticks.
    pub deferred_adds: usize,
    /// Async removes left for later ticks.
    pub deferred_removes: usize,
}

/// Turns attach/detach calls into per-frame work.
///
/// Every call is queued on each frame slot, and each slot applies its queue
/// when [`tick`](Self::tick) runs for it, so a frame still in flight never
/// sees its snapshot change. Immediate queues drain fully on each tick;
/// async queues drain at most `max_async_nodes_per_frame` entries each.
#[derive(Debug)]
pub struct FrameScheduler {
    frames: Vec<FrameData>,
    max_async_nodes_per_frame: usize,
    attached: BTreeSet<NodeId>,
}

impl FrameScheduler {
    /// Creates one empty frame slot per frame in flight.
    pub fn new(frames_in_flight: usize, config: &SchedulerConfig) -> Self {
        let frames = (0..frames_in_flight.max(1))
            .map(|_| FrameData::default())
            .collect();
        Self {
            frames,
            max_async_nodes_per_frame: config.max_async_nodes_per_frame,
            attached: BTreeSet::new(),
        }
    }

    /// Number of frame slots.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Queues `node` to become resident in every frame slot.
    pub fn add_node(&mut self, node: NodeId, is_async: bool) {
        self.attached.insert(node);
        for frame in &mut self.frames {
            if frame.add_pending(node) {
                continue;
            }
            if is_async {
                frame.added_async.push_back(node);
            } else {
                frame.added_immediate.push_back(node);
            }
        }
        log::trace!("FrameScheduler: Queued add of {node:?} (async: {is_async})");
    }

    /// Detaches `node` now and queues its eviction from every frame slot.
    ///
    /// An add of the same node still waiting in a slot is cancelled; slots
    /// where the node never became resident have nothing left to do.
    pub fn remove_node(&mut self, node: NodeId, is_async: bool) {
        self.attached.remove(&node);
        for frame in &mut self.frames {
            frame.cancel_add(node);
            if !frame.scene.contains(node) || frame.remove_pending(node) {
                continue;
            }
            if is_async {
                frame.removed_async.push_back(node);
            } else {
                frame.removed_immediate.push_back(node);
            }
        }
        log::trace!("FrameScheduler: Queued removal of {node:?} (async: {is_async})");
    }

    /// Queues `camera` to become active in every frame slot.
    pub fn activate_camera(&mut self, camera: CameraId) {
        for frame in &mut self.frames {
            frame.requested_camera = Some(camera);
        }
    }

    /// `true` if `node` is attached to the viewport.
    pub fn is_attached(&self, node: NodeId) -> bool {
        self.attached.contains(&node)
    }

    /// The resident snapshot of `frame_index`.
    pub fn scene_instance(&self, frame_index: usize) -> &SceneInstance {
        &self.frames[frame_index % self.frames.len()].scene
    }

    /// `true` if the last tick of `frame_index` changed its camera.
    pub fn camera_changed(&self, frame_index: usize) -> bool {
        self.frames[frame_index % self.frames.len()].camera_changed
    }

    /// Queued adds and removes of `frame_index`.
    pub fn pending_count(&self, frame_index: usize) -> usize {
        let frame = &self.frames[frame_index % self.frames.len()];
        frame.added_immediate.len()
            + frame.added_async.len()
            + frame.removed_immediate.len()
            + frame.removed_async.len()
    }

    /// Applies the queued work of `frame_index`.
    ///
    /// Removals go first, then adds, each immediate queue fully and each
    /// async queue up to the per-frame cap. Then a requested camera is
    /// activated, and if the slot still has none, the scene graph's first
    /// enabled camera is used.
    ///
    /// An arena error stops the tick. The node that failed stays at the
    /// front of its queue.
    pub fn tick(
        &mut self,
        frame_index: usize,
        scene_graph: &dyn SceneGraph,
        arena: &dyn GpuMemoryArena,
    ) -> Result<TickReport, ArenaError> {
        let cap = self.max_async_nodes_per_frame;
        let slot = frame_index % self.frames.len();
        let frame = &mut self.frames[slot];
        let mut report = TickReport::default();
        frame.camera_changed = false;

        let scene = &mut frame.scene;
        Self::drain_removals(&mut frame.removed_immediate, usize::MAX, scene, arena, &mut report)?;
        Self::drain_removals(&mut frame.removed_async, cap, scene, arena, &mut report)?;
        Self::drain_adds(
            &mut frame.added_immediate,
            usize::MAX,
            scene,
            scene_graph,
            arena,
            &mut report,
        )?;
        Self::drain_adds(&mut frame.added_async, cap, scene, scene_graph, arena, &mut report)?;

        if let Some(camera) = frame.requested_camera.take() {
            frame.scene.set_active_camera(Some(camera));
            frame.camera_changed = true;
            report.camera = Some(camera);
        }
        if frame.scene.active_camera().is_none() {
            if let Some(camera) = scene_graph.first_enabled_camera() {
                frame.scene.set_active_camera(Some(camera));
                frame.camera_changed = true;
                report.camera = Some(camera);
            }
        }

        report.deferred_adds = frame.added_async.len();
        report.deferred_removes = frame.removed_async.len();
        log::debug!(
            "FrameScheduler: Tick of slot {}: +{} -{} (deferred +{} -{})",
            slot,
            report.added.len(),
            report.removed.len(),
            report.deferred_adds,
            report.deferred_removes
        );
        Ok(report)
    }

    fn drain_removals(
        queue: &mut VecDeque<NodeId>,
        limit: usize,
        scene: &mut SceneInstance,
        arena: &dyn GpuMemoryArena,
        report: &mut TickReport,
    ) -> Result<(), ArenaError> {
        for _ in 0..limit {
            let Some(node) = queue.pop_front() else {
                break;
            };
            match scene.remove(node, arena) {
                Ok(true) => report.removed.push(node),
                Ok(false) => {}
                Err(e) => {
                    queue.push_front(node);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn drain_adds(
        queue: &mut VecDeque<NodeId>,
        limit: usize,
        scene: &mut SceneInstance,
        scene_graph: &dyn SceneGraph,
        arena: &dyn GpuMemoryArena,
        report: &mut TickReport,
    ) -> Result<(), ArenaError> {
        for _ in 0..limit {
            let Some(node) = queue.pop_front() else {
                break;
            };
            let Some(data) = scene_graph.node_render_data(node) else {
                log::warn!("FrameScheduler: Node {node:?} has no render data; skipped");
                report.missing.push(node);
                continue;
            };
            if let Err(e) = scene.insert(node, &data, arena) {
                queue.push_front(node);
                return Err(e);
            }
            report.added.push(node);
        }
        Ok(())
    }

    /// Evicts every node from every frame slot and drops all queued work.
    pub fn clear(&mut self, arena: &dyn GpuMemoryArena) -> Result<(), ArenaError> {
        for frame in &mut self.frames {
            frame.scene.clear(arena)?;
            *frame = FrameData::default();
        }
        self.attached.clear();
        Ok(())
    }
}
