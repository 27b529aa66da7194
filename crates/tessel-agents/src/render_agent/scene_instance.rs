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

//! The set of nodes resident on the GPU for one frame slot.

use std::collections::BTreeMap;
use tessel_core::memory::{ArenaError, GpuMemoryArena, MemoryBlock};
use tessel_core::renderer::IndirectDrawCommand;
use tessel_core::scene::{CameraId, NodeId, NodeRenderData};
use tessel_data::allocators::GpuMemoryArenaExt;

#[derive(Debug)]
struct ResidentNode {
    block: MemoryBlock,
    draw: IndirectDrawCommand,
}

/// What one frame slot renders: resident nodes and the active camera.
///
/// Each frame slot owns its own instance blocks, so changing the snapshot of
/// one slot never touches data a frame still in flight reads.
#[derive(Debug, Default)]
pub struct SceneInstance {
    nodes: BTreeMap<NodeId, ResidentNode>,
    active_camera: Option<CameraId>,
}

impl SceneInstance {
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `node` resident, or refreshes its data if it already is.
    pub(crate) fn insert(
        &mut self,
        node: NodeId,
        data: &NodeRenderData,
        arena: &dyn GpuMemoryArena,
    ) -> Result<(), ArenaError> {
        let instance = data.to_gpu_instance();
        if let Some(resident) = self.nodes.get_mut(&node) {
            arena.write_elements(&resident.block, &[instance])?;
            resident.draw = data.draw_command(resident.block.instance_index());
            return Ok(());
        }

        let block = arena.alloc(1)?;
        if let Err(e) = arena.write_elements(&block, &[instance]) {
            if let Err(free_err) = arena.free(block) {
                log::warn!("SceneInstance: Failed to release block of {node:?}: {free_err}");
            }
            return Err(e);
        }
        let draw = data.draw_command(block.instance_index());
        self.nodes.insert(node, ResidentNode { block, draw });
        Ok(())
    }

    /// Evicts `node`. Returns `false` if it was not resident.
    pub(crate) fn remove(&mut self, node: NodeId, arena: &dyn GpuMemoryArena) -> Result<bool, ArenaError> {
        match self.nodes.remove(&node) {
            Some(resident) => {
                arena.free(resident.block)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Evicts every node.
    pub(crate) fn clear(&mut self, arena: &dyn GpuMemoryArena) -> Result<(), ArenaError> {
        let nodes = std::mem::take(&mut self.nodes);
        for (_, resident) in nodes {
            arena.free(resident.block)?;
        }
        self.active_camera = None;
        Ok(())
    }

    pub(crate) fn set_active_camera(&mut self, camera: Option<CameraId>) {
        self.active_camera = camera;
    }

    /// `true` if `node` is resident.
    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    /// Number of resident nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// `true` if no node is resident.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The camera this snapshot is viewed through.
    pub fn active_camera(&self) -> Option<CameraId> {
        self.active_camera
    }

    /// Resident nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Instance slot of a resident node.
    pub fn instance_index(&self, node: NodeId) -> Option<u32> {
        self.nodes.get(&node).map(|r| r.block.instance_index())
    }

    /// One unculled draw per resident node, in node id order.
    pub fn draw_commands(&self) -> Vec<IndirectDrawCommand> {
        self.nodes.values().map(|r| r.draw).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tessel_core::math::{Aabb, Mat4, Vec3};
    use tessel_core::memory::ArenaStats;
    use tessel_core::renderer::{BufferId, CommandEncoder};
    use tessel_core::scene::MeshRange;
    use tessel_data::allocators::{ArenaDescriptor, HostBufferKind, HostVisibleMemoryArena};
    use tessel_infra::SoftwareDevice;

    /// Hands out blocks but rejects every write and every free.
    #[derive(Debug)]
    struct RejectingArena;

    impl GpuMemoryArena for RejectingArena {
        fn element_size(&self) -> u64 {
            96
        }

        fn capacity(&self) -> u32 {
            1
        }

        fn buffer(&self) -> BufferId {
            BufferId(0)
        }

        fn alloc(&self, _count: u32) -> Result<MemoryBlock, ArenaError> {
            Ok(MemoryBlock::new(0, 0, 96))
        }

        fn free(&self, block: MemoryBlock) -> Result<(), ArenaError> {
            Err(ArenaError::InvalidBlock {
                byte_offset: block.byte_offset(),
                byte_size: block.byte_size(),
            })
        }

        fn write(&self, block: &MemoryBlock, data: &[u8]) -> Result<(), ArenaError> {
            Err(ArenaError::WriteOutOfBounds {
                size: data.len() as u64,
                block_size: block.byte_size() / 2,
            })
        }

        fn flush(&self, _encoder: &mut dyn CommandEncoder) -> Result<(), ArenaError> {
            Ok(())
        }

        fn stats(&self) -> ArenaStats {
            ArenaStats::default()
        }
    }

    fn render_data(x: f32) -> NodeRenderData {
        NodeRenderData {
            world_transform: Mat4::from_translation(Vec3::new(x, 0.0, 0.0)),
            local_bounds: Aabb::from_center_half_extents(Vec3::ZERO, Vec3::ONE),
            mesh: MeshRange {
                index_count: 6,
                first_index: 0,
                base_vertex: 0,
            },
            material_index: 0,
        }
    }

    #[test]
    fn failed_write_reports_the_write_error() {
        let mut scene = SceneInstance::new();
        let err = scene
            .insert(NodeId(1), &render_data(0.0), &RejectingArena)
            .unwrap_err();
        assert!(matches!(err, ArenaError::WriteOutOfBounds { .. }));
        assert!(scene.is_empty());
    }

    #[test]
    fn refresh_keeps_the_resident_block() {
        let device = SoftwareDevice::new();
        let arena = HostVisibleMemoryArena::new(
            Arc::new(device),
            &ArenaDescriptor {
                label: "instances".into(),
                element_size: 96,
                capacity: 4,
            },
            HostBufferKind::Storage,
        )
        .unwrap();
        let mut scene = SceneInstance::new();
        scene.insert(NodeId(1), &render_data(0.0), &arena).unwrap();
        scene.insert(NodeId(2), &render_data(1.0), &arena).unwrap();
        let before = scene.instance_index(NodeId(2));

        scene.insert(NodeId(2), &render_data(5.0), &arena).unwrap();
        assert_eq!(scene.instance_index(NodeId(2)), before);
        assert_eq!(arena.stats().live_blocks, 2);

        assert!(scene.remove(NodeId(1), &arena).unwrap());
        assert!(!scene.remove(NodeId(1), &arena).unwrap());
        let draws = scene.draw_commands();
        assert_eq!(draws.len(), 1);
        assert_eq!(Some(draws[0].first_instance), before);
    }
}
