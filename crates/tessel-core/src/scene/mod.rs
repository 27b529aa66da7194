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

//! The scene-graph contract consumed by the frame scheduler.
//!
//! The hierarchy itself, its update rules and its traversal live outside the
//! renderer core. The scheduler only needs to look up the render data of a
//! node when it becomes resident, and to find a camera.

use crate::math::{Aabb, Mat4};
use crate::renderer::api::{GpuInstance, IndirectDrawCommand};

/// Identifies a renderable node of the scene graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

/// Identifies a camera of the scene graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CameraId(pub u64);

/// The index range of a mesh inside the shared geometry buffers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeshRange {
    /// Number of indices.
    pub index_count: u32,
    /// First index.
    pub first_index: u32,
    /// Vertex offset applied to every index.
    pub base_vertex: i32,
}

/// What the renderer needs to draw one node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeRenderData {
    /// World transform of the node.
    pub world_transform: Mat4,
    /// Bounds of the mesh in local space.
    pub local_bounds: Aabb,
    /// The mesh to draw.
    pub mesh: MeshRange,
    /// Index into the material table.
    pub material_index: u32,
}

impl NodeRenderData {
    /// The per-instance record uploaded to the instance arena.
    pub fn to_gpu_instance(&self) -> GpuInstance {
        let world_sphere = self
            .local_bounds
            .transform(&self.world_transform)
            .bounding_sphere();
        GpuInstance::new(&self.world_transform, &world_sphere, self.material_index)
    }

    /// The unculled draw for this node once it lives at `instance_index`.
    pub fn draw_command(&self, instance_index: u32) -> IndirectDrawCommand {
        IndirectDrawCommand {
            index_count: self.mesh.index_count,
            instance_count: 1,
            first_index: self.mesh.first_index,
            base_vertex: self.mesh.base_vertex,
            first_instance: instance_index,
        }
    }
}

/// Read access to a scene graph.
pub trait SceneGraph {
    /// Render data of `node`, or `None` if the node does not exist or is not drawable.
    fn node_render_data(&self, node: NodeId) -> Option<NodeRenderData>;

    /// The first camera that is enabled, in the graph's own order.
    fn first_enabled_camera(&self) -> Option<CameraId>;

    /// The combined view-projection matrix of `camera`.
    fn camera_view_projection(&self, camera: CameraId) -> Option<Mat4>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec3;
    use approx::assert_relative_eq;

    #[test]
    fn gpu_instance_uses_world_space_bounds() {
        let data = NodeRenderData {
            world_transform: Mat4::from_translation(Vec3::new(0.0, 0.0, -10.0))
                * Mat4::from_scale(Vec3::splat(2.0)),
            local_bounds: Aabb::from_center_half_extents(Vec3::ZERO, Vec3::ONE),
            mesh: MeshRange::default(),
            material_index: 3,
        };
        let instance = data.to_gpu_instance();
        let sphere = instance.bounding_sphere();
        assert_relative_eq!(sphere.center.z, -10.0);
        assert_relative_eq!(sphere.radius, 2.0 * 3f32.sqrt(), epsilon = 1e-5);
        assert_eq!(instance.material_index, 3);
    }

    #[test]
    fn draw_command_points_at_instance_slot() {
        let data = NodeRenderData {
            world_transform: Mat4::IDENTITY,
            local_bounds: Aabb::from_center_half_extents(Vec3::ZERO, Vec3::ONE),
            mesh: MeshRange {
                index_count: 36,
                first_index: 12,
                base_vertex: -4,
            },
            material_index: 0,
        };
        let cmd = data.draw_command(5);
        assert_eq!(cmd.first_instance, 5);
        assert_eq!(cmd.instance_count, 1);
        assert_eq!(cmd.index_count, 36);
        assert_eq!(cmd.base_vertex, -4);
    }
}
