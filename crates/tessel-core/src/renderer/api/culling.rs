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

//! Plain-old-data layouts shared between the CPU and the culling shader.
//!
//! Every struct here is `#[repr(C)]` and `Pod` so it can be copied into GPU
//! buffers with `bytemuck`. Field order and padding mirror the WGSL structs in
//! `cull_instances.wgsl`; changing one side without the other corrupts the
//! instance stream.

use crate::math::{BoundingSphere, Frustum, Mat4};
use bytemuck::{Pod, Zeroable};

/// Name of the compute entry point that performs frustum culling.
pub const CULL_ENTRY_POINT: &str = "cs_cull_instances";

/// Threads per workgroup of the culling kernel (`@workgroup_size`).
pub const CULL_WORKGROUP_SIZE: u32 = 64;

/// Bind group slots used by the culling kernel.
pub mod cull_bindings {
    /// [`CullUniforms`](super::CullUniforms), uniform buffer.
    pub const UNIFORMS: u32 = 0;
    /// Instance array (`GpuInstance`), read-only storage.
    pub const INSTANCES: u32 = 1;
    /// Unculled draw commands, read-only storage.
    pub const INPUT_COMMANDS: u32 = 2;
    /// Compacted draw commands, read-write storage.
    pub const OUTPUT_COMMANDS: u32 = 3;
    /// Visible-command counter, atomic `u32`.
    pub const COUNTER: u32 = 4;
}

/// Per-instance data uploaded through the instance arena.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuInstance {
    /// Column-major world transform.
    pub model: [[f32; 4]; 4],
    /// World-space bounding sphere, `(center.xyz, radius)`.
    pub bounds: [f32; 4],
    /// Index into the material table.
    pub material_index: u32,
    pub(crate) _pad: [u32; 3],
}

impl GpuInstance {
    /// Builds an instance from its world transform and world-space bounds.
    pub fn new(model: &Mat4, world_bounds: &BoundingSphere, material_index: u32) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            bounds: world_bounds.to_vec4().to_array(),
            material_index,
            _pad: [0; 3],
        }
    }

    /// The world-space bounding sphere.
    pub fn bounding_sphere(&self) -> BoundingSphere {
        let [x, y, z, r] = self.bounds;
        BoundingSphere::new([x, y, z].into(), r)
    }
}

/// Arguments of one indexed indirect draw, laid out as the GPU consumes them.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct IndirectDrawCommand {
    /// Number of indices to draw.
    pub index_count: u32,
    /// Number of instances to draw.
    pub instance_count: u32,
    /// First index in the index buffer.
    pub first_index: u32,
    /// Value added to each index before fetching vertices.
    pub base_vertex: i32,
    /// First instance; also the slot of the instance in the instance arena.
    pub first_instance: u32,
}

/// The uniform block read by the culling kernel.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CullUniforms {
    /// The six frustum planes as `(normal.xyz, d)`, in `FrustumPlane` order.
    pub planes: [[f32; 4]; 6],
    /// Number of valid entries in the input command buffer.
    pub command_count: u32,
    pub(crate) _pad: [u32; 3],
}

impl CullUniforms {
    /// Packs a frustum and the input command count.
    pub fn new(frustum: &Frustum, command_count: u32) -> Self {
        Self {
            planes: frustum.to_gpu_planes(),
            command_count,
            _pad: [0; 3],
        }
    }
}
