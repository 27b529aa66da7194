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

//! CPU implementations of the compute entry points the renderer dispatches.
//!
//! A GPU backend compiles the WGSL module; the software backend instead maps
//! each entry point name to a Rust function with the same semantics.

use super::device::SoftwareBuffer;
use bytemuck::Pod;
use std::collections::HashMap;
use std::mem::size_of;
use tessel_core::renderer::api::{
    cull_bindings, BufferBinding, BufferId, CullUniforms, GpuInstance, IndirectDrawCommand,
    CULL_ENTRY_POINT, CULL_WORKGROUP_SIZE,
};
use tessel_core::renderer::ResourceError;

/// A compute kernel run in place of a shader entry point.
pub type ComputeKernel = fn(&mut KernelContext<'_>) -> Result<(), ResourceError>;

/// Returns the built-in kernel for `entry_point`, if there is one.
pub fn builtin_kernel(entry_point: &str) -> Option<ComputeKernel> {
    match entry_point {
        CULL_ENTRY_POINT => Some(cull_instances),
        _ => None,
    }
}

/// The buffers and launch size visible to a kernel during one dispatch.
pub struct KernelContext<'a> {
    buffers: &'a mut HashMap<BufferId, SoftwareBuffer>,
    bindings: &'a [BufferBinding],
    workgroups: [u32; 3],
}

impl<'a> KernelContext<'a> {
    pub(crate) fn new(
        buffers: &'a mut HashMap<BufferId, SoftwareBuffer>,
        bindings: &'a [BufferBinding],
        workgroups: [u32; 3],
    ) -> Self {
        Self {
            buffers,
            bindings,
            workgroups,
        }
    }

    /// Workgroup counts of the dispatch.
    pub fn workgroups(&self) -> [u32; 3] {
        self.workgroups
    }

    fn buffer_id(&self, binding: u32) -> Result<BufferId, ResourceError> {
        self.bindings
            .iter()
            .find(|b| b.binding == binding)
            .map(|b| b.buffer)
            .ok_or_else(|| ResourceError::BackendError(format!("nothing bound at binding {binding}")))
    }

    /// Contents of the buffer bound at `binding`.
    pub fn binding_bytes(&self, binding: u32) -> Result<&[u8], ResourceError> {
        let id = self.buffer_id(binding)?;
        self.buffers
            .get(&id)
            .map(|b| b.data.as_slice())
            .ok_or(ResourceError::NotFound)
    }

    /// Mutable contents of the buffer bound at `binding`.
    pub fn binding_bytes_mut(&mut self, binding: u32) -> Result<&mut [u8], ResourceError> {
        let id = self.buffer_id(binding)?;
        self.buffers
            .get_mut(&id)
            .map(|b| b.data.as_mut_slice())
            .ok_or(ResourceError::NotFound)
    }
}

fn read_pod<T: Pod>(bytes: &[u8], offset: usize) -> Result<T, ResourceError> {
    let end = offset + size_of::<T>();
    if end > bytes.len() {
        return Err(ResourceError::OutOfBounds {
            offset: offset as u64,
            size: size_of::<T>() as u64,
            capacity: bytes.len() as u64,
        });
    }
    Ok(bytemuck::pod_read_unaligned(&bytes[offset..end]))
}

fn read_pod_array<T: Pod>(bytes: &[u8]) -> Vec<T> {
    bytes
        .chunks_exact(size_of::<T>())
        .map(bytemuck::pod_read_unaligned)
        .collect()
}

fn sphere_visible(planes: &[[f32; 4]; 6], bounds: [f32; 4]) -> bool {
    let [x, y, z, radius] = bounds;
    planes
        .iter()
        .all(|p| p[0] * x + p[1] * y + p[2] * z + p[3] >= -radius)
}

/// `cs_cull_instances`: appends every input draw whose instance sphere
/// intersects the frustum to the output list and bumps the counter.
fn cull_instances(ctx: &mut KernelContext<'_>) -> Result<(), ResourceError> {
    let uniforms: CullUniforms = read_pod(ctx.binding_bytes(cull_bindings::UNIFORMS)?, 0)?;
    let instances: Vec<GpuInstance> =
        read_pod_array(ctx.binding_bytes(cull_bindings::INSTANCES)?);
    let input: Vec<IndirectDrawCommand> =
        read_pod_array(ctx.binding_bytes(cull_bindings::INPUT_COMMANDS)?);

    let invocations = ctx.workgroups()[0] as usize * CULL_WORKGROUP_SIZE as usize;
    let count = (uniforms.command_count as usize)
        .min(input.len())
        .min(invocations);

    let visible: Vec<IndirectDrawCommand> = input[..count]
        .iter()
        .filter(|cmd| {
            instances
                .get(cmd.first_instance as usize)
                .is_some_and(|instance| sphere_visible(&uniforms.planes, instance.bounds))
        })
        .copied()
        .collect();

    let counter_bytes = ctx.binding_bytes_mut(cull_bindings::COUNTER)?;
    let base: u32 = read_pod(counter_bytes, 0)?;
    let total = base.saturating_add(visible.len() as u32);
    counter_bytes[..size_of::<u32>()].copy_from_slice(&total.to_le_bytes());

    let stride = size_of::<IndirectDrawCommand>();
    let output = ctx.binding_bytes_mut(cull_bindings::OUTPUT_COMMANDS)?;
    let capacity = output.len() / stride;
    for (i, cmd) in visible.iter().enumerate() {
        let slot = base as usize + i;
        if slot >= capacity {
            break;
        }
        output[slot * stride..(slot + 1) * stride].copy_from_slice(bytemuck::bytes_of(cmd));
    }

    log::trace!(
        "cs_cull_instances: {} of {} draw commands visible",
        visible.len(),
        count
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sphere_against_single_plane() {
        // Only the first plane constrains: x >= 0.
        let mut planes = [[0.0, 0.0, 0.0, 1.0]; 6];
        planes[0] = [1.0, 0.0, 0.0, 0.0];
        assert!(sphere_visible(&planes, [1.0, 0.0, 0.0, 0.5]));
        assert!(sphere_visible(&planes, [-0.4, 0.0, 0.0, 0.5]));
        assert!(!sphere_visible(&planes, [-0.6, 0.0, 0.0, 0.5]));
    }

    #[test]
    fn unknown_entry_point_has_no_kernel() {
        assert!(builtin_kernel(CULL_ENTRY_POINT).is_some());
        assert!(builtin_kernel("cs_main").is_none());
    }
}
