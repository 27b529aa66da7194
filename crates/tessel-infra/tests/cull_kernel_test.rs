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

//! Runs the CPU culling kernel through the public device contract.

use tessel_core::math::{BoundingSphere, Frustum, Mat4, Vec3};
use tessel_core::renderer::api::*;
use tessel_core::renderer::GraphicsDevice;
use tessel_infra::SoftwareDevice;

const MODULE: &str = "@compute @workgroup_size(64)\nfn cs_cull_instances() {}";

struct Scene {
    device: SoftwareDevice,
    pipeline: ComputePipelineId,
    uniforms: BufferId,
    instances: BufferId,
    input: BufferId,
    output: BufferId,
    counter: BufferId,
}

fn frustum() -> Frustum {
    let projection = Mat4::perspective_rh(60f32.to_radians(), 1.0, 0.1, 100.0);
    let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::new(0.0, 0.0, -1.0), Vec3::Y);
    Frustum::from_view_projection(&(projection * view)).unwrap()
}

fn setup(spheres: &[BoundingSphere], commands: &[IndirectDrawCommand]) -> Scene {
    let _ = env_logger::builder().is_test(true).try_init();
    let device = SoftwareDevice::new();
    let module = device
        .create_shader_module(&ShaderModuleDescriptor {
            label: Some("cull"),
            source: ShaderSourceData::Wgsl(MODULE.into()),
        })
        .unwrap();
    let pipeline = device
        .create_compute_pipeline(&ComputePipelineDescriptor {
            label: Some("cull".into()),
            module,
            entry_point: CULL_ENTRY_POINT.into(),
        })
        .unwrap();

    let instances: Vec<GpuInstance> = spheres
        .iter()
        .map(|s| GpuInstance::new(&Mat4::from_translation(s.center), s, 0))
        .collect();
    let uniforms = CullUniforms::new(&frustum(), commands.len() as u32);

    let uniforms = device
        .create_buffer_with_data(
            &BufferDescriptor::new("uniforms", 112, BufferUsage::UNIFORM),
            bytemuck::bytes_of(&uniforms),
        )
        .unwrap();
    let instance_bytes: &[u8] = bytemuck::cast_slice(&instances);
    let instances = device
        .create_buffer_with_data(
            &BufferDescriptor::new("instances", instance_bytes.len() as u64, BufferUsage::STORAGE),
            instance_bytes,
        )
        .unwrap();
    let command_bytes: &[u8] = bytemuck::cast_slice(commands);
    let input = device
        .create_buffer_with_data(
            &BufferDescriptor::new("input", command_bytes.len() as u64, BufferUsage::STORAGE),
            command_bytes,
        )
        .unwrap();
    let output = device
        .create_buffer(&BufferDescriptor::new(
            "output",
            command_bytes.len() as u64,
            BufferUsage::STORAGE | BufferUsage::INDIRECT,
        ))
        .unwrap();
    let counter = device
        .create_buffer(&BufferDescriptor::new("counter", 4, BufferUsage::STORAGE))
        .unwrap();

    Scene {
        device,
        pipeline,
        uniforms,
        instances,
        input,
        output,
        counter,
    }
}

fn run(scene: &Scene, command_count: u32) -> (u32, Vec<IndirectDrawCommand>) {
    let device = &scene.device;
    let allocator = device.create_command_allocator(CommandKind::Graphics).unwrap();
    let mut encoder = device.create_command_encoder(allocator, Some("cull")).unwrap();
    let bindings = [
        BufferBinding { binding: cull_bindings::UNIFORMS, buffer: scene.uniforms },
        BufferBinding { binding: cull_bindings::INSTANCES, buffer: scene.instances },
        BufferBinding { binding: cull_bindings::INPUT_COMMANDS, buffer: scene.input },
        BufferBinding { binding: cull_bindings::OUTPUT_COMMANDS, buffer: scene.output },
        BufferBinding { binding: cull_bindings::COUNTER, buffer: scene.counter },
    ];
    encoder.dispatch_compute(&ComputeDispatch {
        label: Some("cull"),
        pipeline: scene.pipeline,
        bindings: &bindings,
        workgroups: [
            ComputeDispatch::workgroups_for(command_count, CULL_WORKGROUP_SIZE),
            1,
            1,
        ],
    });
    device
        .submit(CommandKind::Graphics, encoder.as_mut(), None)
        .unwrap();

    let counter = device.snapshot_buffer(scene.counter).unwrap();
    let count = u32::from_le_bytes([counter[0], counter[1], counter[2], counter[3]]);
    let output = device.snapshot_buffer(scene.output).unwrap();
    let emitted: Vec<IndirectDrawCommand> = output
        .chunks_exact(std::mem::size_of::<IndirectDrawCommand>())
        .take(count as usize)
        .map(bytemuck::pod_read_unaligned)
        .collect();
    (count, emitted)
}

fn draw(instance: u32) -> IndirectDrawCommand {
    IndirectDrawCommand {
        index_count: 36,
        instance_count: 1,
        first_index: 0,
        base_vertex: 0,
        first_instance: instance,
    }
}

#[test]
fn culls_instance_behind_far_plane() {
    let spheres = [
        BoundingSphere::new(Vec3::new(0.0, 0.0, -5.0), 1.0),
        BoundingSphere::new(Vec3::new(1.0, 0.0, -10.0), 1.0),
        BoundingSphere::new(Vec3::new(0.0, 0.0, -500.0), 1.0),
        BoundingSphere::new(Vec3::new(-1.0, 1.0, -20.0), 1.0),
    ];
    let commands: Vec<_> = (0..4).map(draw).collect();
    let scene = setup(&spheres, &commands);
    let (count, emitted) = run(&scene, 4);
    assert_eq!(count, 3);
    assert!(emitted.iter().all(|c| c.first_instance != 2));
}

#[test]
fn visible_count_is_bounded_and_sound() {
    // A ring of spheres around the camera: some in front, some behind, some to the side.
    let spheres: Vec<BoundingSphere> = (0..40)
        .map(|i| {
            let angle = i as f32 * std::f32::consts::TAU / 40.0;
            BoundingSphere::new(Vec3::new(angle.sin() * 30.0, 0.0, angle.cos() * 30.0), 2.0)
        })
        .collect();
    let commands: Vec<_> = (0..40).map(draw).collect();
    let scene = setup(&spheres, &commands);
    let (count, emitted) = run(&scene, 40);

    assert!(count > 0 && count < 40);
    let frustum = frustum();
    for cmd in &emitted {
        assert!(frustum.intersects_sphere(&spheres[cmd.first_instance as usize]));
    }
    let culled = spheres
        .iter()
        .filter(|s| !frustum.intersects_sphere(s))
        .count();
    assert_eq!(count as usize, 40 - culled);
}

#[test]
fn only_the_first_command_count_entries_are_considered() {
    let spheres = [BoundingSphere::new(Vec3::new(0.0, 0.0, -5.0), 1.0); 3];
    let commands: Vec<_> = (0..3).map(draw).collect();
    let scene = setup(&spheres, &commands);
    let uniforms = CullUniforms::new(&frustum(), 2);
    // Rebuild the uniform block with a smaller count.
    let smaller = scene
        .device
        .create_buffer_with_data(
            &BufferDescriptor::new("uniforms", 112, BufferUsage::UNIFORM),
            bytemuck::bytes_of(&uniforms),
        )
        .unwrap();
    let scene = Scene {
        uniforms: smaller,
        ..scene
    };
    let (count, _) = run(&scene, 3);
    assert_eq!(count, 2);
}

#[test]
fn draws_referencing_missing_instances_are_dropped() {
    let spheres = [BoundingSphere::new(Vec3::new(0.0, 0.0, -5.0), 1.0)];
    let commands = [draw(0), draw(9)];
    let scene = setup(&spheres, &commands);
    let (count, emitted) = run(&scene, 2);
    assert_eq!(count, 1);
    assert_eq!(emitted[0].first_instance, 0);
}
