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

//! Integration tests: arenas driven through a real submission round trip.

use std::sync::Arc;
use tessel_core::math::{Aabb, Mat4, Vec3};
use tessel_core::memory::{ArenaError, GpuMemoryArena};
use tessel_core::renderer::{CommandKind, GpuInstance, GraphicsDevice};
use tessel_data::allocators::{
    ArenaDescriptor, DeviceMemoryArena, GpuMemoryArenaExt, HostBufferKind, HostVisibleMemoryArena,
};
use tessel_infra::SoftwareDevice;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn instance_arena(device: &SoftwareDevice, capacity: u32, staging: u32) -> DeviceMemoryArena {
    DeviceMemoryArena::new(
        Arc::new(device.clone()),
        &ArenaDescriptor {
            label: "instances".into(),
            element_size: std::mem::size_of::<GpuInstance>() as u64,
            capacity,
        },
        staging,
        2,
    )
    .unwrap()
}

fn flush_and_submit(device: &SoftwareDevice, arena: &dyn GpuMemoryArena) {
    let allocator = device.create_command_allocator(CommandKind::Transfer).unwrap();
    let mut encoder = device
        .create_command_encoder(allocator, Some("upload"))
        .unwrap();
    arena.flush(encoder.as_mut()).unwrap();
    device
        .submit(CommandKind::Transfer, encoder.as_mut(), None)
        .unwrap();
}

fn read_instances(device: &SoftwareDevice, arena: &dyn GpuMemoryArena) -> Vec<GpuInstance> {
    let contents = device.snapshot_buffer(arena.buffer()).unwrap();
    contents
        .chunks_exact(std::mem::size_of::<GpuInstance>())
        .map(bytemuck::pod_read_unaligned)
        .collect()
}

fn instance_at(x: f32) -> GpuInstance {
    let transform = Mat4::from_translation(Vec3::new(x, 0.0, 0.0));
    let bounds = Aabb::from_center_half_extents(Vec3::ZERO, Vec3::ONE).transform(&transform);
    GpuInstance::new(&transform, &bounds.bounding_sphere(), 3)
}

#[test]
fn staged_instances_reach_device_memory_after_flush() {
    init_logger();
    let device = SoftwareDevice::new();
    let arena = instance_arena(&device, 16, 8);

    let blocks: Vec<_> = (0..4).map(|_| arena.alloc(1).unwrap()).collect();
    for (i, block) in blocks.iter().enumerate() {
        arena
            .write_elements(block, &[instance_at(i as f32 * 10.0)])
            .unwrap();
    }
    assert_eq!(arena.pending_writes().len(), 4);

    flush_and_submit(&device, &arena);

    let uploaded = read_instances(&device, &arena);
    for (i, instance) in uploaded.iter().take(4).enumerate() {
        assert_eq!(*instance, instance_at(i as f32 * 10.0));
    }
    assert_eq!(uploaded[4], <GpuInstance as bytemuck::Zeroable>::zeroed());
}

#[test]
fn later_write_to_the_same_block_wins() {
    init_logger();
    let device = SoftwareDevice::new();
    let arena = instance_arena(&device, 4, 4);
    let block = arena.alloc(1).unwrap();

    arena.write_elements(&block, &[instance_at(1.0)]).unwrap();
    arena.write_elements(&block, &[instance_at(2.0)]).unwrap();
    flush_and_submit(&device, &arena);

    let uploaded = read_instances(&device, &arena);
    assert_eq!(uploaded[0], instance_at(2.0));
}

#[test]
fn staging_slots_rotate_per_flush() {
    init_logger();
    let device = SoftwareDevice::new();
    let arena = instance_arena(&device, 4, 2);
    let block = arena.alloc(1).unwrap();

    for expected_slot in [0, 1, 0] {
        assert_eq!(arena.current_staging_slot(), expected_slot);
        arena.write_elements(&block, &[instance_at(0.0)]).unwrap();
        flush_and_submit(&device, &arena);
        assert_eq!(arena.staging_cursor(), 0);
    }
}

#[test]
fn staging_capacity_bounds_one_flush_cycle() {
    init_logger();
    let device = SoftwareDevice::new();
    let arena = instance_arena(&device, 8, 2);
    let blocks: Vec<_> = (0..3).map(|_| arena.alloc(1).unwrap()).collect();

    arena.write_elements(&blocks[0], &[instance_at(0.0)]).unwrap();
    arena.write_elements(&blocks[1], &[instance_at(1.0)]).unwrap();
    let err = arena
        .write_elements(&blocks[2], &[instance_at(2.0)])
        .unwrap_err();
    assert!(matches!(err, ArenaError::StagingOverflow { available: 0, .. }));

    flush_and_submit(&device, &arena);
    arena.write_elements(&blocks[2], &[instance_at(2.0)]).unwrap();
}

#[test]
fn arena_accounting_holds_under_churn() {
    init_logger();
    let device = SoftwareDevice::new();
    // Ten rounds allocate at most 140 elements, so no round can run out.
    let arena = instance_arena(&device, 256, 8);
    let mut live = Vec::new();

    for round in 0..10u32 {
        for i in 0..5 {
            live.push(arena.alloc(1 + (round + i) % 4).unwrap());
        }
        // Release from the middle to fragment the free list.
        let middle = live.len() / 2;
        let block = live.remove(middle);
        arena.free(block).unwrap();

        let stats = arena.stats();
        assert_eq!(stats.live_bytes + stats.free_bytes, stats.capacity_bytes);
        assert_eq!(stats.live_blocks, live.len());
    }

    for (i, a) in live.iter().enumerate() {
        for b in &live[i + 1..] {
            assert!(!a.overlaps(b));
        }
    }

    for block in live {
        arena.free(block).unwrap();
    }
    let stats = arena.stats();
    assert_eq!(stats.free_blocks, 1);
    assert_eq!(stats.largest_free_block, stats.capacity_bytes);
}

#[test]
fn host_visible_arena_needs_no_submission() {
    init_logger();
    let device = SoftwareDevice::new();
    let arena = HostVisibleMemoryArena::new(
        Arc::new(device.clone()),
        &ArenaDescriptor {
            label: "uniforms".into(),
            element_size: 16,
            capacity: 4,
        },
        HostBufferKind::Uniform,
    )
    .unwrap();
    let block = arena.alloc(1).unwrap();
    arena.write_elements(&block, &[1.0f32, 2.0, 3.0, 4.0]).unwrap();

    let contents = device.snapshot_buffer(arena.buffer()).unwrap();
    let values: Vec<f32> = contents[..16]
        .chunks_exact(4)
        .map(bytemuck::pod_read_unaligned)
        .collect();
    assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0]);
}
