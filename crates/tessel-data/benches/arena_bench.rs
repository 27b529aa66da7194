use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use std::sync::Arc;
use tessel_core::memory::GpuMemoryArena;
use tessel_core::renderer::{BufferUsage, CommandKind, GraphicsDevice};
use tessel_data::allocators::{ArenaDescriptor, DeviceMemoryArena, MemoryArena};
use tessel_infra::SoftwareDevice;

fn bench_arena(c: &mut Criterion) {
    let device = SoftwareDevice::new();
    let descriptor = ArenaDescriptor {
        label: "bench instances".into(),
        element_size: 96,
        capacity: 4096,
    };

    let mut group = c.benchmark_group("Instance Arena");

    let arena = MemoryArena::new(&device, &descriptor, BufferUsage::STORAGE).unwrap();
    group.bench_function("Alloc/Free churn (1024 blocks)", |b| {
        b.iter(|| {
            let mut blocks = Vec::with_capacity(1024);
            for i in 0..1024u32 {
                blocks.push(arena.alloc(1 + i % 3).unwrap());
            }
            // Free every other block first so coalescing has work to do.
            let (even, odd): (Vec<_>, Vec<_>) = blocks
                .into_iter()
                .enumerate()
                .partition(|(i, _)| i % 2 == 0);
            for (_, block) in even.into_iter().chain(odd) {
                arena.free(block).unwrap();
            }
            black_box(arena.stats());
        });
    });

    let staged = DeviceMemoryArena::new(Arc::new(device.clone()), &descriptor, 1024, 2).unwrap();
    let blocks: Vec<_> = (0..1024).map(|_| staged.alloc(1).unwrap()).collect();
    let payload = [0xABu8; 96];
    let allocator = device.create_command_allocator(CommandKind::Transfer).unwrap();
    group.bench_function("Staged write + flush (1024 instances)", |b| {
        b.iter(|| {
            for block in &blocks {
                staged.write(block, &payload).unwrap();
            }
            let mut encoder = device
                .create_command_encoder(allocator, Some("bench flush"))
                .unwrap();
            staged.flush(encoder.as_mut()).unwrap();
            black_box(encoder.command_count());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_arena);
criterion_main!(benches);
