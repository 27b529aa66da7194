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

//! Instance arena in device-local memory, fed through staging buffers.

use super::memory_arena::{ArenaDescriptor, MemoryArena};
use parking_lot::Mutex;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use tessel_core::memory::{ArenaError, ArenaStats, GpuMemoryArena, MemoryBlock};
use tessel_core::renderer::{
    BufferCopyRegion, BufferDescriptor, BufferId, BufferUsage, CommandEncoder, GraphicsDevice,
};

/// A write waiting in staging memory for the next flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingWrite {
    /// Offset of the bytes in the current staging slot.
    pub staging_offset: u64,
    /// Offset of the destination in the device buffer.
    pub destination_offset: u64,
    /// Number of bytes.
    pub byte_size: u64,
}

#[derive(Debug)]
struct StagingState {
    slots: Vec<BufferId>,
    current: usize,
    cursor: u64,
    pending: Vec<PendingWrite>,
}

/// An arena whose buffer the CPU cannot write directly.
///
/// Writes land in a host-visible staging slot at an increasing cursor and are
/// remembered as [`PendingWrite`]s. [`flush`](GpuMemoryArena::flush) records
/// one batched copy of every pending range into the device buffer, then moves
/// on to the next staging slot so the CPU never overwrites bytes a queued
/// copy has yet to read. There is one slot per frame in flight.
pub struct DeviceMemoryArena {
    arena: MemoryArena,
    device: Arc<dyn GraphicsDevice>,
    staging_slot_size: u64,
    staging: Mutex<StagingState>,
}

impl fmt::Debug for DeviceMemoryArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceMemoryArena")
            .field("arena", &self.arena)
            .field("staging_slot_size", &self.staging_slot_size)
            .finish_non_exhaustive()
    }
}

impl DeviceMemoryArena {
    /// Creates the device buffer and `staging_slots` staging buffers of
    /// `staging_capacity` elements each.
    pub fn new(
        device: Arc<dyn GraphicsDevice>,
        descriptor: &ArenaDescriptor<'_>,
        staging_capacity: u32,
        staging_slots: usize,
    ) -> Result<Self, ArenaError> {
        if staging_capacity == 0 {
            return Err(ArenaError::InvalidAllocation(format!(
                "arena '{}' needs a non-zero staging capacity",
                descriptor.label
            )));
        }
        let arena = MemoryArena::new(
            device.as_ref(),
            descriptor,
            BufferUsage::STORAGE | BufferUsage::VERTEX | BufferUsage::COPY_DST,
        )?;

        let staging_slot_size = descriptor.element_size * u64::from(staging_capacity);
        let slot_count = staging_slots.max(1);
        let mut slots = Vec::with_capacity(slot_count);
        for i in 0..slot_count {
            let created = device.create_buffer(&BufferDescriptor {
                label: Some(Cow::Owned(format!("{} staging [slot {i}]", descriptor.label))),
                size: staging_slot_size,
                usage: BufferUsage::MAP_WRITE | BufferUsage::COPY_SRC,
                mapped_at_creation: true,
            });
            match created {
                Ok(buffer) => slots.push(buffer),
                Err(e) => {
                    for buffer in slots {
                        let _ = device.destroy_buffer(buffer);
                    }
                    arena.destroy(device.as_ref());
                    return Err(e.into());
                }
            }
        }

        log::debug!(
            "DeviceMemoryArena '{}': {} staging slots of {} bytes",
            descriptor.label,
            slot_count,
            staging_slot_size
        );
        Ok(Self {
            arena,
            device,
            staging_slot_size,
            staging: Mutex::new(StagingState {
                slots,
                current: 0,
                cursor: 0,
                pending: Vec::new(),
            }),
        })
    }

    /// Bytes already written to the current staging slot.
    pub fn staging_cursor(&self) -> u64 {
        self.staging.lock().cursor
    }

    /// Index of the staging slot that receives writes.
    pub fn current_staging_slot(&self) -> usize {
        self.staging.lock().current
    }

    /// Writes waiting for the next flush.
    pub fn pending_writes(&self) -> Vec<PendingWrite> {
        self.staging.lock().pending.clone()
    }

    /// Capacity of one staging slot, in bytes.
    pub fn staging_slot_size(&self) -> u64 {
        self.staging_slot_size
    }

    /// `true` if `block` is currently live in this arena.
    pub fn is_live(&self, block: &MemoryBlock) -> bool {
        self.arena.is_live(block)
    }
}

impl GpuMemoryArena for DeviceMemoryArena {
    fn element_size(&self) -> u64 {
        self.arena.element_size()
    }

    fn capacity(&self) -> u32 {
        self.arena.capacity()
    }

    fn buffer(&self) -> BufferId {
        self.arena.buffer()
    }

    fn alloc(&self, count: u32) -> Result<MemoryBlock, ArenaError> {
        self.arena.alloc(count)
    }

    fn free(&self, block: MemoryBlock) -> Result<(), ArenaError> {
        self.arena.free(block)
    }

    fn write(&self, block: &MemoryBlock, data: &[u8]) -> Result<(), ArenaError> {
        if !self.arena.is_live(block) {
            return Err(ArenaError::InvalidBlock {
                byte_offset: block.byte_offset(),
                byte_size: block.byte_size(),
            });
        }
        let size = data.len() as u64;
        if size > block.byte_size() {
            return Err(ArenaError::WriteOutOfBounds {
                size,
                block_size: block.byte_size(),
            });
        }
        if size == 0 {
            return Ok(());
        }

        let mut staging = self.staging.lock();
        let available = self.staging_slot_size - staging.cursor;
        if size > available {
            log::warn!(
                "DeviceMemoryArena '{}': staging overflow ({} bytes, {} left)",
                self.arena.label(),
                size,
                available
            );
            return Err(ArenaError::StagingOverflow {
                requested: size,
                available,
            });
        }

        let staging_offset = staging.cursor;
        self.device
            .write_buffer(staging.slots[staging.current], staging_offset, data)?;
        staging.pending.push(PendingWrite {
            staging_offset,
            destination_offset: block.byte_offset(),
            byte_size: size,
        });
        staging.cursor += size;
        Ok(())
    }

    fn flush(&self, encoder: &mut dyn CommandEncoder) -> Result<(), ArenaError> {
        let mut staging = self.staging.lock();
        if staging.pending.is_empty() {
            return Ok(());
        }

        let regions: Vec<BufferCopyRegion> = staging
            .pending
            .iter()
            .map(|w| BufferCopyRegion {
                source_offset: w.staging_offset,
                destination_offset: w.destination_offset,
                size: w.byte_size,
            })
            .collect();
        let source = staging.slots[staging.current];
        encoder.copy_buffer_regions(&source, &self.arena.buffer(), &regions);

        log::debug!(
            "DeviceMemoryArena '{}': flushed {} writes ({} bytes) from staging slot {}",
            self.arena.label(),
            regions.len(),
            staging.cursor,
            staging.current
        );
        staging.pending.clear();
        staging.cursor = 0;
        staging.current = (staging.current + 1) % staging.slots.len();
        Ok(())
    }

    fn stats(&self) -> ArenaStats {
        self.arena.stats()
    }
}

impl Drop for DeviceMemoryArena {
    fn drop(&mut self) {
        let staging = self.staging.get_mut();
        for buffer in staging.slots.drain(..) {
            if let Err(e) = self.device.destroy_buffer(buffer) {
                log::warn!(
                    "DeviceMemoryArena '{}': Failed to destroy staging buffer: {:?}",
                    self.arena.label(),
                    e
                );
            }
        }
        self.arena.destroy(self.device.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessel_core::renderer::CommandKind;
    use tessel_infra::SoftwareDevice;

    fn setup(capacity: u32, staging: u32) -> (SoftwareDevice, DeviceMemoryArena) {
        let device = SoftwareDevice::new();
        let arena = DeviceMemoryArena::new(
            Arc::new(device.clone()),
            &ArenaDescriptor {
                label: "instances".into(),
                element_size: 8,
                capacity,
            },
            staging,
            2,
        )
        .unwrap();
        (device, arena)
    }

    fn encoder(device: &SoftwareDevice) -> Box<dyn CommandEncoder> {
        let allocator = device.create_command_allocator(CommandKind::Graphics).unwrap();
        device.create_command_encoder(allocator, Some("flush")).unwrap()
    }

    #[test]
    fn write_stages_without_touching_device_memory() {
        let (device, arena) = setup(4, 4);
        let block = arena.alloc(1).unwrap();
        arena.write(&block, &[9; 8]).unwrap();
        assert_eq!(arena.staging_cursor(), 8);
        assert_eq!(arena.pending_writes().len(), 1);
        assert_eq!(device.snapshot_buffer(arena.buffer()).unwrap(), vec![0; 32]);
    }

    #[test]
    fn flush_records_one_copy_and_resets_staging() {
        let (device, arena) = setup(4, 4);
        let a = arena.alloc(1).unwrap();
        let b = arena.alloc(2).unwrap();
        arena.write(&a, &[1; 8]).unwrap();
        arena.write(&b, &[2; 16]).unwrap();

        let mut encoder = encoder(&device);
        arena.flush(encoder.as_mut()).unwrap();
        assert_eq!(encoder.command_count(), 1);
        assert_eq!(arena.staging_cursor(), 0);
        assert!(arena.pending_writes().is_empty());
        assert_eq!(arena.current_staging_slot(), 1);

        device
            .submit(CommandKind::Graphics, encoder.as_mut(), None)
            .unwrap();
        let contents = device.snapshot_buffer(arena.buffer()).unwrap();
        assert_eq!(&contents[..8], &[1; 8]);
        assert_eq!(&contents[8..24], &[2; 16]);
        assert_eq!(&contents[24..], &[0; 8]);
    }

    #[test]
    fn empty_flush_is_a_no_op() {
        let (device, arena) = setup(4, 4);
        let mut encoder = encoder(&device);
        arena.flush(encoder.as_mut()).unwrap();
        assert_eq!(encoder.command_count(), 0);
        assert_eq!(arena.current_staging_slot(), 0);
        assert_eq!(arena.staging_cursor(), 0);
    }

    #[test]
    fn staging_overflow_until_flushed() {
        let (device, arena) = setup(8, 2);
        let blocks: Vec<_> = (0..3).map(|_| arena.alloc(1).unwrap()).collect();
        arena.write(&blocks[0], &[1; 8]).unwrap();
        arena.write(&blocks[1], &[1; 8]).unwrap();
        assert!(matches!(
            arena.write(&blocks[2], &[1; 8]),
            Err(ArenaError::StagingOverflow {
                requested: 8,
                available: 0
            })
        ));
        let mut encoder = encoder(&device);
        arena.flush(encoder.as_mut()).unwrap();
        arena.write(&blocks[2], &[1; 8]).unwrap();
    }

    #[test]
    fn write_larger_than_block_is_rejected() {
        let (_device, arena) = setup(4, 4);
        let block = arena.alloc(1).unwrap();
        assert!(matches!(
            arena.write(&block, &[0; 9]),
            Err(ArenaError::WriteOutOfBounds {
                size: 9,
                block_size: 8
            })
        ));
        assert_eq!(arena.staging_cursor(), 0);
    }

    #[test]
    fn write_to_freed_block_is_rejected() {
        let (_device, arena) = setup(4, 4);
        let block = arena.alloc(1).unwrap();
        let stale = MemoryBlock::new(block.instance_index(), block.byte_offset(), block.byte_size());
        arena.free(block).unwrap();
        assert!(matches!(
            arena.write(&stale, &[0; 8]),
            Err(ArenaError::InvalidBlock { .. })
        ));
    }

    #[test]
    fn drop_releases_every_buffer() {
        let (device, arena) = setup(4, 4);
        assert_eq!(device.stats().live_buffers, 3);
        drop(arena);
        assert_eq!(device.stats().live_buffers, 0);
    }
}
