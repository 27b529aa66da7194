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

//! The free-list allocator shared by every arena type.

use parking_lot::Mutex;
use std::borrow::Cow;
use std::collections::BTreeMap;
use tessel_core::memory::{ArenaError, ArenaStats, MemoryBlock};
use tessel_core::renderer::{BufferDescriptor, BufferId, BufferUsage, GraphicsDevice};

/// Parameters for creating an arena.
#[derive(Debug, Clone)]
pub struct ArenaDescriptor<'a> {
    /// Debug label, also given to the backing buffer.
    pub label: Cow<'a, str>,
    /// Size of one element in bytes.
    pub element_size: u64,
    /// Capacity in elements.
    pub capacity: u32,
}

#[derive(Debug)]
struct FreeList {
    /// Free ranges keyed by byte offset, never adjacent to one another.
    free: BTreeMap<u64, u64>,
    /// Live blocks keyed by byte offset.
    live: BTreeMap<u64, u64>,
    live_bytes: u64,
}

impl FreeList {
    fn largest_free(&self) -> u64 {
        self.free.values().copied().max().unwrap_or(0)
    }
}

/// A first-fit free-list allocator over a fixed-capacity GPU buffer.
///
/// Blocks are whole multiples of `element_size` and start on element
/// boundaries, so `instance_index * element_size == byte_offset` for every
/// block. Freed ranges are merged with their free neighbours. All state sits
/// behind one mutex; `alloc` and `free` may be called from any thread.
#[derive(Debug)]
pub struct MemoryArena {
    label: String,
    buffer: BufferId,
    element_size: u64,
    capacity: u32,
    state: Mutex<FreeList>,
}

impl MemoryArena {
    /// Creates the backing buffer with `usage` and an arena covering all of it.
    pub fn new(
        device: &dyn GraphicsDevice,
        descriptor: &ArenaDescriptor<'_>,
        usage: BufferUsage,
    ) -> Result<Self, ArenaError> {
        if descriptor.element_size == 0 || descriptor.capacity == 0 {
            return Err(ArenaError::InvalidAllocation(format!(
                "arena '{}' needs a non-zero element size and capacity",
                descriptor.label
            )));
        }
        let capacity_bytes = descriptor.element_size * u64::from(descriptor.capacity);
        let buffer = device.create_buffer(&BufferDescriptor {
            label: Some(descriptor.label.clone()),
            size: capacity_bytes,
            usage,
            mapped_at_creation: false,
        })?;

        let mut free = BTreeMap::new();
        free.insert(0, capacity_bytes);
        log::info!(
            "MemoryArena '{}': {} x {} bytes ({} bytes)",
            descriptor.label,
            descriptor.capacity,
            descriptor.element_size,
            capacity_bytes
        );
        Ok(Self {
            label: descriptor.label.to_string(),
            buffer,
            element_size: descriptor.element_size,
            capacity: descriptor.capacity,
            state: Mutex::new(FreeList {
                free,
                live: BTreeMap::new(),
                live_bytes: 0,
            }),
        })
    }

    /// Debug label of the arena.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The backing buffer.
    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    /// Size of one element in bytes.
    pub fn element_size(&self) -> u64 {
        self.element_size
    }

    /// Capacity in elements.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Capacity in bytes.
    pub fn capacity_bytes(&self) -> u64 {
        self.element_size * u64::from(self.capacity)
    }

    /// Allocates `count` contiguous elements from the first free range large enough.
    pub fn alloc(&self, count: u32) -> Result<MemoryBlock, ArenaError> {
        if count == 0 {
            return Err(ArenaError::InvalidAllocation(
                "cannot allocate zero elements".to_string(),
            ));
        }
        let size = u64::from(count) * self.element_size;

        let mut state = self.state.lock();
        let found = state
            .free
            .iter()
            .find(|&(_, &len)| len >= size)
            .map(|(&offset, &len)| (offset, len));
        let Some((offset, len)) = found else {
            let largest_free = state.largest_free();
            log::warn!(
                "MemoryArena '{}': out of memory ({} bytes requested, largest free {})",
                self.label,
                size,
                largest_free
            );
            return Err(ArenaError::OutOfMemory {
                requested: size,
                largest_free,
            });
        };

        state.free.remove(&offset);
        if len > size {
            state.free.insert(offset + size, len - size);
        }
        state.live.insert(offset, size);
        state.live_bytes += size;

        let block = MemoryBlock::new((offset / self.element_size) as u32, offset, size);
        log::trace!("MemoryArena '{}': alloc {:?}", self.label, block);
        Ok(block)
    }

    /// Returns `block` to the free list, merging it with adjacent free ranges.
    ///
    /// Fails with [`ArenaError::InvalidBlock`] if `block` is not exactly a live
    /// block of this arena, which catches double frees of forged handles.
    pub fn free(&self, block: MemoryBlock) -> Result<(), ArenaError> {
        let mut state = self.state.lock();
        let offset = block.byte_offset();
        let size = block.byte_size();
        if state.live.get(&offset) != Some(&size) {
            log::warn!(
                "MemoryArena '{}': rejected free of {:?}",
                self.label,
                block
            );
            return Err(ArenaError::InvalidBlock {
                byte_offset: offset,
                byte_size: size,
            });
        }
        state.live.remove(&offset);
        state.live_bytes -= size;

        let mut start = offset;
        let mut len = size;
        let previous = state
            .free
            .range(..offset)
            .next_back()
            .map(|(&o, &l)| (o, l));
        if let Some((prev_offset, prev_len)) = previous {
            if prev_offset + prev_len == offset {
                state.free.remove(&prev_offset);
                start = prev_offset;
                len += prev_len;
            }
        }
        let end = offset + size;
        if let Some(next_len) = state.free.remove(&end) {
            len += next_len;
        }
        state.free.insert(start, len);
        log::trace!("MemoryArena '{}': free {:?}", self.label, block);
        Ok(())
    }

    /// `true` if `block` is currently live in this arena.
    pub fn is_live(&self, block: &MemoryBlock) -> bool {
        self.state.lock().live.get(&block.byte_offset()) == Some(&block.byte_size())
    }

    /// Current accounting.
    pub fn stats(&self) -> ArenaStats {
        let state = self.state.lock();
        ArenaStats {
            capacity_bytes: self.capacity_bytes(),
            live_bytes: state.live_bytes,
            free_bytes: state.free.values().sum(),
            live_blocks: state.live.len(),
            free_blocks: state.free.len(),
            largest_free_block: state.largest_free(),
        }
    }

    /// Destroys the backing buffer.
    pub fn destroy(&self, device: &dyn GraphicsDevice) {
        if let Err(e) = device.destroy_buffer(self.buffer) {
            log::warn!(
                "MemoryArena '{}': Failed to destroy buffer: {:?}",
                self.label,
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessel_infra::SoftwareDevice;

    fn arena(capacity: u32) -> MemoryArena {
        let device = SoftwareDevice::new();
        MemoryArena::new(
            &device,
            &ArenaDescriptor {
                label: "test".into(),
                element_size: 16,
                capacity,
            },
            BufferUsage::STORAGE,
        )
        .unwrap()
    }

    fn assert_accounting(arena: &MemoryArena) {
        let stats = arena.stats();
        assert_eq!(stats.live_bytes + stats.free_bytes, stats.capacity_bytes);
    }

    #[test]
    fn alloc_is_first_fit_and_shrinks_from_the_front() {
        let arena = arena(8);
        let a = arena.alloc(2).unwrap();
        let b = arena.alloc(3).unwrap();
        assert_eq!((a.instance_index(), a.byte_offset(), a.byte_size()), (0, 0, 32));
        assert_eq!((b.instance_index(), b.byte_offset(), b.byte_size()), (2, 32, 48));
        assert_eq!(arena.stats().free_blocks, 1);
        assert_eq!(arena.stats().largest_free_block, 48);
        assert_accounting(&arena);
    }

    #[test]
    fn exact_fit_consumes_the_free_range() {
        let arena = arena(4);
        let _all = arena.alloc(4).unwrap();
        let stats = arena.stats();
        assert_eq!(stats.free_blocks, 0);
        assert_eq!(stats.free_bytes, 0);
        assert!(matches!(
            arena.alloc(1),
            Err(ArenaError::OutOfMemory {
                requested: 16,
                largest_free: 0
            })
        ));
    }

    #[test]
    fn zero_count_is_rejected() {
        let arena = arena(4);
        assert!(matches!(arena.alloc(0), Err(ArenaError::InvalidAllocation(_))));
    }

    #[test]
    fn free_coalesces_neighbours() {
        let arena = arena(6);
        let a = arena.alloc(2).unwrap();
        let b = arena.alloc(2).unwrap();
        let c = arena.alloc(2).unwrap();
        arena.free(a).unwrap();
        arena.free(c).unwrap();
        assert_eq!(arena.stats().free_blocks, 2);
        arena.free(b).unwrap();
        let stats = arena.stats();
        assert_eq!(stats.free_blocks, 1);
        assert_eq!(stats.largest_free_block, 96);
        assert_eq!(stats.live_blocks, 0);
        assert_accounting(&arena);
    }

    #[test]
    fn fragmentation_can_fail_a_large_request() {
        let arena = arena(4);
        let a = arena.alloc(1).unwrap();
        let _b = arena.alloc(1).unwrap();
        let c = arena.alloc(1).unwrap();
        let _d = arena.alloc(1).unwrap();
        arena.free(a).unwrap();
        arena.free(c).unwrap();
        assert_eq!(arena.stats().free_bytes, 32);
        assert!(matches!(arena.alloc(2), Err(ArenaError::OutOfMemory { .. })));
        assert!(arena.stats().fragmentation() > 0.0);
    }

    #[test]
    fn reuses_the_lowest_hole() {
        let arena = arena(6);
        let a = arena.alloc(1).unwrap();
        let _b = arena.alloc(1).unwrap();
        arena.free(a).unwrap();
        let again = arena.alloc(1).unwrap();
        assert_eq!(again.byte_offset(), 0);
    }

    #[test]
    fn double_free_is_detected() {
        let arena = arena(4);
        let a = arena.alloc(2).unwrap();
        let forged = MemoryBlock::new(a.instance_index(), a.byte_offset(), a.byte_size());
        arena.free(a).unwrap();
        assert!(matches!(arena.free(forged), Err(ArenaError::InvalidBlock { .. })));
        assert!(matches!(
            arena.free(MemoryBlock::new(100, 1600, 16)),
            Err(ArenaError::InvalidBlock { .. })
        ));
        assert_accounting(&arena);
    }

    #[test]
    fn partial_free_of_a_live_block_is_rejected() {
        let arena = arena(4);
        let a = arena.alloc(2).unwrap();
        assert!(arena
            .free(MemoryBlock::new(0, a.byte_offset(), 16))
            .is_err());
        assert!(arena.is_live(&a));
    }

    #[test]
    fn concurrent_alloc_and_free_keep_blocks_disjoint() {
        let arena = std::sync::Arc::new(arena(256));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let arena = arena.clone();
                std::thread::spawn(move || {
                    let mut kept = Vec::new();
                    for i in 0..200u32 {
                        let block = arena.alloc(1 + i % 3).unwrap();
                        if i % 2 == 0 {
                            arena.free(block).unwrap();
                        } else if kept.len() < 10 {
                            kept.push(block);
                        } else {
                            arena.free(block).unwrap();
                        }
                    }
                    kept
                })
            })
            .collect();
        let blocks: Vec<MemoryBlock> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        for (i, a) in blocks.iter().enumerate() {
            for b in &blocks[i + 1..] {
                assert!(!a.overlaps(b), "{a:?} overlaps {b:?}");
            }
        }
        assert_eq!(arena.stats().live_blocks, blocks.len());
        assert_accounting(&arena);
    }
}
