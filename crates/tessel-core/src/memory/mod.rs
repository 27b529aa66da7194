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

//! Contracts for GPU instance memory arenas.
//!
//! An arena hands out [`MemoryBlock`]s carved from one fixed-capacity GPU
//! buffer of equally sized elements. The allocator lives in `tessel-data`;
//! this module defines the handle, the error taxonomy and the trait the
//! scheduler and lanes program against.

use crate::renderer::{BufferId, CommandEncoder, ResourceError};
use std::fmt;

/// A contiguous region of an arena owned by exactly one requester.
///
/// A block is deliberately neither `Clone` nor `Copy`: handing it back to
/// [`GpuMemoryArena::free`] consumes it, so a live block cannot be released
/// twice through safe code.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct MemoryBlock {
    instance_index: u32,
    byte_offset: u64,
    byte_size: u64,
}

impl MemoryBlock {
    /// Rebuilds a block handle from its raw parts.
    ///
    /// Arenas validate such handles on `free`; a forged block overlapping free
    /// space is rejected.
    pub fn new(instance_index: u32, byte_offset: u64, byte_size: u64) -> Self {
        Self {
            instance_index,
            byte_offset,
            byte_size,
        }
    }

    /// Index of the first element, i.e. `byte_offset / element_size`.
    #[inline]
    pub fn instance_index(&self) -> u32 {
        self.instance_index
    }

    /// Byte offset of the block in the arena buffer.
    #[inline]
    pub fn byte_offset(&self) -> u64 {
        self.byte_offset
    }

    /// Size of the block in bytes.
    #[inline]
    pub fn byte_size(&self) -> u64 {
        self.byte_size
    }

    /// One past the last byte of the block.
    #[inline]
    pub fn byte_end(&self) -> u64 {
        self.byte_offset + self.byte_size
    }

    /// `true` if the two blocks share at least one byte.
    pub fn overlaps(&self, other: &MemoryBlock) -> bool {
        self.byte_offset < other.byte_end() && other.byte_offset < self.byte_end()
    }
}

/// A snapshot of an arena's accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArenaStats {
    /// Total size of the arena buffer, in bytes.
    pub capacity_bytes: u64,
    /// Bytes held by live blocks.
    pub live_bytes: u64,
    /// Bytes on the free list.
    pub free_bytes: u64,
    /// Number of live blocks.
    pub live_blocks: usize,
    /// Number of disjoint free ranges.
    pub free_blocks: usize,
    /// Size of the largest free range, in bytes.
    pub largest_free_block: u64,
}

impl ArenaStats {
    /// Share of free memory not usable by a single allocation, in `[0, 1]`.
    pub fn fragmentation(&self) -> f32 {
        if self.free_bytes == 0 {
            return 0.0;
        }
        1.0 - self.largest_free_block as f32 / self.free_bytes as f32
    }
}

/// Errors returned by arena operations.
#[derive(Debug)]
pub enum ArenaError {
    /// No free range is large enough. Not retried by the arena.
    OutOfMemory {
        /// Bytes requested.
        requested: u64,
        /// Largest free range at the time of the request.
        largest_free: u64,
    },
    /// The staging area cannot hold the write until the next flush.
    StagingOverflow {
        /// Bytes the write needed.
        requested: u64,
        /// Bytes left in the current staging slot.
        available: u64,
    },
    /// The data does not fit in the destination block.
    WriteOutOfBounds {
        /// Bytes written.
        size: u64,
        /// Size of the block.
        block_size: u64,
    },
    /// The block was never allocated from this arena or is already free.
    InvalidBlock {
        /// Offset of the rejected block.
        byte_offset: u64,
        /// Size of the rejected block.
        byte_size: u64,
    },
    /// The allocation request itself is malformed (e.g. zero elements).
    InvalidAllocation(String),
    /// The underlying device failed.
    Resource(ResourceError),
}

impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArenaError::OutOfMemory {
                requested,
                largest_free,
            } => write!(
                f,
                "Arena out of memory: requested {requested} bytes, largest free block is {largest_free} bytes"
            ),
            ArenaError::StagingOverflow {
                requested,
                available,
            } => write!(
                f,
                "Staging overflow: write of {requested} bytes with {available} bytes left before the next flush"
            ),
            ArenaError::WriteOutOfBounds { size, block_size } => {
                write!(f, "Write of {size} bytes exceeds block of {block_size} bytes")
            }
            ArenaError::InvalidBlock {
                byte_offset,
                byte_size,
            } => write!(
                f,
                "Invalid block at offset {byte_offset} ({byte_size} bytes): not live in this arena"
            ),
            ArenaError::InvalidAllocation(msg) => write!(f, "Invalid allocation: {msg}"),
            ArenaError::Resource(err) => write!(f, "Arena resource error: {err}"),
        }
    }
}

impl std::error::Error for ArenaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ArenaError::Resource(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ResourceError> for ArenaError {
    fn from(err: ResourceError) -> Self {
        ArenaError::Resource(err)
    }
}

/// A fixed-capacity GPU buffer sub-allocated in whole elements.
///
/// All methods take `&self`; implementations serialize internally so that
/// several threads can allocate and free concurrently.
pub trait GpuMemoryArena: Send + Sync + fmt::Debug {
    /// Size of one element in bytes.
    fn element_size(&self) -> u64;

    /// Capacity of the arena, in elements.
    fn capacity(&self) -> u32;

    /// The GPU buffer backing the arena.
    fn buffer(&self) -> BufferId;

    /// Allocates `count` contiguous elements.
    fn alloc(&self, count: u32) -> Result<MemoryBlock, ArenaError>;

    /// Returns a block to the arena.
    fn free(&self, block: MemoryBlock) -> Result<(), ArenaError>;

    /// Writes `data` at the start of `block`.
    ///
    /// Whether the bytes reach the GPU immediately or on the next
    /// [`flush`](GpuMemoryArena::flush) depends on the arena's memory type.
    fn write(&self, block: &MemoryBlock, data: &[u8]) -> Result<(), ArenaError>;

    /// Records whatever is needed to make previous writes visible to the GPU.
    fn flush(&self, encoder: &mut dyn CommandEncoder) -> Result<(), ArenaError>;

    /// Current accounting.
    fn stats(&self) -> ArenaStats;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_overlap() {
        let a = MemoryBlock::new(0, 0, 96);
        let b = MemoryBlock::new(1, 96, 96);
        let c = MemoryBlock::new(0, 48, 96);
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(b.overlaps(&c));
        assert_eq!(b.byte_end(), 192);
    }

    #[test]
    fn fragmentation_ratio() {
        let stats = ArenaStats {
            capacity_bytes: 400,
            live_bytes: 200,
            free_bytes: 200,
            live_blocks: 2,
            free_blocks: 2,
            largest_free_block: 150,
        };
        assert!((stats.fragmentation() - 0.25).abs() < 1e-6);
        assert_eq!(ArenaStats::default().fragmentation(), 0.0);
    }

    #[test]
    fn out_of_memory_display() {
        let err = ArenaError::OutOfMemory {
            requested: 192,
            largest_free: 96,
        };
        assert_eq!(
            err.to_string(),
            "Arena out of memory: requested 192 bytes, largest free block is 96 bytes"
        );
    }
}
