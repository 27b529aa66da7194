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

//! Arena in memory the CPU writes directly.

use super::memory_arena::{ArenaDescriptor, MemoryArena};
use std::fmt;
use std::sync::Arc;
use tessel_core::memory::{ArenaError, ArenaStats, GpuMemoryArena, MemoryBlock};
use tessel_core::renderer::{BufferId, BufferUsage, CommandEncoder, GraphicsDevice};

/// What a host-visible arena's buffer is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostBufferKind {
    /// Bound as a uniform buffer.
    Uniform,
    /// Bound as a storage buffer.
    Storage,
    /// Source of uploads to device memory.
    Upload,
    /// Destination of GPU results read back by the CPU.
    Download,
}

impl HostBufferKind {
    /// Buffer usage flags for the kind.
    pub fn usage(self) -> BufferUsage {
        match self {
            HostBufferKind::Uniform => BufferUsage::UNIFORM | BufferUsage::MAP_WRITE,
            HostBufferKind::Storage => BufferUsage::STORAGE | BufferUsage::MAP_WRITE,
            HostBufferKind::Upload => BufferUsage::COPY_SRC | BufferUsage::MAP_WRITE,
            HostBufferKind::Download => {
                BufferUsage::COPY_DST | BufferUsage::MAP_READ | BufferUsage::MAP_WRITE
            }
        }
    }
}

/// An arena over a persistently mapped buffer.
///
/// `write` copies straight into the buffer; `flush` has nothing to do.
/// Callers must not overwrite a range that queued GPU work still reads.
pub struct HostVisibleMemoryArena {
    arena: MemoryArena,
    kind: HostBufferKind,
    device: Arc<dyn GraphicsDevice>,
}

impl fmt::Debug for HostVisibleMemoryArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostVisibleMemoryArena")
            .field("arena", &self.arena)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl HostVisibleMemoryArena {
    /// Creates the mapped buffer.
    pub fn new(
        device: Arc<dyn GraphicsDevice>,
        descriptor: &ArenaDescriptor<'_>,
        kind: HostBufferKind,
    ) -> Result<Self, ArenaError> {
        let arena = MemoryArena::new(device.as_ref(), descriptor, kind.usage())?;
        Ok(Self {
            arena,
            kind,
            device,
        })
    }

    /// The kind this arena was created for.
    pub fn kind(&self) -> HostBufferKind {
        self.kind
    }

    /// Reads the start of `block` back into `out`. Only valid for download arenas.
    pub fn read(&self, block: &MemoryBlock, out: &mut [u8]) -> Result<(), ArenaError> {
        self.check_block(block, out.len() as u64)?;
        self.device
            .read_buffer(self.arena.buffer(), block.byte_offset(), out)?;
        Ok(())
    }

    fn check_block(&self, block: &MemoryBlock, size: u64) -> Result<(), ArenaError> {
        if !self.arena.is_live(block) {
            return Err(ArenaError::InvalidBlock {
                byte_offset: block.byte_offset(),
                byte_size: block.byte_size(),
            });
        }
        if size > block.byte_size() {
            return Err(ArenaError::WriteOutOfBounds {
                size,
                block_size: block.byte_size(),
            });
        }
        Ok(())
    }
}

impl GpuMemoryArena for HostVisibleMemoryArena {
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
        self.check_block(block, data.len() as u64)?;
        if data.is_empty() {
            return Ok(());
        }
        self.device
            .write_buffer(self.arena.buffer(), block.byte_offset(), data)?;
        Ok(())
    }

    fn flush(&self, _encoder: &mut dyn CommandEncoder) -> Result<(), ArenaError> {
        Ok(())
    }

    fn stats(&self) -> ArenaStats {
        self.arena.stats()
    }
}

impl Drop for HostVisibleMemoryArena {
    fn drop(&mut self) {
        self.arena.destroy(self.device.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessel_core::renderer::CommandKind;
    use tessel_infra::SoftwareDevice;

    fn setup(kind: HostBufferKind) -> (SoftwareDevice, HostVisibleMemoryArena) {
        let device = SoftwareDevice::new();
        let arena = HostVisibleMemoryArena::new(
            Arc::new(device.clone()),
            &ArenaDescriptor {
                label: "draws".into(),
                element_size: 4,
                capacity: 4,
            },
            kind,
        )
        .unwrap();
        (device, arena)
    }

    #[test]
    fn write_goes_straight_to_the_buffer() {
        let (device, arena) = setup(HostBufferKind::Storage);
        let _first = arena.alloc(1).unwrap();
        let block = arena.alloc(2).unwrap();
        arena.write(&block, &[5; 8]).unwrap();
        let contents = device.snapshot_buffer(arena.buffer()).unwrap();
        assert_eq!(contents, vec![0, 0, 0, 0, 5, 5, 5, 5, 5, 5, 5, 5, 0, 0, 0, 0]);
    }

    #[test]
    fn flush_records_nothing() {
        let (device, arena) = setup(HostBufferKind::Uniform);
        let block = arena.alloc(1).unwrap();
        arena.write(&block, &[1; 4]).unwrap();
        let allocator = device.create_command_allocator(CommandKind::Graphics).unwrap();
        let mut encoder = device.create_command_encoder(allocator, None).unwrap();
        arena.flush(encoder.as_mut()).unwrap();
        assert_eq!(encoder.command_count(), 0);
    }

    #[test]
    fn download_arena_reads_back() {
        let (_device, arena) = setup(HostBufferKind::Download);
        let block = arena.alloc(1).unwrap();
        arena.write(&block, &7u32.to_le_bytes()).unwrap();
        let mut out = [0u8; 4];
        arena.read(&block, &mut out).unwrap();
        assert_eq!(u32::from_le_bytes(out), 7);
    }

    #[test]
    fn read_requires_a_download_arena() {
        let (_device, arena) = setup(HostBufferKind::Upload);
        let block = arena.alloc(1).unwrap();
        let mut out = [0u8; 4];
        assert!(matches!(arena.read(&block, &mut out), Err(ArenaError::Resource(_))));
    }
}
