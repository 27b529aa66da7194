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

//! GPU instance arenas.
//!
//! - [`MemoryArena`]: the first-fit, coalescing free list over one buffer.
//! - [`DeviceMemoryArena`]: device-local buffer, writes staged and flushed
//!   as one batched copy.
//! - [`HostVisibleMemoryArena`]: mapped buffer written directly.

mod device_arena;
mod host_visible_arena;
mod memory_arena;

pub use self::device_arena::{DeviceMemoryArena, PendingWrite};
pub use self::host_visible_arena::{HostBufferKind, HostVisibleMemoryArena};
pub use self::memory_arena::{ArenaDescriptor, MemoryArena};

use bytemuck::Pod;
use tessel_core::memory::{ArenaError, GpuMemoryArena, MemoryBlock};

/// Typed helpers available on every [`GpuMemoryArena`].
pub trait GpuMemoryArenaExt: GpuMemoryArena {
    /// Writes a slice of `Pod` values at the start of `block`.
    fn write_elements<T: Pod>(&self, block: &MemoryBlock, elements: &[T]) -> Result<(), ArenaError> {
        self.write(block, bytemuck::cast_slice(elements))
    }
}

impl<A: GpuMemoryArena + ?Sized> GpuMemoryArenaExt for A {}
