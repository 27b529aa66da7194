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

//! Persistent ring buffer for per-frame uniform data.
//!
//! The [`UniformRingBuffer`] pre-allocates one host-visible uniform buffer per
//! frame in flight and cycles through them, so the CPU can write the uniforms
//! of frame N+1 while the GPU still reads the block of frame N.
//!
//! ```text
//! Frame N:     [Slot 0: GPU reads]
//! Frame N+1:   [Slot 1: CPU writes]
//! Frame N+2:   [Slot 0: CPU writes] (frame N has been waited on)
//! ```

use crate::renderer::{
    api::buffer::{BufferDescriptor, BufferId, BufferUsage},
    error::ResourceError,
    traits::GraphicsDevice,
};
use std::borrow::Cow;

/// A persistent ring of uniform buffers, one per frame in flight.
///
/// Writing a slot is only safe once the submission that last read it has
/// completed; callers pace on that submission before selecting the slot.
#[derive(Debug)]
pub struct UniformRingBuffer {
    /// The persistent GPU buffer of each slot.
    slots: Vec<BufferId>,
    /// The current slot index.
    current_index: usize,
    /// The size of the uniform data in bytes.
    data_size: u64,
    /// Debug label for logging.
    label: &'static str,
}

impl UniformRingBuffer {
    /// Creates a new `UniformRingBuffer` with `slot_count` pre-allocated buffers.
    ///
    /// # Errors
    ///
    /// Returns a [`ResourceError`] if buffer creation fails. Buffers created
    /// before the failure are destroyed.
    pub fn new(
        device: &dyn GraphicsDevice,
        slot_count: usize,
        data_size: u64,
        label: &'static str,
    ) -> Result<Self, ResourceError> {
        let slot_count = slot_count.max(1);
        let mut slots = Vec::with_capacity(slot_count);

        for i in 0..slot_count {
            let buffer_label = match i {
                0 => Cow::Borrowed(label),
                _ => Cow::Owned(format!("{label} [slot {i}]")),
            };

            let created = device.create_buffer(&BufferDescriptor {
                label: Some(buffer_label),
                size: data_size,
                usage: BufferUsage::UNIFORM | BufferUsage::MAP_WRITE,
                mapped_at_creation: false,
            });
            match created {
                Ok(buffer) => slots.push(buffer),
                Err(e) => {
                    for buffer in slots {
                        let _ = device.destroy_buffer(buffer);
                    }
                    return Err(e);
                }
            }
        }

        Ok(Self {
            slots,
            current_index: 0,
            data_size,
            label,
        })
    }

    /// Advances to the next slot in the ring buffer.
    pub fn advance(&mut self) {
        self.current_index = (self.current_index + 1) % self.slots.len();
    }

    /// Makes the slot of frame `frame_index` current.
    pub fn select(&mut self, frame_index: usize) {
        self.current_index = frame_index % self.slots.len();
    }

    /// Writes uniform data to the current slot's GPU buffer.
    ///
    /// The data must be exactly `data_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns a [`ResourceError`] if the GPU write fails.
    pub fn write(&self, device: &dyn GraphicsDevice, data: &[u8]) -> Result<(), ResourceError> {
        debug_assert_eq!(
            data.len() as u64,
            self.data_size,
            "UniformRingBuffer({}) write size mismatch: expected {}, got {}",
            self.label,
            self.data_size,
            data.len()
        );

        device.write_buffer(self.slots[self.current_index], 0, data)
    }

    /// Returns the buffer of the current slot.
    pub fn current_buffer(&self) -> BufferId {
        self.slots[self.current_index]
    }

    /// Returns the current slot index.
    pub fn current_slot_index(&self) -> usize {
        self.current_index
    }

    /// Returns the number of slots in the ring buffer.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Returns the data size per slot in bytes.
    pub fn data_size(&self) -> u64 {
        self.data_size
    }

    /// Destroys all GPU resources owned by this ring buffer.
    pub fn destroy(&self, device: &dyn GraphicsDevice) {
        for buffer in &self.slots {
            if let Err(e) = device.destroy_buffer(*buffer) {
                log::warn!(
                    "UniformRingBuffer({}): Failed to destroy buffer: {:?}",
                    self.label,
                    e
                );
            }
        }
    }
}
