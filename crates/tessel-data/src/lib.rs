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

//! # Tessel Data
//!
//! Memory layouts and allocators for data that lives on the GPU.
//!
//! The [`allocators`] module provides the instance arenas: a free-list
//! [`MemoryArena`](allocators::MemoryArena) over one fixed-capacity buffer,
//! specialized into a staged [`DeviceMemoryArena`](allocators::DeviceMemoryArena)
//! for device-local memory and a direct-write
//! [`HostVisibleMemoryArena`](allocators::HostVisibleMemoryArena).

#![warn(missing_docs)]

pub mod allocators;
