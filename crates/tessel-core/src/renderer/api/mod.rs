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

//! Backend-agnostic rendering API.
//!
//! - [`buffer`]: buffer handles, usages and copy regions.
//! - [`command`]: queue kinds and command allocators.
//! - [`compute`]: shader modules, compute pipelines and dispatches.
//! - [`fence`]: timeline fences.
//! - [`culling`]: the `Pod` layouts consumed by the culling kernel.
//! - [`adapter`]: adapter information.
//! - [`uniform_ring_buffer`]: per-frame uniform buffers.

pub mod adapter;
pub mod buffer;
pub mod command;
pub mod compute;
pub mod culling;
pub mod fence;
pub mod uniform_ring_buffer;

pub use self::adapter::*;
pub use self::buffer::*;
pub use self::command::*;
pub use self::compute::*;
pub use self::culling::*;
pub use self::fence::*;
pub use self::uniform_ring_buffer::UniformRingBuffer;
