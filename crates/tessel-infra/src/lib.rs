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

//! # Tessel Infra
//!
//! Concrete implementations of the contracts defined in `tessel-core`.
//!
//! The only backend shipped today is [`graphics::software::SoftwareDevice`],
//! a CPU implementation of [`tessel_core::renderer::GraphicsDevice`] that runs
//! headless. It replays recorded copies and compute dispatches at submit time
//! and drives real timeline fences, which makes it suitable for tests and for
//! the sandbox demo.

#![warn(missing_docs)]

#[cfg(feature = "graphics")]
pub mod graphics;

#[cfg(feature = "graphics")]
pub use graphics::software::SoftwareDevice;
