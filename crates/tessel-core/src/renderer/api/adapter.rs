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

//! Information about the adapter behind a [`GraphicsDevice`].
//!
//! [`GraphicsDevice`]: crate::renderer::GraphicsDevice

use std::fmt;

/// The family of backend implementing the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphicsBackendType {
    /// A CPU implementation, used headless and in tests.
    Software,
    /// Vulkan.
    Vulkan,
    /// Metal.
    Metal,
    /// Direct3D 12.
    Dx12,
    /// Unknown or not reported.
    Unknown,
}

impl fmt::Display for GraphicsBackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GraphicsBackendType::Software => "Software",
            GraphicsBackendType::Vulkan => "Vulkan",
            GraphicsBackendType::Metal => "Metal",
            GraphicsBackendType::Dx12 => "DirectX 12",
            GraphicsBackendType::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// Describes the adapter a device was created on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphicsAdapterInfo {
    /// Human readable adapter name.
    pub name: String,
    /// The backend in use.
    pub backend_type: GraphicsBackendType,
}
