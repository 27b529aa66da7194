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

//! Built-in shader sources for the render lanes.
//!
//! ```ignore
//! use tessel_lanes::render_lane::shaders::CULL_INSTANCES_WGSL;
//! use tessel_core::renderer::{ShaderModuleDescriptor, ShaderSourceData};
//! use std::borrow::Cow;
//!
//! let descriptor = ShaderModuleDescriptor {
//!     label: Some("cull_instances"),
//!     source: ShaderSourceData::Wgsl(Cow::Borrowed(CULL_INSTANCES_WGSL)),
//! };
//! ```

/// Frustum culling with draw compaction.
///
/// One invocation per input draw command. Draws whose instance bounding
/// sphere passes all six plane tests are appended to the output list through
/// an atomic counter, so the output order is not stable.
pub const CULL_INSTANCES_WGSL: &str = include_str!("cull_instances.wgsl");
