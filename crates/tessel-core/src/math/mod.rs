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

//! Mathematics primitives used by the culling and instance-staging code.
//!
//! Linear algebra comes from `glam`; this module adds the bounding-volume and
//! frustum types the renderer core needs on top of it. Matrices follow the
//! right-handed, zero-to-one depth convention (`Mat4::perspective_rh`).

/// A small constant for floating-point comparisons.
pub const EPSILON: f32 = 1e-5;

pub mod geometry;

pub use glam::{Mat4, Quat, Vec3, Vec4};

pub use self::geometry::{Aabb, BoundingSphere, Frustum, FrustumPlane, Plane};
