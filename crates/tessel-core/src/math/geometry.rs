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

//! Bounding volumes and the view frustum used by visibility culling.

use super::{Mat4, Vec3, Vec4, EPSILON};

/// An axis-aligned bounding box, stored as its two extreme corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Component-wise minimum corner.
    pub min: Vec3,
    /// Component-wise maximum corner.
    pub max: Vec3,
}

impl Aabb {
    /// Builds a box from two arbitrary corners; the corners are sorted per axis.
    #[inline]
    pub fn from_min_max(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Builds a box around `center` extending `half_extents` on each axis.
    #[inline]
    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        let half_extents = half_extents.abs();
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// Center point of the box.
    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Half of the box size on each axis.
    #[inline]
    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Returns the box enclosing this one after an affine transform.
    ///
    /// The center is transformed as a point; the extents are re-projected onto
    /// the world axes through the absolute values of the matrix's linear part,
    /// which avoids transforming all eight corners.
    pub fn transform(&self, matrix: &Mat4) -> Self {
        let center = matrix.transform_point3(self.center());
        let half = self.half_extents();
        let extents = matrix.x_axis.truncate().abs() * half.x
            + matrix.y_axis.truncate().abs() * half.y
            + matrix.z_axis.truncate().abs() * half.z;
        Self::from_center_half_extents(center, extents)
    }

    /// Smallest sphere centred on the box that contains it.
    #[inline]
    pub fn bounding_sphere(&self) -> BoundingSphere {
        BoundingSphere {
            center: self.center(),
            radius: self.half_extents().length(),
        }
    }
}

/// A sphere used as the per-instance bounding volume on the GPU.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    /// Center of the sphere.
    pub center: Vec3,
    /// Radius of the sphere, never negative.
    pub radius: f32,
}

impl BoundingSphere {
    /// Creates a sphere, clamping a negative radius to zero.
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self {
            center,
            radius: radius.max(0.0),
        }
    }

    /// Packs the sphere as `(center.xyz, radius)` for shader consumption.
    #[inline]
    pub fn to_vec4(&self) -> Vec4 {
        self.center.extend(self.radius)
    }
}

/// A plane `normal · p + d = 0`, with `normal` of unit length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Unit normal, pointing to the inside of the frustum.
    pub normal: Vec3,
    /// Distance term.
    pub d: f32,
}

impl Plane {
    /// Builds a normalized plane from the raw `(a, b, c, d)` coefficients.
    ///
    /// Returns `None` if the normal is degenerate.
    pub fn from_coefficients(coefficients: Vec4) -> Option<Self> {
        let normal = coefficients.truncate();
        let length = normal.length();
        if length < EPSILON {
            return None;
        }
        Some(Self {
            normal: normal / length,
            d: coefficients.w / length,
        })
    }

    /// Signed distance from `point` to the plane; positive on the normal side.
    #[inline]
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.d
    }

    /// Packs the plane as `(normal.xyz, d)`.
    #[inline]
    pub fn to_array(&self) -> [f32; 4] {
        [self.normal.x, self.normal.y, self.normal.z, self.d]
    }
}

/// Index of each plane inside [`Frustum::planes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrustumPlane {
    /// Left clip plane.
    Left = 0,
    /// Right clip plane.
    Right = 1,
    /// Bottom clip plane.
    Bottom = 2,
    /// Top clip plane.
    Top = 3,
    /// Near clip plane.
    Near = 4,
    /// Far clip plane.
    Far = 5,
}

/// The six inward-facing planes bounding a camera's view volume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    /// Planes in [`FrustumPlane`] order.
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extracts the frustum from a view-projection matrix.
    ///
    /// Uses the row-combination method for clip space with depth in `[0, 1]`:
    /// a point is inside when `-w <= x <= w`, `-w <= y <= w` and `0 <= z <= w`.
    /// Returns `None` when the matrix yields a degenerate plane.
    pub fn from_view_projection(view_projection: &Mat4) -> Option<Self> {
        let r0 = view_projection.row(0);
        let r1 = view_projection.row(1);
        let r2 = view_projection.row(2);
        let r3 = view_projection.row(3);

        let coefficients = [
            r3 + r0, // left
            r3 - r0, // right
            r3 + r1, // bottom
            r3 - r1, // top
            r2,      // near
            r3 - r2, // far
        ];

        let mut planes = [Plane {
            normal: Vec3::ZERO,
            d: 0.0,
        }; 6];
        for (plane, c) in planes.iter_mut().zip(coefficients) {
            *plane = Plane::from_coefficients(c)?;
        }
        Some(Self { planes })
    }

    /// Returns the plane for `which`.
    #[inline]
    pub fn plane(&self, which: FrustumPlane) -> &Plane {
        &self.planes[which as usize]
    }

    /// `true` if the point lies on the inner side of all six planes.
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes.iter().all(|p| p.signed_distance(point) >= 0.0)
    }

    /// `true` if any part of the sphere can be inside the frustum.
    ///
    /// This is the conservative test run by the culling kernel: a sphere is
    /// rejected only when it lies entirely behind one plane.
    pub fn intersects_sphere(&self, sphere: &BoundingSphere) -> bool {
        self.planes
            .iter()
            .all(|p| p.signed_distance(sphere.center) >= -sphere.radius)
    }

    /// Packs all planes for a uniform block.
    pub fn to_gpu_planes(&self) -> [[f32; 4]; 6] {
        let mut out = [[0.0; 4]; 6];
        for (dst, plane) in out.iter_mut().zip(self.planes.iter()) {
            *dst = plane.to_array();
        }
        out
    }
}
