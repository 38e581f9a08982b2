//! Axis-aligned bounding boxes.

use glam::{DMat4, DVec3, Vec3};

use crate::model::{Accessor, ComponentType};

/// An axis-aligned bounding box in double precision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Aabb {
    /// A box containing nothing; the identity for [`Aabb::union`].
    pub const EMPTY: Self = Self {
        min: DVec3::splat(f64::INFINITY),
        max: DVec3::splat(f64::NEG_INFINITY),
    };

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }

    /// Bounds from an accessor's declared `min`/`max`, if both have three
    /// components.
    ///
    /// Only unnormalized `f32` accessors qualify: declared bounds of
    /// quantized data are in raw component units, not decoded values.
    #[must_use]
    pub fn from_accessor(accessor: &Accessor) -> Option<Self> {
        if accessor.component_type != ComponentType::F32 || accessor.normalized {
            return None;
        }
        match (accessor.min.as_slice(), accessor.max.as_slice()) {
            ([x0, y0, z0], [x1, y1, z1]) => Some(Self {
                min: DVec3::new(*x0, *y0, *z0),
                max: DVec3::new(*x1, *y1, *z1),
            }),
            _ => None,
        }
    }

    /// Bounds of a set of points.
    #[must_use]
    pub fn from_points(points: &[Vec3]) -> Self {
        points.iter().fold(Self::EMPTY, |aabb, p| aabb.extend(p.as_dvec3()))
    }

    /// Grow to include `point`.
    #[must_use]
    pub fn extend(self, point: DVec3) -> Self {
        Self {
            min: self.min.min(point),
            max: self.max.max(point),
        }
    }

    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    #[must_use]
    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    /// Bounds of this box after transforming all eight corners.
    #[must_use]
    pub fn transformed(&self, transform: &DMat4) -> Self {
        if self.is_empty() {
            return *self;
        }
        (0..8).fold(Self::EMPTY, |aabb, corner| {
            let point = DVec3::new(
                if corner & 1 == 0 { self.min.x } else { self.max.x },
                if corner & 2 == 0 { self.min.y } else { self.max.y },
                if corner & 4 == 0 { self.min.z } else { self.max.z },
            );
            aabb.extend(transform.transform_point3(point))
        })
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}
