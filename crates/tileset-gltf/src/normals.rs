//! Flat normal generation.

use glam::Vec3;

/// Normal substituted for triangles with (near) zero area.
pub const DEGENERATE_NORMAL: Vec3 = Vec3::Y;

const DEGENERATE_EPSILON: f32 = f32::EPSILON * f32::EPSILON;

/// Face normal of the triangle `(p0, p1, p2)` with counter-clockwise winding.
///
/// Returns [`DEGENERATE_NORMAL`] when the triangle is degenerate.
#[must_use]
pub fn face_normal(p0: Vec3, p1: Vec3, p2: Vec3) -> Vec3 {
    let cross = (p1 - p0).cross(p2 - p0);
    let length_squared = cross.length_squared();
    if length_squared < DEGENERATE_EPSILON || !length_squared.is_finite() {
        return DEGENERATE_NORMAL;
    }
    cross / length_squared.sqrt()
}

/// Compute one normal per vertex of an un-indexed triangle list.
///
/// Each consecutive triple of `positions` is one triangle; all three of its
/// vertices receive the same face normal.
///
/// # Panics
///
/// Panics if `positions.len()` is not a multiple of three.
#[must_use]
pub fn flat_normals(positions: &[Vec3]) -> Vec<Vec3> {
    assert!(
        positions.len() % 3 == 0,
        "flat normals need an un-indexed triangle list, got {} vertices",
        positions.len()
    );

    let mut normals = Vec::with_capacity(positions.len());
    for triangle in positions.chunks_exact(3) {
        let normal = face_normal(triangle[0], triangle[1], triangle[2]);
        normals.extend([normal; 3]);
    }
    normals
}
