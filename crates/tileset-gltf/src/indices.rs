//! Index expansion.
//!
//! Every topology the pipeline accepts is normalized to a flat triangle list
//! of `u32` indices before attribute generation and packing.

use crate::{
    accessor::{AccessorStatus, AccessorView},
    error::{GeometryError, GeometryResult},
    model::PrimitiveMode,
};

/// Identity indices `0..count`, used when a primitive has no index accessor.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn implicit_indices(count: usize) -> Vec<u32> {
    (0..count as u32).collect()
}

/// Convert a triangle strip to a triangle list.
///
/// Winding alternates every other triangle so all faces keep the orientation
/// of the first one. Degenerate triangles are kept; they rasterize to nothing.
///
/// # Errors
///
/// Returns an error if the strip has fewer than three indices.
pub fn strip_to_triangles(strip: &[u32]) -> GeometryResult<Vec<u32>> {
    if strip.len() < 3 {
        return Err(GeometryError::NotEnoughIndices {
            mode: PrimitiveMode::TriangleStrip,
            count: strip.len(),
        });
    }

    let mut triangles = Vec::with_capacity((strip.len() - 2) * 3);
    for (i, window) in strip.windows(3).enumerate() {
        let (a, b, c) = (window[0], window[1], window[2]);
        if i % 2 == 0 {
            triangles.extend([a, b, c]);
        } else {
            triangles.extend([a, c, b]);
        }
    }
    Ok(triangles)
}

/// Convert a triangle fan to a triangle list.
///
/// # Errors
///
/// Returns an error if the fan has fewer than three indices.
pub fn fan_to_triangles(fan: &[u32]) -> GeometryResult<Vec<u32>> {
    if fan.len() < 3 {
        return Err(GeometryError::NotEnoughIndices {
            mode: PrimitiveMode::TriangleFan,
            count: fan.len(),
        });
    }

    let hub = fan[0];
    let mut triangles = Vec::with_capacity((fan.len() - 2) * 3);
    for pair in fan[1..].windows(2) {
        triangles.extend([hub, pair[0], pair[1]]);
    }
    Ok(triangles)
}

/// Expand `indices` of the given topology into a triangle list.
///
/// # Errors
///
/// Returns an error for non-triangle topologies, for triangle lists whose
/// length is not a multiple of three, and for strips or fans with fewer than
/// three indices.
pub fn expand_indices(mode: PrimitiveMode, indices: Vec<u32>) -> GeometryResult<Vec<u32>> {
    match mode {
        PrimitiveMode::Triangles => {
            if indices.len() % 3 != 0 {
                return Err(GeometryError::IndexCountNotMultipleOfThree {
                    count: indices.len(),
                });
            }
            Ok(indices)
        }
        PrimitiveMode::TriangleStrip => strip_to_triangles(&indices),
        PrimitiveMode::TriangleFan => fan_to_triangles(&indices),
        other => Err(GeometryError::UnsupportedTopology(other)),
    }
}

/// Read a primitive's index accessor (or synthesize implicit indices) and
/// expand it into a triangle list referencing at most `vertex_count` vertices.
///
/// # Errors
///
/// Returns an error if the index accessor is present but invalid, if any
/// index addresses a vertex past `vertex_count`, or if expansion fails.
pub fn triangle_indices(
    view: &AccessorView<'_, u32>,
    mode: PrimitiveMode,
    vertex_count: usize,
) -> GeometryResult<Vec<u32>> {
    let source = match view.status() {
        AccessorStatus::Absent => implicit_indices(vertex_count),
        AccessorStatus::Invalid => {
            return Err(GeometryError::InvalidAccessor {
                context: "indices",
                detail: "index accessor is not an unsigned integer scalar".to_string(),
            });
        }
        AccessorStatus::Valid => {
            let indices = view.to_vec();
            if let Some(&bad) = indices.iter().find(|&&i| i as usize >= vertex_count) {
                return Err(GeometryError::IndexOutOfBounds {
                    index: bad as usize,
                    len: vertex_count,
                });
            }
            indices
        }
    };
    expand_indices(mode, source)
}
