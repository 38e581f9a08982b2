//! Tangent space generation.
//!
//! Tangents are produced with MikkTSpace over an un-indexed triangle list.
//! Each available texture coordinate set is tried in turn; when none works
//! every vertex gets a constant dummy frame so the primitive still renders.

use glam::{Vec2, Vec3, Vec4};

/// Tangent used when no texture coordinates can drive MikkTSpace.
pub const DUMMY_TANGENT: Vec4 = Vec4::new(1.0, 0.0, 0.0, 1.0);
/// Bitangent paired with [`DUMMY_TANGENT`].
pub const DUMMY_BITANGENT: Vec3 = Vec3::Y;

/// Per-vertex tangents (xyz plus handedness in w) and bitangents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TangentFrame {
    pub tangents: Vec<Vec4>,
    pub bitangents: Vec<Vec3>,
    /// Texture coordinate set the frame was generated from, `None` for the
    /// dummy fallback.
    pub texcoord: Option<usize>,
}

impl TangentFrame {
    /// A constant dummy frame for `vertex_count` vertices.
    #[must_use]
    pub fn dummy(vertex_count: usize) -> Self {
        Self {
            tangents: vec![DUMMY_TANGENT; vertex_count],
            bitangents: vec![DUMMY_BITANGENT; vertex_count],
            texcoord: None,
        }
    }
}

struct MikkGeometry<'a> {
    positions: &'a [Vec3],
    normals: &'a [Vec3],
    texcoords: &'a [Vec2],
    tangents: Vec<Vec4>,
    bitangents: Vec<Vec3>,
}

impl mikktspace::Geometry for MikkGeometry<'_> {
    fn num_faces(&self) -> usize {
        self.positions.len() / 3
    }

    fn num_vertices_of_face(&self, _face: usize) -> usize {
        3
    }

    fn position(&self, face: usize, vert: usize) -> [f32; 3] {
        self.positions[face * 3 + vert].to_array()
    }

    fn normal(&self, face: usize, vert: usize) -> [f32; 3] {
        self.normals[face * 3 + vert].to_array()
    }

    fn tex_coord(&self, face: usize, vert: usize) -> [f32; 2] {
        self.texcoords[face * 3 + vert].to_array()
    }

    fn set_tangent(
        &mut self,
        tangent: [f32; 3],
        bi_tangent: [f32; 3],
        _f_mag_s: f32,
        f_mag_t: f32,
        bi_tangent_preserves_orientation: bool,
        face: usize,
        vert: usize,
    ) {
        let sign = if bi_tangent_preserves_orientation {
            1.0
        } else {
            -1.0
        };
        let index = face * 3 + vert;
        self.tangents[index] = Vec3::from_array(tangent).extend(sign);
        self.bitangents[index] = Vec3::from_array(bi_tangent) * f_mag_t;
    }
}

/// Whether a face spans a non-zero area both in space and in texture space.
fn has_area(positions: &[Vec3], texcoords: &[Vec2]) -> bool {
    let [p0, p1, p2] = [positions[0], positions[1], positions[2]];
    let [t0, t1, t2] = [texcoords[0], texcoords[1], texcoords[2]];
    (p1 - p0).cross(p2 - p0).length_squared() > 0.0 && (t1 - t0).perp_dot(t2 - t0).abs() > 0.0
}

/// Run MikkTSpace with a single texture coordinate set.
///
/// Returns `None` if any input is non-finite, if every face is degenerate,
/// or if generation fails or produces non-finite values. MikkTSpace does
/// not terminate on NaN input and panics when no face is usable.
#[must_use]
pub fn mikktspace_tangents(
    positions: &[Vec3],
    normals: &[Vec3],
    texcoords: &[Vec2],
) -> Option<(Vec<Vec4>, Vec<Vec3>)> {
    let count = positions.len();
    if count == 0 || count % 3 != 0 || normals.len() != count || texcoords.len() != count {
        return None;
    }
    if !positions.iter().all(|p| p.is_finite())
        || !normals.iter().all(|n| n.is_finite())
        || !texcoords.iter().all(|t| t.is_finite())
    {
        return None;
    }
    if !positions
        .chunks_exact(3)
        .zip(texcoords.chunks_exact(3))
        .any(|(p, t)| has_area(p, t))
    {
        return None;
    }

    let mut geometry = MikkGeometry {
        positions,
        normals,
        texcoords,
        tangents: vec![Vec4::ZERO; count],
        bitangents: vec![Vec3::ZERO; count],
    };
    if !mikktspace::generate_tangents(&mut geometry) {
        return None;
    }
    if !geometry.tangents.iter().all(|t| t.is_finite())
        || !geometry.bitangents.iter().all(|b| b.is_finite())
    {
        return None;
    }
    Some((geometry.tangents, geometry.bitangents))
}

/// Generate a tangent frame for an un-indexed triangle list.
///
/// `texcoord_sets` holds the decoded texture coordinates per set (`None` when
/// a set is absent). Sets are tried in order until MikkTSpace succeeds.
#[must_use]
pub fn generate_tangents(
    positions: &[Vec3],
    normals: &[Vec3],
    texcoord_sets: &[Option<Vec<Vec2>>],
) -> TangentFrame {
    for (set, texcoords) in texcoord_sets.iter().enumerate() {
        let Some(texcoords) = texcoords else {
            continue;
        };
        if let Some((tangents, bitangents)) = mikktspace_tangents(positions, normals, texcoords) {
            return TangentFrame {
                tangents,
                bitangents,
                texcoord: Some(set),
            };
        }
        tracing::debug!("MikkTSpace failed for TEXCOORD_{set}");
    }

    tracing::debug!(
        "no texture coordinates produced tangents, using dummy frame for {} vertices",
        positions.len()
    );
    TangentFrame::dummy(positions.len())
}

/// Derive bitangents from explicit tangents: `cross(n, t.xyz) * t.w`.
#[must_use]
pub fn bitangents_from_tangents(normals: &[Vec3], tangents: &[Vec4]) -> Vec<Vec3> {
    debug_assert_eq!(normals.len(), tangents.len());
    normals
        .iter()
        .zip(tangents)
        .map(|(n, t)| n.cross(t.truncate()) * t.w)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A unit quad in the XY plane facing +Z, as two un-indexed triangles.
    fn quad() -> (Vec<Vec3>, Vec<Vec3>, Vec<Vec2>) {
        let positions = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        let texcoords = positions.iter().map(|p| p.truncate()).collect();
        (positions, vec![Vec3::Z; 6], texcoords)
    }

    #[test]
    fn test_mikktspace_follows_u_direction() {
        let (positions, normals, texcoords) = quad();
        let frame = generate_tangents(&positions, &normals, &[Some(texcoords)]);
        assert_eq!(frame.texcoord, Some(0));
        for (tangent, bitangent) in frame.tangents.iter().zip(&frame.bitangents) {
            assert!((tangent.truncate() - Vec3::X).length() < 1e-4);
            assert!((tangent.w - 1.0).abs() < 1e-6);
            assert!(bitangent.normalize().dot(Vec3::Y) > 0.99);
        }
    }

    #[test]
    fn test_skips_missing_texcoord_sets() {
        let (positions, normals, texcoords) = quad();
        let frame = generate_tangents(&positions, &normals, &[None, Some(texcoords)]);
        assert_eq!(frame.texcoord, Some(1));
        assert_eq!(frame.tangents.len(), 6);
    }

    #[test]
    fn test_dummy_fallback_without_texcoords() {
        let (positions, normals, _) = quad();
        let frame = generate_tangents(&positions, &normals, &[None, None]);
        assert_eq!(frame, TangentFrame::dummy(6));
    }

    #[test]
    fn test_mismatched_lengths_rejected() {
        let (positions, normals, texcoords) = quad();
        assert!(mikktspace_tangents(&positions, &normals[..3], &texcoords).is_none());
    }

    #[test]
    fn test_non_finite_input_rejected() {
        let positions = [Vec3::new(f32::NAN, 0.0, 0.0), Vec3::X, Vec3::new(1.0, 1.0, 0.0)];
        let texcoords = [Vec2::ZERO, Vec2::X, Vec2::ONE];
        assert!(mikktspace_tangents(&positions, &[Vec3::Z; 3], &texcoords).is_none());

        let (positions, mut normals, texcoords) = quad();
        normals[4] = Vec3::splat(f32::INFINITY);
        assert!(mikktspace_tangents(&positions, &normals, &texcoords).is_none());

        let (positions, normals, mut texcoords) = quad();
        texcoords[0].y = f32::NAN;
        let frame = generate_tangents(&positions, &normals, &[Some(texcoords)]);
        assert_eq!(frame, TangentFrame::dummy(6));
    }

    #[test]
    fn test_all_degenerate_faces_use_dummy_frame() {
        let frame = generate_tangents(
            &[Vec3::ZERO; 6],
            &[Vec3::Y; 6],
            &[Some(vec![Vec2::ZERO; 6])],
        );
        assert_eq!(frame, TangentFrame::dummy(6));

        // Real positions but collapsed texture coordinates.
        let (positions, normals, _) = quad();
        let frame = generate_tangents(&positions, &normals, &[Some(vec![Vec2::ONE; 6])]);
        assert_eq!(frame, TangentFrame::dummy(6));
    }

    #[test]
    fn test_one_usable_face_is_enough() {
        let (mut positions, normals, texcoords) = quad();
        for p in &mut positions[3..] {
            *p = Vec3::ZERO;
        }
        let frame = generate_tangents(&positions, &normals, &[Some(texcoords)]);
        assert_eq!(frame.texcoord, Some(0));
        assert_eq!(frame.tangents.len(), 6);
    }

    #[test]
    fn test_bitangents_from_tangents() {
        let bitangents = bitangents_from_tangents(
            &[Vec3::Z, Vec3::Z],
            &[Vec4::new(1.0, 0.0, 0.0, 1.0), Vec4::new(1.0, 0.0, 0.0, -1.0)],
        );
        assert_eq!(bitangents, vec![Vec3::Y, -Vec3::Y]);
    }
}
