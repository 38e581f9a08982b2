//! Vertex attribute decisions and un-indexing.
//!
//! For each primitive the builder decides once whether normals and tangents
//! must be generated. Either generation works on an un-indexed triangle list,
//! so every per-vertex stream is first expanded through the index buffer and
//! the final index buffer becomes `0..n`.

use glam::{Vec2, Vec3, Vec4};

use crate::{
    accessor::{AccessorBytes, AccessorView},
    format::VertexFormat,
    indices::implicit_indices,
    normals::flat_normals,
    tangents::{TangentFrame, bitangents_from_tangents, generate_tangents},
};

/// What has to be generated for a primitive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttributePlan {
    pub generate_normals: bool,
    pub generate_tangents: bool,
}

impl AttributePlan {
    /// Decide generation from the primitive's accessors.
    ///
    /// Normals are generated when absent or of the wrong length. Tangents are
    /// only considered when the material needs them.
    #[must_use]
    pub fn new(
        position_count: usize,
        normals: &AccessorView<'_, Vec3>,
        tangents: &AccessorView<'_, Vec4>,
        needs_tangents: bool,
    ) -> Self {
        let generate_normals = !normals.is_valid() || normals.len() != position_count;
        let generate_tangents =
            needs_tangents && (!tangents.is_valid() || tangents.len() != position_count);
        Self {
            generate_normals,
            generate_tangents,
        }
    }

    /// Whether per-vertex streams must be expanded to one vertex per corner.
    #[must_use]
    pub fn unindex(&self) -> bool {
        self.generate_normals || self.generate_tangents
    }
}

/// A per-vertex stream kept in its source encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawStream {
    pub format: VertexFormat,
    pub data: Vec<u8>,
}

impl RawStream {
    /// Copy an accessor's elements into a tightly packed stream.
    #[must_use]
    pub fn from_accessor(accessor: &AccessorBytes<'_>, format: VertexFormat) -> Self {
        debug_assert_eq!(accessor.element_size(), format.size());
        Self {
            format,
            data: accessor.to_packed_bytes(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len() / self.format.size()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Expand through `indices`, producing one element per index.
    #[must_use]
    pub fn gather(&self, indices: &[u32]) -> Self {
        let size = self.format.size();
        let mut data = Vec::with_capacity(indices.len() * size);
        for &index in indices {
            let start = index as usize * size;
            data.extend_from_slice(&self.data[start..start + size]);
        }
        Self {
            format: self.format,
            data,
        }
    }

    /// Decode a two-component stream to floats.
    #[must_use]
    pub fn to_vec2(&self) -> Option<Vec<Vec2>> {
        self.data
            .chunks_exact(self.format.size())
            .map(|element| self.format.decode_vec2(element))
            .collect()
    }
}

fn gather<T: Copy>(values: &[T], indices: &[u32]) -> Vec<T> {
    indices.iter().map(|&i| values[i as usize]).collect()
}

/// All per-vertex data of one primitive, plus its triangle-list indices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexStreams {
    pub indices: Vec<u32>,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    /// Empty when the primitive carries no tangent frame.
    pub tangents: Vec<Vec4>,
    pub bitangents: Vec<Vec3>,
    /// Texture coordinate slots 0 and 1.
    pub texcoords: [Option<RawStream>; 2],
    /// RGBA colours, empty when the primitive has none.
    pub colors: Vec<Vec4>,
    /// Custom attribute streams, by registry order. `None` when skipped.
    pub custom: Vec<Option<RawStream>>,
}

impl VertexStreams {
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Expand every per-vertex stream through the index buffer and replace
    /// the indices with the identity sequence.
    pub fn unindex(&mut self) {
        let indices = std::mem::take(&mut self.indices);
        self.positions = gather(&self.positions, &indices);
        if !self.normals.is_empty() {
            self.normals = gather(&self.normals, &indices);
        }
        if !self.tangents.is_empty() {
            self.tangents = gather(&self.tangents, &indices);
        }
        if !self.bitangents.is_empty() {
            self.bitangents = gather(&self.bitangents, &indices);
        }
        if !self.colors.is_empty() {
            self.colors = gather(&self.colors, &indices);
        }
        for stream in self
            .texcoords
            .iter_mut()
            .chain(self.custom.iter_mut())
            .flatten()
        {
            *stream = stream.gather(&indices);
        }
        self.indices = implicit_indices(indices.len());
    }

    /// Run the plan: un-index if needed, then generate normals and the
    /// tangent frame. Explicit tangents that are kept get analytic bitangents.
    ///
    /// # Panics
    ///
    /// Panics if parallel streams end up with different lengths.
    pub fn apply(&mut self, plan: AttributePlan) {
        if plan.unindex() {
            self.unindex();
        }

        if plan.generate_normals {
            self.normals = flat_normals(&self.positions);
        }

        if plan.generate_tangents {
            let texcoord_sets: Vec<Option<Vec<Vec2>>> = self
                .texcoords
                .iter()
                .map(|stream| stream.as_ref().and_then(RawStream::to_vec2))
                .collect();
            let TangentFrame {
                tangents,
                bitangents,
                ..
            } = generate_tangents(&self.positions, &self.normals, &texcoord_sets);
            self.tangents = tangents;
            self.bitangents = bitangents;
        } else if !self.tangents.is_empty() {
            self.bitangents = bitangents_from_tangents(&self.normals, &self.tangents);
        }

        self.check_lengths();
    }

    fn check_lengths(&self) {
        let count = self.vertex_count();
        assert_eq!(self.normals.len(), count, "normal stream length");
        if !self.tangents.is_empty() {
            assert_eq!(self.tangents.len(), count, "tangent stream length");
            assert_eq!(self.bitangents.len(), count, "bitangent stream length");
        }
        if !self.colors.is_empty() {
            assert_eq!(self.colors.len(), count, "colour stream length");
        }
        for stream in self.texcoords.iter().chain(&self.custom).flatten() {
            assert_eq!(stream.len(), count, "{:?} stream length", stream.format);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AccessorType, Model};

    fn indexed_quad() -> VertexStreams {
        VertexStreams {
            indices: vec![0, 1, 2, 0, 2, 3],
            positions: vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ],
            texcoords: [
                Some(RawStream {
                    format: VertexFormat::Unorm8x2,
                    data: vec![0, 0, 255, 0, 255, 255, 0, 255],
                }),
                None,
            ],
            colors: vec![Vec4::X, Vec4::Y, Vec4::Z, Vec4::W],
            ..VertexStreams::default()
        }
    }

    #[test]
    fn test_plan_generates_missing_normals() {
        let model = Model::default();
        let normals = AccessorView::<Vec3>::new(&model, None);
        let tangents = AccessorView::<Vec4>::new(&model, None);

        let plan = AttributePlan::new(4, &normals, &tangents, false);
        assert!(plan.generate_normals);
        assert!(!plan.generate_tangents);
        assert!(plan.unindex());

        let plan = AttributePlan::new(4, &normals, &tangents, true);
        assert!(plan.generate_tangents);
    }

    #[test]
    fn test_plan_detects_length_mismatch() {
        let mut model = Model::default();
        let normals = model.push_f32_accessor(AccessorType::Vec3, &[0.0, 0.0, 1.0]);
        let normals = AccessorView::<Vec3>::new(&model, Some(normals));
        let tangents = AccessorView::<Vec4>::new(&model, None);

        assert!(AttributePlan::new(2, &normals, &tangents, false).generate_normals);
        assert!(!AttributePlan::new(1, &normals, &tangents, false).unindex());
    }

    #[test]
    fn test_unindex_expands_all_streams() {
        let mut streams = indexed_quad();
        streams.unindex();
        assert_eq!(streams.indices, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(streams.positions.len(), 6);
        assert_eq!(streams.positions[3], Vec3::ZERO);
        assert_eq!(streams.positions[5], Vec3::new(0.0, 1.0, 0.0));
        let uv = streams.texcoords[0].as_ref().unwrap();
        assert_eq!(uv.len(), 6);
        assert_eq!(&uv.data[10..12], &[0, 255]);
        assert_eq!(
            streams.colors,
            vec![Vec4::X, Vec4::Y, Vec4::Z, Vec4::X, Vec4::Z, Vec4::W]
        );
    }

    #[test]
    fn test_apply_generates_normals_and_tangents() {
        let mut streams = indexed_quad();
        streams.apply(AttributePlan {
            generate_normals: true,
            generate_tangents: true,
        });
        assert_eq!(streams.vertex_count(), 6);
        assert!(streams.normals.iter().all(|n| (*n - Vec3::Z).length() < 1e-6));
        assert_eq!(streams.tangents.len(), 6);
        assert!((streams.tangents[0].truncate() - Vec3::X).length() < 1e-4);
    }

    #[test]
    fn test_apply_derives_bitangents_from_explicit_tangents() {
        let mut streams = VertexStreams {
            indices: vec![0, 1, 2],
            positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            normals: vec![Vec3::Z; 3],
            tangents: vec![Vec4::new(1.0, 0.0, 0.0, -1.0); 3],
            ..VertexStreams::default()
        };
        streams.apply(AttributePlan::default());
        assert_eq!(streams.indices, vec![0, 1, 2]);
        assert_eq!(streams.bitangents, vec![-Vec3::Y; 3]);
    }
}
