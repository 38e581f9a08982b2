//! Conversion of one glTF primitive into renderer-ready geometry.

use glam::{Vec2, Vec3, Vec4};

use crate::{
    accessor::{AccessorBytes, AccessorView},
    attributes::{AttributePlan, RawStream, VertexStreams},
    bounds::Aabb,
    error::{GeometryError, GeometryResult},
    format::{StreamKind, VertexFormat},
    indices::triangle_indices,
    material::LoadMaterial,
    model::{
        AccessorType, COLOR_0, ComponentType, Model, NORMAL, POSITION, Primitive, TANGENT,
        texcoord_semantic,
    },
    packer::{GeometryPacker, PackedBuffer},
};

/// Accepted texture coordinate formats, in order of preference.
pub const TEXCOORD_FORMATS: [VertexFormat; 3] = [
    VertexFormat::Float32x2,
    VertexFormat::Unorm8x2,
    VertexFormat::Unorm16x2,
];

/// A primitive ready for GPU upload.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadPrimitive {
    /// All streams packed into one buffer.
    pub buffer: PackedBuffer,
    pub vertex_count: usize,
    pub index_count: usize,
    /// Local-space bounds.
    pub bounds: Aabb,
    /// Index of the material in the owning load model.
    pub material: usize,
    /// Shader binding names of the custom streams, by stream index.
    pub custom_attributes: Vec<(String, VertexFormat)>,
}

impl LoadPrimitive {
    #[must_use]
    pub fn indices(&self) -> Vec<u32> {
        self.buffer.read(StreamKind::Indices).unwrap_or_default()
    }

    #[must_use]
    pub fn positions(&self) -> Vec<Vec3> {
        self.buffer.read(StreamKind::Position).unwrap_or_default()
    }

    #[must_use]
    pub fn normals(&self) -> Vec<Vec3> {
        self.buffer.read(StreamKind::Normal).unwrap_or_default()
    }

    /// Tangents, empty when the stream is a placeholder.
    #[must_use]
    pub fn tangents(&self) -> Vec<Vec4> {
        self.buffer.read(StreamKind::Tangent).unwrap_or_default()
    }

    #[must_use]
    pub fn bitangents(&self) -> Vec<Vec3> {
        self.buffer.read(StreamKind::Bitangent).unwrap_or_default()
    }

    /// Linear RGBA vertex colours, empty when the stream is a placeholder.
    #[must_use]
    pub fn colors(&self) -> Vec<Vec4> {
        self.buffer.read(StreamKind::Color).unwrap_or_default()
    }

    /// Decoded texture coordinates of `slot`, `None` when absent.
    #[must_use]
    pub fn texcoords(&self, slot: usize) -> Option<Vec<Vec2>> {
        self.buffer.read_vec2(StreamKind::texcoord(slot)?)
    }

    /// Decoded two-component custom stream bound to `shader_name`.
    #[must_use]
    pub fn custom_vec2(&self, shader_name: &str) -> Option<Vec<Vec2>> {
        let index = self
            .custom_attributes
            .iter()
            .position(|(name, _)| name == shader_name)?;
        self.buffer
            .read_vec2(StreamKind::Custom(u16::try_from(index).ok()?))
    }

    /// Whether a stream holds real data rather than a placeholder.
    #[must_use]
    pub fn has_stream(&self, kind: StreamKind) -> bool {
        self.buffer.view(kind).is_some_and(|view| !view.placeholder)
    }
}

fn decode_texcoords(
    model: &Model,
    primitive: &Primitive,
    channel: usize,
    vertex_count: usize,
) -> Option<RawStream> {
    #[allow(clippy::cast_possible_truncation)]
    let semantic = texcoord_semantic(channel as u32);
    let accessor = AccessorBytes::new(model, primitive.attribute(&semantic));
    if !accessor.is_valid() {
        return None;
    }
    let format = VertexFormat::from_accessor(
        accessor.component_type(),
        accessor.accessor_type(),
        accessor.normalized(),
    )
    .filter(|format| TEXCOORD_FORMATS.contains(format));
    match format {
        Some(format) if accessor.len() == vertex_count => {
            Some(RawStream::from_accessor(&accessor, format))
        }
        _ => {
            tracing::debug!(
                "skipping {semantic}: {:?}/{:?} x{} for {vertex_count} vertices",
                accessor.accessor_type(),
                accessor.component_type(),
                accessor.len()
            );
            None
        }
    }
}

/// Decode `COLOR_0` to RGBA floats. RGB colours get an opaque alpha.
///
/// Floats and normalized `u8`/`u16` are accepted; anything else is skipped.
fn decode_colors(model: &Model, primitive: &Primitive, vertex_count: usize) -> Vec<Vec4> {
    let index = primitive.attribute(COLOR_0);
    let accessor = AccessorBytes::new(model, index);
    if !accessor.is_valid() {
        return Vec::new();
    }
    let supported = match accessor.component_type() {
        ComponentType::F32 => true,
        ComponentType::U8 | ComponentType::U16 => accessor.normalized(),
        _ => false,
    };
    let colors = match accessor.accessor_type() {
        AccessorType::Vec3 if supported => AccessorView::<Vec3>::new(model, index)
            .iter()
            .map(|rgb| rgb.extend(1.0))
            .collect(),
        AccessorType::Vec4 if supported => AccessorView::<Vec4>::new(model, index).to_vec(),
        _ => Vec::new(),
    };
    if colors.len() != vertex_count {
        tracing::debug!(
            "skipping {COLOR_0}: {:?}/{:?} x{} for {vertex_count} vertices",
            accessor.accessor_type(),
            accessor.component_type(),
            accessor.len()
        );
        return Vec::new();
    }
    colors
}

fn decode_custom(
    model: &Model,
    primitive: &Primitive,
    material: &LoadMaterial,
    vertex_count: usize,
) -> Vec<Option<RawStream>> {
    material
        .custom_attributes
        .iter()
        .map(|attribute| {
            let accessor = AccessorBytes::new(model, primitive.attribute(&attribute.semantic));
            if !accessor.is_valid() {
                return None;
            }
            let format = VertexFormat::from_accessor(
                accessor.component_type(),
                accessor.accessor_type(),
                accessor.normalized(),
            );
            if format != Some(attribute.format) || accessor.len() != vertex_count {
                tracing::debug!(
                    "skipping {}: expected {:?}, got {format:?} x{}",
                    attribute.semantic,
                    attribute.format,
                    accessor.len()
                );
                return None;
            }
            Some(RawStream::from_accessor(&accessor, attribute.format))
        })
        .collect()
}

/// Build a primitive, reporting why it cannot be built.
///
/// # Errors
///
/// Returns an error if the primitive has no usable positions or its indices
/// cannot be expanded into a triangle list.
pub fn try_build_primitive(
    model: &Model,
    primitive: &Primitive,
    material: &LoadMaterial,
) -> GeometryResult<LoadPrimitive> {
    let position_index = primitive.attribute(POSITION);
    let positions = AccessorView::<Vec3>::new(model, position_index);
    if !positions.is_valid() || positions.is_empty() {
        return Err(GeometryError::MissingPositions);
    }
    let vertex_count = positions.len();

    let bounds = position_index
        .and_then(|index| model.accessors.get(index))
        .and_then(Aabb::from_accessor);

    let indices = triangle_indices(
        &AccessorView::new(model, primitive.indices),
        primitive.mode,
        vertex_count,
    )?;

    let normals = AccessorView::<Vec3>::new(model, primitive.attribute(NORMAL));
    let tangents = AccessorView::<Vec4>::new(model, primitive.attribute(TANGENT));
    let plan = AttributePlan::new(vertex_count, &normals, &tangents, material.needs_tangents);

    let explicit_tangents = tangents.is_valid() && tangents.len() == vertex_count;
    let mut streams = VertexStreams {
        indices,
        positions: positions.to_vec(),
        normals: if plan.generate_normals {
            Vec::new()
        } else {
            normals.to_vec()
        },
        tangents: if plan.generate_tangents || !explicit_tangents {
            Vec::new()
        } else {
            tangents.to_vec()
        },
        bitangents: Vec::new(),
        texcoords: std::array::from_fn(|channel| {
            decode_texcoords(model, primitive, channel, vertex_count)
        }),
        colors: decode_colors(model, primitive, vertex_count),
        custom: decode_custom(model, primitive, material, vertex_count),
    };
    let bounds = bounds.unwrap_or_else(|| Aabb::from_points(&streams.positions));
    streams.apply(plan);

    Ok(pack(streams, material, bounds))
}

fn pack(streams: VertexStreams, material: &LoadMaterial, bounds: Aabb) -> LoadPrimitive {
    let vertex_count = streams.vertex_count();
    let index_count = streams.indices.len();

    let mut packer = GeometryPacker::new(vertex_count);
    packer
        .push_indices(&streams.indices)
        .push(StreamKind::Position, VertexFormat::Float32x3, &streams.positions)
        .push(StreamKind::Normal, VertexFormat::Float32x3, &streams.normals)
        .push(StreamKind::Bitangent, VertexFormat::Float32x3, &streams.bitangents)
        .push(StreamKind::Tangent, VertexFormat::Float32x4, &streams.tangents);

    for (slot, texcoords) in streams.texcoords.into_iter().enumerate() {
        let Some(kind) = StreamKind::texcoord(slot) else {
            continue;
        };
        match texcoords {
            Some(stream) => packer.push_raw(kind, stream.format, stream.data),
            None => packer.push_placeholder(kind, VertexFormat::Float32x2),
        };
    }

    packer.push(StreamKind::Color, VertexFormat::Float32x4, &streams.colors);

    let mut custom_attributes = Vec::with_capacity(streams.custom.len());
    for (index, (stream, attribute)) in streams
        .custom
        .into_iter()
        .zip(material.custom_attributes.iter())
        .enumerate()
    {
        #[allow(clippy::cast_possible_truncation)]
        let kind = StreamKind::Custom(index as u16);
        match stream {
            Some(stream) => packer.push_raw(kind, stream.format, stream.data),
            None => packer.push_placeholder(kind, attribute.format),
        };
        custom_attributes.push((attribute.shader_name.clone(), attribute.format));
    }

    LoadPrimitive {
        buffer: packer.finish(),
        vertex_count,
        index_count,
        bounds,
        material: 0,
        custom_attributes,
    }
}

/// Build a primitive, or `None` when there is nothing to render.
///
/// Failures are logged and never propagated; a primitive that cannot be
/// built is simply skipped.
#[must_use]
pub fn build_primitive(
    model: &Model,
    primitive: &Primitive,
    material: &LoadMaterial,
) -> Option<LoadPrimitive> {
    match try_build_primitive(model, primitive, material) {
        Ok(built) => Some(built),
        Err(e) => {
            tracing::debug!("skipping primitive: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        material::{MaterialBuilder, RasterOverlayMaterialBuilder},
        model::PrimitiveMode,
        tangents::{DUMMY_BITANGENT, DUMMY_TANGENT},
        texture::TextureCache,
    };

    /// Two triangles forming a unit quad, positions only.
    fn quad_model() -> (Model, Primitive) {
        let mut model = Model::default();
        let positions = model.push_f32_accessor(
            AccessorType::Vec3,
            &[
                0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, //
                0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0,
            ],
        );
        let mut primitive = Primitive::default();
        primitive.attributes.insert(POSITION.to_string(), positions);
        (model, primitive)
    }

    fn tangent_material() -> LoadMaterial {
        LoadMaterial {
            needs_tangents: true,
            ..LoadMaterial::default()
        }
    }

    #[test]
    fn test_generates_attributes_end_to_end() {
        let (mut model, mut primitive) = quad_model();
        // u = y, v = -x: the U direction runs along +Y.
        let uvs = model.push_f32_accessor(
            AccessorType::Vec2,
            &[0.0, 0.0, 0.0, -1.0, 1.0, -1.0, 0.0, 0.0, 1.0, -1.0, 1.0, 0.0],
        );
        primitive.attributes.insert(texcoord_semantic(0), uvs);

        let built = build_primitive(&model, &primitive, &tangent_material()).unwrap();

        assert_eq!(built.vertex_count % 3, 0);
        assert_eq!(built.indices(), (0..6).collect::<Vec<u32>>());
        let normals = built.normals();
        assert_eq!(normals.len(), 6);
        for triangle in normals.chunks(3) {
            assert_eq!(triangle[0], triangle[1]);
            assert_eq!(triangle[1], triangle[2]);
        }
        assert!((normals[0] - Vec3::Z).length() < 1e-6);

        let tangents = built.tangents();
        assert_eq!(tangents.len(), 6);
        for tangent in &tangents {
            assert_ne!(*tangent, DUMMY_TANGENT);
            assert!((tangent.truncate() - Vec3::Y).length() < 1e-4);
        }
        let bitangents = built.bitangents();
        assert_eq!(bitangents.len(), 6);
        for bitangent in &bitangents {
            assert_ne!(*bitangent, DUMMY_BITANGENT);
            assert!(bitangent.normalize().dot(Vec3::NEG_X) > 0.99);
        }
        assert!(built.has_stream(StreamKind::TexCoord0));
        assert!(!built.has_stream(StreamKind::TexCoord1));
    }

    #[test]
    fn test_vertex_colors_follow_unindexing() {
        let mut model = Model::default();
        let positions = model.push_f32_accessor(
            AccessorType::Vec3,
            &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0],
        );
        let view = model.push_buffer_view(vec![
            255, 0, 0, 255, 0, 255, 0, 255, 0, 0, 255, 255, 255, 255, 255, 0,
        ]);
        let colors = model.push_accessor(view, ComponentType::U8, AccessorType::Vec4, 4, true);
        let indices = model.push_u32_accessor(&[0, 1, 2, 0, 2, 3]);
        let primitive = Primitive {
            attributes: [(POSITION.to_string(), positions), (COLOR_0.to_string(), colors)]
                .into_iter()
                .collect(),
            indices: Some(indices),
            ..Primitive::default()
        };

        // Missing normals force un-indexing.
        let built = build_primitive(&model, &primitive, &LoadMaterial::default()).unwrap();
        assert_eq!(built.vertex_count, 6);
        assert!(built.has_stream(StreamKind::Color));
        let red = Vec4::new(1.0, 0.0, 0.0, 1.0);
        let blue = Vec4::new(0.0, 0.0, 1.0, 1.0);
        let white = Vec4::new(1.0, 1.0, 1.0, 0.0);
        assert_eq!(
            built.colors(),
            vec![red, Vec4::new(0.0, 1.0, 0.0, 1.0), blue, red, blue, white]
        );
    }

    #[test]
    fn test_rgb_colors_get_opaque_alpha() {
        let (mut model, mut primitive) = quad_model();
        let colors = model.push_f32_accessor(AccessorType::Vec3, &[0.5; 18]);
        primitive.attributes.insert(COLOR_0.to_string(), colors);
        let built = build_primitive(&model, &primitive, &LoadMaterial::default()).unwrap();
        assert_eq!(built.colors(), vec![Vec4::new(0.5, 0.5, 0.5, 1.0); 6]);

        let (model, primitive) = quad_model();
        let built = build_primitive(&model, &primitive, &LoadMaterial::default()).unwrap();
        assert!(!built.has_stream(StreamKind::Color));
        assert!(built.colors().is_empty());
    }

    #[test]
    fn test_nan_positions_fall_back_to_dummy_tangents() {
        let (mut model, mut primitive) = quad_model();
        let buffer = model.buffers.len() - 1;
        model.buffers[buffer].data[..4].copy_from_slice(&f32::NAN.to_le_bytes());
        let uvs = model.push_f32_accessor(
            AccessorType::Vec2,
            &[0.0, 0.0, 1.0, 0.0, 1.0, 1.0].repeat(2),
        );
        primitive.attributes.insert(texcoord_semantic(0), uvs);

        let built = build_primitive(&model, &primitive, &tangent_material()).unwrap();
        assert_eq!(built.tangents(), vec![DUMMY_TANGENT; 6]);
    }

    #[test]
    fn test_collapsed_primitive_falls_back_to_dummy_tangents() {
        let mut model = Model::default();
        let positions = model.push_f32_accessor(AccessorType::Vec3, &[2.0; 18]);
        let uvs = model.push_f32_accessor(AccessorType::Vec2, &[0.0; 12]);
        let mut primitive = Primitive::default();
        primitive.attributes.insert(POSITION.to_string(), positions);
        primitive.attributes.insert(texcoord_semantic(0), uvs);

        let built = build_primitive(&model, &primitive, &tangent_material()).unwrap();
        assert_eq!(built.tangents(), vec![DUMMY_TANGENT; 6]);
        assert_eq!(built.bitangents(), vec![DUMMY_BITANGENT; 6]);
    }

    #[test]
    fn test_missing_positions_is_skipped() {
        let model = Model::default();
        let primitive = Primitive::default();
        assert_eq!(
            try_build_primitive(&model, &primitive, &LoadMaterial::default()),
            Err(GeometryError::MissingPositions)
        );
        assert!(build_primitive(&model, &primitive, &LoadMaterial::default()).is_none());
    }

    #[test]
    fn test_bad_topology_is_skipped() {
        let (model, mut primitive) = quad_model();
        primitive.mode = PrimitiveMode::Points;
        assert!(build_primitive(&model, &primitive, &LoadMaterial::default()).is_none());
    }

    #[test]
    fn test_keeps_indices_when_nothing_is_generated() {
        let mut model = Model::default();
        let positions = model.push_f32_accessor(
            AccessorType::Vec3,
            &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0],
        );
        let normals = model.push_f32_accessor(AccessorType::Vec3, &[0.0, 0.0, 1.0].repeat(4));
        let indices = model.push_u32_accessor(&[0, 1, 2, 0, 2, 3]);
        let primitive = Primitive {
            attributes: [(POSITION.to_string(), positions), (NORMAL.to_string(), normals)]
                .into_iter()
                .collect(),
            indices: Some(indices),
            ..Primitive::default()
        };

        let built = build_primitive(&model, &primitive, &LoadMaterial::default()).unwrap();
        assert_eq!(built.vertex_count, 4);
        assert_eq!(built.indices(), vec![0, 1, 2, 0, 2, 3]);
        assert!(!built.has_stream(StreamKind::Tangent));
        assert!(built.buffer.view(StreamKind::Tangent).unwrap().placeholder);
    }

    #[test]
    fn test_dummy_tangents_without_texcoords() {
        let (model, primitive) = quad_model();
        let built = build_primitive(&model, &primitive, &tangent_material()).unwrap();
        assert!(built.tangents().iter().all(|t| *t == DUMMY_TANGENT));
    }

    #[test]
    fn test_declared_bounds_are_preferred() {
        let (mut model, primitive) = quad_model();
        model.accessors[0].min = vec![-5.0, -5.0, -5.0];
        model.accessors[0].max = vec![5.0, 5.0, 5.0];
        let built = build_primitive(&model, &primitive, &LoadMaterial::default()).unwrap();
        assert_eq!(built.bounds.max, glam::DVec3::splat(5.0));

        let (model, primitive) = quad_model();
        let built = build_primitive(&model, &primitive, &LoadMaterial::default()).unwrap();
        assert_eq!(built.bounds.max, glam::DVec3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn test_quantized_positions_scan_bounds() {
        let mut model = Model::default();
        let raw: Vec<u16> = vec![0, 0, 0, 65535, 0, 0, 0, 32768, 0];
        let view = model.push_buffer_view(bytemuck::cast_slice(&raw).to_vec());
        let positions = model.push_accessor(view, ComponentType::U16, AccessorType::Vec3, 3, true);
        model.accessors[positions].min = vec![0.0; 3];
        model.accessors[positions].max = vec![65535.0, 32768.0, 0.0];
        let mut primitive = Primitive::default();
        primitive.attributes.insert(POSITION.to_string(), positions);

        let built = build_primitive(&model, &primitive, &LoadMaterial::default()).unwrap();
        assert!((built.bounds.max.x - 1.0).abs() < 1e-6);
        assert!((built.bounds.max.y - 32768.0 / 65535.0).abs() < 1e-6);
        assert_eq!(built.bounds.min, glam::DVec3::ZERO);
    }

    #[test]
    fn test_custom_attributes_match_format() {
        let (mut model, mut primitive) = quad_model();
        let overlay = model.push_f32_accessor(AccessorType::Vec2, &[0.5; 12]);
        primitive
            .attributes
            .insert("_CESIUMOVERLAY_0".to_string(), overlay);
        // Wrong format: unnormalized u8 vec2 where Float32x2 is expected.
        let view = model.push_buffer_view(vec![0; 12]);
        let wrong = model.push_accessor(view, ComponentType::U8, AccessorType::Vec2, 6, false);
        primitive
            .attributes
            .insert("_CESIUMOVERLAY_1".to_string(), wrong);

        let material = RasterOverlayMaterialBuilder::default().create(
            &model,
            None,
            &mut TextureCache::new(),
        );
        let built = build_primitive(&model, &primitive, &material).unwrap();

        assert!(built.has_stream(StreamKind::Custom(0)));
        assert!(!built.has_stream(StreamKind::Custom(1)));
        assert!(built.buffer.view(StreamKind::Custom(1)).is_some());
        assert_eq!(
            built.buffer.read_vec2(StreamKind::Custom(0)).unwrap(),
            vec![Vec2::splat(0.5); 6]
        );
        assert_eq!(built.custom_attributes[1].0, "overlay_uv1");
        assert_eq!(built.custom_vec2("overlay_uv0").unwrap().len(), 6);
        assert!(built.custom_vec2("overlay_uv1").is_none());
        assert!(built.custom_vec2("overlay_uv9").is_none());
    }
}
