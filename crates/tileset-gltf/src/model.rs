//! In-memory glTF document consumed by the geometry pipeline.
//!
//! This mirrors the parts of glTF 2.0 that tile payloads use: buffers,
//! accessors, meshes, materials, textures, and the node hierarchy. Images are
//! stored already decoded to RGBA8. Use [`crate::import`] to build a model
//! from `.glb`/`.gltf` bytes.

use std::collections::BTreeMap;

use glam::{DMat4, DVec3};
use serde::{Deserialize, Serialize};

/// Attribute semantic for vertex positions.
pub const POSITION: &str = "POSITION";
/// Attribute semantic for vertex normals.
pub const NORMAL: &str = "NORMAL";
/// Attribute semantic for vertex tangents.
pub const TANGENT: &str = "TANGENT";
/// Attribute semantic for the first vertex colour set.
pub const COLOR_0: &str = "COLOR_0";

/// Attribute semantic for texture coordinate set `channel`.
#[must_use]
pub fn texcoord_semantic(channel: u32) -> String {
    format!("TEXCOORD_{channel}")
}

/// Numeric type of each accessor component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentType {
    I8,
    U8,
    I16,
    U16,
    U32,
    F32,
}

impl ComponentType {
    /// Size of one component in bytes.
    #[must_use]
    pub fn size(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::U32 | Self::F32 => 4,
        }
    }
}

/// Cardinality of an accessor element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessorType {
    Scalar,
    Vec2,
    Vec3,
    Vec4,
    Mat2,
    Mat3,
    Mat4,
}

impl AccessorType {
    /// Number of components per element.
    #[must_use]
    pub fn component_count(self) -> usize {
        match self {
            Self::Scalar => 1,
            Self::Vec2 => 2,
            Self::Vec3 => 3,
            Self::Vec4 | Self::Mat2 => 4,
            Self::Mat3 => 9,
            Self::Mat4 => 16,
        }
    }
}

/// A binary buffer.
#[derive(Debug, Clone, Default)]
pub struct Buffer {
    pub data: Vec<u8>,
}

/// A contiguous region of a buffer, optionally interleaved.
#[derive(Debug, Clone, Default)]
pub struct BufferView {
    pub buffer: usize,
    pub byte_offset: usize,
    pub byte_length: usize,
    /// Distance between consecutive elements. `None` means tightly packed.
    pub byte_stride: Option<usize>,
}

/// A typed view into a buffer view.
#[derive(Debug, Clone)]
pub struct Accessor {
    pub buffer_view: Option<usize>,
    pub byte_offset: usize,
    pub component_type: ComponentType,
    pub accessor_type: AccessorType,
    pub count: usize,
    pub normalized: bool,
    /// Declared per-component minimum, empty when absent.
    pub min: Vec<f64>,
    /// Declared per-component maximum, empty when absent.
    pub max: Vec<f64>,
}

/// Primitive topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrimitiveMode {
    Points,
    Lines,
    LineLoop,
    LineStrip,
    #[default]
    Triangles,
    TriangleStrip,
    TriangleFan,
}

/// One renderable part of a mesh.
#[derive(Debug, Clone, Default)]
pub struct Primitive {
    /// Attribute semantic (e.g. `POSITION`, `_CESIUMOVERLAY_0`) to accessor index.
    pub attributes: BTreeMap<String, usize>,
    pub indices: Option<usize>,
    pub mode: PrimitiveMode,
    pub material: Option<usize>,
}

impl Primitive {
    /// Accessor index for an attribute semantic.
    #[must_use]
    pub fn attribute(&self, semantic: &str) -> Option<usize> {
        self.attributes.get(semantic).copied()
    }
}

/// A mesh, made of one or more primitives.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub primitives: Vec<Primitive>,
}

/// Reference from a material to a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureInfo {
    pub texture: usize,
    /// Which `TEXCOORD_n` set the texture samples.
    pub tex_coord: u32,
}

/// Alpha blending mode of a material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlphaMode {
    #[default]
    Opaque,
    Mask,
    Blend,
}

/// A metallic-roughness PBR material.
#[derive(Debug, Clone)]
pub struct Material {
    pub base_color_factor: [f32; 4],
    pub base_color_texture: Option<TextureInfo>,
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    pub metallic_roughness_texture: Option<TextureInfo>,
    pub normal_texture: Option<TextureInfo>,
    pub normal_scale: f32,
    pub occlusion_texture: Option<TextureInfo>,
    pub occlusion_strength: f32,
    pub emissive_factor: [f32; 3],
    pub emissive_texture: Option<TextureInfo>,
    pub alpha_mode: AlphaMode,
    pub alpha_cutoff: f32,
    pub double_sided: bool,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            base_color_factor: [1.0; 4],
            base_color_texture: None,
            metallic_factor: 1.0,
            roughness_factor: 1.0,
            metallic_roughness_texture: None,
            normal_texture: None,
            normal_scale: 1.0,
            occlusion_texture: None,
            occlusion_strength: 1.0,
            emissive_factor: [0.0; 3],
            emissive_texture: None,
            alpha_mode: AlphaMode::Opaque,
            alpha_cutoff: 0.5,
            double_sided: false,
        }
    }
}

/// A texture: an image plus sampling state.
#[derive(Debug, Clone, Copy, Default)]
pub struct Texture {
    pub source: Option<usize>,
    pub sampler: Option<usize>,
}

/// A decoded RGBA8 image.
#[derive(Debug, Clone, Default)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    /// RGBA pixel data (4 bytes per pixel).
    pub pixels: Vec<u8>,
}

/// A node in the scene hierarchy.
#[derive(Debug, Clone)]
pub struct Node {
    pub mesh: Option<usize>,
    pub children: Vec<usize>,
    /// Local transform relative to the parent node.
    pub matrix: DMat4,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            mesh: None,
            children: Vec::new(),
            matrix: DMat4::IDENTITY,
        }
    }
}

/// A set of root nodes.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    pub nodes: Vec<usize>,
}

/// The axis glTF content treats as "up".
///
/// Tile payloads are authored Y-up by default and corrected to the Z-up
/// convention of the tile transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UpAxis {
    X,
    #[default]
    Y,
    Z,
}

impl UpAxis {
    /// Rotation that maps this up axis onto +Z.
    #[must_use]
    pub fn to_z_up(self) -> DMat4 {
        match self {
            Self::X => DMat4::from_rotation_y(-std::f64::consts::FRAC_PI_2),
            Self::Y => DMat4::from_rotation_x(std::f64::consts::FRAC_PI_2),
            Self::Z => DMat4::IDENTITY,
        }
    }
}

/// A parsed glTF document.
#[derive(Debug, Clone, Default)]
pub struct Model {
    pub buffers: Vec<Buffer>,
    pub buffer_views: Vec<BufferView>,
    pub accessors: Vec<Accessor>,
    pub meshes: Vec<Mesh>,
    pub materials: Vec<Material>,
    pub textures: Vec<Texture>,
    pub images: Vec<Image>,
    pub nodes: Vec<Node>,
    pub scenes: Vec<Scene>,
    /// Default scene index.
    pub scene: Option<usize>,
    /// `CESIUM_RTC` center: positions are relative to this point.
    pub rtc_center: Option<DVec3>,
}

impl Model {
    /// Append a tightly packed buffer with a single view and return the view index.
    pub fn push_buffer_view(&mut self, data: Vec<u8>) -> usize {
        let byte_length = data.len();
        self.buffers.push(Buffer { data });
        self.buffer_views.push(BufferView {
            buffer: self.buffers.len() - 1,
            byte_offset: 0,
            byte_length,
            byte_stride: None,
        });
        self.buffer_views.len() - 1
    }

    /// Append an accessor covering a whole buffer view and return its index.
    pub fn push_accessor(
        &mut self,
        buffer_view: usize,
        component_type: ComponentType,
        accessor_type: AccessorType,
        count: usize,
        normalized: bool,
    ) -> usize {
        self.accessors.push(Accessor {
            buffer_view: Some(buffer_view),
            byte_offset: 0,
            component_type,
            accessor_type,
            count,
            normalized,
            min: Vec::new(),
            max: Vec::new(),
        });
        self.accessors.len() - 1
    }

    /// Append a tightly packed `f32` accessor built from `values`.
    ///
    /// `values` holds `count * accessor_type.component_count()` floats.
    pub fn push_f32_accessor(&mut self, accessor_type: AccessorType, values: &[f32]) -> usize {
        let count = values.len() / accessor_type.component_count();
        let view = self.push_buffer_view(bytemuck::cast_slice(values).to_vec());
        self.push_accessor(view, ComponentType::F32, accessor_type, count, false)
    }

    /// Append a tightly packed `u32` scalar accessor, e.g. for indices.
    pub fn push_u32_accessor(&mut self, values: &[u32]) -> usize {
        let view = self.push_buffer_view(bytemuck::cast_slice(values).to_vec());
        self.push_accessor(
            view,
            ComponentType::U32,
            AccessorType::Scalar,
            values.len(),
            false,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_y_up_maps_to_z_up() {
        let up = UpAxis::Y.to_z_up().transform_vector3(DVec3::Y);
        assert!((up - DVec3::Z).length() < 1e-12);

        let up = UpAxis::X.to_z_up().transform_vector3(DVec3::X);
        assert!((up - DVec3::Z).length() < 1e-12);
    }

    #[test]
    fn test_push_f32_accessor() {
        let mut model = Model::default();
        let index = model.push_f32_accessor(AccessorType::Vec3, &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        let accessor = &model.accessors[index];
        assert_eq!(accessor.count, 2);
        assert_eq!(model.buffers[0].data.len(), 24);
    }
}
