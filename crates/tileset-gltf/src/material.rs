//! Load-thread materials and material strategies.
//!
//! A [`MaterialBuilder`] turns a glTF material into a [`LoadMaterial`]: the
//! property bag the renderer instantiates on the main thread, plus the custom
//! vertex attributes the material's shader expects.

use std::sync::Arc;

use glam::{Vec3, Vec4};

use crate::{
    format::VertexFormat,
    model::{AlphaMode, Material, Model, TextureInfo},
    texture::{ChannelMode, TextureCache, TextureData},
};

/// Semantic prefix of raster overlay texture coordinate sets.
pub const OVERLAY_SEMANTIC_PREFIX: &str = "_CESIUMOVERLAY_";

/// A vertex attribute a material's shader expects beyond the standard ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomAttribute {
    /// glTF attribute semantic to read, e.g. `_CESIUMOVERLAY_0`.
    pub semantic: String,
    /// GPU format the shader binds. Accessors of any other format are skipped.
    pub format: VertexFormat,
    /// Name the shader binds the stream under.
    pub shader_name: String,
}

/// Ordered set of custom attributes. The position of an attribute is its
/// stream index in the packed buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomAttributeRegistry {
    attributes: Vec<CustomAttribute>,
}

impl CustomAttributeRegistry {
    /// Register an attribute. Re-registering a semantic replaces it in place.
    pub fn register(
        &mut self,
        semantic: impl Into<String>,
        format: VertexFormat,
        shader_name: impl Into<String>,
    ) -> &mut Self {
        let attribute = CustomAttribute {
            semantic: semantic.into(),
            format,
            shader_name: shader_name.into(),
        };
        match self
            .attributes
            .iter_mut()
            .find(|existing| existing.semantic == attribute.semantic)
        {
            Some(existing) => *existing = attribute,
            None => self.attributes.push(attribute),
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &CustomAttribute> {
        self.attributes.iter()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&CustomAttribute> {
        self.attributes.get(index)
    }

    /// Stream index of an attribute by shader binding name.
    #[must_use]
    pub fn position_of_shader_name(&self, shader_name: &str) -> Option<usize> {
        self.attributes
            .iter()
            .position(|attribute| attribute.shader_name == shader_name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// A texture bound to a material slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialTexture {
    pub data: Arc<TextureData>,
    /// Texture coordinate slot the texture samples.
    pub tex_coord: u32,
}

/// Material properties produced on the load thread.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadMaterial {
    pub base_color_factor: Vec4,
    pub base_color_texture: Option<MaterialTexture>,
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    pub metallic_roughness_texture: Option<MaterialTexture>,
    pub normal_texture: Option<MaterialTexture>,
    pub normal_scale: f32,
    pub occlusion_texture: Option<MaterialTexture>,
    pub occlusion_strength: f32,
    pub emissive_factor: Vec3,
    pub emissive_texture: Option<MaterialTexture>,
    pub alpha_mode: AlphaMode,
    pub alpha_cutoff: f32,
    pub double_sided: bool,
    /// Whether primitives using this material need a tangent frame.
    pub needs_tangents: bool,
    /// Whether the material exposes raster overlay texture slots.
    pub raster_overlays: bool,
    pub custom_attributes: CustomAttributeRegistry,
}

impl Default for LoadMaterial {
    fn default() -> Self {
        Self {
            base_color_factor: Vec4::ONE,
            base_color_texture: None,
            metallic_factor: 1.0,
            roughness_factor: 1.0,
            metallic_roughness_texture: None,
            normal_texture: None,
            normal_scale: 1.0,
            occlusion_texture: None,
            occlusion_strength: 1.0,
            emissive_factor: Vec3::ZERO,
            emissive_texture: None,
            alpha_mode: AlphaMode::Opaque,
            alpha_cutoff: 0.5,
            double_sided: false,
            needs_tangents: false,
            raster_overlays: false,
            custom_attributes: CustomAttributeRegistry::default(),
        }
    }
}

/// Strategy that builds a [`LoadMaterial`] for a glTF material.
///
/// Builders run on load threads and must not hold main-thread state.
pub trait MaterialBuilder: Send + Sync {
    /// Build the material for glTF material `material`, or the glTF default
    /// material when `None`.
    fn create(
        &self,
        model: &Model,
        material: Option<usize>,
        textures: &mut TextureCache,
    ) -> LoadMaterial;
}

/// Metallic-roughness PBR materials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PbrMaterialBuilder {
    /// Request tangents even when the material has no normal texture.
    pub require_tangents: bool,
}

impl Default for PbrMaterialBuilder {
    fn default() -> Self {
        Self {
            require_tangents: true,
        }
    }
}

fn resolve_texture(
    model: &Model,
    info: Option<TextureInfo>,
    mode: ChannelMode,
    textures: &mut TextureCache,
) -> Option<MaterialTexture> {
    let info = info?;
    let data = textures.get_or_create(model, info.texture, mode)?;
    Some(MaterialTexture {
        data,
        tex_coord: info.tex_coord,
    })
}

impl MaterialBuilder for PbrMaterialBuilder {
    fn create(
        &self,
        model: &Model,
        material: Option<usize>,
        textures: &mut TextureCache,
    ) -> LoadMaterial {
        let fallback = Material::default();
        let source = match material {
            Some(index) => model.materials.get(index).unwrap_or_else(|| {
                tracing::warn!("material {index} does not exist, using default material");
                &fallback
            }),
            None => &fallback,
        };

        let normal_texture = resolve_texture(
            model,
            source.normal_texture,
            ChannelMode::Rgba,
            textures,
        );
        LoadMaterial {
            base_color_factor: Vec4::from_array(source.base_color_factor),
            base_color_texture: resolve_texture(
                model,
                source.base_color_texture,
                ChannelMode::Rgba,
                textures,
            ),
            metallic_factor: source.metallic_factor,
            roughness_factor: source.roughness_factor,
            metallic_roughness_texture: resolve_texture(
                model,
                source.metallic_roughness_texture,
                ChannelMode::MetallicRoughness,
                textures,
            ),
            needs_tangents: self.require_tangents || normal_texture.is_some(),
            normal_texture,
            normal_scale: source.normal_scale,
            occlusion_texture: resolve_texture(
                model,
                source.occlusion_texture,
                ChannelMode::Occlusion,
                textures,
            ),
            occlusion_strength: source.occlusion_strength,
            emissive_factor: Vec3::from_array(source.emissive_factor),
            emissive_texture: resolve_texture(
                model,
                source.emissive_texture,
                ChannelMode::Rgba,
                textures,
            ),
            alpha_mode: source.alpha_mode,
            alpha_cutoff: source.alpha_cutoff,
            double_sided: source.double_sided,
            raster_overlays: false,
            custom_attributes: CustomAttributeRegistry::default(),
        }
    }
}

/// PBR materials with raster overlay slots and overlay texture coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterOverlayMaterialBuilder {
    pub pbr: PbrMaterialBuilder,
    /// Number of `_CESIUMOVERLAY_n` sets to register.
    pub overlay_texcoord_count: u32,
}

impl Default for RasterOverlayMaterialBuilder {
    fn default() -> Self {
        Self {
            pbr: PbrMaterialBuilder::default(),
            overlay_texcoord_count: 2,
        }
    }
}

impl RasterOverlayMaterialBuilder {
    /// Shader binding name of overlay texture coordinate set `n`.
    #[must_use]
    pub fn overlay_shader_name(n: u32) -> String {
        format!("overlay_uv{n}")
    }
}

impl MaterialBuilder for RasterOverlayMaterialBuilder {
    fn create(
        &self,
        model: &Model,
        material: Option<usize>,
        textures: &mut TextureCache,
    ) -> LoadMaterial {
        let mut load = self.pbr.create(model, material, textures);
        load.raster_overlays = true;
        for n in 0..self.overlay_texcoord_count {
            load.custom_attributes.register(
                format!("{OVERLAY_SEMANTIC_PREFIX}{n}"),
                VertexFormat::Float32x2,
                Self::overlay_shader_name(n),
            );
        }
        load
    }
}
