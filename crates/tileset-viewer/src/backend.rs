//! Renderer backend on top of Bevy assets and entities.
//!
//! Meshes become entities with a `Mesh3d` and a `StandardMaterial`. Asset
//! lifetimes follow Bevy's handle reference counting: releasing an id drops
//! the strong handle this backend holds.
//!
//! `StandardMaterial` has a single base colour texture, so raster layer 0 is
//! drawn by swapping it in and sampling the overlay texture coordinates from
//! `UV_1`. Properties of the other layers are stored but not drawn.

use std::collections::HashMap;

use bevy::asset::RenderAssetUsages;
use bevy::ecs::system::SystemParam;
use bevy::math::Affine2;
use bevy::mesh::{Indices, PrimitiveTopology};
use bevy::pbr::UvChannel;
use bevy::prelude::*;
use bevy::render::render_resource::{Extent3d, TextureDimension, TextureFormat};
use glam::DMat4;
use tileset_gltf::model::AlphaMode as GltfAlphaMode;
use tileset_gltf::{
    LoadMaterial, LoadPrimitive, MaterialTexture, MipChain, RasterOverlayMaterialBuilder,
    TextureData,
};
use tileset_render::raster::{texcoord_property, texture_property, uv_transform_property};
use tileset_render::{
    Error, ImageApi, ImageId, MAX_RASTER_LAYERS, MaterialApi, MaterialId, MaterialValue, MeshApi,
    MeshId,
};

const BASE_COLOR_FACTOR: &str = "base_color_factor";

/// Marker for entities created by the backend.
#[derive(Component, Debug, Clone, Copy)]
pub struct TileMesh {
    pub id: MeshId,
}

struct MaterialEntry {
    handle: Handle<StandardMaterial>,
    /// The glTF base colour texture, restored when raster layer 0 is cleared.
    base_color_texture: Option<Handle<Image>>,
    properties: HashMap<String, MaterialValue>,
    dirty: bool,
}

/// Id-to-asset bookkeeping that persists between frames.
#[derive(Resource, Default)]
pub struct BackendState {
    next_id: u64,
    meshes: HashMap<MeshId, Entity>,
    materials: HashMap<MaterialId, MaterialEntry>,
    images: HashMap<ImageId, Handle<Image>>,
}

impl BackendState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    #[must_use]
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }
}

/// The renderer the preparer drives from main-thread systems.
#[derive(SystemParam)]
pub struct BevyBackend<'w, 's> {
    commands: Commands<'w, 's>,
    meshes: ResMut<'w, Assets<Mesh>>,
    materials: ResMut<'w, Assets<StandardMaterial>>,
    images: ResMut<'w, Assets<Image>>,
    state: ResMut<'w, BackendState>,
}

/// Convert a prepared primitive into a Bevy triangle list mesh.
pub fn convert_primitive(primitive: &LoadPrimitive) -> Mesh {
    let positions: Vec<[f32; 3]> = primitive.positions().iter().map(|p| p.to_array()).collect();
    let normals: Vec<[f32; 3]> = primitive.normals().iter().map(|n| n.to_array()).collect();
    let tangents: Vec<[f32; 4]> = primitive.tangents().iter().map(|t| t.to_array()).collect();

    let mut mesh = Mesh::new(
        PrimitiveTopology::TriangleList,
        RenderAssetUsages::default(),
    );
    mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, positions);
    if !normals.is_empty() {
        mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, normals);
    }
    if !tangents.is_empty() {
        mesh.insert_attribute(Mesh::ATTRIBUTE_TANGENT, tangents);
    }
    if let Some(uvs) = primitive.texcoords(0) {
        let uvs: Vec<[f32; 2]> = uvs.iter().map(|uv| uv.to_array()).collect();
        mesh.insert_attribute(Mesh::ATTRIBUTE_UV_0, uvs);
    }
    let colors = primitive.colors();
    if !colors.is_empty() {
        let colors: Vec<[f32; 4]> = colors.iter().map(|c| c.to_array()).collect();
        mesh.insert_attribute(Mesh::ATTRIBUTE_COLOR, colors);
    }
    let overlay = RasterOverlayMaterialBuilder::overlay_shader_name(0);
    if let Some(uvs) = primitive.custom_vec2(&overlay) {
        let uvs: Vec<[f32; 2]> = uvs.iter().map(|uv| uv.to_array()).collect();
        mesh.insert_attribute(Mesh::ATTRIBUTE_UV_1, uvs);
    }
    mesh.insert_indices(Indices::U32(primitive.indices()));
    mesh
}

/// Create a single-level Bevy image from RGBA8 texture data.
pub fn convert_texture(texture: &TextureData, srgb: bool) -> Image {
    let format = if srgb {
        TextureFormat::Rgba8UnormSrgb
    } else {
        TextureFormat::Rgba8Unorm
    };
    Image::new(
        Extent3d {
            width: texture.width,
            height: texture.height,
            depth_or_array_layers: 1,
        },
        TextureDimension::D2,
        texture.pixels.clone(),
        format,
        RenderAssetUsages::default(),
    )
}

/// Create a Bevy image holding every level of a mip chain.
pub fn convert_mip_chain(mips: &MipChain) -> Option<Image> {
    let base = mips.base()?;
    let mut image = convert_texture(base, true);
    image.data = Some(
        mips.levels
            .iter()
            .flat_map(|level| level.pixels.iter().copied())
            .collect(),
    );
    image.texture_descriptor.mip_level_count = u32::try_from(mips.level_count()).unwrap_or(1);
    Some(image)
}

/// Map a glTF-derived material onto `StandardMaterial`.
pub fn convert_material(material: &LoadMaterial, images: &mut Assets<Image>) -> StandardMaterial {
    let mut texture = |texture: &Option<MaterialTexture>, srgb: bool| {
        texture
            .as_ref()
            .map(|texture| images.add(convert_texture(&texture.data, srgb)))
    };
    let base_color_texture = texture(&material.base_color_texture, true);
    let metallic_roughness_texture = texture(&material.metallic_roughness_texture, false);
    let normal_map_texture = texture(&material.normal_texture, false);
    let occlusion_texture = texture(&material.occlusion_texture, false);
    let emissive_texture = texture(&material.emissive_texture, true);

    let factor = material.base_color_factor;
    let emissive = material.emissive_factor;
    StandardMaterial {
        base_color: Color::linear_rgba(factor.x, factor.y, factor.z, factor.w),
        base_color_texture,
        metallic: material.metallic_factor,
        perceptual_roughness: material.roughness_factor,
        metallic_roughness_texture,
        normal_map_texture,
        occlusion_texture,
        emissive: LinearRgba::rgb(emissive.x, emissive.y, emissive.z),
        emissive_texture,
        alpha_mode: match material.alpha_mode {
            GltfAlphaMode::Opaque => AlphaMode::Opaque,
            GltfAlphaMode::Mask => AlphaMode::Mask(material.alpha_cutoff),
            GltfAlphaMode::Blend => AlphaMode::Blend,
        },
        double_sided: material.double_sided,
        cull_mode: if material.double_sided {
            None
        } else {
            Some(bevy::render::render_resource::Face::Back)
        },
        ..default()
    }
}

fn raster_properties(material: &LoadMaterial) -> HashMap<String, MaterialValue> {
    let factor = material.base_color_factor;
    let mut properties = HashMap::new();
    properties.insert(BASE_COLOR_FACTOR.to_string(), MaterialValue::Vec4(factor));
    if material.raster_overlays {
        for slot in 0..MAX_RASTER_LAYERS {
            properties.insert(texture_property(slot), MaterialValue::Image(None));
            properties.insert(
                uv_transform_property(slot),
                MaterialValue::Vec4(Vec4::new(0.0, 0.0, 1.0, 1.0)),
            );
            properties.insert(texcoord_property(slot), MaterialValue::UInt(0));
        }
    }
    properties
}

impl MeshApi for BevyBackend<'_, '_> {
    fn acquire_mesh(&mut self, primitive: &LoadPrimitive, material: MaterialId) -> tileset_render::Result<MeshId> {
        let handle = self
            .state
            .materials
            .get(&material)
            .map(|entry| entry.handle.clone())
            .ok_or(Error::StaleHandle { kind: "material" })?;
        let mesh = self.meshes.add(convert_primitive(primitive));
        let id = MeshId(self.state.next_id());
        let entity = self
            .commands
            .spawn((
                Mesh3d(mesh),
                MeshMaterial3d(handle),
                Transform::IDENTITY,
                Visibility::Hidden,
                TileMesh { id },
            ))
            .id();
        self.state.meshes.insert(id, entity);
        Ok(id)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn set_transform(&mut self, mesh: MeshId, transform: &DMat4) {
        if let Some(&entity) = self.state.meshes.get(&mesh) {
            self.commands
                .entity(entity)
                .insert(Transform::from_matrix(transform.as_mat4()));
        }
    }

    fn set_visible(&mut self, mesh: MeshId, visible: bool) {
        if let Some(&entity) = self.state.meshes.get(&mesh) {
            let visibility = if visible {
                Visibility::Inherited
            } else {
                Visibility::Hidden
            };
            self.commands.entity(entity).insert(visibility);
        }
    }

    fn set_material_assignment(&mut self, mesh: MeshId, material: MaterialId) {
        let (Some(&entity), Some(entry)) = (
            self.state.meshes.get(&mesh),
            self.state.materials.get(&material),
        ) else {
            return;
        };
        self.commands
            .entity(entity)
            .insert(MeshMaterial3d(entry.handle.clone()));
    }

    fn release_mesh(&mut self, mesh: MeshId) {
        if let Some(entity) = self.state.meshes.remove(&mesh) {
            self.commands.entity(entity).despawn();
        }
    }
}

impl MaterialApi for BevyBackend<'_, '_> {
    fn create_material(&mut self, material: &LoadMaterial) -> tileset_render::Result<MaterialId> {
        let standard = convert_material(material, &mut self.images);
        let base_color_texture = standard.base_color_texture.clone();
        let handle = self.materials.add(standard);
        let id = MaterialId(self.state.next_id());
        self.state.materials.insert(
            id,
            MaterialEntry {
                handle,
                base_color_texture,
                properties: raster_properties(material),
                dirty: false,
            },
        );
        Ok(id)
    }

    fn derive_material(&mut self, parent: MaterialId) -> tileset_render::Result<MaterialId> {
        let entry = self
            .state
            .materials
            .get(&parent)
            .ok_or(Error::StaleHandle { kind: "material" })?;
        let standard = self
            .materials
            .get(&entry.handle)
            .cloned()
            .ok_or(Error::Renderer {
                operation: "derive_material",
                message: "parent material asset is gone".into(),
            })?;
        let derived = MaterialEntry {
            handle: self.materials.add(standard),
            base_color_texture: entry.base_color_texture.clone(),
            properties: entry.properties.clone(),
            dirty: true,
        };
        let id = MaterialId(self.state.next_id());
        self.state.materials.insert(id, derived);
        Ok(id)
    }

    fn release_material(&mut self, material: MaterialId) {
        self.state.materials.remove(&material);
    }

    fn set_property(&mut self, material: MaterialId, name: &str, value: MaterialValue) -> bool {
        let Some(entry) = self.state.materials.get_mut(&material) else {
            return false;
        };
        let Some(property) = entry.properties.get_mut(name) else {
            return false;
        };
        *property = value;
        entry.dirty = true;
        true
    }

    fn property(&self, material: MaterialId, name: &str) -> Option<MaterialValue> {
        self.state
            .materials
            .get(&material)?
            .properties
            .get(name)
            .copied()
    }

    fn can_compile(&self, material: MaterialId) -> bool {
        self.state
            .materials
            .get(&material)
            .is_some_and(|entry| self.materials.contains(&entry.handle))
    }

    fn needs_compile(&self, material: MaterialId) -> bool {
        self.state
            .materials
            .get(&material)
            .is_some_and(|entry| entry.dirty)
    }

    fn compile(&mut self, material: MaterialId) -> bool {
        let state = &mut *self.state;
        let Some(entry) = state.materials.get_mut(&material) else {
            return false;
        };
        let Some(standard) = self.materials.get_mut(&entry.handle) else {
            return false;
        };

        if let Some(MaterialValue::Vec4(factor)) = entry.properties.get(BASE_COLOR_FACTOR) {
            standard.base_color = Color::linear_rgba(factor.x, factor.y, factor.z, factor.w);
        }
        let raster = match entry.properties.get(&texture_property(0)) {
            Some(MaterialValue::Image(Some(image))) => state.images.get(image).cloned(),
            _ => None,
        };
        if let Some(raster) = raster {
            standard.base_color_texture = Some(raster);
            standard.base_color_channel = UvChannel::Uv1;
        } else {
            standard.base_color_texture.clone_from(&entry.base_color_texture);
            standard.base_color_channel = UvChannel::Uv0;
        }
        if let Some(MaterialValue::Vec4(uv)) = entry.properties.get(&uv_transform_property(0)) {
            standard.uv_transform =
                Affine2::from_scale_angle_translation(Vec2::new(uv.z, uv.w), 0.0, Vec2::new(uv.x, uv.y));
        }
        entry.dirty = false;
        true
    }
}

impl ImageApi for BevyBackend<'_, '_> {
    fn create_image(&mut self, mips: &MipChain) -> tileset_render::Result<ImageId> {
        let image = convert_mip_chain(mips).ok_or(Error::Renderer {
            operation: "create_image",
            message: "empty mip chain".into(),
        })?;
        let id = ImageId(self.state.next_id());
        let handle = self.images.add(image);
        self.state.images.insert(id, handle);
        Ok(id)
    }

    fn release_image(&mut self, image: ImageId) {
        self.state.images.remove(&image);
    }
}
