//! Renderer interfaces.
//!
//! The preparer never talks to a GPU directly. It drives a backend through
//! these traits, all of which are only called from the main thread.

use glam::{DMat4, Vec4};
use tileset_gltf::{LoadMaterial, LoadPrimitive, MipChain};

use crate::error::Result;

/// Renderer-side mesh instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub u64);

/// Renderer-side material instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub u64);

/// Renderer-side streaming image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId(pub u64);

/// Value of a named material property.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaterialValue {
    Image(Option<ImageId>),
    Vec4(Vec4),
    UInt(u32),
    Float(f32),
}

/// Mesh creation and per-instance state.
pub trait MeshApi {
    /// Upload a primitive and create a mesh instance drawn with `material`.
    fn acquire_mesh(&mut self, primitive: &LoadPrimitive, material: MaterialId) -> Result<MeshId>;

    fn set_transform(&mut self, mesh: MeshId, transform: &DMat4);

    fn set_visible(&mut self, mesh: MeshId, visible: bool);

    /// Draw `mesh` with a different material.
    fn set_material_assignment(&mut self, mesh: MeshId, material: MaterialId);

    fn release_mesh(&mut self, mesh: MeshId);
}

/// Material instances with named properties and deferred compilation.
pub trait MaterialApi {
    fn create_material(&mut self, material: &LoadMaterial) -> Result<MaterialId>;

    /// Create a new material that starts with `parent`'s properties.
    ///
    /// The new material does not keep `parent` alive.
    fn derive_material(&mut self, parent: MaterialId) -> Result<MaterialId>;

    fn release_material(&mut self, material: MaterialId);

    /// Set a property. Returns `false` if the material has no such property.
    fn set_property(&mut self, material: MaterialId, name: &str, value: MaterialValue) -> bool;

    fn property(&self, material: MaterialId, name: &str) -> Option<MaterialValue>;

    /// Whether [`MaterialApi::compile`] would succeed right now.
    fn can_compile(&self, material: MaterialId) -> bool;

    /// Whether property changes are waiting to be compiled.
    fn needs_compile(&self, material: MaterialId) -> bool;

    /// Apply pending property changes. Returns `false` if nothing was applied.
    fn compile(&mut self, material: MaterialId) -> bool;
}

/// Raster image upload.
pub trait ImageApi {
    fn create_image(&mut self, mips: &MipChain) -> Result<ImageId>;

    fn release_image(&mut self, image: ImageId);
}

/// Everything the main-thread preparer needs from a renderer.
pub trait RenderBackend: MeshApi + MaterialApi + ImageApi {}

impl<T: MeshApi + MaterialApi + ImageApi> RenderBackend for T {}
