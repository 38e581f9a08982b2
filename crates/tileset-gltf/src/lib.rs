//! Geometry preparation for glTF tile payloads.
//!
//! This crate turns a decoded glTF document into renderer-ready data on a
//! load thread:
//!
//! - Typed accessor decoding over all glTF component types
//! - Index expansion of triangle strips and fans into triangle lists
//! - Flat normal and MikkTSpace tangent generation for missing attributes
//! - Packing of all vertex streams into one aligned GPU buffer
//! - Material strategies with custom vertex attributes for raster overlays
//!
//! Everything here is synchronous and free of renderer state, so
//! [`build_load_model`] can run concurrently for many tiles.

pub mod accessor;
pub mod attributes;
pub mod bounds;
pub mod error;
pub mod format;
pub mod import;
pub mod indices;
pub mod load;
pub mod material;
pub mod model;
pub mod normals;
pub mod packer;
pub mod primitive;
pub mod tangents;
pub mod texture;

pub use accessor::{AccessorStatus, AccessorView};
pub use bounds::Aabb;
pub use error::{GeometryError, GeometryResult};
pub use format::{StreamKind, VertexFormat};
pub use import::import_slice;
pub use load::{LoadMesh, LoadModel, LoadOptions, build_load_model};
pub use material::{
    CustomAttribute, CustomAttributeRegistry, LoadMaterial, MaterialBuilder, MaterialTexture,
    PbrMaterialBuilder, RasterOverlayMaterialBuilder,
};
pub use model::{Model, UpAxis};
pub use packer::{BufferLayout, BufferView, GeometryPacker, PackedBuffer};
pub use primitive::{LoadPrimitive, build_primitive};
pub use texture::{ChannelMode, MipChain, TextureCache, TextureData, build_mip_chain};
