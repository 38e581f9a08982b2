//! Render resource lifecycle for streamed 3D tiles.
//!
//! Tiles are prepared in two phases. [`LoadPreparer`] runs on worker threads
//! and turns a glTF model into CPU-side geometry. [`MainThreadResources`]
//! runs on the main thread and realizes that geometry through a
//! [`RenderBackend`], keeping every renderer handle in a generation-checked
//! arena. It also owns the raster overlay layer slots and the queue of
//! materials waiting to compile.

pub mod arena;
pub mod compile;
pub mod config;
pub mod error;
pub mod preparer;
pub mod raster;
pub mod renderer;

#[cfg(test)]
mod mock;

pub use arena::{Arena, Handle};
pub use config::PreparerConfig;
pub use error::{Error, Result};
pub use preparer::{
    LoadPreparer, LoadRasterImage, LoadThreadResult, MainThreadResources, MainThreadResult,
    RenderModel, RenderPrimitive, RenderRaster,
};
pub use raster::{MAX_RASTER_LAYERS, OverlayId, RasterLayers};
pub use renderer::{
    ImageApi, ImageId, MaterialApi, MaterialId, MaterialValue, MeshApi, MeshId, RenderBackend,
};
