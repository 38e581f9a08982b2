//! Bevy integration for the tile render preparer.
//!
//! [`backend::BevyBackend`] implements the renderer traits on Bevy assets and
//! entities. [`plugin::TilesetPlugin`] drives both preparer phases from the
//! async compute pool and `Update` systems.

pub mod backend;
pub mod plugin;

pub use backend::{BackendState, BevyBackend, TileMesh};
pub use plugin::{TileId, TileState, Tileset, TilesetPlugin, TilesetResources};
