//! Tile streaming on Bevy's task pools.
//!
//! Tile payloads are parsed and prepared on the `AsyncComputeTaskPool`.
//! Results come back over `async_channel` and are realized in `Update`
//! systems, which are the only place the preparer's main-thread half is
//! touched.

use std::collections::HashMap;
use std::sync::Arc;

use bevy::prelude::*;
use bevy::tasks::AsyncComputeTaskPool;
use glam::DMat4;
use tileset_gltf::{Aabb, GeometryError, TextureData, import_slice};
use tileset_render::{
    LoadPreparer, LoadThreadResult, MainThreadResources, MainThreadResult, OverlayId,
    PreparerConfig, RenderModel, RenderRaster,
};

use crate::backend::{BackendState, BevyBackend};

/// Identifies a tile requested through [`Tileset::load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId(pub u64);

/// Overlay used for the raster given to [`Tileset::drape`].
const DRAPE_OVERLAY: OverlayId = OverlayId(0);

/// Where a tile is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileState {
    Loading,
    Ready(tileset_render::Handle<RenderModel>),
    Failed,
}

#[derive(Debug)]
struct TileEntry {
    state: TileState,
    visible: bool,
    draped: bool,
}

struct TileRequest {
    id: TileId,
    bytes: Arc<[u8]>,
    transform: DMat4,
}


/// Tile requests and their current state.
#[derive(Resource, Default)]
pub struct Tileset {
    next_id: u64,
    tiles: HashMap<TileId, TileEntry>,
    requests: Vec<TileRequest>,
    unloads: Vec<TileId>,
    drape_request: Option<TextureData>,
    /// Draped raster. Stays in place while a replacement is prepared.
    draped_raster: Option<tileset_render::Handle<RenderRaster>>,
}

impl Tileset {
    /// Queue a `.glb` payload placed with `transform`.
    pub fn load(&mut self, bytes: impl Into<Arc<[u8]>>, transform: DMat4) -> TileId {
        let id = TileId(self.next_id);
        self.next_id += 1;
        self.tiles.insert(
            id,
            TileEntry {
                state: TileState::Loading,
                visible: true,
                draped: false,
            },
        );
        self.requests.push(TileRequest {
            id,
            bytes: bytes.into(),
            transform,
        });
        id
    }

    pub fn set_visible(&mut self, id: TileId, visible: bool) {
        if let Some(tile) = self.tiles.get_mut(&id) {
            tile.visible = visible;
        }
    }

    /// Release a tile, whether or not it has finished loading.
    pub fn unload(&mut self, id: TileId) {
        self.unloads.push(id);
    }

    /// Drape `image` over every tile as a raster overlay.
    pub fn drape(&mut self, image: TextureData) {
        self.drape_request = Some(image);
    }

    #[must_use]
    pub fn state(&self, id: TileId) -> Option<TileState> {
        self.tiles.get(&id).map(|tile| tile.state)
    }

    pub fn iter(&self) -> impl Iterator<Item = (TileId, TileState)> + '_ {
        self.tiles.iter().map(|(&id, tile)| (id, tile.state))
    }

    /// Make `raster` the draped image and mark every tile for re-draping.
    ///
    /// Returns the raster it replaces, which the caller must free.
    fn replace_drape(
        &mut self,
        raster: tileset_render::Handle<RenderRaster>,
    ) -> Option<tileset_render::Handle<RenderRaster>> {
        for tile in self.tiles.values_mut() {
            tile.draped = false;
        }
        self.draped_raster.replace(raster)
    }
}

/// Load-thread half of the preparer, shared with tasks.
#[derive(Resource, Clone)]
pub struct TilesetPreparer(pub Arc<LoadPreparer>);

/// Main-thread half of the preparer.
#[derive(Resource, Default, Deref, DerefMut)]
pub struct TilesetResources(pub MainThreadResources);

type TileResult = (TileId, Result<LoadThreadResult, GeometryError>);

#[derive(Resource)]
struct TilesetChannels {
    tile_tx: async_channel::Sender<TileResult>,
    tile_rx: async_channel::Receiver<TileResult>,
    raster_tx: async_channel::Sender<Option<LoadThreadResult>>,
    raster_rx: async_channel::Receiver<Option<LoadThreadResult>>,
}

impl Default for TilesetChannels {
    fn default() -> Self {
        let (tile_tx, tile_rx) = async_channel::unbounded();
        let (raster_tx, raster_rx) = async_channel::bounded(1);
        Self {
            tile_tx,
            tile_rx,
            raster_tx,
            raster_rx,
        }
    }
}

/// Streams tiles through the two-phase preparer.
pub struct TilesetPlugin {
    pub preparer: Arc<LoadPreparer>,
}

impl TilesetPlugin {
    pub fn new(config: PreparerConfig) -> tileset_render::Result<Self> {
        Ok(Self {
            preparer: Arc::new(LoadPreparer::new(config)?),
        })
    }
}

impl Plugin for TilesetPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(TilesetPreparer(Arc::clone(&self.preparer)))
            .init_resource::<Tileset>()
            .init_resource::<TilesetResources>()
            .init_resource::<TilesetChannels>()
            .init_resource::<BackendState>()
            .add_systems(
                Update,
                (
                    spawn_load_tasks,
                    realize_tiles,
                    realize_drape,
                    unload_tiles,
                    update_tiles,
                    tick_materials,
                )
                    .chain(),
            );
    }
}

/// Start load-thread work for new tile and raster requests.
#[allow(clippy::needless_pass_by_value)]
fn spawn_load_tasks(
    mut tileset: ResMut<Tileset>,
    preparer: Res<TilesetPreparer>,
    channels: Res<TilesetChannels>,
) {
    let pool = AsyncComputeTaskPool::get();
    for request in tileset.requests.drain(..) {
        let preparer = Arc::clone(&preparer.0);
        let tx = channels.tile_tx.clone();
        pool.spawn(async move {
            let result = import_slice(&request.bytes)
                .map(|model| preparer.prepare_in_load_thread(&model, request.transform));
            let _ = tx.send((request.id, result)).await;
        })
        .detach();
    }

    if let Some(image) = tileset.drape_request.take() {
        let preparer = Arc::clone(&preparer.0);
        let tx = channels.raster_tx.clone();
        pool.spawn(async move {
            let _ = tx.send(preparer.prepare_raster_in_load_thread(image)).await;
        })
        .detach();
        tracing::info!("Started preparing raster overlay");
    }
}

/// Realize finished tiles on the main thread.
#[allow(clippy::needless_pass_by_value)]
fn realize_tiles(
    mut tileset: ResMut<Tileset>,
    mut resources: ResMut<TilesetResources>,
    mut backend: BevyBackend,
    channels: Res<TilesetChannels>,
) {
    while let Ok((id, result)) = channels.tile_rx.try_recv() {
        let load = match result {
            Ok(load) => load,
            Err(e) => {
                tracing::warn!("Failed to import tile {}: {}", id.0, e);
                if let Some(tile) = tileset.tiles.get_mut(&id) {
                    tile.state = TileState::Failed;
                }
                continue;
            }
        };

        // Unloaded while the load thread was busy.
        let Some(tile) = tileset.tiles.get_mut(&id) else {
            if let Err(e) = resources.free(&mut backend, Some(load), None) {
                tracing::warn!("Failed to free tile {}: {}", id.0, e);
            }
            continue;
        };

        match resources.prepare_in_main_thread(&mut backend, load) {
            Ok(MainThreadResult::Model(handle)) => {
                tracing::debug!("Tile {} ready", id.0);
                tile.state = TileState::Ready(handle);
            }
            Ok(other) => {
                tracing::warn!("Tile {} produced a raster result", id.0);
                tile.state = TileState::Failed;
                let _ = resources.free(&mut backend, None, Some(other));
            }
            Err(e) => {
                tracing::warn!("Failed to realize tile {}: {}", id.0, e);
                tile.state = TileState::Failed;
            }
        }
    }
}

/// Upload the draped raster and reserve its layer.
///
/// A new raster replaces the previous one, which is freed once tiles have
/// been marked for re-draping.
#[allow(clippy::needless_pass_by_value)]
fn realize_drape(
    mut tileset: ResMut<Tileset>,
    mut resources: ResMut<TilesetResources>,
    mut backend: BevyBackend,
    channels: Res<TilesetChannels>,
) {
    let Ok(result) = channels.raster_rx.try_recv() else {
        return;
    };
    let Some(load) = result else {
        return;
    };
    if !resources.add_raster_layer(DRAPE_OVERLAY) {
        let _ = resources.free(&mut backend, Some(load), None);
        return;
    }
    match resources.prepare_in_main_thread(&mut backend, load) {
        Ok(MainThreadResult::Raster(handle)) => {
            tracing::info!("Raster overlay ready");
            if let Some(previous) = tileset.replace_drape(handle)
                && let Err(e) =
                    resources.free(&mut backend, None, Some(MainThreadResult::Raster(previous)))
            {
                tracing::warn!("Failed to free previous raster overlay: {}", e);
            }
        }
        Ok(other) => {
            let _ = resources.free(&mut backend, None, Some(other));
        }
        Err(e) => {
            tracing::warn!("Failed to upload raster overlay: {}", e);
            if tileset.draped_raster.is_none() {
                resources.remove_raster_layer(DRAPE_OVERLAY);
            }
        }
    }
}

/// Free unloaded tiles.
#[allow(clippy::needless_pass_by_value)]
fn unload_tiles(
    mut tileset: ResMut<Tileset>,
    mut resources: ResMut<TilesetResources>,
    mut backend: BevyBackend,
) {
    let unloads: Vec<TileId> = tileset.unloads.drain(..).collect();
    for id in unloads {
        let Some(tile) = tileset.tiles.remove(&id) else {
            continue;
        };
        if let TileState::Ready(handle) = tile.state {
            if let Err(e) =
                resources.free(&mut backend, None, Some(MainThreadResult::Model(handle)))
            {
                tracing::warn!("Failed to free tile {}: {}", id.0, e);
            }
        }
    }
}

/// Apply requested visibility and drape ready tiles.
#[allow(clippy::needless_pass_by_value)]
fn update_tiles(
    mut tileset: ResMut<Tileset>,
    mut resources: ResMut<TilesetResources>,
    mut backend: BevyBackend,
) {
    let drape = tileset.draped_raster;
    for (id, tile) in &mut tileset.tiles {
        let TileState::Ready(handle) = tile.state else {
            continue;
        };
        if let Err(e) = resources.set_visible(&mut backend, handle, tile.visible) {
            tracing::warn!("Failed to update tile {}: {}", id.0, e);
            continue;
        }
        if let (Some(raster), false) = (drape, tile.draped) {
            match resources.attach_raster_in_main_thread(
                &mut backend,
                handle,
                DRAPE_OVERLAY,
                raster,
                0,
                Vec2::ZERO,
                Vec2::ONE,
            ) {
                Ok(()) => tile.draped = true,
                Err(e) => tracing::warn!("Failed to drape tile {}: {}", id.0, e),
            }
        }
    }
}

/// Retry deferred material compiles.
fn tick_materials(mut resources: ResMut<TilesetResources>, mut backend: BevyBackend) {
    resources.tick(&mut backend);
}

/// World-space bounds of every ready tile.
#[must_use]
pub fn tileset_bounds(tileset: &Tileset, resources: &MainThreadResources) -> Aabb {
    tileset
        .iter()
        .filter_map(|(_, state)| match state {
            TileState::Ready(handle) => resources.model(handle).map(|model| model.bounds),
            TileState::Loading | TileState::Failed => None,
        })
        .fold(Aabb::EMPTY, Aabb::union)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_queues_request() {
        let mut tileset = Tileset::default();
        let a = tileset.load(vec![1, 2, 3], DMat4::IDENTITY);
        let b = tileset.load(vec![4], DMat4::IDENTITY);
        assert_ne!(a, b);
        assert_eq!(tileset.requests.len(), 2);
        assert_eq!(tileset.state(a), Some(TileState::Loading));
    }

    #[test]
    fn test_visibility_and_unload_requests() {
        let mut tileset = Tileset::default();
        let id = tileset.load(vec![0], DMat4::IDENTITY);
        tileset.set_visible(id, false);
        assert!(!tileset.tiles[&id].visible);

        tileset.unload(id);
        assert_eq!(tileset.unloads, vec![id]);
        tileset.set_visible(TileId(99), true);
        assert_eq!(tileset.state(TileId(99)), None);
    }

    #[test]
    fn test_second_drape_redrapes_tiles() {
        let mut rasters = tileset_render::Arena::new();
        let first = rasters.insert(RenderRaster {
            image: tileset_render::ImageId(1),
            width: 1,
            height: 1,
        });
        let second = rasters.insert(RenderRaster {
            image: tileset_render::ImageId(2),
            width: 1,
            height: 1,
        });

        let mut tileset = Tileset::default();
        let a = tileset.load(vec![0], DMat4::IDENTITY);
        let b = tileset.load(vec![1], DMat4::IDENTITY);
        assert_eq!(tileset.replace_drape(first), None);
        for tile in tileset.tiles.values_mut() {
            tile.draped = true;
        }
        tileset.drape(TextureData {
            width: 1,
            height: 1,
            pixels: vec![0; 4],
        });
        assert_eq!(tileset.draped_raster, Some(first));

        assert_eq!(tileset.replace_drape(second), Some(first));
        assert_eq!(tileset.draped_raster, Some(second));
        assert!(!tileset.tiles[&a].draped);
        assert!(!tileset.tiles[&b].draped);
    }

    #[test]
    fn test_bounds_ignore_unready_tiles() {
        let mut tileset = Tileset::default();
        tileset.load(vec![0], DMat4::IDENTITY);
        let bounds = tileset_bounds(&tileset, &MainThreadResources::new());
        assert!(bounds.is_empty());
    }
}
