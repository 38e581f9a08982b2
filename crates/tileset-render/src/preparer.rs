//! Two-phase preparation of tile render resources.
//!
//! The tile engine calls [`LoadPreparer`] from any number of worker threads
//! and hands the results to [`MainThreadResources`] on the main thread. The
//! load half is `Sync` and stateless between calls. The main half owns every
//! renderer handle and is only reachable through `&mut`, so it can never be
//! shared with the workers.

use std::sync::Arc;

use glam::{DMat4, Vec2, Vec4};
use tileset_gltf::{
    Aabb, LoadModel, MaterialBuilder, MipChain, Model, TextureData, build_load_model,
    build_mip_chain,
};
use tracing::{debug, warn};

use crate::arena::{Arena, Handle};
use crate::compile::CompileQueue;
use crate::config::PreparerConfig;
use crate::error::{Error, Result};
use crate::raster::{
    OverlayId, RasterLayers, texcoord_property, texture_property, uv_transform_property,
};
use crate::renderer::{ImageId, MaterialId, MaterialValue, MeshId, RenderBackend};

/// CPU-side raster image ready for upload.
#[derive(Debug, Clone)]
pub struct LoadRasterImage {
    pub mips: MipChain,
}

/// Output of the load-thread phase.
#[derive(Debug)]
pub enum LoadThreadResult {
    Model(Box<LoadModel>),
    Raster(Box<LoadRasterImage>),
}

/// One realized primitive.
#[derive(Debug, Clone, Copy)]
pub struct RenderPrimitive {
    pub mesh: MeshId,
    /// Index into [`RenderModel::materials`].
    pub material: usize,
}

/// Main-thread counterpart of a [`LoadModel`].
#[derive(Debug)]
pub struct RenderModel {
    pub primitives: Vec<RenderPrimitive>,
    pub materials: Vec<MaterialId>,
    pub visible: bool,
    /// World-space bounds.
    pub bounds: Aabb,
}

/// A raster image uploaded to the renderer.
#[derive(Debug, Clone, Copy)]
pub struct RenderRaster {
    pub image: ImageId,
    pub width: u32,
    pub height: u32,
}

/// Output of the main-thread phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MainThreadResult {
    Model(Handle<RenderModel>),
    Raster(Handle<RenderRaster>),
}

/// Load-thread half of the preparer.
#[derive(Clone)]
pub struct LoadPreparer {
    config: PreparerConfig,
    materials: Arc<dyn MaterialBuilder>,
}

impl LoadPreparer {
    pub fn new(config: PreparerConfig) -> Result<Self> {
        config.validate()?;
        let materials = config.material_builder();
        Ok(Self { config, materials })
    }

    #[must_use]
    pub fn config(&self) -> &PreparerConfig {
        &self.config
    }

    /// Build CPU-side geometry and materials for a tile.
    ///
    /// A `CESIUM_RTC` center in `model` is folded into the mesh transforms.
    /// Primitives that cannot be built are skipped.
    #[must_use]
    pub fn prepare_in_load_thread(&self, model: &Model, tile_transform: DMat4) -> LoadThreadResult {
        let load = build_load_model(
            model,
            tile_transform,
            self.materials.as_ref(),
            self.config.load_options(),
        );
        debug!(
            meshes = load.meshes.len(),
            primitives = load.primitive_count(),
            materials = load.materials.len(),
            "Prepared tile in load thread"
        );
        LoadThreadResult::Model(Box::new(load))
    }

    /// Build the mip chain of a decoded raster image.
    ///
    /// Returns `None` if the image data does not match its dimensions.
    #[must_use]
    pub fn prepare_raster_in_load_thread(&self, image: TextureData) -> Option<LoadThreadResult> {
        let Some(mips) = build_mip_chain(image, self.config.mip_levels()) else {
            warn!("Skipping raster image with invalid pixel data");
            return None;
        };
        Some(LoadThreadResult::Raster(Box::new(LoadRasterImage { mips })))
    }
}

/// Main-thread half of the preparer.
#[derive(Debug, Default)]
pub struct MainThreadResources {
    models: Arena<RenderModel>,
    rasters: Arena<RenderRaster>,
    layers: RasterLayers,
    compile_queue: CompileQueue,
}

impl MainThreadResources {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create renderer resources for a load-thread result.
    ///
    /// Model meshes start hidden. If the renderer fails partway through,
    /// everything created so far is released again.
    pub fn prepare_in_main_thread(
        &mut self,
        backend: &mut impl RenderBackend,
        load: LoadThreadResult,
    ) -> Result<MainThreadResult> {
        match load {
            LoadThreadResult::Model(model) => self.realize_model(backend, *model),
            LoadThreadResult::Raster(raster) => {
                let (width, height) = raster
                    .mips
                    .base()
                    .map_or((0, 0), |base| (base.width, base.height));
                let image = backend.create_image(&raster.mips)?;
                let handle = self.rasters.insert(RenderRaster {
                    image,
                    width,
                    height,
                });
                Ok(MainThreadResult::Raster(handle))
            }
        }
    }

    fn realize_model(
        &mut self,
        backend: &mut impl RenderBackend,
        load: LoadModel,
    ) -> Result<MainThreadResult> {
        let bounds = load.bounds();
        let mut render = RenderModel {
            primitives: Vec::with_capacity(load.primitive_count()),
            materials: Vec::with_capacity(load.materials.len()),
            visible: false,
            bounds,
        };

        if let Err(e) = Self::create_renderer_objects(backend, &load, &mut render) {
            warn!("Failed to realize tile: {e}");
            Self::release_model(backend, &mut self.compile_queue, &render);
            return Err(e);
        }

        debug!(
            primitives = render.primitives.len(),
            materials = render.materials.len(),
            "Realized tile in main thread"
        );
        Ok(MainThreadResult::Model(self.models.insert(render)))
    }

    fn create_renderer_objects(
        backend: &mut impl RenderBackend,
        load: &LoadModel,
        render: &mut RenderModel,
    ) -> Result<()> {
        for material in &load.materials {
            render.materials.push(backend.create_material(material)?);
        }
        for mesh in &load.meshes {
            for primitive in &mesh.primitives {
                let material = render
                    .materials
                    .get(primitive.material)
                    .copied()
                    .ok_or(Error::StaleHandle { kind: "material" })?;
                let id = backend.acquire_mesh(primitive, material)?;
                render.primitives.push(RenderPrimitive {
                    mesh: id,
                    material: primitive.material,
                });
                backend.set_transform(id, &mesh.transform);
                backend.set_visible(id, false);
            }
        }
        Ok(())
    }

    fn release_model(
        backend: &mut impl RenderBackend,
        compile_queue: &mut CompileQueue,
        render: &RenderModel,
    ) {
        for primitive in &render.primitives {
            backend.release_mesh(primitive.mesh);
        }
        for &material in &render.materials {
            compile_queue.remove(material);
            backend.release_material(material);
        }
    }

    /// Release whichever results are present.
    ///
    /// A load-thread result is simply dropped and never reaches the renderer.
    pub fn free(
        &mut self,
        backend: &mut impl RenderBackend,
        load: Option<LoadThreadResult>,
        main: Option<MainThreadResult>,
    ) -> Result<()> {
        drop(load);
        match main {
            None => Ok(()),
            Some(MainThreadResult::Model(handle)) => {
                let render = self
                    .models
                    .get(handle)
                    .ok_or(Error::StaleHandle { kind: "model" })?;
                Self::release_model(backend, &mut self.compile_queue, render);
                self.models.remove(handle);
                Ok(())
            }
            Some(MainThreadResult::Raster(handle)) => {
                let raster = self
                    .rasters
                    .get(handle)
                    .ok_or(Error::StaleHandle { kind: "raster" })?;
                backend.release_image(raster.image);
                self.rasters.remove(handle);
                Ok(())
            }
        }
    }

    /// Show or hide every mesh of a tile.
    pub fn set_visible(
        &mut self,
        backend: &mut impl RenderBackend,
        tile: Handle<RenderModel>,
        visible: bool,
    ) -> Result<()> {
        let render = self
            .models
            .get_mut(tile)
            .ok_or(Error::StaleHandle { kind: "model" })?;
        if render.visible == visible {
            return Ok(());
        }
        for primitive in &render.primitives {
            backend.set_visible(primitive.mesh, visible);
        }
        render.visible = visible;
        Ok(())
    }

    /// Reserve a layer slot for `overlay`. Returns `false` when all slots are taken.
    pub fn add_raster_layer(&mut self, overlay: OverlayId) -> bool {
        self.layers.add(overlay)
    }

    pub fn remove_raster_layer(&mut self, overlay: OverlayId) {
        self.layers.remove(overlay);
    }

    /// Drape a raster image over a tile.
    ///
    /// `translation` and `scale` map the tile's overlay texture coordinates
    /// into the raster image, which may be a sub-region of an atlas.
    #[allow(clippy::too_many_arguments)]
    pub fn attach_raster_in_main_thread(
        &mut self,
        backend: &mut impl RenderBackend,
        tile: Handle<RenderModel>,
        overlay: OverlayId,
        raster: Handle<RenderRaster>,
        overlay_texcoord: u32,
        translation: Vec2,
        scale: Vec2,
    ) -> Result<()> {
        let slot = self
            .layers
            .slot(overlay)
            .ok_or(Error::MissingRasterLayer { overlay: overlay.0 })?;
        let image = self
            .rasters
            .get(raster)
            .ok_or(Error::StaleHandle { kind: "raster" })?
            .image;
        let properties = [
            (texture_property(slot), MaterialValue::Image(Some(image))),
            (
                uv_transform_property(slot),
                MaterialValue::Vec4(Vec4::new(translation.x, translation.y, scale.x, scale.y)),
            ),
            (texcoord_property(slot), MaterialValue::UInt(overlay_texcoord)),
        ];
        self.update_materials(backend, tile, &properties)
    }

    /// Remove an overlay's raster image from a tile.
    pub fn detach_raster_in_main_thread(
        &mut self,
        backend: &mut impl RenderBackend,
        tile: Handle<RenderModel>,
        overlay: OverlayId,
    ) -> Result<()> {
        let slot = self
            .layers
            .slot(overlay)
            .ok_or(Error::MissingRasterLayer { overlay: overlay.0 })?;
        let properties = [
            (texture_property(slot), MaterialValue::Image(None)),
            (
                uv_transform_property(slot),
                MaterialValue::Vec4(Vec4::new(0.0, 0.0, 1.0, 1.0)),
            ),
            (texcoord_property(slot), MaterialValue::UInt(0)),
        ];
        self.update_materials(backend, tile, &properties)
    }

    /// Apply property changes to every material of a tile.
    ///
    /// A material that cannot compile right now is replaced by a derived
    /// instance carrying the changes, so the tile never draws with a
    /// half-updated material.
    fn update_materials(
        &mut self,
        backend: &mut impl RenderBackend,
        tile: Handle<RenderModel>,
        properties: &[(String, MaterialValue)],
    ) -> Result<()> {
        let render = self
            .models
            .get_mut(tile)
            .ok_or(Error::StaleHandle { kind: "model" })?;

        for index in 0..render.materials.len() {
            let material = render.materials[index];
            if backend.can_compile(material) {
                set_properties(backend, material, properties);
                backend.compile(material);
                if backend.needs_compile(material) {
                    self.compile_queue.push(material);
                }
                continue;
            }

            let derived = backend.derive_material(material)?;
            set_properties(backend, derived, properties);
            for primitive in render.primitives.iter().filter(|p| p.material == index) {
                backend.set_material_assignment(primitive.mesh, derived);
            }
            self.compile_queue.remove(material);
            backend.release_material(material);
            render.materials[index] = derived;
            self.compile_queue.push(derived);
            debug!(?material, ?derived, "Deferred material compile");
        }
        Ok(())
    }

    /// Retry queued material compiles. Call once per frame.
    pub fn tick(&mut self, backend: &mut impl RenderBackend) {
        self.compile_queue.tick(backend);
    }

    #[must_use]
    pub fn model(&self, tile: Handle<RenderModel>) -> Option<&RenderModel> {
        self.models.get(tile)
    }

    #[must_use]
    pub fn raster(&self, raster: Handle<RenderRaster>) -> Option<&RenderRaster> {
        self.rasters.get(raster)
    }

    #[must_use]
    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    #[must_use]
    pub fn raster_count(&self) -> usize {
        self.rasters.len()
    }

    #[must_use]
    pub fn raster_layers(&self) -> &RasterLayers {
        &self.layers
    }

    #[must_use]
    pub fn pending_compiles(&self) -> usize {
        self.compile_queue.len()
    }
}

fn set_properties(
    backend: &mut impl RenderBackend,
    material: MaterialId,
    properties: &[(String, MaterialValue)],
) {
    for (name, value) in properties {
        if !backend.set_property(material, name, *value) {
            debug!(?material, property = %name, "Material has no such property");
        }
    }
}
