//! Preparer configuration.

use std::sync::Arc;

use serde::Deserialize;
use tileset_gltf::{
    LoadOptions, MaterialBuilder, PbrMaterialBuilder, RasterOverlayMaterialBuilder, UpAxis,
};

use crate::error::{Error, Result};

/// Settings shared by the load-thread and main-thread halves of the preparer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PreparerConfig {
    /// Whether PBR materials request tangents without a normal texture.
    pub require_tangents: bool,
    /// Use materials with raster overlay slots.
    pub raster_overlays: bool,
    /// Number of `_CESIUMOVERLAY_n` texture coordinate sets to read.
    pub overlay_texcoord_count: u32,
    /// Build mip chains for raster images.
    pub generate_mipmaps: bool,
    /// Limit on raster mip levels, `None` for a full chain.
    pub max_mip_levels: Option<u32>,
    /// Up axis of the glTF content.
    pub up_axis: UpAxis,
}

impl Default for PreparerConfig {
    fn default() -> Self {
        Self {
            require_tangents: true,
            raster_overlays: true,
            overlay_texcoord_count: 2,
            generate_mipmaps: true,
            max_mip_levels: None,
            up_axis: UpAxis::Y,
        }
    }
}

impl PreparerConfig {
    /// Check values that deserialization cannot.
    pub fn validate(&self) -> Result<()> {
        if self.max_mip_levels == Some(0) {
            return Err(Error::Config("max_mip_levels must be at least 1".into()));
        }
        Ok(())
    }

    /// The material strategy this configuration selects.
    #[must_use]
    pub fn material_builder(&self) -> Arc<dyn MaterialBuilder> {
        let pbr = PbrMaterialBuilder {
            require_tangents: self.require_tangents,
        };
        if self.raster_overlays {
            Arc::new(RasterOverlayMaterialBuilder {
                pbr,
                overlay_texcoord_count: self.overlay_texcoord_count,
            })
        } else {
            Arc::new(pbr)
        }
    }

    #[must_use]
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            up_axis: self.up_axis,
        }
    }

    /// Mip levels to build for raster images.
    #[must_use]
    pub fn mip_levels(&self) -> Option<u32> {
        if self.generate_mipmaps {
            self.max_mip_levels
        } else {
            Some(1)
        }
    }
}
