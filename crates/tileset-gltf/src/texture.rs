//! Texture extraction, caching and mip chains.
//!
//! Materials reference glTF images through textures. Some material slots only
//! read specific channels (occlusion reads red, metallic-roughness reads
//! blue/green), so the extracted texture depends on both the source image
//! and the channel mode. The cache is keyed on both.

use std::collections::HashMap;
use std::sync::Arc;

use image::{RgbaImage, imageops};

use crate::model::{Image, Model};

/// Which channels of the source image a texture keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelMode {
    /// All four channels unchanged.
    Rgba,
    /// Green (roughness) and blue (metallic); red cleared, alpha opaque.
    MetallicRoughness,
    /// Red replicated to RGB, alpha opaque.
    Occlusion,
}

/// Decoded RGBA8 texture data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureData {
    /// RGBA pixel data (4 bytes per pixel).
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl TextureData {
    /// Check if the pixel buffer matches the dimensions.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.pixels.len() == (self.width as usize) * (self.height as usize) * 4
    }

    /// Extract the channels `mode` keeps from `image`.
    #[must_use]
    pub fn from_image(image: &Image, mode: ChannelMode) -> Self {
        let pixels = match mode {
            ChannelMode::Rgba => image.pixels.clone(),
            ChannelMode::MetallicRoughness => image
                .pixels
                .chunks_exact(4)
                .flat_map(|p| [0, p[1], p[2], 255])
                .collect(),
            ChannelMode::Occlusion => image
                .pixels
                .chunks_exact(4)
                .flat_map(|p| [p[0], p[0], p[0], 255])
                .collect(),
        };
        Self {
            pixels,
            width: image.width,
            height: image.height,
        }
    }
}

/// Cache of extracted textures shared between the materials of one model.
#[derive(Debug, Default)]
pub struct TextureCache {
    entries: HashMap<(usize, ChannelMode), Arc<TextureData>>,
}

impl TextureCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the texture for glTF texture `texture`, extracting it on first use.
    ///
    /// Returns `None` if the texture has no source image or the image data is
    /// malformed.
    pub fn get_or_create(
        &mut self,
        model: &Model,
        texture: usize,
        mode: ChannelMode,
    ) -> Option<Arc<TextureData>> {
        let source = model.textures.get(texture)?.source?;
        if let Some(existing) = self.entries.get(&(source, mode)) {
            return Some(Arc::clone(existing));
        }

        let image = model.images.get(source)?;
        let data = TextureData::from_image(image, mode);
        if !data.is_valid() || data.width == 0 || data.height == 0 {
            tracing::warn!(
                "image {source} has {} bytes for {}x{} pixels, skipping",
                image.pixels.len(),
                image.width,
                image.height
            );
            return None;
        }

        let data = Arc::new(data);
        self.entries.insert((source, mode), Arc::clone(&data));
        Some(data)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// An RGBA8 image with its successively halved mip levels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MipChain {
    /// Level 0 first.
    pub levels: Vec<TextureData>,
}

impl MipChain {
    #[must_use]
    pub fn base(&self) -> Option<&TextureData> {
        self.levels.first()
    }

    #[must_use]
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }
}

/// Build a mip chain down to 1x1, limited to `max_levels` levels when given.
///
/// Returns `None` if the texture data is malformed.
#[must_use]
pub fn build_mip_chain(base: TextureData, max_levels: Option<u32>) -> Option<MipChain> {
    if !base.is_valid() || base.width == 0 || base.height == 0 {
        return None;
    }

    let full = base.width.max(base.height).ilog2() + 1;
    let count = max_levels.map_or(full, |max| max.clamp(1, full));

    let mut current = RgbaImage::from_raw(base.width, base.height, base.pixels.clone())?;
    let mut levels = Vec::with_capacity(count as usize);
    levels.push(base);
    for _ in 1..count {
        let width = (current.width() / 2).max(1);
        let height = (current.height() / 2).max(1);
        current = imageops::resize(&current, width, height, imageops::FilterType::Triangle);
        levels.push(TextureData {
            pixels: current.as_raw().clone(),
            width,
            height,
        });
    }
    Some(MipChain { levels })
}
