//! Raster overlay layer slots.

use tracing::warn;

/// Maximum number of raster overlays draped on a tileset at once.
pub const MAX_RASTER_LAYERS: usize = 3;

/// Identity of a raster overlay, assigned by the tile engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OverlayId(pub u64);

/// Material property holding the image bound to a layer slot.
#[must_use]
pub fn texture_property(slot: usize) -> String {
    format!("raster{slot}_texture")
}

/// Material property holding a layer's UV transform as `(tx, ty, sx, sy)`.
#[must_use]
pub fn uv_transform_property(slot: usize) -> String {
    format!("raster{slot}_uv_transform")
}

/// Material property selecting which overlay texture coordinate set a layer samples.
#[must_use]
pub fn texcoord_property(slot: usize) -> String {
    format!("raster{slot}_texcoord")
}

/// Fixed-size free list mapping overlays to layer slots.
#[derive(Debug)]
pub struct RasterLayers {
    slots: [Option<OverlayId>; MAX_RASTER_LAYERS],
    free: Vec<usize>,
}

impl Default for RasterLayers {
    fn default() -> Self {
        Self {
            slots: [None; MAX_RASTER_LAYERS],
            // Popped from the back, so slot 0 is handed out first.
            free: (0..MAX_RASTER_LAYERS).rev().collect(),
        }
    }
}

impl RasterLayers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a slot to `overlay`.
    ///
    /// Returns `true` if the overlay already had a slot. Returns `false` when
    /// every slot is taken.
    pub fn add(&mut self, overlay: OverlayId) -> bool {
        if self.slot(overlay).is_some() {
            return true;
        }
        let Some(slot) = self.free.pop() else {
            warn!(overlay = overlay.0, "All {MAX_RASTER_LAYERS} raster layers in use");
            return false;
        };
        self.slots[slot] = Some(overlay);
        true
    }

    /// Release the overlay's slot, returning the slot it held.
    pub fn remove(&mut self, overlay: OverlayId) -> Option<usize> {
        let slot = self.slot(overlay)?;
        self.slots[slot] = None;
        self.free.push(slot);
        Some(slot)
    }

    #[must_use]
    pub fn slot(&self, overlay: OverlayId) -> Option<usize> {
        self.slots.iter().position(|held| *held == Some(overlay))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        MAX_RASTER_LAYERS - self.free.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhaustion_and_idempotence() {
        let mut layers = RasterLayers::new();
        let mut slots = Vec::new();
        for i in 0..MAX_RASTER_LAYERS as u64 {
            assert!(layers.add(OverlayId(i)));
            slots.push(layers.slot(OverlayId(i)).unwrap());
        }
        slots.sort_unstable();
        slots.dedup();
        assert_eq!(slots.len(), MAX_RASTER_LAYERS);
        assert!(slots.iter().all(|&s| s < MAX_RASTER_LAYERS));

        assert!(!layers.add(OverlayId(100)));
        assert!(layers.add(OverlayId(0)));
        assert_eq!(layers.len(), MAX_RASTER_LAYERS);
    }

    #[test]
    fn test_remove_frees_slot() {
        let mut layers = RasterLayers::new();
        layers.add(OverlayId(1));
        layers.add(OverlayId(2));
        assert_eq!(layers.remove(OverlayId(1)), Some(0));
        assert_eq!(layers.remove(OverlayId(1)), None);

        assert!(layers.add(OverlayId(3)));
        assert_eq!(layers.slot(OverlayId(3)), Some(0));
        assert_eq!(layers.slot(OverlayId(2)), Some(1));
    }

    #[test]
    fn test_property_names() {
        assert_eq!(texture_property(1), "raster1_texture");
        assert_eq!(uv_transform_property(0), "raster0_uv_transform");
        assert_eq!(texcoord_property(2), "raster2_texcoord");
    }
}
