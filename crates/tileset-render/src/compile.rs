//! Deferred material compilation.

use tracing::debug;

use crate::renderer::{MaterialApi, MaterialId};

/// Materials whose property changes could not be compiled yet.
#[derive(Debug, Default)]
pub struct CompileQueue {
    pending: Vec<MaterialId>,
}

impl CompileQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, material: MaterialId) {
        if !self.pending.contains(&material) {
            self.pending.push(material);
        }
    }

    /// Drop a material that is about to be released.
    pub fn remove(&mut self, material: MaterialId) {
        self.pending.retain(|&m| m != material);
    }

    /// Compile every material that can compile now.
    ///
    /// Materials stay queued until the renderer reports nothing left to compile.
    pub fn tick(&mut self, materials: &mut impl MaterialApi) {
        self.pending.retain(|&material| {
            if materials.can_compile(material) {
                materials.compile(material);
            }
            materials.needs_compile(material)
        });
        if !self.pending.is_empty() {
            debug!(pending = self.pending.len(), "Materials waiting to compile");
        }
    }

    #[must_use]
    pub fn contains(&self, material: MaterialId) -> bool {
        self.pending.contains(&material)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
