//! Call-recording renderer for lifecycle tests.

use std::collections::{HashMap, HashSet};

use glam::{DMat4, Vec4};
use tileset_gltf::{LoadMaterial, LoadPrimitive, MipChain};

use crate::error::{Error, Result};
use crate::raster::{MAX_RASTER_LAYERS, texcoord_property, texture_property, uv_transform_property};
use crate::renderer::{
    ImageApi, ImageId, MaterialApi, MaterialId, MaterialValue, MeshApi, MeshId,
};

#[derive(Debug, Clone)]
pub struct MockMesh {
    pub material: MaterialId,
    pub transform: DMat4,
    pub visible: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MockMaterial {
    pub properties: HashMap<String, MaterialValue>,
    pub dirty: bool,
}

#[derive(Debug, Default)]
pub struct MockBackend {
    next_id: u64,
    pub calls: Vec<&'static str>,
    pub meshes: HashMap<MeshId, MockMesh>,
    pub materials: HashMap<MaterialId, MockMaterial>,
    pub images: HashSet<ImageId>,
    /// Whether materials report they can compile.
    pub compile_ready: bool,
    /// Fail `acquire_mesh` once this many meshes exist.
    pub mesh_limit: Option<usize>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            compile_ready: true,
            ..Self::default()
        }
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.iter().filter(|&&c| c == call).count()
    }

    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

impl MeshApi for MockBackend {
    fn acquire_mesh(&mut self, _primitive: &LoadPrimitive, material: MaterialId) -> Result<MeshId> {
        self.calls.push("acquire_mesh");
        if self.mesh_limit.is_some_and(|limit| self.meshes.len() >= limit) {
            return Err(Error::Renderer {
                operation: "acquire_mesh",
                message: "out of meshes".into(),
            });
        }
        let id = MeshId(self.next());
        self.meshes.insert(
            id,
            MockMesh {
                material,
                transform: DMat4::IDENTITY,
                visible: true,
            },
        );
        Ok(id)
    }

    fn set_transform(&mut self, mesh: MeshId, transform: &DMat4) {
        self.calls.push("set_transform");
        if let Some(m) = self.meshes.get_mut(&mesh) {
            m.transform = *transform;
        }
    }

    fn set_visible(&mut self, mesh: MeshId, visible: bool) {
        self.calls.push("set_visible");
        if let Some(m) = self.meshes.get_mut(&mesh) {
            m.visible = visible;
        }
    }

    fn set_material_assignment(&mut self, mesh: MeshId, material: MaterialId) {
        self.calls.push("set_material_assignment");
        if let Some(m) = self.meshes.get_mut(&mesh) {
            m.material = material;
        }
    }

    fn release_mesh(&mut self, mesh: MeshId) {
        self.calls.push("release_mesh");
        self.meshes.remove(&mesh);
    }
}

impl MaterialApi for MockBackend {
    fn create_material(&mut self, material: &LoadMaterial) -> Result<MaterialId> {
        self.calls.push("create_material");
        let mut properties = HashMap::new();
        properties.insert(
            "base_color_factor".to_string(),
            MaterialValue::Vec4(material.base_color_factor),
        );
        if material.raster_overlays {
            for slot in 0..MAX_RASTER_LAYERS {
                properties.insert(texture_property(slot), MaterialValue::Image(None));
                properties.insert(
                    uv_transform_property(slot),
                    MaterialValue::Vec4(Vec4::new(0.0, 0.0, 1.0, 1.0)),
                );
                properties.insert(texcoord_property(slot), MaterialValue::UInt(0));
            }
        }
        let id = MaterialId(self.next());
        self.materials.insert(
            id,
            MockMaterial {
                properties,
                dirty: false,
            },
        );
        Ok(id)
    }

    fn derive_material(&mut self, parent: MaterialId) -> Result<MaterialId> {
        self.calls.push("derive_material");
        let properties = self
            .materials
            .get(&parent)
            .map(|m| m.properties.clone())
            .ok_or(Error::StaleHandle { kind: "material" })?;
        let id = MaterialId(self.next());
        self.materials.insert(
            id,
            MockMaterial {
                properties,
                dirty: true,
            },
        );
        Ok(id)
    }

    fn release_material(&mut self, material: MaterialId) {
        self.calls.push("release_material");
        self.materials.remove(&material);
    }

    fn set_property(&mut self, material: MaterialId, name: &str, value: MaterialValue) -> bool {
        self.calls.push("set_property");
        let Some(m) = self.materials.get_mut(&material) else {
            return false;
        };
        let Some(slot) = m.properties.get_mut(name) else {
            return false;
        };
        *slot = value;
        m.dirty = true;
        true
    }

    fn property(&self, material: MaterialId, name: &str) -> Option<MaterialValue> {
        self.materials.get(&material)?.properties.get(name).copied()
    }

    fn can_compile(&self, material: MaterialId) -> bool {
        self.compile_ready && self.materials.contains_key(&material)
    }

    fn needs_compile(&self, material: MaterialId) -> bool {
        self.materials.get(&material).is_some_and(|m| m.dirty)
    }

    fn compile(&mut self, material: MaterialId) -> bool {
        self.calls.push("compile");
        if !self.compile_ready {
            return false;
        }
        match self.materials.get_mut(&material) {
            Some(m) if m.dirty => {
                m.dirty = false;
                true
            }
            _ => false,
        }
    }
}

impl ImageApi for MockBackend {
    fn create_image(&mut self, _mips: &MipChain) -> Result<ImageId> {
        self.calls.push("create_image");
        let id = ImageId(self.next());
        self.images.insert(id);
        Ok(id)
    }

    fn release_image(&mut self, image: ImageId) {
        self.calls.push("release_image");
        self.images.remove(&image);
    }
}
