//! Load-thread model construction.
//!
//! A [`LoadModel`] is everything the main thread needs to realize a tile:
//! packed primitives grouped by mesh instance with their world transforms, and
//! the materials they reference. Building one touches no renderer state.

use std::collections::HashMap;

use glam::{DMat4, DVec3};

use crate::{
    bounds::Aabb,
    material::{LoadMaterial, MaterialBuilder},
    model::{Model, UpAxis},
    primitive::{LoadPrimitive, build_primitive},
    texture::TextureCache,
};

/// Deepest node hierarchy followed before giving up on a (cyclic) graph.
const MAX_NODE_DEPTH: usize = 64;

/// One mesh instance: a transform and the primitives drawn with it.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadMesh {
    /// Source glTF mesh index.
    pub mesh: usize,
    /// Mesh-to-world transform.
    pub transform: DMat4,
    pub primitives: Vec<LoadPrimitive>,
}

impl LoadMesh {
    /// World-space bounds of all primitives.
    #[must_use]
    pub fn bounds(&self) -> Aabb {
        self.primitives
            .iter()
            .map(|primitive| primitive.bounds.transformed(&self.transform))
            .fold(Aabb::EMPTY, Aabb::union)
    }
}

/// Geometry and materials of one tile, prepared off the main thread.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadModel {
    pub meshes: Vec<LoadMesh>,
    /// Materials referenced by [`LoadPrimitive::material`].
    pub materials: Vec<LoadMaterial>,
}

impl LoadModel {
    #[must_use]
    pub fn primitive_count(&self) -> usize {
        self.meshes.iter().map(|mesh| mesh.primitives.len()).sum()
    }

    /// World-space bounds of the whole model.
    #[must_use]
    pub fn bounds(&self) -> Aabb {
        self.meshes
            .iter()
            .map(LoadMesh::bounds)
            .fold(Aabb::EMPTY, Aabb::union)
    }
}

/// Options for [`build_load_model`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// The glTF content's up axis.
    pub up_axis: UpAxis,
}

struct ModelBuilder<'a> {
    model: &'a Model,
    materials: &'a dyn MaterialBuilder,
    textures: TextureCache,
    material_ids: HashMap<Option<usize>, usize>,
    primitives: HashMap<usize, Vec<LoadPrimitive>>,
    output: LoadModel,
}

impl ModelBuilder<'_> {
    fn material_id(&mut self, material: Option<usize>) -> usize {
        if let Some(&id) = self.material_ids.get(&material) {
            return id;
        }
        let built = self
            .materials
            .create(self.model, material, &mut self.textures);
        self.output.materials.push(built);
        let id = self.output.materials.len() - 1;
        self.material_ids.insert(material, id);
        id
    }

    fn mesh_primitives(&mut self, mesh: usize) -> Vec<LoadPrimitive> {
        if let Some(cached) = self.primitives.get(&mesh) {
            return cached.clone();
        }

        let Some(source) = self.model.meshes.get(mesh) else {
            tracing::warn!("node references missing mesh {mesh}");
            return Vec::new();
        };

        let mut built = Vec::with_capacity(source.primitives.len());
        for (index, primitive) in source.primitives.iter().enumerate() {
            let material = self.material_id(primitive.material);
            match build_primitive(self.model, primitive, &self.output.materials[material]) {
                Some(mut load) => {
                    load.material = material;
                    built.push(load);
                }
                None => tracing::debug!("mesh {mesh} primitive {index} skipped"),
            }
        }
        self.primitives.insert(mesh, built.clone());
        built
    }

    fn add_mesh(&mut self, mesh: usize, transform: DMat4) {
        let primitives = self.mesh_primitives(mesh);
        if !primitives.is_empty() {
            self.output.meshes.push(LoadMesh {
                mesh,
                transform,
                primitives,
            });
        }
    }

    fn visit(&mut self, node: usize, parent: DMat4, depth: usize) {
        if depth > MAX_NODE_DEPTH {
            tracing::warn!("node hierarchy deeper than {MAX_NODE_DEPTH}, stopping at node {node}");
            return;
        }
        let Some(source) = self.model.nodes.get(node) else {
            tracing::warn!("scene references missing node {node}");
            return;
        };
        let transform = parent * source.matrix;
        if let Some(mesh) = source.mesh {
            self.add_mesh(mesh, transform);
        }
        for &child in &source.children {
            self.visit(child, transform, depth + 1);
        }
    }
}

/// Nodes no other node lists as a child.
fn root_nodes(model: &Model) -> Vec<usize> {
    let mut is_child = vec![false; model.nodes.len()];
    for node in &model.nodes {
        for &child in &node.children {
            if let Some(flag) = is_child.get_mut(child) {
                *flag = true;
            }
        }
    }
    (0..model.nodes.len()).filter(|&i| !is_child[i]).collect()
}

/// Root transform of a tile's content: tile transform, then the `CESIUM_RTC`
/// offset, then the up-axis correction.
#[must_use]
pub fn root_transform(model: &Model, tile_transform: DMat4, up_axis: UpAxis) -> DMat4 {
    let rtc = model.rtc_center.unwrap_or(DVec3::ZERO);
    tile_transform * DMat4::from_translation(rtc) * up_axis.to_z_up()
}

/// Build the load model for a tile.
///
/// Walks the default scene, or the first scene, or every root node when the
/// document has no scenes, or every mesh when it has no nodes. Primitives
/// that cannot be built are skipped.
#[must_use]
pub fn build_load_model(
    model: &Model,
    tile_transform: DMat4,
    materials: &dyn MaterialBuilder,
    options: LoadOptions,
) -> LoadModel {
    let root = root_transform(model, tile_transform, options.up_axis);
    let mut builder = ModelBuilder {
        model,
        materials,
        textures: TextureCache::new(),
        material_ids: HashMap::new(),
        primitives: HashMap::new(),
        output: LoadModel::default(),
    };

    let scene = model
        .scene
        .or(if model.scenes.is_empty() { None } else { Some(0) })
        .and_then(|index| model.scenes.get(index));
    if let Some(scene) = scene {
        for &node in &scene.nodes {
            builder.visit(node, root, 0);
        }
    } else if !model.nodes.is_empty() {
        for node in root_nodes(model) {
            builder.visit(node, root, 0);
        }
    } else {
        for mesh in 0..model.meshes.len() {
            builder.add_mesh(mesh, root);
        }
    }

    tracing::debug!(
        "built load model: {} meshes, {} primitives, {} materials",
        builder.output.meshes.len(),
        builder.output.primitive_count(),
        builder.output.materials.len()
    );
    builder.output
}
