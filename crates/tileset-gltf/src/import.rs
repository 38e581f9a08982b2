//! glTF import.
//!
//! Parses `.glb` (or self-contained `.gltf`) bytes with the `gltf` crate and
//! copies the parts the pipeline uses into a [`Model`]. Buffers must be
//! embedded in the binary chunk; images are decoded to RGBA8.

use glam::{DVec3, Mat4};

use crate::{
    error::{GeometryError, GeometryResult},
    model::{
        Accessor, AccessorType, AlphaMode, Buffer, BufferView, ComponentType, Image, Material,
        Mesh, Model, Node, Primitive, PrimitiveMode, Scene, Texture, TextureInfo,
    },
};

/// Extension carrying the relative-to-center offset of a tile's positions.
pub const CESIUM_RTC: &str = "CESIUM_RTC";

/// Import a glTF document from bytes.
///
/// # Errors
///
/// Returns [`GeometryError::Import`] if the bytes are not valid glTF or a
/// buffer is not embedded.
pub fn import_slice(bytes: &[u8]) -> GeometryResult<Model> {
    let gltf::Gltf { document, blob } =
        gltf::Gltf::from_slice(bytes).map_err(|e| GeometryError::Import(e.to_string()))?;

    let buffers = resolve_buffers(&document, blob)?;
    let images = document
        .images()
        .map(|image| decode_image(&image, &buffers))
        .collect();

    let model = Model {
        buffer_views: document.views().map(|view| convert_view(&view)).collect(),
        accessors: document
            .accessors()
            .map(|accessor| convert_accessor(&accessor))
            .collect(),
        meshes: document.meshes().map(|mesh| convert_mesh(&mesh)).collect(),
        materials: document
            .materials()
            .map(|material| convert_material(&material))
            .collect(),
        textures: document
            .textures()
            .map(|texture| Texture {
                source: Some(texture.source().index()),
                sampler: texture.sampler().index(),
            })
            .collect(),
        images,
        nodes: document.nodes().map(|node| convert_node(&node)).collect(),
        scenes: document
            .scenes()
            .map(|scene| Scene {
                nodes: scene.nodes().map(|node| node.index()).collect(),
            })
            .collect(),
        scene: document.default_scene().map(|scene| scene.index()),
        rtc_center: rtc_center(&document),
        buffers,
    };

    tracing::debug!(
        "imported glTF: {} meshes, {} materials, {} images",
        model.meshes.len(),
        model.materials.len(),
        model.images.len()
    );
    Ok(model)
}

fn resolve_buffers(
    document: &gltf::Document,
    blob: Option<Vec<u8>>,
) -> GeometryResult<Vec<Buffer>> {
    let mut buffers = Vec::new();
    for buffer in document.buffers() {
        match buffer.source() {
            gltf::buffer::Source::Bin => {
                let data = blob.clone().ok_or_else(|| {
                    GeometryError::Import("binary buffer referenced but no blob present".into())
                })?;
                buffers.push(Buffer { data });
            }
            gltf::buffer::Source::Uri(uri) => {
                return Err(GeometryError::Import(format!(
                    "external buffer URIs not supported: {uri}"
                )));
            }
        }
    }
    Ok(buffers)
}

fn decode_image(image: &gltf::Image<'_>, buffers: &[Buffer]) -> Image {
    let gltf::image::Source::View { view, .. } = image.source() else {
        tracing::warn!("image {} is not embedded, skipping", image.index());
        return Image::default();
    };

    let bytes = buffers
        .get(view.buffer().index())
        .and_then(|buffer| buffer.data.get(view.offset()..view.offset() + view.length()));
    let Some(bytes) = bytes else {
        tracing::warn!("image {} view is out of range", image.index());
        return Image::default();
    };

    match image::load_from_memory(bytes) {
        Ok(decoded) => {
            let rgba = decoded.to_rgba8();
            let (width, height) = rgba.dimensions();
            Image {
                width,
                height,
                pixels: rgba.into_raw(),
            }
        }
        Err(e) => {
            tracing::warn!("failed to decode image {}: {e}", image.index());
            Image::default()
        }
    }
}

fn convert_view(view: &gltf::buffer::View<'_>) -> BufferView {
    BufferView {
        buffer: view.buffer().index(),
        byte_offset: view.offset(),
        byte_length: view.length(),
        byte_stride: view.stride(),
    }
}

fn json_numbers(value: Option<gltf::json::Value>) -> Vec<f64> {
    value
        .as_ref()
        .and_then(gltf::json::Value::as_array)
        .map(|values| values.iter().filter_map(gltf::json::Value::as_f64).collect())
        .unwrap_or_default()
}

fn convert_accessor(accessor: &gltf::Accessor<'_>) -> Accessor {
    use gltf::accessor::{DataType, Dimensions};

    Accessor {
        buffer_view: accessor.view().map(|view| view.index()),
        byte_offset: accessor.offset(),
        component_type: match accessor.data_type() {
            DataType::I8 => ComponentType::I8,
            DataType::U8 => ComponentType::U8,
            DataType::I16 => ComponentType::I16,
            DataType::U16 => ComponentType::U16,
            DataType::U32 => ComponentType::U32,
            DataType::F32 => ComponentType::F32,
        },
        accessor_type: match accessor.dimensions() {
            Dimensions::Scalar => AccessorType::Scalar,
            Dimensions::Vec2 => AccessorType::Vec2,
            Dimensions::Vec3 => AccessorType::Vec3,
            Dimensions::Vec4 => AccessorType::Vec4,
            Dimensions::Mat2 => AccessorType::Mat2,
            Dimensions::Mat3 => AccessorType::Mat3,
            Dimensions::Mat4 => AccessorType::Mat4,
        },
        count: accessor.count(),
        normalized: accessor.normalized(),
        min: json_numbers(accessor.min()),
        max: json_numbers(accessor.max()),
    }
}

fn convert_mesh(mesh: &gltf::Mesh<'_>) -> Mesh {
    use gltf::mesh::Mode;

    Mesh {
        primitives: mesh
            .primitives()
            .map(|primitive| Primitive {
                attributes: primitive
                    .attributes()
                    .map(|(semantic, accessor)| (semantic.to_string(), accessor.index()))
                    .collect(),
                indices: primitive.indices().map(|accessor| accessor.index()),
                mode: match primitive.mode() {
                    Mode::Points => PrimitiveMode::Points,
                    Mode::Lines => PrimitiveMode::Lines,
                    Mode::LineLoop => PrimitiveMode::LineLoop,
                    Mode::LineStrip => PrimitiveMode::LineStrip,
                    Mode::Triangles => PrimitiveMode::Triangles,
                    Mode::TriangleStrip => PrimitiveMode::TriangleStrip,
                    Mode::TriangleFan => PrimitiveMode::TriangleFan,
                },
                material: primitive.material().index(),
            })
            .collect(),
    }
}

fn texture_info(info: Option<gltf::texture::Info<'_>>) -> Option<TextureInfo> {
    info.map(|info| TextureInfo {
        texture: info.texture().index(),
        tex_coord: info.tex_coord(),
    })
}

fn convert_material(material: &gltf::Material<'_>) -> Material {
    let pbr = material.pbr_metallic_roughness();
    let defaults = Material::default();
    let normal = material.normal_texture();
    let occlusion = material.occlusion_texture();

    Material {
        base_color_factor: pbr.base_color_factor(),
        base_color_texture: texture_info(pbr.base_color_texture()),
        metallic_factor: pbr.metallic_factor(),
        roughness_factor: pbr.roughness_factor(),
        metallic_roughness_texture: texture_info(pbr.metallic_roughness_texture()),
        normal_texture: normal.as_ref().map(|normal| TextureInfo {
            texture: normal.texture().index(),
            tex_coord: normal.tex_coord(),
        }),
        normal_scale: normal.as_ref().map_or(defaults.normal_scale, |n| n.scale()),
        occlusion_texture: occlusion.as_ref().map(|occlusion| TextureInfo {
            texture: occlusion.texture().index(),
            tex_coord: occlusion.tex_coord(),
        }),
        occlusion_strength: occlusion
            .as_ref()
            .map_or(defaults.occlusion_strength, |o| o.strength()),
        emissive_factor: material.emissive_factor(),
        emissive_texture: texture_info(material.emissive_texture()),
        alpha_mode: match material.alpha_mode() {
            gltf::material::AlphaMode::Opaque => AlphaMode::Opaque,
            gltf::material::AlphaMode::Mask => AlphaMode::Mask,
            gltf::material::AlphaMode::Blend => AlphaMode::Blend,
        },
        alpha_cutoff: material.alpha_cutoff().unwrap_or(defaults.alpha_cutoff),
        double_sided: material.double_sided(),
    }
}

fn convert_node(node: &gltf::Node<'_>) -> Node {
    Node {
        mesh: node.mesh().map(|mesh| mesh.index()),
        children: node.children().map(|child| child.index()).collect(),
        matrix: Mat4::from_cols_array_2d(&node.transform().matrix()).as_dmat4(),
    }
}

fn rtc_center(document: &gltf::Document) -> Option<DVec3> {
    let center = document.extension_value(CESIUM_RTC)?.get("center")?.as_array()?;
    match center.as_slice() {
        [x, y, z] => Some(DVec3::new(x.as_f64()?, y.as_f64()?, z.as_f64()?)),
        _ => {
            tracing::warn!("{CESIUM_RTC} center has {} components", center.len());
            None
        }
    }
}
