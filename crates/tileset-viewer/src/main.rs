//! Viewer for glTF tile payloads.
//!
//! Every `.glb` file given on the command line is streamed in as one tile,
//! laid out side by side along +X. An optional image is draped over all of
//! them as a raster overlay.

use std::path::{Path, PathBuf};

use bevy::prelude::*;
use clap::Parser;
use glam::{DMat4, DVec3};
use tileset_gltf::{TextureData, UpAxis};
use tileset_render::PreparerConfig;
use tileset_viewer::plugin::{
    TileState, Tileset, TilesetPlugin, TilesetResources, tileset_bounds,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum UpAxisArg {
    X,
    Y,
    Z,
}

impl From<UpAxisArg> for UpAxis {
    fn from(axis: UpAxisArg) -> Self {
        match axis {
            UpAxisArg::X => UpAxis::X,
            UpAxisArg::Y => UpAxis::Y,
            UpAxisArg::Z => UpAxis::Z,
        }
    }
}

#[derive(Parser)]
#[command(about = "View glTF tiles through the two-phase render preparer")]
struct CliArgs {
    /// Tile payloads (.glb).
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Up axis of the glTF content.
    #[arg(long, value_enum, default_value_t = UpAxisArg::Y)]
    up_axis: UpAxisArg,

    /// Distance between tiles along +X, in meters.
    #[arg(long, default_value_t = 0.0)]
    spacing: f64,

    /// Image draped over every tile as a raster overlay.
    #[arg(long)]
    overlay: Option<PathBuf>,

    /// Use plain PBR materials without raster overlay slots.
    #[arg(long)]
    no_raster_overlays: bool,

    /// Only generate tangents for materials with a normal texture.
    #[arg(long)]
    lazy_tangents: bool,

    /// Limit raster overlay mip levels.
    #[arg(long)]
    max_mip_levels: Option<u32>,
}

impl CliArgs {
    fn config(&self) -> PreparerConfig {
        PreparerConfig {
            require_tangents: !self.lazy_tangents,
            raster_overlays: !self.no_raster_overlays,
            max_mip_levels: self.max_mip_levels,
            up_axis: self.up_axis.into(),
            ..PreparerConfig::default()
        }
    }
}

/// Payloads read at startup, handed to the tileset on the first frame.
#[derive(Resource)]
struct InitialTiles {
    tiles: Vec<(Vec<u8>, DMat4)>,
    overlay: Option<TextureData>,
}

/// Whether the camera has been placed around the loaded tiles.
#[derive(Resource, Default)]
struct CameraFramed(bool);

fn read_overlay(path: &Path) -> Option<TextureData> {
    match image::open(path) {
        Ok(image) => {
            let rgba = image.to_rgba8();
            Some(TextureData {
                width: rgba.width(),
                height: rgba.height(),
                pixels: rgba.into_raw(),
            })
        }
        Err(e) => {
            tracing::error!("Failed to read overlay {}: {}", path.display(), e);
            None
        }
    }
}

#[allow(clippy::needless_pass_by_value)]
fn setup_scene(mut commands: Commands, mut tileset: ResMut<Tileset>, initial: Res<InitialTiles>) {
    for (bytes, transform) in &initial.tiles {
        tileset.load(bytes.as_slice(), *transform);
    }
    if let Some(overlay) = &initial.overlay {
        tileset.drape(overlay.clone());
    }
    commands.remove_resource::<InitialTiles>();

    commands.spawn((
        Camera3d::default(),
        Transform::from_xyz(0.0, -50.0, 50.0).looking_at(Vec3::ZERO, Vec3::Z),
    ));
    commands.spawn((
        DirectionalLight {
            illuminance: 10_000.0,
            ..default()
        },
        Transform::from_xyz(1.0, -1.0, 2.0).looking_at(Vec3::ZERO, Vec3::Z),
    ));

    tracing::info!("Scene setup complete");
}

/// Point the camera at the tiles once all of them have settled.
#[allow(clippy::needless_pass_by_value)]
fn frame_camera(
    tileset: Res<Tileset>,
    resources: Res<TilesetResources>,
    mut framed: ResMut<CameraFramed>,
    mut cameras: Query<&mut Transform, With<Camera3d>>,
) {
    if framed.0
        || tileset
            .iter()
            .any(|(_, state)| state == TileState::Loading)
    {
        return;
    }
    let bounds = tileset_bounds(&tileset, &resources);
    if bounds.is_empty() {
        return;
    }

    let center = bounds.center();
    let radius = ((bounds.max - bounds.min).length() * 0.5).max(1.0);
    let eye = center + DVec3::new(0.0, -2.0, 1.5) * radius;
    for mut transform in &mut cameras {
        *transform = Transform::from_translation(eye.as_vec3())
            .looking_at(center.as_vec3(), Vec3::Z);
    }
    framed.0 = true;
    tracing::info!(
        "Framed tiles: center=({:.1}, {:.1}, {:.1}) radius={:.1}",
        center.x,
        center.y,
        center.z,
        radius
    );
}

fn main() {
    {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    let args = CliArgs::parse();

    let mut tiles = Vec::with_capacity(args.files.len());
    let mut offset = 0.0;
    for path in &args.files {
        match std::fs::read(path) {
            Ok(bytes) => {
                tracing::info!("Loading {} ({} bytes)", path.display(), bytes.len());
                let transform = DMat4::from_translation(DVec3::new(offset, 0.0, 0.0));
                tiles.push((bytes, transform));
                offset += args.spacing;
            }
            Err(e) => tracing::error!("Failed to read {}: {}", path.display(), e),
        }
    }
    let overlay = args.overlay.as_deref().and_then(read_overlay);

    let plugin = match TilesetPlugin::new(args.config()) {
        Ok(plugin) => plugin,
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(1);
        }
    };

    App::new()
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: "tileset-viewer".to_string(),
                resolution: (1280, 720).into(),
                ..Default::default()
            }),
            ..Default::default()
        }))
        .add_plugins(plugin)
        .insert_resource(InitialTiles { tiles, overlay })
        .init_resource::<CameraFramed>()
        .add_systems(Startup, setup_scene)
        .add_systems(Update, frame_camera)
        .run();
}
