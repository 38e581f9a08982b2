//! Error types for the tileset-render crate.

use std::fmt;

use tileset_gltf::GeometryError;

/// Result type for render resource operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while realizing or updating tile resources.
#[derive(Debug)]
pub enum Error {
    /// Geometry preparation failed.
    Geometry(GeometryError),
    /// The renderer rejected a request.
    Renderer {
        /// The operation that failed.
        operation: &'static str,
        /// The error message.
        message: String,
    },
    /// A handle refers to a resource that has already been freed.
    StaleHandle {
        /// The kind of resource the handle refers to.
        kind: &'static str,
    },
    /// A raster was attached for an overlay that holds no raster layer.
    MissingRasterLayer {
        /// The overlay without a layer.
        overlay: u64,
    },
    /// Invalid configuration.
    Config(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Geometry(e) => write!(f, "geometry error: {e}"),
            Error::Renderer { operation, message } => {
                write!(f, "renderer {operation} failed: {message}")
            }
            Error::StaleHandle { kind } => write!(f, "stale {kind} handle"),
            Error::MissingRasterLayer { overlay } => {
                write!(f, "overlay {overlay} has no raster layer")
            }
            Error::Config(message) => write!(f, "invalid configuration: {message}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Geometry(e) => Some(e),
            _ => None,
        }
    }
}

impl From<GeometryError> for Error {
    fn from(e: GeometryError) -> Self {
        Error::Geometry(e)
    }
}
