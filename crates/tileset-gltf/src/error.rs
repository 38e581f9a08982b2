//! Error types for geometry preparation.

use std::fmt;

use crate::model::PrimitiveMode;

/// Errors that can occur while turning a glTF primitive into GPU geometry.
///
/// None of these abort a whole model: the primitive builder turns them into
/// "skip this primitive" or "fall back to a generated value" decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    /// The primitive topology cannot be expanded into a triangle list.
    UnsupportedTopology(PrimitiveMode),
    /// A triangle list whose index count is not a multiple of three.
    IndexCountNotMultipleOfThree { count: usize },
    /// A strip or fan with too few indices to form a triangle.
    NotEnoughIndices { mode: PrimitiveMode, count: usize },
    /// The primitive has no usable `POSITION` accessor.
    MissingPositions,
    /// An accessor is malformed or does not match the expected element type.
    InvalidAccessor {
        context: &'static str,
        detail: String,
    },
    /// Index out of bounds.
    IndexOutOfBounds { index: usize, len: usize },
    /// The glTF document could not be imported.
    Import(String),
}

impl fmt::Display for GeometryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedTopology(mode) => {
                write!(f, "unsupported primitive topology {mode:?}")
            }
            Self::IndexCountNotMultipleOfThree { count } => {
                write!(f, "triangle list has {count} indices, not a multiple of 3")
            }
            Self::NotEnoughIndices { mode, count } => {
                write!(f, "{mode:?} needs at least 3 indices, got {count}")
            }
            Self::MissingPositions => write!(f, "primitive has no valid POSITION accessor"),
            Self::InvalidAccessor { context, detail } => {
                write!(f, "invalid accessor in {context}: {detail}")
            }
            Self::IndexOutOfBounds { index, len } => {
                write!(f, "index {index} out of bounds for length {len}")
            }
            Self::Import(message) => write!(f, "failed to import glTF: {message}"),
        }
    }
}

impl std::error::Error for GeometryError {}

/// Result type for geometry operations.
pub type GeometryResult<T> = Result<T, GeometryError>;
