//! GPU vertex formats and the logical streams of a packed geometry buffer.

use glam::Vec2;

use crate::model::{AccessorType, ComponentType};

/// Element format of one stream in a packed geometry buffer.
///
/// Only formats a GPU can bind directly are listed: 3-component 8/16-bit
/// integer formats do not exist on the GPU side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Uint32,
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
    Unorm8x2,
    Unorm8x4,
    Unorm16x2,
    Unorm16x4,
    Snorm8x2,
    Snorm8x4,
    Snorm16x2,
    Snorm16x4,
    Uint8x2,
    Uint8x4,
    Uint16x2,
    Uint16x4,
}

impl VertexFormat {
    /// Size of one element in bytes.
    #[must_use]
    pub fn size(self) -> usize {
        match self {
            Self::Unorm8x2 | Self::Snorm8x2 | Self::Uint8x2 => 2,
            Self::Uint32
            | Self::Float32
            | Self::Unorm8x4
            | Self::Snorm8x4
            | Self::Uint8x4
            | Self::Unorm16x2
            | Self::Snorm16x2
            | Self::Uint16x2 => 4,
            Self::Float32x2 | Self::Unorm16x4 | Self::Snorm16x4 | Self::Uint16x4 => 8,
            Self::Float32x3 => 12,
            Self::Float32x4 => 16,
        }
    }

    /// Pick the GPU format that binds an accessor's data without conversion.
    ///
    /// Returns `None` when no such format exists (e.g. unnormalized `u8` vec3).
    #[must_use]
    pub fn from_accessor(
        component_type: ComponentType,
        accessor_type: AccessorType,
        normalized: bool,
    ) -> Option<Self> {
        use AccessorType::{Scalar, Vec2, Vec3, Vec4};
        use ComponentType::{F32, I8, I16, U8, U16, U32};

        match (component_type, accessor_type, normalized) {
            (F32, Scalar, _) => Some(Self::Float32),
            (F32, Vec2, _) => Some(Self::Float32x2),
            (F32, Vec3, _) => Some(Self::Float32x3),
            (F32, Vec4, _) => Some(Self::Float32x4),
            (U32, Scalar, false) => Some(Self::Uint32),
            (U8, Vec2, true) => Some(Self::Unorm8x2),
            (U8, Vec4, true) => Some(Self::Unorm8x4),
            (U16, Vec2, true) => Some(Self::Unorm16x2),
            (U16, Vec4, true) => Some(Self::Unorm16x4),
            (I8, Vec2, true) => Some(Self::Snorm8x2),
            (I8, Vec4, true) => Some(Self::Snorm8x4),
            (I16, Vec2, true) => Some(Self::Snorm16x2),
            (I16, Vec4, true) => Some(Self::Snorm16x4),
            (U8, Vec2, false) => Some(Self::Uint8x2),
            (U8, Vec4, false) => Some(Self::Uint8x4),
            (U16, Vec2, false) => Some(Self::Uint16x2),
            (U16, Vec4, false) => Some(Self::Uint16x4),
            _ => None,
        }
    }

    /// Decode one two-component element to floats, applying normalization.
    ///
    /// Returns `None` for formats that are not two-component.
    #[must_use]
    pub fn decode_vec2(self, bytes: &[u8]) -> Option<Vec2> {
        let pair = |ct: ComponentType, normalized: bool| {
            let size = ct.size();
            Vec2::new(
                crate::accessor::read_component(&bytes[..size], ct, normalized),
                crate::accessor::read_component(&bytes[size..size * 2], ct, normalized),
            )
        };
        match self {
            Self::Float32x2 => Some(pair(ComponentType::F32, false)),
            Self::Unorm8x2 => Some(pair(ComponentType::U8, true)),
            Self::Unorm16x2 => Some(pair(ComponentType::U16, true)),
            Self::Snorm8x2 => Some(pair(ComponentType::I8, true)),
            Self::Snorm16x2 => Some(pair(ComponentType::I16, true)),
            Self::Uint8x2 => Some(pair(ComponentType::U8, false)),
            Self::Uint16x2 => Some(pair(ComponentType::U16, false)),
            _ => None,
        }
    }
}

/// A logical stream inside a packed geometry buffer.
///
/// The declaration order is the packing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StreamKind {
    Indices,
    Position,
    Normal,
    Bitangent,
    Tangent,
    TexCoord0,
    TexCoord1,
    /// Linear RGBA vertex colours.
    Color,
    /// A material-declared custom attribute, by registration order.
    Custom(u16),
}

impl StreamKind {
    /// Stream for texture coordinate slot `channel` (0 or 1).
    #[must_use]
    pub fn texcoord(channel: usize) -> Option<Self> {
        match channel {
            0 => Some(Self::TexCoord0),
            1 => Some(Self::TexCoord1),
            _ => None,
        }
    }
}
