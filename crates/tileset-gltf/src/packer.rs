//! Packing of vertex and index streams into one GPU buffer.
//!
//! Streams are laid out in [`StreamKind`] order. Each stream starts at a byte
//! offset that is a multiple of its element size, so it can be bound as a
//! typed view. A stream with no data (e.g. an absent second UV set) still gets
//! a view of the full vertex count: it aliases an existing region with a
//! compatible offset or, failing that, a zeroed region appended to the end.

use bytemuck::Pod;
use glam::Vec2;

use crate::format::{StreamKind, VertexFormat};

/// Round `offset` up to the next multiple of `alignment`.
///
/// Power-of-two alignments use `(x + a - 1) & !(a - 1)`.
///
/// # Panics
///
/// Panics if `alignment` is zero.
#[must_use]
pub fn align_to(offset: usize, alignment: usize) -> usize {
    assert!(alignment > 0, "alignment must be non-zero");
    if alignment.is_power_of_two() {
        (offset + alignment - 1) & !(alignment - 1)
    } else {
        offset.div_ceil(alignment) * alignment
    }
}

/// Description of one stream to be packed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamDesc {
    pub kind: StreamKind,
    pub format: VertexFormat,
    /// Element count. Zero marks a placeholder stream.
    pub count: usize,
}

/// Location of one stream inside a packed buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferView {
    pub kind: StreamKind,
    pub format: VertexFormat,
    /// Byte offset from the start of the buffer.
    pub offset: usize,
    pub count: usize,
    /// Whether the view aliases don't-care data.
    pub placeholder: bool,
}

impl BufferView {
    /// Byte length of the view.
    #[must_use]
    pub fn byte_length(&self) -> usize {
        self.count * self.format.size()
    }
}

/// Result of [`compute_layout`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferLayout {
    pub views: Vec<BufferView>,
    /// Size of the whole buffer in bytes.
    pub total_size: usize,
}

impl BufferLayout {
    /// View for a stream kind.
    #[must_use]
    pub fn view(&self, kind: StreamKind) -> Option<&BufferView> {
        self.views.iter().find(|view| view.kind == kind)
    }
}

/// Compute byte offsets for `streams`.
///
/// Placeholder streams (`count == 0`) get `vertex_count` elements.
#[must_use]
pub fn compute_layout(streams: &[StreamDesc], vertex_count: usize) -> BufferLayout {
    let mut ordered = streams.to_vec();
    ordered.sort_by_key(|stream| stream.kind);

    let mut views = Vec::with_capacity(ordered.len());
    let mut total_size = 0;
    for stream in ordered.iter().filter(|stream| stream.count > 0) {
        let offset = align_to(total_size, stream.format.size());
        total_size = offset + stream.count * stream.format.size();
        views.push(BufferView {
            kind: stream.kind,
            format: stream.format,
            offset,
            count: stream.count,
            placeholder: false,
        });
    }

    for stream in ordered.iter().filter(|stream| stream.count == 0) {
        let element_size = stream.format.size();
        let needed = vertex_count * element_size;
        let reusable = views
            .iter()
            .find(|view| view.offset % element_size == 0 && view.byte_length() >= needed)
            .map(|view| view.offset);
        let offset = reusable.unwrap_or_else(|| {
            let offset = align_to(total_size, element_size);
            total_size = offset + needed;
            offset
        });
        views.push(BufferView {
            kind: stream.kind,
            format: stream.format,
            offset,
            count: vertex_count,
            placeholder: true,
        });
    }

    views.sort_by_key(|view| view.kind);
    BufferLayout { views, total_size }
}

/// Accumulates streams and writes them into a single packed buffer.
#[derive(Debug, Default)]
pub struct GeometryPacker {
    vertex_count: usize,
    streams: Vec<(StreamDesc, Vec<u8>)>,
}

impl GeometryPacker {
    /// A packer for geometry with `vertex_count` vertices.
    #[must_use]
    pub fn new(vertex_count: usize) -> Self {
        Self {
            vertex_count,
            streams: Vec::new(),
        }
    }

    /// Add the index stream.
    pub fn push_indices(&mut self, indices: &[u32]) -> &mut Self {
        self.push(StreamKind::Indices, VertexFormat::Uint32, indices)
    }

    /// Add a stream of plain-old-data elements of the given format.
    ///
    /// An empty slice is recorded as a placeholder.
    pub fn push<T: Pod>(&mut self, kind: StreamKind, format: VertexFormat, data: &[T]) -> &mut Self {
        debug_assert_eq!(std::mem::size_of::<T>(), format.size());
        self.push_raw(kind, format, bytemuck::cast_slice(data).to_vec())
    }

    /// Add a stream from already-encoded bytes.
    pub fn push_raw(&mut self, kind: StreamKind, format: VertexFormat, bytes: Vec<u8>) -> &mut Self {
        assert!(
            bytes.len() % format.size() == 0,
            "{kind:?} stream of {} bytes is not a whole number of {format:?} elements",
            bytes.len()
        );
        let count = bytes.len() / format.size();
        self.streams.push((StreamDesc { kind, format, count }, bytes));
        self
    }

    /// Reserve a don't-care view for a stream with no data.
    pub fn push_placeholder(&mut self, kind: StreamKind, format: VertexFormat) -> &mut Self {
        self.push_raw(kind, format, Vec::new())
    }

    /// Lay out and copy all streams.
    #[must_use]
    pub fn finish(self) -> PackedBuffer {
        let descs: Vec<StreamDesc> = self.streams.iter().map(|(desc, _)| *desc).collect();
        let layout = compute_layout(&descs, self.vertex_count);

        let mut data = vec![0u8; layout.total_size];
        for (desc, bytes) in &self.streams {
            if bytes.is_empty() {
                continue;
            }
            if let Some(view) = layout.view(desc.kind) {
                data[view.offset..view.offset + bytes.len()].copy_from_slice(bytes);
            }
        }

        PackedBuffer { data, layout }
    }
}

/// A packed geometry buffer and its stream views.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackedBuffer {
    pub data: Vec<u8>,
    pub layout: BufferLayout,
}

impl PackedBuffer {
    #[must_use]
    pub fn view(&self, kind: StreamKind) -> Option<&BufferView> {
        self.layout.view(kind)
    }

    /// Raw bytes of a stream.
    #[must_use]
    pub fn bytes(&self, kind: StreamKind) -> Option<&[u8]> {
        let view = self.view(kind)?;
        self.data.get(view.offset..view.offset + view.byte_length())
    }

    /// Read a stream back as elements of `T`.
    ///
    /// Returns `None` if the stream is missing, is a placeholder, or its
    /// element size differs from `T`.
    #[must_use]
    pub fn read<T: Pod>(&self, kind: StreamKind) -> Option<Vec<T>> {
        let view = self.view(kind)?;
        if view.placeholder || view.format.size() != std::mem::size_of::<T>() {
            return None;
        }
        let bytes = self.bytes(kind)?;
        Some(
            bytes
                .chunks_exact(std::mem::size_of::<T>())
                .map(bytemuck::pod_read_unaligned)
                .collect(),
        )
    }

    /// Read a two-component stream as floats, applying its normalization.
    #[must_use]
    pub fn read_vec2(&self, kind: StreamKind) -> Option<Vec<Vec2>> {
        let view = self.view(kind)?;
        if view.placeholder {
            return None;
        }
        let bytes = self.bytes(kind)?;
        bytes
            .chunks_exact(view.format.size())
            .map(|element| view.format.decode_vec2(element))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use proptest::prelude::*;

    #[test]
    fn test_align_to() {
        assert_eq!(align_to(0, 4), 0);
        assert_eq!(align_to(5, 4), 8);
        assert_eq!(align_to(8, 8), 8);
        assert_eq!(align_to(40, 12), 48);
    }

    #[test]
    #[should_panic(expected = "alignment must be non-zero")]
    fn test_align_to_zero_panics() {
        let _ = align_to(3, 0);
    }

    #[test]
    fn test_two_stream_layout() {
        let layout = compute_layout(
            &[
                StreamDesc {
                    kind: StreamKind::Indices,
                    format: VertexFormat::Uint32,
                    count: 10,
                },
                StreamDesc {
                    kind: StreamKind::Position,
                    format: VertexFormat::Float32x3,
                    count: 5,
                },
            ],
            5,
        );
        assert_eq!(layout.view(StreamKind::Indices).unwrap().offset, 0);
        assert_eq!(layout.view(StreamKind::Position).unwrap().offset, 48);
        assert_eq!(layout.total_size, 108);
    }

    #[test]
    fn test_layout_uses_stream_order() {
        let layout = compute_layout(
            &[
                StreamDesc {
                    kind: StreamKind::TexCoord0,
                    format: VertexFormat::Float32x2,
                    count: 3,
                },
                StreamDesc {
                    kind: StreamKind::Position,
                    format: VertexFormat::Float32x3,
                    count: 3,
                },
            ],
            3,
        );
        let kinds: Vec<_> = layout.views.iter().map(|v| v.kind).collect();
        assert_eq!(kinds, vec![StreamKind::Position, StreamKind::TexCoord0]);
        assert_eq!(layout.view(StreamKind::TexCoord0).unwrap().offset, 40);
    }

    #[test]
    fn test_placeholder_reuses_region() {
        let mut packer = GeometryPacker::new(3);
        packer
            .push_indices(&[0, 1, 2, 2, 1, 0])
            .push(StreamKind::Position, VertexFormat::Float32x3, &[Vec3::ZERO; 3])
            .push_placeholder(StreamKind::TexCoord1, VertexFormat::Float32x2);
        let packed = packer.finish();

        // 24 bytes of indices at offset 0 can back three Float32x2 elements.
        let uv1 = packed.view(StreamKind::TexCoord1).unwrap();
        assert!(uv1.placeholder);
        assert_eq!(uv1.count, 3);
        assert_eq!(uv1.offset, 0);
        assert_eq!(packed.data.len(), 24 + 36);
    }

    #[test]
    fn test_placeholder_appends_when_nothing_fits() {
        let mut packer = GeometryPacker::new(4);
        packer
            .push_indices(&[0, 1, 2])
            .push_placeholder(StreamKind::Tangent, VertexFormat::Float32x4);
        let packed = packer.finish();

        let tangent = packed.view(StreamKind::Tangent).unwrap();
        assert_eq!(tangent.offset, 16);
        assert_eq!(packed.data.len(), 16 + 64);
        assert!(packed.data[16..].iter().all(|b| *b == 0));
        assert!(packed.read::<[f32; 4]>(StreamKind::Tangent).is_none());
    }

    #[test]
    fn test_round_trip() {
        let indices = [0u32, 1, 2, 2, 1, 3];
        let positions = [Vec3::X, Vec3::Y, Vec3::Z, Vec3::ONE];
        let uvs: [u8; 8] = [0, 255, 128, 64, 255, 255, 0, 0];

        let mut packer = GeometryPacker::new(4);
        packer
            .push_indices(&indices)
            .push(StreamKind::Position, VertexFormat::Float32x3, &positions)
            .push_raw(StreamKind::TexCoord0, VertexFormat::Unorm8x2, uvs.to_vec());
        let packed = packer.finish();

        assert_eq!(packed.read::<u32>(StreamKind::Indices).unwrap(), indices);
        assert_eq!(packed.read::<Vec3>(StreamKind::Position).unwrap(), positions);
        assert_eq!(packed.bytes(StreamKind::TexCoord0).unwrap(), &uvs);
        let decoded = packed.read_vec2(StreamKind::TexCoord0).unwrap();
        assert!((decoded[0] - Vec2::new(0.0, 1.0)).length() < 1e-6);
    }

    proptest! {
        #[test]
        fn offsets_are_aligned_and_disjoint(
            counts in proptest::collection::vec(1usize..50, 1..6)
        ) {
            let formats = [
                VertexFormat::Uint32,
                VertexFormat::Float32x3,
                VertexFormat::Float32x3,
                VertexFormat::Float32x4,
                VertexFormat::Unorm8x2,
                VertexFormat::Float32x2,
            ];
            let kinds = [
                StreamKind::Indices,
                StreamKind::Position,
                StreamKind::Normal,
                StreamKind::Tangent,
                StreamKind::TexCoord0,
                StreamKind::TexCoord1,
            ];
            let streams: Vec<StreamDesc> = counts
                .iter()
                .enumerate()
                .map(|(i, &count)| StreamDesc { kind: kinds[i], format: formats[i], count })
                .collect();
            let layout = compute_layout(&streams, 0);

            let mut end = 0;
            for view in &layout.views {
                prop_assert_eq!(view.offset % view.format.size(), 0);
                prop_assert!(view.offset >= end);
                end = view.offset + view.byte_length();
            }
            prop_assert_eq!(layout.total_size, end);
        }
    }
}
