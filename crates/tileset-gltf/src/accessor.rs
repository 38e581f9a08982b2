//! Typed views over glTF accessors.
//!
//! An accessor describes how to interpret a (possibly interleaved) region of
//! a buffer as an array of scalars or vectors. [`AccessorView`] validates that
//! description once and then yields decoded elements by logical index,
//! converting from whatever component type the data was stored in.

use std::marker::PhantomData;

use glam::{Vec2, Vec3, Vec4};

use crate::error::{GeometryError, GeometryResult};
use crate::model::{AccessorType, ComponentType, Model};

/// Outcome of validating an accessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessorStatus {
    /// No accessor was referenced.
    Absent,
    /// The accessor exists but is malformed or of the wrong type.
    Invalid,
    /// The accessor can be read.
    Valid,
}

/// Read one component, rescaling normalized integers to `[0, 1]` or `[-1, 1]`.
///
/// `bytes` must hold at least `component_type.size()` bytes.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn read_component(bytes: &[u8], component_type: ComponentType, normalized: bool) -> f32 {
    match component_type {
        ComponentType::I8 => {
            let value = f32::from(i8::from_le_bytes([bytes[0]]));
            if normalized {
                (value / 127.0).max(-1.0)
            } else {
                value
            }
        }
        ComponentType::U8 => {
            let value = f32::from(bytes[0]);
            if normalized { value / 255.0 } else { value }
        }
        ComponentType::I16 => {
            let value = f32::from(i16::from_le_bytes([bytes[0], bytes[1]]));
            if normalized {
                (value / 32767.0).max(-1.0)
            } else {
                value
            }
        }
        ComponentType::U16 => {
            let value = f32::from(u16::from_le_bytes([bytes[0], bytes[1]]));
            if normalized { value / 65535.0 } else { value }
        }
        ComponentType::U32 => {
            let value = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            if normalized {
                (f64::from(value) / f64::from(u32::MAX)) as f32
            } else {
                value as f32
            }
        }
        ComponentType::F32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
    }
}

/// An element type that can be decoded from accessor data.
pub trait AccessorElement: Copy {
    /// The accessor cardinality this element expects.
    const ACCESSOR_TYPE: AccessorType;

    /// Whether data stored with `component_type` can be decoded into this element.
    fn accepts(component_type: ComponentType) -> bool {
        let _ = component_type;
        true
    }

    /// Decode one element from `bytes` (exactly one element long).
    fn decode(bytes: &[u8], component_type: ComponentType, normalized: bool) -> Self;
}

fn read_components<const N: usize>(
    bytes: &[u8],
    component_type: ComponentType,
    normalized: bool,
) -> [f32; N] {
    let size = component_type.size();
    std::array::from_fn(|i| read_component(&bytes[i * size..], component_type, normalized))
}

impl AccessorElement for f32 {
    const ACCESSOR_TYPE: AccessorType = AccessorType::Scalar;

    fn decode(bytes: &[u8], component_type: ComponentType, normalized: bool) -> Self {
        read_component(bytes, component_type, normalized)
    }
}

impl AccessorElement for Vec2 {
    const ACCESSOR_TYPE: AccessorType = AccessorType::Vec2;

    fn decode(bytes: &[u8], component_type: ComponentType, normalized: bool) -> Self {
        Vec2::from_array(read_components(bytes, component_type, normalized))
    }
}

impl AccessorElement for Vec3 {
    const ACCESSOR_TYPE: AccessorType = AccessorType::Vec3;

    fn decode(bytes: &[u8], component_type: ComponentType, normalized: bool) -> Self {
        Vec3::from_array(read_components(bytes, component_type, normalized))
    }
}

impl AccessorElement for Vec4 {
    const ACCESSOR_TYPE: AccessorType = AccessorType::Vec4;

    fn decode(bytes: &[u8], component_type: ComponentType, normalized: bool) -> Self {
        Vec4::from_array(read_components(bytes, component_type, normalized))
    }
}

/// Vertex indices: unsigned integers only, never rescaled.
impl AccessorElement for u32 {
    const ACCESSOR_TYPE: AccessorType = AccessorType::Scalar;

    fn accepts(component_type: ComponentType) -> bool {
        matches!(
            component_type,
            ComponentType::U8 | ComponentType::U16 | ComponentType::U32
        )
    }

    fn decode(bytes: &[u8], component_type: ComponentType, _normalized: bool) -> Self {
        match component_type {
            ComponentType::U8 => u32::from(bytes[0]),
            ComponentType::U16 => u32::from(u16::from_le_bytes([bytes[0], bytes[1]])),
            _ => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        }
    }
}

/// Untyped, validated access to the raw bytes of an accessor's elements.
#[derive(Debug, Clone, Copy)]
pub struct AccessorBytes<'a> {
    data: &'a [u8],
    stride: usize,
    element_size: usize,
    count: usize,
    component_type: ComponentType,
    accessor_type: AccessorType,
    normalized: bool,
    status: AccessorStatus,
}

impl<'a> AccessorBytes<'a> {
    fn with_status(status: AccessorStatus) -> Self {
        Self {
            data: &[],
            stride: 0,
            element_size: 0,
            count: 0,
            component_type: ComponentType::F32,
            accessor_type: AccessorType::Scalar,
            normalized: false,
            status,
        }
    }

    /// Validate accessor `index` of `model`.
    ///
    /// The view is [`AccessorStatus::Absent`] when `index` is `None`, and
    /// [`AccessorStatus::Invalid`] when the accessor, its buffer view or its
    /// buffer is missing, or the buffer is too short for `count` elements at
    /// the declared stride.
    #[must_use]
    pub fn new(model: &'a Model, index: Option<usize>) -> Self {
        let Some(index) = index else {
            return Self::with_status(AccessorStatus::Absent);
        };
        match Self::validate(model, index) {
            Ok(view) => view,
            Err(e) => {
                tracing::debug!("accessor {index} rejected: {e}");
                Self::with_status(AccessorStatus::Invalid)
            }
        }
    }

    fn validate(model: &'a Model, index: usize) -> GeometryResult<Self> {
        let invalid = |detail: String| GeometryError::InvalidAccessor {
            context: "accessor",
            detail,
        };

        let accessor = model.accessors.get(index).ok_or(GeometryError::IndexOutOfBounds {
            index,
            len: model.accessors.len(),
        })?;
        let view_index = accessor
            .buffer_view
            .ok_or_else(|| invalid("no buffer view (sparse or zero-filled data)".to_string()))?;
        let view = model
            .buffer_views
            .get(view_index)
            .ok_or_else(|| invalid(format!("buffer view {view_index} does not exist")))?;
        let buffer = model
            .buffers
            .get(view.buffer)
            .ok_or_else(|| invalid(format!("buffer {} does not exist", view.buffer)))?;

        let element_size =
            accessor.component_type.size() * accessor.accessor_type.component_count();
        let stride = view.byte_stride.unwrap_or(element_size);
        if stride < element_size {
            return Err(invalid(format!(
                "stride {stride} is smaller than element size {element_size}"
            )));
        }

        let view_end = view
            .byte_offset
            .checked_add(view.byte_length)
            .filter(|end| *end <= buffer.data.len())
            .ok_or_else(|| invalid("buffer view extends past its buffer".to_string()))?;
        let start = view
            .byte_offset
            .checked_add(accessor.byte_offset)
            .ok_or_else(|| invalid("byte offset overflow".to_string()))?;
        let end = if accessor.count == 0 {
            Some(start)
        } else {
            stride
                .checked_mul(accessor.count - 1)
                .and_then(|span| span.checked_add(element_size))
                .and_then(|span| start.checked_add(span))
        }
        .filter(|end| *end <= view_end)
        .ok_or_else(|| {
            invalid(format!(
                "{} elements of {element_size} bytes at stride {stride} do not fit in {} bytes",
                accessor.count, view.byte_length
            ))
        })?;

        Ok(Self {
            data: &buffer.data[start..end],
            stride,
            element_size,
            count: accessor.count,
            component_type: accessor.component_type,
            accessor_type: accessor.accessor_type,
            normalized: accessor.normalized,
            status: AccessorStatus::Valid,
        })
    }

    #[must_use]
    pub fn status(&self) -> AccessorStatus {
        self.status
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.status == AccessorStatus::Valid
    }

    /// Number of elements. Zero unless the view is valid.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[must_use]
    pub fn component_type(&self) -> ComponentType {
        self.component_type
    }

    #[must_use]
    pub fn accessor_type(&self) -> AccessorType {
        self.accessor_type
    }

    #[must_use]
    pub fn normalized(&self) -> bool {
        self.normalized
    }

    #[must_use]
    pub fn element_size(&self) -> usize {
        self.element_size
    }

    /// Raw bytes of element `index`.
    pub fn element(&self, index: usize) -> GeometryResult<&'a [u8]> {
        if self.status != AccessorStatus::Valid {
            return Err(GeometryError::InvalidAccessor {
                context: "element",
                detail: format!("accessor is {:?}", self.status),
            });
        }
        if index >= self.count {
            return Err(GeometryError::IndexOutOfBounds {
                index,
                len: self.count,
            });
        }
        let start = index * self.stride;
        Ok(&self.data[start..start + self.element_size])
    }

    /// Copy all elements into a tightly packed byte vector.
    #[must_use]
    pub fn to_packed_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.count * self.element_size);
        for index in 0..self.count {
            let start = index * self.stride;
            out.extend_from_slice(&self.data[start..start + self.element_size]);
        }
        out
    }
}

/// A validated accessor that decodes elements of type `T`.
#[derive(Debug, Clone, Copy)]
pub struct AccessorView<'a, T> {
    bytes: AccessorBytes<'a>,
    _marker: PhantomData<T>,
}

impl<'a, T: AccessorElement> AccessorView<'a, T> {
    /// Validate accessor `index` of `model` for element type `T`.
    ///
    /// Besides the checks of [`AccessorBytes::new`], the accessor's
    /// cardinality must match `T` and its component type must be decodable
    /// into `T`.
    #[must_use]
    pub fn new(model: &'a Model, index: Option<usize>) -> Self {
        let bytes = AccessorBytes::new(model, index);
        let bytes = if bytes.is_valid()
            && (bytes.accessor_type != T::ACCESSOR_TYPE || !T::accepts(bytes.component_type))
        {
            tracing::debug!(
                "accessor {index:?} is {:?}/{:?}, expected {:?}",
                bytes.accessor_type,
                bytes.component_type,
                T::ACCESSOR_TYPE
            );
            AccessorBytes::with_status(AccessorStatus::Invalid)
        } else {
            bytes
        };
        Self {
            bytes,
            _marker: PhantomData,
        }
    }

    #[must_use]
    pub fn status(&self) -> AccessorStatus {
        self.bytes.status
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.bytes.is_valid()
    }

    /// Number of elements. Zero unless the view is valid.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.count == 0
    }

    /// The untyped view this typed view wraps.
    #[must_use]
    pub fn bytes(&self) -> &AccessorBytes<'a> {
        &self.bytes
    }

    /// Decode element `index`.
    pub fn get(&self, index: usize) -> GeometryResult<T> {
        let element = self.bytes.element(index)?;
        Ok(T::decode(
            element,
            self.bytes.component_type,
            self.bytes.normalized,
        ))
    }

    /// Iterate over all decoded elements.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        (0..self.len()).filter_map(|i| self.get(i).ok())
    }

    /// Decode every element into a vector.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Accessor, Buffer, BufferView};
    use proptest::prelude::*;

    fn model_with(
        data: Vec<u8>,
        stride: Option<usize>,
        component_type: ComponentType,
        accessor_type: AccessorType,
        count: usize,
        normalized: bool,
    ) -> Model {
        let byte_length = data.len();
        Model {
            buffers: vec![Buffer { data }],
            buffer_views: vec![BufferView {
                buffer: 0,
                byte_offset: 0,
                byte_length,
                byte_stride: stride,
            }],
            accessors: vec![Accessor {
                buffer_view: Some(0),
                byte_offset: 0,
                component_type,
                accessor_type,
                count,
                normalized,
                min: Vec::new(),
                max: Vec::new(),
            }],
            ..Model::default()
        }
    }

    #[test]
    fn test_absent_accessor() {
        let model = Model::default();
        let view = AccessorView::<Vec3>::new(&model, None);
        assert_eq!(view.status(), AccessorStatus::Absent);
        assert_eq!(view.len(), 0);
    }

    #[test]
    fn test_missing_accessor_is_invalid() {
        let model = Model::default();
        let view = AccessorView::<Vec3>::new(&model, Some(3));
        assert_eq!(view.status(), AccessorStatus::Invalid);
    }

    #[test]
    fn test_normalized_u8() {
        let model = model_with(
            vec![255, 0],
            None,
            ComponentType::U8,
            AccessorType::Scalar,
            2,
            true,
        );
        let view = AccessorView::<f32>::new(&model, Some(0));
        assert!(view.is_valid());
        assert!((view.get(0).unwrap() - 1.0).abs() < 1e-6);
        assert!(view.get(1).unwrap().abs() < 1e-6);
    }

    #[test]
    fn test_normalized_signed_clamps_to_minus_one() {
        let model = model_with(
            vec![0x80, 0x7f],
            None,
            ComponentType::I8,
            AccessorType::Scalar,
            2,
            true,
        );
        let view = AccessorView::<f32>::new(&model, Some(0));
        assert!((view.get(0).unwrap() + 1.0).abs() < 1e-6);
        assert!((view.get(1).unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_unnormalized_i16() {
        let model = model_with(
            (-300i16).to_le_bytes().to_vec(),
            None,
            ComponentType::I16,
            AccessorType::Scalar,
            1,
            false,
        );
        let view = AccessorView::<f32>::new(&model, Some(0));
        assert!((view.get(0).unwrap() + 300.0).abs() < 1e-6);
    }

    #[test]
    fn test_interleaved_stride() {
        // Two Vec2<f32> elements interleaved with 4 bytes of padding each.
        let mut data = Vec::new();
        for (u, v) in [(0.25f32, 0.5f32), (0.75, 1.0)] {
            data.extend_from_slice(&u.to_le_bytes());
            data.extend_from_slice(&v.to_le_bytes());
            data.extend_from_slice(&[0xAA; 4]);
        }
        let model = model_with(data, Some(12), ComponentType::F32, AccessorType::Vec2, 2, false);
        let view = AccessorView::<Vec2>::new(&model, Some(0));
        assert_eq!(view.to_vec(), vec![Vec2::new(0.25, 0.5), Vec2::new(0.75, 1.0)]);
    }

    #[test]
    fn test_buffer_too_short_is_invalid() {
        // Three Vec3<f32> need 36 bytes.
        let model = model_with(
            vec![0; 30],
            None,
            ComponentType::F32,
            AccessorType::Vec3,
            3,
            false,
        );
        let view = AccessorView::<Vec3>::new(&model, Some(0));
        assert_eq!(view.status(), AccessorStatus::Invalid);
    }

    #[test]
    fn test_stride_smaller_than_element_is_invalid() {
        let model = model_with(
            vec![0; 64],
            Some(8),
            ComponentType::F32,
            AccessorType::Vec3,
            2,
            false,
        );
        assert!(!AccessorView::<Vec3>::new(&model, Some(0)).is_valid());
    }

    #[test]
    fn test_wrong_cardinality_is_invalid() {
        let model = model_with(
            vec![0; 24],
            None,
            ComponentType::F32,
            AccessorType::Vec3,
            2,
            false,
        );
        assert!(!AccessorView::<Vec2>::new(&model, Some(0)).is_valid());
    }

    #[test]
    fn test_float_indices_are_invalid() {
        let model = model_with(
            vec![0; 12],
            None,
            ComponentType::F32,
            AccessorType::Scalar,
            3,
            false,
        );
        assert!(!AccessorView::<u32>::new(&model, Some(0)).is_valid());
    }

    #[test]
    fn test_get_out_of_bounds() {
        let model = model_with(
            vec![1, 2, 3],
            None,
            ComponentType::U8,
            AccessorType::Scalar,
            3,
            false,
        );
        let view = AccessorView::<u32>::new(&model, Some(0));
        assert_eq!(view.get(2).unwrap(), 3);
        assert!(matches!(
            view.get(3),
            Err(GeometryError::IndexOutOfBounds { index: 3, len: 3 })
        ));
    }

    #[test]
    fn test_u16_indices() {
        let data: Vec<u8> = [0u16, 1, 65535].iter().flat_map(|i| i.to_le_bytes()).collect();
        let model = model_with(data, None, ComponentType::U16, AccessorType::Scalar, 3, false);
        let view = AccessorView::<u32>::new(&model, Some(0));
        assert_eq!(view.to_vec(), vec![0, 1, 65535]);
    }

    #[test]
    fn test_to_packed_bytes_drops_padding() {
        let data = vec![1, 2, 0, 0, 3, 4, 0, 0];
        let model = model_with(data, Some(4), ComponentType::U8, AccessorType::Vec2, 2, true);
        let bytes = AccessorBytes::new(&model, Some(0));
        assert_eq!(bytes.to_packed_bytes(), vec![1, 2, 3, 4]);
    }

    proptest! {
        #[test]
        fn normalized_unsigned_stays_in_unit_range(value in any::<u16>()) {
            let decoded = read_component(&value.to_le_bytes(), ComponentType::U16, true);
            prop_assert!((0.0..=1.0).contains(&decoded));
        }

        #[test]
        fn normalized_signed_stays_in_signed_unit_range(value in any::<i16>()) {
            let decoded = read_component(&value.to_le_bytes(), ComponentType::I16, true);
            prop_assert!((-1.0..=1.0).contains(&decoded));
        }
    }
}
