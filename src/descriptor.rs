//! Descriptor rows and descriptor matrices.
//!
//! A [`Descriptor`] is one fixed-length feature vector; a [`Descriptors`]
//! matrix stores many rows of the same shape in one contiguous, row-major
//! buffer (SoA layout, like the tree indices use for their vectors).
//!
//! Two element types exist:
//!
//! | Type | Typical source | Native metric |
//! |------|----------------|---------------|
//! | `F32` | SURF/SIFT-like float descriptors | squared L2 |
//! | `U8`  | ORB/BRIEF-like binary descriptors | Hamming |
//!
//! Binary rows can be widened to `F32` (each byte becomes its numeric value)
//! for backends that only search float data. The reverse is not supported.

use crate::error::{IndexError, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Element type of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    F32,
    U8,
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::F32 => write!(f, "f32"),
            ElementType::U8 => write!(f, "u8"),
        }
    }
}

/// Element type plus dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DescriptorShape {
    pub element: ElementType,
    pub dim: usize,
}

impl DescriptorShape {
    pub const fn new(element: ElementType, dim: usize) -> Self {
        Self { element, dim }
    }
}

impl fmt::Display for DescriptorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.element, self.dim)
    }
}

/// A single descriptor row (owned).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Descriptor {
    F32(Vec<f32>),
    U8(Vec<u8>),
}

impl Descriptor {
    pub fn element_type(&self) -> ElementType {
        match self {
            Descriptor::F32(_) => ElementType::F32,
            Descriptor::U8(_) => ElementType::U8,
        }
    }

    pub fn dim(&self) -> usize {
        match self {
            Descriptor::F32(v) => v.len(),
            Descriptor::U8(v) => v.len(),
        }
    }

    pub fn shape(&self) -> DescriptorShape {
        DescriptorShape::new(self.element_type(), self.dim())
    }

    pub fn is_empty(&self) -> bool {
        self.dim() == 0
    }

    /// No NaN or infinite component. Binary descriptors always are.
    pub fn is_finite(&self) -> bool {
        match self {
            Descriptor::F32(v) => v.iter().all(|x| x.is_finite()),
            Descriptor::U8(_) => true,
        }
    }

    /// Borrow as a row view.
    pub fn as_row(&self) -> Row<'_> {
        match self {
            Descriptor::F32(v) => Row::F32(v),
            Descriptor::U8(v) => Row::U8(v),
        }
    }
}

impl From<Vec<f32>> for Descriptor {
    fn from(v: Vec<f32>) -> Self {
        Descriptor::F32(v)
    }
}

impl From<Vec<u8>> for Descriptor {
    fn from(v: Vec<u8>) -> Self {
        Descriptor::U8(v)
    }
}

/// Borrowed view of one descriptor row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Row<'a> {
    F32(&'a [f32]),
    U8(&'a [u8]),
}

impl<'a> Row<'a> {
    pub fn element_type(&self) -> ElementType {
        match self {
            Row::F32(_) => ElementType::F32,
            Row::U8(_) => ElementType::U8,
        }
    }

    pub fn dim(&self) -> usize {
        match self {
            Row::F32(v) => v.len(),
            Row::U8(v) => v.len(),
        }
    }

    pub fn to_descriptor(&self) -> Descriptor {
        match *self {
            Row::F32(v) => Descriptor::F32(v.to_vec()),
            Row::U8(v) => Descriptor::U8(v.to_vec()),
        }
    }
}

/// Row-major storage of a descriptor matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DescriptorData {
    F32(Vec<f32>),
    U8(Vec<u8>),
}

impl DescriptorData {
    fn len(&self) -> usize {
        match self {
            DescriptorData::F32(v) => v.len(),
            DescriptorData::U8(v) => v.len(),
        }
    }

    fn element_type(&self) -> ElementType {
        match self {
            DescriptorData::F32(_) => ElementType::F32,
            DescriptorData::U8(_) => ElementType::U8,
        }
    }
}

#[derive(Deserialize)]
struct DescriptorsRepr {
    dim: usize,
    data: DescriptorData,
}

/// A matrix of descriptors sharing one shape.
///
/// Invariant: `data.len() == rows * dim`, and `dim > 0` whenever `rows > 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DescriptorsRepr")]
pub struct Descriptors {
    dim: usize,
    data: DescriptorData,
}

impl TryFrom<DescriptorsRepr> for Descriptors {
    type Error = IndexError;

    fn try_from(repr: DescriptorsRepr) -> Result<Self> {
        Self::checked(repr.dim, repr.data)
    }
}

impl Descriptors {
    fn checked(dim: usize, data: DescriptorData) -> Result<Self> {
        let len = data.len();
        if (dim == 0 && len != 0) || (dim != 0 && len % dim != 0) {
            return Err(IndexError::InvariantViolation(format!(
                "descriptor buffer of {len} elements is not a multiple of dimension {dim}"
            )));
        }
        Ok(Self { dim, data })
    }

    /// Float matrix from a flat row-major buffer.
    pub fn from_f32(dim: usize, data: Vec<f32>) -> Result<Self> {
        Self::checked(dim, DescriptorData::F32(data))
    }

    /// Binary matrix from a flat row-major buffer.
    pub fn from_u8(dim: usize, data: Vec<u8>) -> Result<Self> {
        Self::checked(dim, DescriptorData::U8(data))
    }

    /// Float matrix from individual rows; all rows must have the same length.
    pub fn from_f32_rows(rows: &[Vec<f32>]) -> Result<Self> {
        let dim = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * dim);
        for row in rows {
            if row.len() != dim {
                return Err(IndexError::InvariantViolation(format!(
                    "row of length {} in a matrix of dimension {dim}",
                    row.len()
                )));
            }
            data.extend_from_slice(row);
        }
        Self::from_f32(dim, data)
    }

    /// Binary matrix from individual rows; all rows must have the same length.
    pub fn from_u8_rows(rows: &[Vec<u8>]) -> Result<Self> {
        let dim = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * dim);
        for row in rows {
            if row.len() != dim {
                return Err(IndexError::InvariantViolation(format!(
                    "row of length {} in a matrix of dimension {dim}",
                    row.len()
                )));
            }
            data.extend_from_slice(row);
        }
        Self::from_u8(dim, data)
    }

    /// Zero-row matrix of the given shape.
    pub fn empty(shape: DescriptorShape) -> Self {
        Self::with_capacity(shape, 0)
    }

    pub fn with_capacity(shape: DescriptorShape, rows: usize) -> Self {
        let data = match shape.element {
            ElementType::F32 => DescriptorData::F32(Vec::with_capacity(rows * shape.dim)),
            ElementType::U8 => DescriptorData::U8(Vec::with_capacity(rows * shape.dim)),
        };
        Self {
            dim: shape.dim,
            data,
        }
    }

    pub fn rows(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.data.len() / self.dim
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn element_type(&self) -> ElementType {
        self.data.element_type()
    }

    pub fn shape(&self) -> DescriptorShape {
        DescriptorShape::new(self.element_type(), self.dim)
    }

    pub fn is_empty(&self) -> bool {
        self.rows() == 0
    }

    pub fn data(&self) -> &DescriptorData {
        &self.data
    }

    pub fn into_data(self) -> DescriptorData {
        self.data
    }

    /// Row `i`. Panics if `i >= rows()`.
    pub fn row(&self, i: usize) -> Row<'_> {
        let start = i * self.dim;
        let end = start + self.dim;
        match &self.data {
            DescriptorData::F32(v) => Row::F32(&v[start..end]),
            DescriptorData::U8(v) => Row::U8(&v[start..end]),
        }
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = Row<'_>> + '_ {
        (0..self.rows()).map(move |i| self.row(i))
    }

    /// Append a row, widening binary rows when this matrix is float.
    pub fn push_row(&mut self, row: Row<'_>) -> Result<()> {
        if row.dim() != self.dim {
            return Err(IndexError::InvariantViolation(format!(
                "cannot append row of dimension {} to matrix of dimension {}",
                row.dim(),
                self.dim
            )));
        }
        match (&mut self.data, row) {
            (DescriptorData::F32(data), Row::F32(r)) => data.extend_from_slice(r),
            (DescriptorData::F32(data), Row::U8(r)) => data.extend(r.iter().map(|&b| f32::from(b))),
            (DescriptorData::U8(data), Row::U8(r)) => data.extend_from_slice(r),
            (DescriptorData::U8(_), Row::F32(_)) => {
                return Err(IndexError::InvariantViolation(
                    "float rows cannot be narrowed into a binary matrix".to_string(),
                ))
            }
        }
        Ok(())
    }

    /// This matrix in the `target` element type; borrows when no conversion is needed.
    pub fn converted(&self, target: ElementType) -> Result<Cow<'_, Descriptors>> {
        if self.element_type() == target {
            return Ok(Cow::Borrowed(self));
        }
        let mut out = Descriptors::with_capacity(DescriptorShape::new(target, self.dim), self.rows());
        for row in self.iter_rows() {
            out.push_row(row)?;
        }
        Ok(Cow::Owned(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_and_shape() {
        let m = Descriptors::from_f32_rows(&[vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]).unwrap();
        assert_eq!(m.rows(), 3);
        assert_eq!(m.dim(), 2);
        assert_eq!(m.shape(), DescriptorShape::new(ElementType::F32, 2));
        assert_eq!(m.row(1), Row::F32(&[3.0, 4.0]));
    }

    #[test]
    fn ragged_rows_rejected() {
        assert!(Descriptors::from_f32_rows(&[vec![1.0, 2.0], vec![3.0]]).is_err());
        assert!(Descriptors::from_u8(3, vec![1, 2, 3, 4]).is_err());
        assert!(Descriptors::from_f32(0, vec![1.0]).is_err());
    }

    #[test]
    fn empty_matrix_keeps_shape() {
        let m = Descriptors::empty(DescriptorShape::new(ElementType::U8, 32));
        assert_eq!(m.rows(), 0);
        assert_eq!(m.dim(), 32);
        assert!(m.is_empty());
    }

    #[test]
    fn binary_widens_to_float() {
        let m = Descriptors::from_u8_rows(&[vec![0, 255], vec![7, 8]]).unwrap();
        let f = m.converted(ElementType::F32).unwrap();
        assert_eq!(f.element_type(), ElementType::F32);
        assert_eq!(f.row(0), Row::F32(&[0.0, 255.0]));
        assert_eq!(f.row(1), Row::F32(&[7.0, 8.0]));
    }

    #[test]
    fn same_type_conversion_borrows() {
        let m = Descriptors::from_f32_rows(&[vec![1.0]]).unwrap();
        assert!(matches!(m.converted(ElementType::F32).unwrap(), Cow::Borrowed(_)));
        assert!(m.converted(ElementType::U8).is_err());
    }

    #[test]
    fn deserialize_rejects_inconsistent_buffer() {
        let bad = r#"{"dim":3,"data":{"f32":[1.0,2.0]}}"#;
        assert!(serde_json::from_str::<Descriptors>(bad).is_err());
        let good = r#"{"dim":2,"data":{"f32":[1.0,2.0]}}"#;
        assert_eq!(serde_json::from_str::<Descriptors>(good).unwrap().rows(), 1);
    }
}
