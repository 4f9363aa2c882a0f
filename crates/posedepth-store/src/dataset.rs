use std::{collections::BTreeMap, ops::Range};

use crate::error::StoreError;

/// Element type of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub enum DType {
    /// Unsigned 8-bit integers, e.g. color images.
    U8,
    /// Unsigned 16-bit integers, e.g. depth images in millimeters.
    U16,
    /// Signed 64-bit integers, e.g. frame indices.
    I64,
    /// 32-bit floats.
    F32,
    /// 64-bit floats, e.g. timestamps.
    F64,
}

/// Typed storage of a dataset, flattened row-major.
#[derive(Debug, Clone, PartialEq, bincode::Encode, bincode::Decode)]
pub enum DatasetData {
    /// Unsigned 8-bit data.
    U8(Vec<u8>),
    /// Unsigned 16-bit data.
    U16(Vec<u16>),
    /// Signed 64-bit data.
    I64(Vec<i64>),
    /// 32-bit float data.
    F32(Vec<f32>),
    /// 64-bit float data.
    F64(Vec<f64>),
}

macro_rules! convert_range {
    ($data:expr, $range:expr, $ty:ty) => {
        match $data {
            DatasetData::U8(v) => v[$range].iter().map(|&x| x as $ty).collect(),
            DatasetData::U16(v) => v[$range].iter().map(|&x| x as $ty).collect(),
            DatasetData::I64(v) => v[$range].iter().map(|&x| x as $ty).collect(),
            DatasetData::F32(v) => v[$range].iter().map(|&x| x as $ty).collect(),
            DatasetData::F64(v) => v[$range].iter().map(|&x| x as $ty).collect(),
        }
    };
}

impl DatasetData {
    /// Zero-filled storage of `len` elements.
    pub fn zeros(dtype: DType, len: usize) -> Self {
        match dtype {
            DType::U8 => DatasetData::U8(vec![0; len]),
            DType::U16 => DatasetData::U16(vec![0; len]),
            DType::I64 => DatasetData::I64(vec![0; len]),
            DType::F32 => DatasetData::F32(vec![0.0; len]),
            DType::F64 => DatasetData::F64(vec![0.0; len]),
        }
    }

    /// The element type.
    pub fn dtype(&self) -> DType {
        match self {
            DatasetData::U8(_) => DType::U8,
            DatasetData::U16(_) => DType::U16,
            DatasetData::I64(_) => DType::I64,
            DatasetData::F32(_) => DType::F32,
            DatasetData::F64(_) => DType::F64,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            DatasetData::U8(v) => v.len(),
            DatasetData::U16(v) => v.len(),
            DatasetData::I64(v) => v.len(),
            DatasetData::F32(v) => v.len(),
            DatasetData::F64(v) => v.len(),
        }
    }

    /// Whether the storage holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn resize(&mut self, len: usize) {
        match self {
            DatasetData::U8(v) => v.resize(len, 0),
            DatasetData::U16(v) => v.resize(len, 0),
            DatasetData::I64(v) => v.resize(len, 0),
            DatasetData::F32(v) => v.resize(len, 0.0),
            DatasetData::F64(v) => v.resize(len, 0.0),
        }
    }
}

/// A dataset attribute value.
#[derive(Debug, Clone, PartialEq, bincode::Encode, bincode::Decode)]
pub enum AttrValue {
    /// A flag.
    Bool(bool),
    /// An integer.
    Int(i64),
    /// A float.
    Float(f64),
    /// A string.
    Text(String),
    /// A flat array of floats, e.g. a row-major matrix.
    FloatArray(Vec<f64>),
}

impl AttrValue {
    /// Interpret the value as a flag. Integers are true when nonzero.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            AttrValue::Int(i) => Some(*i != 0),
            _ => None,
        }
    }

    /// Interpret the value as a flat array of floats.
    pub fn as_f64_vec(&self) -> Option<Vec<f64>> {
        match self {
            AttrValue::FloatArray(v) => Some(v.clone()),
            AttrValue::Float(x) => Some(vec![*x]),
            AttrValue::Int(i) => Some(vec![*i as f64]),
            _ => None,
        }
    }

    /// Interpret the value as a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Float(value)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Text(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Text(value)
    }
}

impl From<Vec<f64>> for AttrValue {
    fn from(value: Vec<f64>) -> Self {
        AttrValue::FloatArray(value)
    }
}

/// A typed, resizable array with attributes.
///
/// The first axis is the row axis; a row holds `shape[1..].product()` elements.
#[derive(Debug, Clone, PartialEq, bincode::Encode, bincode::Decode)]
pub struct Dataset {
    shape: Vec<usize>,
    data: DatasetData,
    attrs: BTreeMap<String, AttrValue>,
}

impl Dataset {
    /// Create a zero-filled dataset.
    pub fn zeros(dtype: DType, shape: &[usize]) -> Self {
        let len = shape.iter().product();
        Self {
            shape: shape.to_vec(),
            data: DatasetData::zeros(dtype, len),
            attrs: BTreeMap::new(),
        }
    }

    /// Create a dataset from existing data.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShapeMismatch`] when the data does not fill the shape.
    pub fn from_data(shape: &[usize], data: DatasetData) -> Result<Self, StoreError> {
        let expected = shape.iter().product::<usize>();
        if data.len() != expected {
            return Err(StoreError::ShapeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            shape: shape.to_vec(),
            data,
            attrs: BTreeMap::new(),
        })
    }

    /// Attach an attribute, builder style.
    pub fn with_attr(mut self, key: &str, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(key.to_string(), value.into());
        self
    }

    /// The shape of the dataset.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// The element type.
    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    /// The typed storage.
    pub fn data(&self) -> &DatasetData {
        &self.data
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    /// Number of elements per row.
    pub fn row_len(&self) -> usize {
        self.shape.iter().skip(1).product()
    }

    /// The attribute map.
    pub fn attrs(&self) -> &BTreeMap<String, AttrValue> {
        &self.attrs
    }

    /// Set an attribute.
    pub fn set_attr(&mut self, key: &str, value: AttrValue) {
        self.attrs.insert(key.to_string(), value);
    }

    fn element_range(&self, name: &str, rows: &Range<usize>) -> Result<Range<usize>, StoreError> {
        if self.shape.is_empty() {
            return Err(StoreError::ScalarDataset(name.to_string()));
        }
        if rows.start > rows.end || rows.end > self.rows() {
            return Err(StoreError::RowsOutOfBounds {
                name: name.to_string(),
                start: rows.start,
                end: rows.end,
                len: self.rows(),
            });
        }
        let row_len = self.row_len();
        Ok(rows.start * row_len..rows.end * row_len)
    }

    /// Read rows converted to `f32`.
    pub fn read_rows_f32(&self, name: &str, rows: Range<usize>) -> Result<Vec<f32>, StoreError> {
        let range = self.element_range(name, &rows)?;
        Ok(convert_range!(&self.data, range, f32))
    }

    /// Read rows converted to `f64`.
    pub fn read_rows_f64(&self, name: &str, rows: Range<usize>) -> Result<Vec<f64>, StoreError> {
        let range = self.element_range(name, &rows)?;
        Ok(convert_range!(&self.data, range, f64))
    }

    /// Read rows converted to `i64`. Floats are truncated.
    pub fn read_rows_i64(&self, name: &str, rows: Range<usize>) -> Result<Vec<i64>, StoreError> {
        let range = self.element_range(name, &rows)?;
        Ok(convert_range!(&self.data, range, i64))
    }

    /// Overwrite rows of an `f32` dataset starting at `start`.
    pub fn write_rows_f32(&mut self, name: &str, start: usize, data: &[f32]) -> Result<(), StoreError> {
        let row_len = self.row_len();
        if data.len() % row_len.max(1) != 0 || (row_len == 0 && !data.is_empty()) {
            return Err(StoreError::ShapeMismatch {
                expected: row_len,
                actual: data.len(),
            });
        }
        let rows = start..start + data.len() / row_len.max(1);
        let range = self.element_range(name, &rows)?;
        match &mut self.data {
            DatasetData::F32(v) => {
                v[range].copy_from_slice(data);
                Ok(())
            }
            other => Err(StoreError::DTypeMismatch {
                name: name.to_string(),
                expected: DType::F32,
                actual: other.dtype(),
            }),
        }
    }

    /// Set every element of an `f32` dataset.
    pub fn fill_f32(&mut self, name: &str, value: f32) -> Result<(), StoreError> {
        match &mut self.data {
            DatasetData::F32(v) => {
                v.iter_mut().for_each(|x| *x = value);
                Ok(())
            }
            other => Err(StoreError::DTypeMismatch {
                name: name.to_string(),
                expected: DType::F32,
                actual: other.dtype(),
            }),
        }
    }

    /// Change the number of rows, zero-filling new rows.
    pub fn resize(&mut self, name: &str, rows: usize) -> Result<(), StoreError> {
        if self.shape.is_empty() {
            return Err(StoreError::ScalarDataset(name.to_string()));
        }
        self.shape[0] = rows;
        self.data.resize(rows * self.row_len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_rows_converts() -> Result<(), StoreError> {
        let dataset = Dataset::from_data(&[3, 2], DatasetData::U16(vec![1, 2, 3, 4, 5, 6]))?;
        assert_eq!(dataset.rows(), 3);
        assert_eq!(dataset.row_len(), 2);
        assert_eq!(dataset.read_rows_f32("d", 1..3)?, vec![3.0, 4.0, 5.0, 6.0]);
        assert_eq!(dataset.read_rows_i64("d", 0..1)?, vec![1, 2]);
        assert!(dataset.read_rows_f64("d", 2..4).is_err());
        Ok(())
    }

    #[test]
    fn test_write_rows_requires_f32() -> Result<(), StoreError> {
        let mut dataset = Dataset::zeros(DType::F32, &[4, 2, 3]);
        dataset.write_rows_f32("d", 2, &[1.0; 12])?;
        let rows = dataset.read_rows_f32("d", 0..4)?;
        assert_eq!(rows[..12], [0.0; 12]);
        assert_eq!(rows[12..], [1.0; 12]);

        // partial rows are rejected
        assert!(matches!(
            dataset.write_rows_f32("d", 0, &[1.0; 5]),
            Err(StoreError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            dataset.write_rows_f32("d", 3, &[1.0; 12]),
            Err(StoreError::RowsOutOfBounds { .. })
        ));

        let mut ints = Dataset::zeros(DType::I64, &[2]);
        assert!(matches!(
            ints.write_rows_f32("i", 0, &[1.0]),
            Err(StoreError::DTypeMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_resize_zero_fills() -> Result<(), StoreError> {
        let mut dataset = Dataset::from_data(&[1, 2], DatasetData::F32(vec![7.0, 8.0]))?;
        dataset.resize("d", 3)?;
        assert_eq!(dataset.shape(), &[3, 2]);
        assert_eq!(
            dataset.read_rows_f32("d", 0..3)?,
            vec![7.0, 8.0, 0.0, 0.0, 0.0, 0.0]
        );
        Ok(())
    }

    #[test]
    fn test_attr_values() {
        let dataset = Dataset::zeros(DType::F64, &[0])
            .with_attr("complete", true)
            .with_attr("K", vec![1.0, 0.0, 2.0])
            .with_attr("desc", "timestamps");
        assert_eq!(dataset.attrs()["complete"].as_bool(), Some(true));
        assert_eq!(
            dataset.attrs()["K"].as_f64_vec(),
            Some(vec![1.0, 0.0, 2.0])
        );
        assert_eq!(dataset.attrs()["desc"].as_str(), Some("timestamps"));
        assert_eq!(AttrValue::Int(0).as_bool(), Some(false));
        assert_eq!(AttrValue::Text("x".into()).as_bool(), None);
    }
}
