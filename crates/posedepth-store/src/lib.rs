#![deny(missing_docs)]
//! Dataset store used by the depth extraction pipeline.
//!
//! A store holds named, typed, resizable arrays addressed by row ranges along
//! their first axis, each with a key-value attribute map. Names are path-like
//! (`lower/color/time`) but carry no hierarchy semantics.

mod dataset;
pub use dataset::*;

mod error;
pub use error::StoreError;

mod file;
pub use file::FileStore;

mod memory;
pub use memory::MemoryStore;

use std::ops::Range;

/// The contract the pipeline needs from a dataset store.
///
/// Reads convert from the stored numeric type; writes require the dataset to
/// hold the written type.
pub trait DatasetStore {
    /// Whether a dataset with this name exists.
    fn contains(&self, name: &str) -> bool;

    /// The shape of the dataset.
    fn shape(&self, name: &str) -> Result<Vec<usize>, StoreError>;

    /// The element type of the dataset.
    fn dtype(&self, name: &str) -> Result<DType, StoreError>;

    /// Create a zero-filled dataset.
    fn create_dataset(&mut self, name: &str, dtype: DType, shape: &[usize])
        -> Result<(), StoreError>;

    /// Change the number of rows of a dataset, zero-filling new rows.
    fn resize(&mut self, name: &str, rows: usize) -> Result<(), StoreError>;

    /// Read `rows` flattened, converted to `f32`.
    fn read_rows_f32(&self, name: &str, rows: Range<usize>) -> Result<Vec<f32>, StoreError>;

    /// Read `rows` flattened, converted to `f64`.
    fn read_rows_f64(&self, name: &str, rows: Range<usize>) -> Result<Vec<f64>, StoreError>;

    /// Read `rows` flattened, converted to `i64`.
    fn read_rows_i64(&self, name: &str, rows: Range<usize>) -> Result<Vec<i64>, StoreError>;

    /// Overwrite rows starting at `start` with the flattened `data`.
    fn write_rows_f32(&mut self, name: &str, start: usize, data: &[f32])
        -> Result<(), StoreError>;

    /// Set every element of an `f32` dataset to `value`.
    fn fill_f32(&mut self, name: &str, value: f32) -> Result<(), StoreError>;

    /// Read an attribute, `None` when the dataset has no such key.
    fn attr(&self, name: &str, key: &str) -> Result<Option<AttrValue>, StoreError>;

    /// Set an attribute, replacing any previous value.
    fn set_attr(&mut self, name: &str, key: &str, value: AttrValue) -> Result<(), StoreError>;

    /// Number of rows of the dataset.
    fn len(&self, name: &str) -> Result<usize, StoreError> {
        Ok(self.shape(name)?.first().copied().unwrap_or(0))
    }

    /// Whether the dataset has no rows.
    fn is_empty(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.len(name)? == 0)
    }
}
