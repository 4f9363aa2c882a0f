use std::{collections::BTreeMap, ops::Range};

use crate::{AttrValue, DType, Dataset, DatasetStore, StoreError};

/// A dataset store held entirely in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryStore {
    datasets: BTreeMap<String, Dataset>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a dataset, replacing any dataset with the same name.
    pub fn insert(&mut self, name: &str, dataset: Dataset) {
        self.datasets.insert(name.to_string(), dataset);
    }

    /// Remove a dataset, returning it if it existed.
    pub fn remove(&mut self, name: &str) -> Option<Dataset> {
        self.datasets.remove(name)
    }

    /// Get a dataset by name.
    pub fn get(&self, name: &str) -> Result<&Dataset, StoreError> {
        self.datasets
            .get(name)
            .ok_or_else(|| StoreError::MissingDataset(name.to_string()))
    }

    fn get_mut(&mut self, name: &str) -> Result<&mut Dataset, StoreError> {
        self.datasets
            .get_mut(name)
            .ok_or_else(|| StoreError::MissingDataset(name.to_string()))
    }

    /// Iterate over the dataset names in lexicographic order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.datasets.keys().map(String::as_str)
    }

    pub(crate) fn into_datasets(self) -> BTreeMap<String, Dataset> {
        self.datasets
    }

    pub(crate) fn from_datasets(datasets: BTreeMap<String, Dataset>) -> Self {
        Self { datasets }
    }
}

impl DatasetStore for MemoryStore {
    fn contains(&self, name: &str) -> bool {
        self.datasets.contains_key(name)
    }

    fn shape(&self, name: &str) -> Result<Vec<usize>, StoreError> {
        Ok(self.get(name)?.shape().to_vec())
    }

    fn dtype(&self, name: &str) -> Result<DType, StoreError> {
        Ok(self.get(name)?.dtype())
    }

    fn create_dataset(
        &mut self,
        name: &str,
        dtype: DType,
        shape: &[usize],
    ) -> Result<(), StoreError> {
        if self.contains(name) {
            return Err(StoreError::DatasetExists(name.to_string()));
        }
        log::debug!("creating dataset {name} {dtype:?} {shape:?}");
        self.insert(name, Dataset::zeros(dtype, shape));
        Ok(())
    }

    fn resize(&mut self, name: &str, rows: usize) -> Result<(), StoreError> {
        self.get_mut(name)?.resize(name, rows)
    }

    fn read_rows_f32(&self, name: &str, rows: Range<usize>) -> Result<Vec<f32>, StoreError> {
        self.get(name)?.read_rows_f32(name, rows)
    }

    fn read_rows_f64(&self, name: &str, rows: Range<usize>) -> Result<Vec<f64>, StoreError> {
        self.get(name)?.read_rows_f64(name, rows)
    }

    fn read_rows_i64(&self, name: &str, rows: Range<usize>) -> Result<Vec<i64>, StoreError> {
        self.get(name)?.read_rows_i64(name, rows)
    }

    fn write_rows_f32(&mut self, name: &str, start: usize, data: &[f32]) -> Result<(), StoreError> {
        self.get_mut(name)?.write_rows_f32(name, start, data)
    }

    fn fill_f32(&mut self, name: &str, value: f32) -> Result<(), StoreError> {
        self.get_mut(name)?.fill_f32(name, value)
    }

    fn attr(&self, name: &str, key: &str) -> Result<Option<AttrValue>, StoreError> {
        Ok(self.get(name)?.attrs().get(key).cloned())
    }

    fn set_attr(&mut self, name: &str, key: &str, value: AttrValue) -> Result<(), StoreError> {
        self.get_mut(name)?.set_attr(key, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DatasetData;

    #[test]
    fn test_create_and_write() -> Result<(), StoreError> {
        let mut store = MemoryStore::new();
        assert!(!store.contains("pose/depth"));
        store.create_dataset("pose/depth", DType::F32, &[2, 25, 2])?;
        assert!(store.contains("pose/depth"));
        assert_eq!(store.shape("pose/depth")?, vec![2, 25, 2]);
        assert_eq!(store.len("pose/depth")?, 2);

        store.write_rows_f32("pose/depth", 1, &[3.0; 50])?;
        let rows = store.read_rows_f32("pose/depth", 1..2)?;
        assert!(rows.iter().all(|v| *v == 3.0));

        assert!(matches!(
            store.create_dataset("pose/depth", DType::F32, &[1]),
            Err(StoreError::DatasetExists(_))
        ));
        Ok(())
    }

    #[test]
    fn test_missing_dataset() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.shape("nope"),
            Err(StoreError::MissingDataset(name)) if name == "nope"
        ));
        assert!(store.attr("nope", "complete").is_err());
    }

    #[test]
    fn test_attrs_roundtrip() -> Result<(), StoreError> {
        let mut store = MemoryStore::new();
        store.insert(
            "cam/color/time",
            Dataset::from_data(&[2], DatasetData::F64(vec![0.0, 0.033]))?,
        );
        assert_eq!(store.attr("cam/color/time", "complete")?, None);
        store.set_attr("cam/color/time", "complete", AttrValue::Bool(false))?;
        assert_eq!(
            store.attr("cam/color/time", "complete")?,
            Some(AttrValue::Bool(false))
        );
        assert!(!store.is_empty("cam/color/time")?);
        Ok(())
    }
}
