use std::{
    collections::BTreeMap,
    ops::Range,
    path::{Path, PathBuf},
};

use crate::{AttrValue, DType, Dataset, DatasetStore, MemoryStore, StoreError};

const STORE_VERSION: u32 = 1;

#[derive(bincode::Encode, bincode::Decode)]
struct StoreFile {
    version: u32,
    datasets: BTreeMap<String, Dataset>,
}

/// A dataset store persisted to a single binary file.
///
/// All datasets are loaded on [`FileStore::open`] and written back on
/// [`FileStore::flush`]; nothing reaches the disk in between.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    inner: MemoryStore,
}

impl FileStore {
    /// Create a new empty store that will be written to `path`.
    pub fn create(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            inner: MemoryStore::new(),
        }
    }

    /// Open an existing store file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::FileDoesNotExist`] when the file is absent and a
    /// decode error when it is corrupt.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(StoreError::FileDoesNotExist(path));
        }

        let bytes = std::fs::read(&path)?;
        let (file, _): (StoreFile, usize) =
            bincode::decode_from_slice(&bytes, bincode::config::standard())?;
        if file.version != STORE_VERSION {
            return Err(StoreError::Decode(bincode::error::DecodeError::OtherString(
                format!("unsupported store version {}", file.version),
            )));
        }
        log::debug!(
            "opened store {} with {} datasets",
            path.display(),
            file.datasets.len()
        );

        Ok(Self {
            path,
            inner: MemoryStore::from_datasets(file.datasets),
        })
    }

    /// Write every dataset to the store file.
    pub fn flush(&self) -> Result<(), StoreError> {
        let file = StoreFile {
            version: STORE_VERSION,
            datasets: self.inner.clone().into_datasets(),
        };
        let bytes = bincode::encode_to_vec(&file, bincode::config::standard())?;
        std::fs::write(&self.path, bytes)?;
        Ok(())
    }

    /// The path of the store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The datasets held by this store.
    pub fn memory(&self) -> &MemoryStore {
        &self.inner
    }

    /// Insert a dataset, replacing any dataset with the same name.
    pub fn insert(&mut self, name: &str, dataset: Dataset) {
        self.inner.insert(name, dataset);
    }
}

impl DatasetStore for FileStore {
    fn contains(&self, name: &str) -> bool {
        self.inner.contains(name)
    }

    fn shape(&self, name: &str) -> Result<Vec<usize>, StoreError> {
        self.inner.shape(name)
    }

    fn dtype(&self, name: &str) -> Result<DType, StoreError> {
        self.inner.dtype(name)
    }

    fn create_dataset(
        &mut self,
        name: &str,
        dtype: DType,
        shape: &[usize],
    ) -> Result<(), StoreError> {
        self.inner.create_dataset(name, dtype, shape)
    }

    fn resize(&mut self, name: &str, rows: usize) -> Result<(), StoreError> {
        self.inner.resize(name, rows)
    }

    fn read_rows_f32(&self, name: &str, rows: Range<usize>) -> Result<Vec<f32>, StoreError> {
        self.inner.read_rows_f32(name, rows)
    }

    fn read_rows_f64(&self, name: &str, rows: Range<usize>) -> Result<Vec<f64>, StoreError> {
        self.inner.read_rows_f64(name, rows)
    }

    fn read_rows_i64(&self, name: &str, rows: Range<usize>) -> Result<Vec<i64>, StoreError> {
        self.inner.read_rows_i64(name, rows)
    }

    fn write_rows_f32(&mut self, name: &str, start: usize, data: &[f32]) -> Result<(), StoreError> {
        self.inner.write_rows_f32(name, start, data)
    }

    fn fill_f32(&mut self, name: &str, value: f32) -> Result<(), StoreError> {
        self.inner.fill_f32(name, value)
    }

    fn attr(&self, name: &str, key: &str) -> Result<Option<AttrValue>, StoreError> {
        self.inner.attr(name, key)
    }

    fn set_attr(&mut self, name: &str, key: &str, value: AttrValue) -> Result<(), StoreError> {
        self.inner.set_attr(name, key, value)
    }
}
