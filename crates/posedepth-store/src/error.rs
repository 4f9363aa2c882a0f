use std::path::PathBuf;

use crate::DType;

/// An error type for the dataset store.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// The dataset does not exist.
    #[error("Dataset does not exist: {0}")]
    MissingDataset(String),

    /// The dataset has no attribute with this key.
    #[error("Dataset {name} has no attribute {key}")]
    MissingAttribute {
        /// The dataset name.
        name: String,
        /// The attribute key.
        key: String,
    },

    /// A dataset with this name already exists.
    #[error("Dataset already exists: {0}")]
    DatasetExists(String),

    /// The dataset holds a different element type.
    #[error("Dataset {name} holds {actual:?}, expected {expected:?}")]
    DTypeMismatch {
        /// The dataset name.
        name: String,
        /// The requested type.
        expected: DType,
        /// The stored type.
        actual: DType,
    },

    /// The data length does not fit the dataset layout.
    #[error("Data length ({actual}) does not match the dataset layout ({expected})")]
    ShapeMismatch {
        /// The expected number of elements.
        expected: usize,
        /// The number of elements given.
        actual: usize,
    },

    /// The requested rows are outside the dataset.
    #[error("Rows {start}..{end} are out of bounds for dataset {name} with {len} rows")]
    RowsOutOfBounds {
        /// The dataset name.
        name: String,
        /// The first requested row.
        start: usize,
        /// One past the last requested row.
        end: usize,
        /// The number of rows in the dataset.
        len: usize,
    },

    /// The dataset has no rows axis.
    #[error("Dataset {0} is a scalar and has no rows")]
    ScalarDataset(String),

    /// The store file does not exist.
    #[error("Store file does not exist: {0}")]
    FileDoesNotExist(PathBuf),

    /// Error reading or writing the store file.
    #[error("Failed to manipulate the store file. {0}")]
    Io(#[from] std::io::Error),

    /// Error encoding the store.
    #[error("Failed to encode the store. {0}")]
    Encode(#[from] bincode::error::EncodeError),

    /// Error decoding the store.
    #[error("Failed to decode the store. {0}")]
    Decode(#[from] bincode::error::DecodeError),
}
