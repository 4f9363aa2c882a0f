use posedepth_3d::GeometryError;
use posedepth_image::{ImageError, ImageSize};
use posedepth_store::StoreError;

/// An error type for the extraction configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The sampling window must have an odd edge.
    #[error("Window size must be odd, got {0}")]
    EvenWindowSize(usize),

    /// The depth validity range is empty or not finite.
    #[error("Invalid depth range [{min}, {max}] meters")]
    InvalidDepthRange {
        /// The lower bound in meters.
        min: f64,
        /// The upper bound in meters.
        max: f64,
    },

    /// The time disparity must be finite and non negative.
    #[error("Invalid maximum time disparity {0}")]
    InvalidTimeDisparity(f64),

    /// Chunks must hold at least one frame.
    #[error("Chunk size must be > 0")]
    ZeroChunkSize,

    /// The pool needs at least one worker.
    #[error("Number of workers must be > 0")]
    ZeroWorkers,

    /// An environment override could not be parsed.
    #[error("Invalid value {value:?} for {key}")]
    InvalidEnvValue {
        /// The environment variable.
        key: String,
        /// The raw value.
        value: String,
    },

    /// Error reading the configuration file.
    #[error("Failed to read the configuration file. {0}")]
    Io(#[from] std::io::Error),

    /// Error parsing the configuration file.
    #[error("Failed to parse the configuration file. {0}")]
    Json(#[from] serde_json::Error),
}

/// An error type for the calibration table.
#[derive(thiserror::Error, Debug)]
pub enum CalibrationError {
    /// The nested table has no entry for this source and camera.
    #[error("No calibration for source {source_name} and camera {camera}")]
    MissingCalibration {
        /// The recording source.
        source_name: String,
        /// The camera.
        camera: String,
    },

    /// A table entry cannot be interpreted.
    #[error("Malformed calibration entry {key}: {reason}")]
    MalformedEntry {
        /// The entry key.
        key: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The table holds no entry.
    #[error("Calibration table is empty")]
    EmptyTable,

    /// Error reading the calibration file.
    #[error("Failed to read the calibration file. {0}")]
    Io(#[from] std::io::Error),

    /// Error parsing the calibration file.
    #[error("Failed to parse the calibration file. {0}")]
    Json(#[from] serde_json::Error),
}

/// An error type for the per-frame extraction.
#[derive(thiserror::Error, Debug)]
pub enum ExtractError {
    /// The raw depth image does not have the depth sensor size.
    #[error("Depth image size {actual} does not match the sensor size {expected}")]
    DepthSizeMismatch {
        /// The depth sensor size.
        expected: ImageSize,
        /// The size of the given image.
        actual: ImageSize,
    },

    /// The cached depth map does not have the color frame size.
    #[error("Depth map size {actual} does not match the color size {expected}")]
    MapSizeMismatch {
        /// The color frame size.
        expected: ImageSize,
        /// The size of the given map.
        actual: ImageSize,
    },

    /// Error in the geometry kernel.
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// An error type for the chunked pipeline.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Invalid calibration table.
    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    /// Error building the transforms.
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    /// Error reading or writing a dataset.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Error building an image from dataset rows.
    #[error(transparent)]
    Image(#[from] ImageError),

    /// Neither the sensor attributes nor a calibration table provide extrinsics.
    #[error("No depth to color extrinsics available for {0}")]
    MissingExtrinsics(String),

    /// A dataset does not have the expected rank.
    #[error("Dataset {name} has shape {shape:?}, expected {expected}")]
    InvalidShape {
        /// The dataset name.
        name: String,
        /// The stored shape.
        shape: Vec<usize>,
        /// A description of the expected shape.
        expected: String,
    },

    /// The matched depth index points outside the depth recording.
    #[error("Frame {frame} is matched to depth frame {index}, but only {len} exist")]
    InvalidMatchedIndex {
        /// The color frame.
        frame: usize,
        /// The matched depth frame.
        index: i64,
        /// The number of depth frames.
        len: usize,
    },

    /// A frame failed inside a worker.
    #[error("Extraction failed at frame {frame}. {source}")]
    Worker {
        /// The color frame.
        frame: usize,
        /// The underlying error.
        #[source]
        source: ExtractError,
    },

    /// Error building the worker pool.
    #[error("Failed to build the worker pool. {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Error building the progress bar style.
    #[error("Invalid progress bar template. {0}")]
    ProgressTemplate(#[from] indicatif::style::TemplateError),
}
