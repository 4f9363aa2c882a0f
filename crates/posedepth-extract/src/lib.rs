#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Lookup of depth-to-color extrinsics recorded over time.
pub mod calibration;

/// Tunable thresholds and sizes of the extraction.
pub mod config;

/// Error types for the extraction.
pub mod error;

/// Depth extraction for the keypoints of a single frame.
pub mod extractor;

/// Chunked driver running the extractor over a whole recording.
pub mod pipeline;

pub use crate::calibration::{CalibrationEntry, CalibrationTable};
pub use crate::config::ExtractionConfig;
pub use crate::error::{CalibrationError, ConfigError, ExtractError, PipelineError};
pub use crate::extractor::{
    DepthGeometry, DepthSource, FrameExtractor, FrameInput, FrameOutput, PinholeGeometry,
};
pub use crate::pipeline::{DatasetNames, DepthPipeline, ExecutionStrategy, PipelineSummary};
