#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Pinhole camera parameters.
pub mod camera;

/// Error types for the geometry module.
pub mod error;

/// Small fixed-size linear algebra utilities.
pub mod linalg;

/// Geometry kernel: pixel grids, deprojection, reprojection and depth map rasterization.
pub mod ops;

/// Transforms between the depth and color sensors.
pub mod transforms;

pub use crate::error::GeometryError;
