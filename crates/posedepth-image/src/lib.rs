#![deny(missing_docs)]
//! Single-channel image types used for depth images and depth maps.

/// image representation for depth processing.
pub mod image;

/// Error types for the image module.
pub mod error;

pub use crate::error::ImageError;
pub use crate::image::{Image, ImageSize};
