use crate::{error::GeometryError, linalg};

/// Represents the intrinsic parameters of a pinhole camera
///
/// # Fields
///
/// * `fx` - The focal length in the x direction
/// * `fy` - The focal length in the y direction
/// * `cx` - The x coordinate of the principal point
/// * `cy` - The y coordinate of the principal point
/// * `skew` - The axis skew, zero for most sensors
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsic {
    /// The focal length in the x direction
    pub fx: f64,
    /// The focal length in the y direction
    pub fy: f64,
    /// The x coordinate of the principal point
    pub cx: f64,
    /// The y coordinate of the principal point
    pub cy: f64,
    /// The axis skew
    pub skew: f64,
}

impl CameraIntrinsic {
    /// Create intrinsics without skew.
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            skew: 0.0,
        }
    }

    /// Read intrinsics from a row-major 3x3 `K` matrix given as 9 values.
    ///
    /// Example:
    ///
    /// ```
    /// use posedepth_3d::camera::CameraIntrinsic;
    ///
    /// let k = [615.0, 0.0, 320.0, 0.0, 615.0, 240.0, 0.0, 0.0, 1.0];
    /// let intrinsic = CameraIntrinsic::from_row_major(&k).unwrap();
    /// assert_eq!(intrinsic.cx, 320.0);
    /// ```
    pub fn from_row_major(values: &[f64]) -> Result<Self, GeometryError> {
        let k = linalg::mat33_from_slice(values)?;
        Ok(Self {
            fx: k[0][0],
            fy: k[1][1],
            cx: k[0][2],
            cy: k[1][2],
            skew: k[0][1],
        })
    }

    /// The camera matrix `K`.
    pub fn matrix(&self) -> [[f64; 3]; 3] {
        [
            [self.fx, self.skew, self.cx],
            [0.0, self.fy, self.cy],
            [0.0, 0.0, 1.0],
        ]
    }
}

/// Represents the rigid transform from the depth sensor frame to the color sensor frame
///
/// # Fields
///
/// * `rotation` - The rotation matrix 3x3
/// * `translation` - The translation vector 3x1, in millimeters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraExtrinsic {
    /// The rotation matrix 3x3
    pub rotation: [[f64; 3]; 3],
    /// The translation vector in millimeters
    pub translation: [f64; 3],
}

impl CameraExtrinsic {
    /// The transform between two co-located sensors.
    pub fn identity() -> Self {
        Self {
            rotation: linalg::IDENTITY_33,
            translation: [0.0; 3],
        }
    }

    /// Build an extrinsic from flat rotation (9 values, row-major) and translation (3 values).
    ///
    /// The translation is multiplied by `translation_scale`, which converts the
    /// source unit to millimeters (1000.0 when the source is in meters).
    pub fn from_slices(
        rotation: &[f64],
        translation: &[f64],
        translation_scale: f64,
    ) -> Result<Self, GeometryError> {
        let rotation = linalg::mat33_from_slice(rotation)?;
        if translation.len() != 3 {
            return Err(GeometryError::DimensionMismatch {
                expected: 3,
                actual: translation.len(),
            });
        }
        Ok(Self {
            rotation,
            translation: [
                translation[0] * translation_scale,
                translation[1] * translation_scale,
                translation[2] * translation_scale,
            ],
        })
    }
}
