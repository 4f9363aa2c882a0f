use crate::{
    camera::{CameraExtrinsic, CameraIntrinsic},
    error::GeometryError,
    linalg,
};

/// The fixed set of matrices relating a depth sensor to a color sensor.
///
/// Built once per camera and sequence, then shared read-only by every frame.
/// All translations are in millimeters.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformBundle {
    h: [[f64; 4]; 4],
    h_inv: [[f64; 4]; 4],
    color_from_depth: [[f64; 4]; 3],
    depth_from_color: [[f64; 4]; 3],
    k_color: [[f64; 3]; 3],
    k_color_inv: [[f64; 3]; 3],
    k_depth: [[f64; 3]; 3],
    k_depth_inv: [[f64; 3]; 3],
}

impl TransformBundle {
    /// Build the transform bundle.
    ///
    /// # Arguments
    ///
    /// * `color` - The intrinsics of the color camera.
    /// * `depth` - The intrinsics of the depth camera.
    /// * `extrinsic` - The rotation and translation (mm) from the depth to the color sensor.
    ///
    /// # Returns
    ///
    /// The bundle holding `H = [[R^T, t], [0, 1]]`, its inverse, the color
    /// projection `[K_color | 0] * H`, the depth reprojection `K_depth * H^-1[0..3]`
    /// and both intrinsics with their inverses.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::SingularMatrix`] if an intrinsic matrix or the
    /// rotation cannot be inverted.
    ///
    /// Example:
    ///
    /// ```
    /// use posedepth_3d::camera::{CameraExtrinsic, CameraIntrinsic};
    /// use posedepth_3d::transforms::TransformBundle;
    ///
    /// let k = CameraIntrinsic::new(500.0, 500.0, 320.0, 240.0);
    /// let bundle = TransformBundle::new(&k, &k, &CameraExtrinsic::identity()).unwrap();
    /// assert_eq!(bundle.h(), bundle.h_inv());
    /// ```
    pub fn new(
        color: &CameraIntrinsic,
        depth: &CameraIntrinsic,
        extrinsic: &CameraExtrinsic,
    ) -> Result<Self, GeometryError> {
        let k_color = color.matrix();
        let k_depth = depth.matrix();
        let k_color_inv = linalg::inverse33(&k_color)?;
        let k_depth_inv = linalg::inverse33(&k_depth)?;

        let rotation = linalg::transpose33(&extrinsic.rotation);
        let translation = extrinsic.translation;
        let h = compose_homogeneous(&rotation, &translation);

        // invert the blocks separately: R' = R^-1, t' = -R^-1 * t
        let rotation_inv = linalg::inverse33(&rotation)?;
        let rotated = linalg::mat33_mul_vec3(&rotation_inv, &translation);
        let h_inv = compose_homogeneous(&rotation_inv, &[-rotated[0], -rotated[1], -rotated[2]]);

        let color_from_depth = linalg::matmul(&pad_intrinsic(&k_color), &h);
        let depth_from_color = linalg::matmul(&pad_intrinsic(&k_depth), &h_inv);

        Ok(Self {
            h,
            h_inv,
            color_from_depth,
            depth_from_color,
            k_color,
            k_color_inv,
            k_depth,
            k_depth_inv,
        })
    }

    /// The homogeneous transform from the depth frame to the color frame.
    pub fn h(&self) -> &[[f64; 4]; 4] {
        &self.h
    }

    /// The homogeneous transform from the color frame to the depth frame.
    pub fn h_inv(&self) -> &[[f64; 4]; 4] {
        &self.h_inv
    }

    /// Projection of depth-frame points to color-camera rays, `[K_color | 0] * H`.
    pub fn color_from_depth(&self) -> &[[f64; 4]; 3] {
        &self.color_from_depth
    }

    /// Projection of color-frame points to depth-camera rays, `[K_depth | 0] * H^-1`.
    pub fn depth_from_color(&self) -> &[[f64; 4]; 3] {
        &self.depth_from_color
    }

    /// The color camera matrix.
    pub fn k_color(&self) -> &[[f64; 3]; 3] {
        &self.k_color
    }

    /// The inverse color camera matrix.
    pub fn k_color_inv(&self) -> &[[f64; 3]; 3] {
        &self.k_color_inv
    }

    /// The depth camera matrix.
    pub fn k_depth(&self) -> &[[f64; 3]; 3] {
        &self.k_depth
    }

    /// The inverse depth camera matrix.
    pub fn k_depth_inv(&self) -> &[[f64; 3]; 3] {
        &self.k_depth_inv
    }
}

fn compose_homogeneous(rotation: &[[f64; 3]; 3], translation: &[f64; 3]) -> [[f64; 4]; 4] {
    let mut h = [[0.0; 4]; 4];
    for i in 0..3 {
        h[i][..3].copy_from_slice(&rotation[i]);
        h[i][3] = translation[i];
    }
    h[3][3] = 1.0;
    h
}

// [K | 0]
fn pad_intrinsic(k: &[[f64; 3]; 3]) -> [[f64; 4]; 3] {
    let mut padded = [[0.0; 4]; 3];
    for i in 0..3 {
        padded[i][..3].copy_from_slice(&k[i]);
    }
    padded
}
