use posedepth_3d::{linalg, ops, transforms::TransformBundle, GeometryError};
use posedepth_image::{Image, ImageSize};

use crate::{config::ExtractionConfig, error::ExtractError};

/// The depth data a frame is extracted from.
#[derive(Debug, Clone, PartialEq)]
pub enum DepthSource {
    /// The depth image as recorded by the depth sensor, in millimeters.
    Raw(Image<f32>),
    /// A depth map already rasterized into the color frame.
    Mapped(Image<f32>),
}

/// The inputs of a single frame.
#[derive(Debug, Clone)]
pub struct FrameInput {
    /// The color frame index.
    pub index: usize,
    /// The depth data matched to the frame.
    pub depth: DepthSource,
    /// The `[x, y]` keypoints in color pixels.
    pub keypoints: Vec<[f32; 2]>,
    /// The timestamp of the matched depth frame.
    pub depth_time: f64,
    /// The timestamp of the color frame.
    pub color_time: f64,
}

/// The outputs of a single frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameOutput {
    /// The color frame index.
    pub index: usize,
    /// The keypoints in 3D, millimeters in the color camera frame.
    pub keypoints_3d: Vec<[f32; 3]>,
    /// The keypoints in depth image pixels.
    pub keypoints_depth: Vec<[f32; 2]>,
    /// The depth map computed for this frame, only when the input was raw.
    pub depth_in_color: Option<Image<f32>>,
    /// Whether the matched depth frame was too far in time.
    pub stale: bool,
}

impl FrameOutput {
    /// An output where every keypoint is NaN.
    pub fn invalid(index: usize, num_keypoints: usize) -> Self {
        Self {
            index,
            keypoints_3d: vec![[f32::NAN; 3]; num_keypoints],
            keypoints_depth: vec![[f32::NAN; 2]; num_keypoints],
            depth_in_color: None,
            stale: false,
        }
    }

    /// Number of keypoints without a valid 3D position.
    pub fn num_invalid(&self) -> usize {
        self.keypoints_3d.iter().filter(|p| p[2].is_nan()).count()
    }
}

/// The geometry steps of the extraction.
///
/// [`PinholeGeometry`] implements them with the kernels in [`posedepth_3d::ops`].
pub trait DepthGeometry: Sync {
    /// Rasterize a depth image into a depth map of the color frame.
    fn depth_in_color(
        &self,
        depth: &Image<f32>,
        bundle: &TransformBundle,
        color_size: ImageSize,
    ) -> Result<Image<f32>, GeometryError>;

    /// Sample the depth map around each keypoint.
    fn sample_depths(
        &self,
        depth_map: &Image<f32>,
        keypoints: &[[f64; 2]],
        half_window: usize,
    ) -> Vec<f32>;

    /// Lift keypoints with their depth into 3D in the color camera frame.
    fn deproject_keypoints(
        &self,
        bundle: &TransformBundle,
        keypoints: &[[f64; 2]],
        depths: &[f32],
    ) -> Result<Vec<[f64; 3]>, GeometryError>;

    /// Project 3D points of the color camera frame to depth image pixels.
    fn project_to_depth(&self, bundle: &TransformBundle, points: &[[f64; 3]]) -> Vec<[f64; 2]>;
}

/// Pinhole camera geometry.
#[derive(Debug, Clone, Copy, Default)]
pub struct PinholeGeometry;

impl DepthGeometry for PinholeGeometry {
    fn depth_in_color(
        &self,
        depth: &Image<f32>,
        bundle: &TransformBundle,
        color_size: ImageSize,
    ) -> Result<Image<f32>, GeometryError> {
        let pixels_h = ops::homogeneous_pixel_grid(depth.size());
        let points = ops::deproject(bundle.k_depth_inv(), &pixels_h, depth.as_slice())?;
        let projection = linalg::array_to_faer_mat(bundle.color_from_depth());
        let rays = ops::transform_points(&projection, &points)?;
        ops::rasterize_sparse_to_dense(&rays, color_size)
    }

    fn sample_depths(
        &self,
        depth_map: &Image<f32>,
        keypoints: &[[f64; 2]],
        half_window: usize,
    ) -> Vec<f32> {
        keypoints
            .iter()
            .map(|&center| ops::sample_window(depth_map, center, half_window))
            .collect()
    }

    fn deproject_keypoints(
        &self,
        bundle: &TransformBundle,
        keypoints: &[[f64; 2]],
        depths: &[f32],
    ) -> Result<Vec<[f64; 3]>, GeometryError> {
        ops::deproject_pixels(bundle.k_color_inv(), keypoints, depths)
    }

    fn project_to_depth(&self, bundle: &TransformBundle, points: &[[f64; 3]]) -> Vec<[f64; 2]> {
        ops::project_points(bundle.depth_from_color(), points)
    }
}

/// Extracts keypoint depth frame by frame.
///
/// Holds only shared references, so one extractor is built per run and
/// shared by every worker.
pub struct FrameExtractor<'a, G: DepthGeometry = PinholeGeometry> {
    bundle: &'a TransformBundle,
    config: &'a ExtractionConfig,
    geometry: &'a G,
    depth_size: ImageSize,
    color_size: ImageSize,
}

impl<'a, G: DepthGeometry> FrameExtractor<'a, G> {
    /// Create an extractor.
    ///
    /// # Arguments
    ///
    /// * `bundle` - The sensor transforms.
    /// * `config` - The extraction configuration. Assumed validated.
    /// * `geometry` - The geometry implementation.
    /// * `depth_size` - The size of the raw depth images.
    /// * `color_size` - The size of the color images and the depth maps.
    pub fn new(
        bundle: &'a TransformBundle,
        config: &'a ExtractionConfig,
        geometry: &'a G,
        depth_size: ImageSize,
        color_size: ImageSize,
    ) -> Self {
        Self {
            bundle,
            config,
            geometry,
            depth_size,
            color_size,
        }
    }

    /// Extract the 3D and depth-frame keypoints of a frame.
    ///
    /// Invalid data never fails: a stale depth match makes every keypoint
    /// NaN without touching the geometry, and keypoints whose depth falls
    /// outside the valid range are NaN in both outputs. Only inputs of the
    /// wrong size are errors.
    ///
    /// # Arguments
    ///
    /// * `frame` - The frame to extract.
    ///
    /// # Returns
    ///
    /// The keypoints of the frame, with the depth map when it was computed here.
    pub fn extract_frame(&self, frame: FrameInput) -> Result<FrameOutput, ExtractError> {
        let num_keypoints = frame.keypoints.len();

        // NaN timestamps count as stale
        let disparity = (frame.depth_time - frame.color_time).abs();
        if !(disparity <= self.config.max_time_disparity) {
            return Ok(FrameOutput {
                stale: true,
                ..FrameOutput::invalid(frame.index, num_keypoints)
            });
        }

        let min_depth = self.config.min_valid_depth_mm();
        let max_depth = self.config.max_valid_depth_mm();

        let (depth_map, computed) = match frame.depth {
            DepthSource::Raw(mut depth) => {
                if depth.size() != self.depth_size {
                    return Err(ExtractError::DepthSizeMismatch {
                        expected: self.depth_size,
                        actual: depth.size(),
                    });
                }
                depth.map_inplace(|d| {
                    if !(min_depth..=max_depth).contains(&*d) {
                        *d = 0.0;
                    }
                });
                let depth_map = self
                    .geometry
                    .depth_in_color(&depth, self.bundle, self.color_size)?;
                (depth_map, true)
            }
            DepthSource::Mapped(depth_map) => {
                if depth_map.size() != self.color_size {
                    return Err(ExtractError::MapSizeMismatch {
                        expected: self.color_size,
                        actual: depth_map.size(),
                    });
                }
                (depth_map, false)
            }
        };

        let keypoints = frame
            .keypoints
            .iter()
            .map(|k| [k[0] as f64, k[1] as f64])
            .collect::<Vec<_>>();
        let depths = self
            .geometry
            .sample_depths(&depth_map, &keypoints, self.config.half_window());
        let points = self
            .geometry
            .deproject_keypoints(self.bundle, &keypoints, &depths)?;
        let in_depth = self.geometry.project_to_depth(self.bundle, &points);

        let (min_depth, max_depth) = (min_depth as f64, max_depth as f64);
        let mut output = FrameOutput::invalid(frame.index, num_keypoints);
        for (i, (p, q)) in points.iter().zip(in_depth.iter()).enumerate() {
            if !(min_depth..=max_depth).contains(&p[2]) {
                continue;
            }
            output.keypoints_3d[i] = [p[0] as f32, p[1] as f32, p[2] as f32];
            output.keypoints_depth[i] = [q[0] as f32, q[1] as f32];
        }
        output.depth_in_color = computed.then_some(depth_map);

        Ok(output)
    }

    /// The size of the raw depth images.
    pub fn depth_size(&self) -> ImageSize {
        self.depth_size
    }

    /// The size of the color images and the depth maps.
    pub fn color_size(&self) -> ImageSize {
        self.color_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use posedepth_3d::camera::{CameraExtrinsic, CameraIntrinsic};

    const SIZE: ImageSize = ImageSize {
        width: 200,
        height: 200,
    };

    fn identity_bundle() -> Result<TransformBundle, GeometryError> {
        let k = CameraIntrinsic::new(500.0, 500.0, 0.0, 0.0);
        TransformBundle::new(&k, &k, &CameraExtrinsic::identity())
    }

    fn frame(depth: DepthSource, keypoints: Vec<[f32; 2]>) -> FrameInput {
        FrameInput {
            index: 7,
            depth,
            keypoints,
            depth_time: 10.01,
            color_time: 10.0,
        }
    }

    #[test]
    fn test_flat_depth_identity_sensors() -> Result<(), Box<dyn std::error::Error>> {
        let bundle = identity_bundle()?;
        let config = ExtractionConfig::default();
        let extractor = FrameExtractor::new(&bundle, &config, &PinholeGeometry, SIZE, SIZE);

        let depth = Image::from_size_val(SIZE, 1000.0f32);
        let output = extractor.extract_frame(frame(DepthSource::Raw(depth), vec![[100.0, 100.0]]))?;

        assert_eq!(output.index, 7);
        assert!(!output.stale);
        let p = output.keypoints_3d[0];
        assert_relative_eq!(p[0], 200.0, epsilon = 1e-3);
        assert_relative_eq!(p[1], 200.0, epsilon = 1e-3);
        assert_relative_eq!(p[2], 1000.0, epsilon = 1e-3);
        let q = output.keypoints_depth[0];
        assert_relative_eq!(q[0], 100.0, epsilon = 1e-3);
        assert_relative_eq!(q[1], 100.0, epsilon = 1e-3);

        let depth_map = output.depth_in_color.ok_or("missing depth map")?;
        assert_eq!(depth_map.get(100, 100), Some(&1000.0));
        assert_eq!(depth_map.get(0, 0), Some(&1000.0));
        Ok(())
    }

    #[test]
    fn test_out_of_range_depth_is_cleared() -> Result<(), Box<dyn std::error::Error>> {
        let bundle = identity_bundle()?;
        let config = ExtractionConfig::default();
        let extractor = FrameExtractor::new(&bundle, &config, &PinholeGeometry, SIZE, SIZE);

        // too close on the left half, too far on the right half
        let data = (0..SIZE.num_pixels())
            .map(|p| if p % SIZE.width < 100 { 50.0 } else { 20000.0 })
            .collect();
        let depth = Image::new(SIZE, data)?;
        let output = extractor.extract_frame(frame(
            DepthSource::Raw(depth),
            vec![[20.0, 20.0], [180.0, 20.0]],
        ))?;

        let depth_map = output.depth_in_color.as_ref().ok_or("missing depth map")?;
        assert!(depth_map.as_slice().iter().all(|&d| d == 0.0));
        for i in 0..2 {
            assert!(output.keypoints_3d[i].iter().all(|v| v.is_nan()));
            assert!(output.keypoints_depth[i].iter().all(|v| v.is_nan()));
        }
        assert_eq!(output.num_invalid(), 2);

        // the range bounds themselves are valid
        let (min_depth, max_depth) = (config.min_valid_depth_mm(), config.max_valid_depth_mm());
        let data = (0..SIZE.num_pixels())
            .map(|p| if p % SIZE.width < 100 { min_depth } else { max_depth })
            .collect();
        let depth = Image::new(SIZE, data)?;
        let output = extractor.extract_frame(frame(
            DepthSource::Raw(depth),
            vec![[20.0, 20.0], [180.0, 20.0]],
        ))?;

        assert_eq!(output.num_invalid(), 0);
        assert_eq!(output.keypoints_3d[0][2], min_depth);
        assert_eq!(output.keypoints_3d[1][2], max_depth);
        assert!(output.keypoints_depth.iter().flatten().all(|v| v.is_finite()));
        Ok(())
    }

    #[test]
    fn test_out_of_range_mapped_depth_is_invalid() -> Result<(), Box<dyn std::error::Error>> {
        let bundle = identity_bundle()?;
        let config = ExtractionConfig::default();
        let extractor = FrameExtractor::new(&bundle, &config, &PinholeGeometry, SIZE, SIZE);

        let mut depth_map = Image::from_size_val(SIZE, 1000.0f32);
        for y in 0..10 {
            for x in 0..10 {
                depth_map.set(x, y, 20000.0)?;
            }
        }
        let output = extractor.extract_frame(frame(
            DepthSource::Mapped(depth_map),
            vec![[3.0, 3.0], [150.0, 50.0]],
        ))?;

        assert!(output.depth_in_color.is_none());
        assert!(output.keypoints_3d[0].iter().all(|v| v.is_nan()));
        assert!(output.keypoints_depth[0].iter().all(|v| v.is_nan()));
        assert_relative_eq!(output.keypoints_3d[1][2], 1000.0, epsilon = 1e-3);
        assert_relative_eq!(output.keypoints_depth[1][0], 150.0, epsilon = 1e-3);
        Ok(())
    }

    #[test]
    fn test_stale_frame() -> Result<(), Box<dyn std::error::Error>> {
        let bundle = identity_bundle()?;
        let config = ExtractionConfig::default();
        let extractor = FrameExtractor::new(&bundle, &config, &PinholeGeometry, SIZE, SIZE);

        let mut input = frame(
            DepthSource::Raw(Image::from_size_val(SIZE, 1000.0)),
            vec![[100.0, 100.0]; 25],
        );
        input.depth_time = 10.2;
        let output = extractor.extract_frame(input)?;

        assert!(output.stale);
        assert!(output.depth_in_color.is_none());
        assert_eq!(output.keypoints_3d.len(), 25);
        assert_eq!(output.num_invalid(), 25);
        assert!(output.keypoints_depth.iter().flatten().all(|v| v.is_nan()));
        Ok(())
    }

    #[test]
    fn test_cached_and_fresh_maps_agree() -> Result<(), Box<dyn std::error::Error>> {
        let color = CameraIntrinsic::new(615.0, 614.0, 100.0, 80.0);
        let depth = CameraIntrinsic::new(385.0, 385.0, 64.0, 48.0);
        let extrinsic = CameraExtrinsic::from_slices(
            &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            &[0.015, 0.0, 0.0],
            1000.0,
        )?;
        let bundle = TransformBundle::new(&color, &depth, &extrinsic)?;
        let config = ExtractionConfig::default();
        let depth_size = ImageSize {
            width: 128,
            height: 96,
        };
        let color_size = ImageSize {
            width: 200,
            height: 160,
        };
        let extractor =
            FrameExtractor::new(&bundle, &config, &PinholeGeometry, depth_size, color_size);

        let data = (0..depth_size.num_pixels())
            .map(|p| 800.0 + (p % 97) as f32 * 3.0)
            .collect();
        let keypoints = vec![[100.0, 80.0], [60.0, 40.0], [150.0, 120.0]];
        let fresh = extractor.extract_frame(frame(
            DepthSource::Raw(Image::new(depth_size, data)?),
            keypoints.clone(),
        ))?;
        let depth_map = fresh.depth_in_color.clone().ok_or("missing depth map")?;
        let cached = extractor.extract_frame(frame(DepthSource::Mapped(depth_map), keypoints))?;

        assert_eq!(fresh.keypoints_3d, cached.keypoints_3d);
        assert_eq!(fresh.keypoints_depth, cached.keypoints_depth);
        assert_eq!(fresh.num_invalid(), 0);
        Ok(())
    }

    #[test]
    fn test_size_mismatch() -> Result<(), GeometryError> {
        let bundle = identity_bundle()?;
        let config = ExtractionConfig::default();
        let extractor = FrameExtractor::new(&bundle, &config, &PinholeGeometry, SIZE, SIZE);

        let small = Image::from_size_val(
            ImageSize {
                width: 10,
                height: 10,
            },
            1000.0,
        );
        assert!(matches!(
            extractor.extract_frame(frame(DepthSource::Raw(small.clone()), vec![])),
            Err(ExtractError::DepthSizeMismatch { .. })
        ));
        assert!(matches!(
            extractor.extract_frame(frame(DepthSource::Mapped(small), vec![])),
            Err(ExtractError::MapSizeMismatch { .. })
        ));
        Ok(())
    }
}
