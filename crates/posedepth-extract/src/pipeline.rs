use std::ops::Range;

use indicatif::{ParallelProgressIterator, ProgressBar, ProgressDrawTarget, ProgressStyle};
use posedepth_3d::{
    camera::{CameraExtrinsic, CameraIntrinsic},
    transforms::TransformBundle,
};
use posedepth_image::{Image, ImageSize};
use posedepth_store::{AttrValue, DType, DatasetStore, StoreError};
use rayon::prelude::*;

use crate::{
    calibration::CalibrationTable,
    config::ExtractionConfig,
    error::{ExtractError, PipelineError},
    extractor::{DepthGeometry, DepthSource, FrameExtractor, FrameInput, FrameOutput, PinholeGeometry},
};

/// Attribute holding the row-major intrinsic matrix of an image dataset.
pub const INTRINSICS_ATTR: &str = "K";
/// Attribute holding the depth-to-color rotation on the color dataset.
pub const ROTATION_ATTR: &str = "depth_to_color-rotation";
/// Attribute holding the depth-to-color translation in meters on the color dataset.
pub const TRANSLATION_ATTR: &str = "depth_to_color-translation";
/// Attribute marking the depth map cache as fully computed.
pub const COMPLETE_ATTR: &str = "complete";
/// Attribute describing an output dataset.
pub const DESC_ATTR: &str = "desc";

const KEYPOINTS_3D_DESC: &str = "Keypoints in 3D coordinates using the raw depth from the depth \
    sensor, indexed at keypoints. Depth is used to provide x, y, and z in metric space (millimeters)";
const KEYPOINTS_DEPTH_DESC: &str = "Keypoints in the depth image frame space (pixels)";
const DEPTH_MAP_DESC: &str = "Depth points mapped into the color image frame as depth in millimeters";

/// The names of the datasets read and written by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetNames {
    /// Index of the depth frame matched to each color frame. Input store.
    pub matched_depth_index: String,
    /// Color images, `(frames, height, width, ...)`. Input store.
    pub color_data: String,
    /// Color timestamps. Input store.
    pub color_time: String,
    /// Depth images in millimeters, `(frames, height, width)`. Input store.
    pub depth_data: String,
    /// Depth timestamps. Input store.
    pub depth_time: String,
    /// Keypoints in color pixels, `(frames, keypoints, >= 2)`. Output store.
    pub keypoints: String,
    /// Depth maps in the color frame. Output store.
    pub depth_map: String,
    /// Keypoints in 3D. Output store.
    pub keypoints_3d: String,
    /// Keypoints in depth pixels. Output store.
    pub keypoints_depth: String,
}

impl DatasetNames {
    /// The dataset names of a camera and a set of pose detections.
    ///
    /// Example:
    ///
    /// ```
    /// use posedepth_extract::DatasetNames;
    ///
    /// let names = DatasetNames::new("lower", "lower/pose");
    /// assert_eq!(names.depth_time, "lower/depth/time");
    /// assert_eq!(names.keypoints_3d, "lower/pose/3d-realsense-raw");
    /// ```
    pub fn new(camera_root: &str, pose_root: &str) -> Self {
        Self {
            matched_depth_index: format!("{camera_root}/color/matched_depth_index"),
            color_data: format!("{camera_root}/color/data"),
            color_time: format!("{camera_root}/color/time"),
            depth_data: format!("{camera_root}/depth/data"),
            depth_time: format!("{camera_root}/depth/time"),
            keypoints: format!("{pose_root}/color"),
            depth_map: format!("{camera_root}/color/depth_map"),
            keypoints_3d: format!("{pose_root}/3d-realsense-raw"),
            keypoints_depth: format!("{pose_root}/depth"),
        }
    }
}

/// How the frames of a chunk are run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStrategy {
    /// On the calling thread, used when the depth maps are cached.
    Serial,
    /// On a worker pool with the given number of threads.
    Pool(usize),
}

impl std::fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ExecutionStrategy::Serial => write!(f, "serial"),
            ExecutionStrategy::Pool(workers) => write!(f, "pool of {workers} workers"),
        }
    }
}

/// What a pipeline run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    /// Number of frames extracted.
    pub frames: usize,
    /// Number of chunks processed.
    pub chunks: usize,
    /// Chunks run with [`ExecutionStrategy::Serial`].
    pub serial_chunks: usize,
    /// Chunks run with [`ExecutionStrategy::Pool`].
    pub pooled_chunks: usize,
    /// Frames whose matched depth was too far in time.
    pub stale_frames: usize,
    /// Keypoints left NaN in frames that were not stale.
    pub invalid_keypoints: usize,
    /// Whether the cached depth maps were used.
    pub dense_map_reused: bool,
    /// Whether the run stopped early for lack of depth data.
    pub early_exit: bool,
}

/// Runs the depth extraction over a whole recording, chunk by chunk.
///
/// Reads the camera datasets from an input store and the keypoints from
/// the output store, and writes the 3D keypoints, the depth-frame keypoints
/// and the depth map cache to the output store. Workers never touch a store.
pub struct DepthPipeline<G: DepthGeometry = PinholeGeometry> {
    config: ExtractionConfig,
    names: DatasetNames,
    geometry: G,
}

impl DepthPipeline<PinholeGeometry> {
    /// Create a pipeline for a camera and a set of pose detections.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] when the configuration is invalid.
    pub fn new(
        config: ExtractionConfig,
        camera_root: &str,
        pose_root: &str,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            config,
            names: DatasetNames::new(camera_root, pose_root),
            geometry: PinholeGeometry,
        })
    }
}

impl<G: DepthGeometry> DepthPipeline<G> {
    /// Replace the geometry implementation.
    pub fn with_geometry<H: DepthGeometry>(self, geometry: H) -> DepthPipeline<H> {
        DepthPipeline {
            config: self.config,
            names: self.names,
            geometry,
        }
    }

    /// The configuration.
    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// The dataset names.
    pub fn names(&self) -> &DatasetNames {
        &self.names
    }

    /// The geometry implementation.
    pub fn geometry(&self) -> &G {
        &self.geometry
    }

    /// Extract the keypoint depth of every frame.
    ///
    /// When the depth map cache is complete and `rerun` is false the frames
    /// are sampled from the cache on the calling thread. Otherwise the raw
    /// depth images are loaded and the frames run on a worker pool, which
    /// also fills the cache. The cache is marked complete only after the
    /// last chunk is written.
    ///
    /// The cache reflects the configuration of the run that built it. Frames
    /// that were stale then have a NaN map, which holds no depth data, so
    /// pass `rerun` after changing the valid depth range or the time disparity.
    ///
    /// # Arguments
    ///
    /// * `input` - The store holding the camera datasets.
    /// * `output` - The store holding the keypoints, receiving the results.
    /// * `calibration` - Extrinsics to use when the color dataset has none.
    /// * `rerun` - Recompute the depth maps even when cached.
    pub fn run<I, O>(
        &self,
        input: &I,
        output: &mut O,
        calibration: Option<&CalibrationTable>,
        rerun: bool,
    ) -> Result<PipelineSummary, PipelineError>
    where
        I: DatasetStore + ?Sized,
        O: DatasetStore + ?Sized,
    {
        let names = &self.names;

        let color_shape = input.shape(&names.color_data)?;
        if color_shape.len() < 3 {
            return Err(invalid_shape(&names.color_data, color_shape, "(frames, height, width, ..)"));
        }
        let num_frames = color_shape[0];
        let color_size = ImageSize {
            width: color_shape[2],
            height: color_shape[1],
        };

        let keypoints_shape = output.shape(&names.keypoints)?;
        if keypoints_shape.len() != 3 || keypoints_shape[2] < 2 {
            return Err(invalid_shape(&names.keypoints, keypoints_shape, "(frames, keypoints, >= 2)"));
        }
        let num_keypoints = keypoints_shape[1];

        log::info!(
            "extracting depth of {num_keypoints} keypoints over {num_frames} frames into {}",
            names.keypoints_3d
        );

        prepare_output(
            output,
            &names.keypoints_3d,
            &[num_frames, num_keypoints, 3],
            KEYPOINTS_3D_DESC,
        )?;
        prepare_output(
            output,
            &names.keypoints_depth,
            &[num_frames, num_keypoints, 2],
            KEYPOINTS_DEPTH_DESC,
        )?;
        let grown = prepare_output(
            output,
            &names.depth_map,
            &[num_frames, color_size.height, color_size.width],
            DEPTH_MAP_DESC,
        )?;
        let cache_complete = !grown
            && output
                .attr(&names.depth_map, COMPLETE_ATTR)?
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
        let reuse_cache = cache_complete && !rerun;
        if !reuse_cache {
            output.set_attr(&names.depth_map, COMPLETE_ATTR, AttrValue::Bool(false))?;
        }

        if !input.contains(&names.matched_depth_index)
            || input.is_empty(&names.matched_depth_index)?
        {
            log::warn!(
                "no depth data in {}, filling the outputs with NaN",
                names.matched_depth_index
            );
            output.fill_f32(&names.keypoints_3d, f32::NAN)?;
            output.fill_f32(&names.keypoints_depth, f32::NAN)?;
            output.fill_f32(&names.depth_map, f32::NAN)?;
            output.set_attr(&names.depth_map, COMPLETE_ATTR, AttrValue::Bool(true))?;
            return Ok(PipelineSummary {
                early_exit: true,
                ..Default::default()
            });
        }

        let bundle = self.build_transforms(input, calibration)?;

        let depth_shape = input.shape(&names.depth_data)?;
        if depth_shape.len() != 3 {
            return Err(invalid_shape(&names.depth_data, depth_shape, "(frames, height, width)"));
        }
        let depth_size = ImageSize {
            width: depth_shape[2],
            height: depth_shape[1],
        };

        let extractor =
            FrameExtractor::new(&bundle, &self.config, &self.geometry, depth_size, color_size);

        let strategy = if reuse_cache {
            log::info!("reusing the cached depth maps in {}", names.depth_map);
            ExecutionStrategy::Serial
        } else {
            ExecutionStrategy::Pool(
                self.config
                    .num_workers
                    .unwrap_or_else(rayon::current_num_threads),
            )
        };
        let pool = match strategy {
            ExecutionStrategy::Serial => None,
            ExecutionStrategy::Pool(workers) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .build()?,
            ),
        };

        let progress = self.progress_bar(num_frames)?;
        progress.set_message(strategy.to_string());

        let mut summary = PipelineSummary {
            frames: num_frames,
            dense_map_reused: reuse_cache,
            ..Default::default()
        };

        for start in (0..num_frames).step_by(self.config.chunk_size) {
            let rows = start..(start + self.config.chunk_size).min(num_frames);
            log::debug!("chunk {rows:?} with {strategy}");

            let frames = self.read_chunk(
                input,
                output,
                rows.clone(),
                depth_shape[0],
                &extractor,
                reuse_cache,
            )?;

            let extracted = match &pool {
                None => frames
                    .into_iter()
                    .map(|frame| {
                        let result = extract(&extractor, frame);
                        progress.inc(1);
                        result
                    })
                    .collect::<Result<Vec<_>, _>>(),
                Some(pool) => pool.install(|| {
                    frames
                        .into_par_iter()
                        .progress_with(progress.clone())
                        .map(|frame| extract(&extractor, frame))
                        .collect::<Result<Vec<_>, _>>()
                }),
            };
            let mut outputs = extracted
                .map_err(|(frame, source)| PipelineError::Worker { frame, source })?;
            outputs.sort_by_key(|out| out.index);

            self.write_chunk(output, rows.start, &outputs, color_size, !reuse_cache, &mut summary)?;

            summary.chunks += 1;
            match strategy {
                ExecutionStrategy::Serial => summary.serial_chunks += 1,
                ExecutionStrategy::Pool(_) => summary.pooled_chunks += 1,
            }
        }

        output.set_attr(&names.depth_map, COMPLETE_ATTR, AttrValue::Bool(true))?;
        progress.finish();

        log::info!(
            "extracted {} frames in {} chunks, {} stale, {} invalid keypoints",
            summary.frames,
            summary.chunks,
            summary.stale_frames,
            summary.invalid_keypoints
        );

        Ok(summary)
    }

    fn build_transforms<I: DatasetStore + ?Sized>(
        &self,
        input: &I,
        calibration: Option<&CalibrationTable>,
    ) -> Result<TransformBundle, PipelineError> {
        let extrinsic = self.load_extrinsic(input, calibration)?;
        let color = load_intrinsic(input, &self.names.color_data)?;
        let depth = load_intrinsic(input, &self.names.depth_data)?;
        Ok(TransformBundle::new(&color, &depth, &extrinsic)?)
    }

    fn load_extrinsic<I: DatasetStore + ?Sized>(
        &self,
        input: &I,
        calibration: Option<&CalibrationTable>,
    ) -> Result<CameraExtrinsic, PipelineError> {
        let names = &self.names;
        let rotation = input
            .attr(&names.color_data, ROTATION_ATTR)?
            .and_then(|v| v.as_f64_vec());
        let translation = input
            .attr(&names.color_data, TRANSLATION_ATTR)?
            .and_then(|v| v.as_f64_vec());
        if let (Some(rotation), Some(translation)) = (rotation, translation) {
            return Ok(CameraExtrinsic::from_slices(&rotation, &translation, 1000.0)?);
        }

        let Some(table) = calibration else {
            return Err(PipelineError::MissingExtrinsics(names.color_data.clone()));
        };

        let num_times = input.len(&names.color_time)?;
        let target = if num_times == 0 {
            0.0
        } else {
            let first = input.read_rows_f64(&names.color_time, 0..1)?;
            let last = input.read_rows_f64(&names.color_time, num_times - 1..num_times)?;
            match (first.first(), last.first()) {
                (Some(t0), Some(t1)) => t0 + (t1 - t0) / 2.0,
                _ => 0.0,
            }
        };
        let entry = table.nearest(target);
        log::warn!(
            "no extrinsics on {}, using the calibration recorded at {}",
            names.color_data,
            entry.timestamp
        );

        Ok(entry.extrinsic()?)
    }

    fn read_chunk<I, O>(
        &self,
        input: &I,
        output: &O,
        rows: Range<usize>,
        num_depth_frames: usize,
        extractor: &FrameExtractor<'_, G>,
        reuse_cache: bool,
    ) -> Result<Vec<FrameInput>, PipelineError>
    where
        I: DatasetStore + ?Sized,
        O: DatasetStore + ?Sized,
    {
        let names = &self.names;
        let matched = input.read_rows_i64(&names.matched_depth_index, rows.clone())?;
        let color_times = input.read_rows_f64(&names.color_time, rows.clone())?;

        let keypoints_shape = output.shape(&names.keypoints)?;
        let (num_keypoints, channels) = (keypoints_shape[1], keypoints_shape[2]);
        let keypoints = output.read_rows_f32(&names.keypoints, rows.clone())?;

        let color_size = extractor.color_size();
        let depth_maps = if reuse_cache {
            Some(output.read_rows_f32(&names.depth_map, rows.clone())?)
        } else {
            None
        };

        let mut frames = Vec::with_capacity(rows.len());
        for (offset, index) in rows.enumerate() {
            let matched_index = matched[offset];
            let depth_row = usize::try_from(matched_index)
                .ok()
                .filter(|&row| row < num_depth_frames)
                .ok_or(PipelineError::InvalidMatchedIndex {
                    frame: index,
                    index: matched_index,
                    len: num_depth_frames,
                })?;
            let depth_time = input
                .read_rows_f64(&names.depth_time, depth_row..depth_row + 1)?
                .first()
                .copied()
                .unwrap_or(f64::NAN);

            let depth = match &depth_maps {
                Some(maps) => {
                    let len = color_size.num_pixels();
                    let map = maps[offset * len..(offset + 1) * len].to_vec();
                    DepthSource::Mapped(Image::new(color_size, map)?)
                }
                None => {
                    let data = input.read_rows_f32(&names.depth_data, depth_row..depth_row + 1)?;
                    DepthSource::Raw(Image::new(extractor.depth_size(), data)?)
                }
            };

            let base = offset * num_keypoints * channels;
            let keypoints = (0..num_keypoints)
                .map(|k| {
                    let i = base + k * channels;
                    [keypoints[i], keypoints[i + 1]]
                })
                .collect();

            frames.push(FrameInput {
                index,
                depth,
                keypoints,
                depth_time,
                color_time: color_times[offset],
            });
        }

        Ok(frames)
    }

    fn write_chunk<O: DatasetStore + ?Sized>(
        &self,
        output: &mut O,
        start: usize,
        outputs: &[FrameOutput],
        color_size: ImageSize,
        write_maps: bool,
        summary: &mut PipelineSummary,
    ) -> Result<(), PipelineError> {
        let names = &self.names;

        let mut points: Vec<f32> = Vec::new();
        let mut pixels: Vec<f32> = Vec::new();
        for out in outputs {
            points.extend(out.keypoints_3d.iter().flatten());
            pixels.extend(out.keypoints_depth.iter().flatten());
            if out.stale {
                summary.stale_frames += 1;
            } else {
                summary.invalid_keypoints += out.num_invalid();
            }
        }
        output.write_rows_f32(&names.keypoints_3d, start, &points)?;
        output.write_rows_f32(&names.keypoints_depth, start, &pixels)?;

        if write_maps {
            let mut missing: Option<Vec<f32>> = None;
            for (offset, out) in outputs.iter().enumerate() {
                let row = match &out.depth_in_color {
                    Some(map) => map.as_slice(),
                    // stale frames have no depth map
                    None => missing
                        .get_or_insert_with(|| vec![f32::NAN; color_size.num_pixels()])
                        .as_slice(),
                };
                output.write_rows_f32(&names.depth_map, start + offset, row)?;
            }
        }

        Ok(())
    }

    fn progress_bar(&self, len: usize) -> Result<ProgressBar, PipelineError> {
        let pb = ProgressBar::new(len as u64);
        if !self.config.show_progress {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        }
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>7}/{len:7} ({eta}) {msg}",
                )?
                .progress_chars("##>-"),
        );
        Ok(pb)
    }
}

fn extract<G: DepthGeometry>(
    extractor: &FrameExtractor<'_, G>,
    frame: FrameInput,
) -> Result<FrameOutput, (usize, ExtractError)> {
    let index = frame.index;
    extractor.extract_frame(frame).map_err(|err| (index, err))
}

fn load_intrinsic<I: DatasetStore + ?Sized>(
    input: &I,
    name: &str,
) -> Result<CameraIntrinsic, PipelineError> {
    let k = input
        .attr(name, INTRINSICS_ATTR)?
        .and_then(|v| v.as_f64_vec())
        .ok_or_else(|| StoreError::MissingAttribute {
            name: name.to_string(),
            key: INTRINSICS_ATTR.to_string(),
        })?;
    Ok(CameraIntrinsic::from_row_major(&k)?)
}

/// Create the dataset or grow it to `shape[0]` rows, then describe it.
///
/// Returns whether an existing dataset had to grow.
fn prepare_output<O: DatasetStore + ?Sized>(
    output: &mut O,
    name: &str,
    shape: &[usize],
    desc: &str,
) -> Result<bool, PipelineError> {
    let mut grown = false;
    if !output.contains(name) {
        output.create_dataset(name, DType::F32, shape)?;
    } else {
        let existing = output.shape(name)?;
        if existing.len() != shape.len() || existing[1..] != shape[1..] {
            return Err(invalid_shape(name, existing, &format!("{shape:?}")));
        }
        if existing[0] < shape[0] {
            log::debug!("growing {name} from {} to {} rows", existing[0], shape[0]);
            output.resize(name, shape[0])?;
            grown = true;
        }
    }
    output.set_attr(name, DESC_ATTR, AttrValue::from(desc))?;
    Ok(grown)
}

fn invalid_shape(name: &str, shape: Vec<usize>, expected: &str) -> PipelineError {
    PipelineError::InvalidShape {
        name: name.to_string(),
        shape,
        expected: expected.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_names() {
        let names = DatasetNames::new("upper", "upper/openpose");
        assert_eq!(names.matched_depth_index, "upper/color/matched_depth_index");
        assert_eq!(names.color_data, "upper/color/data");
        assert_eq!(names.depth_data, "upper/depth/data");
        assert_eq!(names.depth_map, "upper/color/depth_map");
        assert_eq!(names.keypoints, "upper/openpose/color");
        assert_eq!(names.keypoints_depth, "upper/openpose/depth");
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = ExtractionConfig {
            window_size: 6,
            ..Default::default()
        };
        assert!(matches!(
            DepthPipeline::new(config, "lower", "lower/pose"),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_strategy_display() {
        assert_eq!(ExecutionStrategy::Serial.to_string(), "serial");
        assert_eq!(ExecutionStrategy::Pool(4).to_string(), "pool of 4 workers");
    }
}
