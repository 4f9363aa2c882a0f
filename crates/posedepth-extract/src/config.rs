use std::{path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Environment variable overriding [`ExtractionConfig::min_valid_depth_m`].
pub const ENV_MIN_VALID_DEPTH: &str = "POSEDEPTH_MIN_VALID_DEPTH";
/// Environment variable overriding [`ExtractionConfig::max_valid_depth_m`].
pub const ENV_MAX_VALID_DEPTH: &str = "POSEDEPTH_MAX_VALID_DEPTH";
/// Environment variable overriding [`ExtractionConfig::window_size`].
pub const ENV_WINDOW_SIZE: &str = "POSEDEPTH_WINDOW_SIZE";
/// Environment variable overriding [`ExtractionConfig::max_time_disparity`].
pub const ENV_MAX_TIME_DISPARITY: &str = "POSEDEPTH_MAX_TIME_DISPARITY";
/// Environment variable overriding [`ExtractionConfig::chunk_size`].
pub const ENV_CHUNK_SIZE: &str = "POSEDEPTH_CHUNK_SIZE";
/// Environment variable overriding [`ExtractionConfig::num_workers`].
pub const ENV_NUM_WORKERS: &str = "POSEDEPTH_NUM_WORKERS";

/// Configuration of the depth extraction.
///
/// Missing fields in a configuration file take their default value.
///
/// # Fields
///
/// * `min_valid_depth_m` - Depth below this is treated as no data (meters).
/// * `max_valid_depth_m` - Depth above this is treated as no data (meters).
/// * `window_size` - Edge of the square window sampled around a keypoint, in pixels. Must be odd.
/// * `max_time_disparity` - Largest accepted gap between the color and the matched depth timestamps.
/// * `chunk_size` - Number of frames loaded and processed together.
/// * `num_workers` - Size of the worker pool, the available parallelism when `None`.
/// * `show_progress` - Whether to draw a progress bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Depth below this is treated as no data (meters).
    pub min_valid_depth_m: f64,
    /// Depth above this is treated as no data (meters).
    pub max_valid_depth_m: f64,
    /// Edge of the sampling window in pixels.
    pub window_size: usize,
    /// Largest accepted gap between color and depth timestamps.
    pub max_time_disparity: f64,
    /// Number of frames per chunk.
    pub chunk_size: usize,
    /// Size of the worker pool.
    pub num_workers: Option<usize>,
    /// Whether to draw a progress bar.
    pub show_progress: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_valid_depth_m: 0.1,
            max_valid_depth_m: 10.0,
            window_size: 5,
            max_time_disparity: 0.05,
            chunk_size: 5000,
            num_workers: None,
            show_progress: true,
        }
    }
}

impl ExtractionConfig {
    /// Read a configuration from a JSON file.
    ///
    /// The file is not validated; call [`ExtractionConfig::validate`] once
    /// every override has been applied.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Override fields from the `POSEDEPTH_*` environment variables.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Override fields from any key-value source using the environment variable names.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(value) = lookup(ENV_MIN_VALID_DEPTH) {
            self.min_valid_depth_m = parse_value(ENV_MIN_VALID_DEPTH, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_VALID_DEPTH) {
            self.max_valid_depth_m = parse_value(ENV_MAX_VALID_DEPTH, &value)?;
        }
        if let Some(value) = lookup(ENV_WINDOW_SIZE) {
            self.window_size = parse_value(ENV_WINDOW_SIZE, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_TIME_DISPARITY) {
            self.max_time_disparity = parse_value(ENV_MAX_TIME_DISPARITY, &value)?;
        }
        if let Some(value) = lookup(ENV_CHUNK_SIZE) {
            self.chunk_size = parse_value(ENV_CHUNK_SIZE, &value)?;
        }
        if let Some(value) = lookup(ENV_NUM_WORKERS) {
            self.num_workers = Some(parse_value(ENV_NUM_WORKERS, &value)?);
        }
        Ok(self)
    }

    /// Check that the configuration describes a runnable extraction.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (min, max) = (self.min_valid_depth_m, self.max_valid_depth_m);
        if !(min.is_finite() && max.is_finite()) || min < 0.0 || min >= max {
            return Err(ConfigError::InvalidDepthRange { min, max });
        }
        if self.window_size % 2 == 0 {
            return Err(ConfigError::EvenWindowSize(self.window_size));
        }
        if !self.max_time_disparity.is_finite() || self.max_time_disparity < 0.0 {
            return Err(ConfigError::InvalidTimeDisparity(self.max_time_disparity));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if self.num_workers == Some(0) {
            return Err(ConfigError::ZeroWorkers);
        }
        Ok(())
    }

    /// The lower depth validity bound in millimeters.
    pub fn min_valid_depth_mm(&self) -> f32 {
        (self.min_valid_depth_m * 1000.0) as f32
    }

    /// The upper depth validity bound in millimeters.
    pub fn max_valid_depth_mm(&self) -> f32 {
        (self.max_valid_depth_m * 1000.0) as f32
    }

    /// Distance from the sampled pixel to the edge of the window.
    pub fn half_window(&self) -> usize {
        self.window_size.saturating_sub(1) / 2
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnvValue {
            key: key.to_string(),
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_is_valid() -> Result<(), ConfigError> {
        let config = ExtractionConfig::default();
        config.validate()?;
        assert_eq!(config.min_valid_depth_mm(), 100.0);
        assert_eq!(config.max_valid_depth_mm(), 10000.0);
        assert_eq!(config.half_window(), 2);
        Ok(())
    }

    #[test]
    fn test_validate() {
        let even = ExtractionConfig {
            window_size: 4,
            ..Default::default()
        };
        assert!(matches!(even.validate(), Err(ConfigError::EvenWindowSize(4))));

        let inverted = ExtractionConfig {
            min_valid_depth_m: 5.0,
            max_valid_depth_m: 1.0,
            ..Default::default()
        };
        assert!(matches!(
            inverted.validate(),
            Err(ConfigError::InvalidDepthRange { .. })
        ));

        let no_chunk = ExtractionConfig {
            chunk_size: 0,
            ..Default::default()
        };
        assert!(matches!(no_chunk.validate(), Err(ConfigError::ZeroChunkSize)));

        let no_workers = ExtractionConfig {
            num_workers: Some(0),
            ..Default::default()
        };
        assert!(matches!(no_workers.validate(), Err(ConfigError::ZeroWorkers)));

        let nan_disparity = ExtractionConfig {
            max_time_disparity: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(
            nan_disparity.validate(),
            Err(ConfigError::InvalidTimeDisparity(_))
        ));
    }

    #[test]
    fn test_overrides() -> Result<(), ConfigError> {
        let vars = HashMap::from([
            (ENV_WINDOW_SIZE, "7"),
            (ENV_NUM_WORKERS, " 3 "),
            (ENV_MAX_VALID_DEPTH, "4.5"),
        ]);
        let config = ExtractionConfig::default()
            .with_overrides(|key| vars.get(key).map(|v| v.to_string()))?;
        assert_eq!(config.window_size, 7);
        assert_eq!(config.num_workers, Some(3));
        assert_eq!(config.max_valid_depth_m, 4.5);
        assert_eq!(config.chunk_size, 5000);

        let bad = HashMap::from([(ENV_CHUNK_SIZE, "many")]);
        let result =
            ExtractionConfig::default().with_overrides(|key| bad.get(key).map(|v| v.to_string()));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidEnvValue { key, .. }) if key == ENV_CHUNK_SIZE
        ));
        Ok(())
    }

    #[test]
    fn test_from_json_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "window_size": 9, "show_progress": false }"#)?;

        let config = ExtractionConfig::from_json_file(&path)?;
        assert_eq!(config.window_size, 9);
        assert!(!config.show_progress);
        assert_eq!(config.max_time_disparity, 0.05);

        std::fs::write(&path, "{ window_size: ")?;
        assert!(matches!(
            ExtractionConfig::from_json_file(&path),
            Err(ConfigError::Json(_))
        ));
        Ok(())
    }
}
