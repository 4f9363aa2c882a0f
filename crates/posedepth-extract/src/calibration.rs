use std::path::Path;

use posedepth_3d::{camera::CameraExtrinsic, GeometryError};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::CalibrationError;

#[derive(Deserialize)]
struct RawEntry {
    rotation: Vec<f64>,
    translation: Vec<f64>,
}

/// One recorded depth-to-color extrinsic.
///
/// The translation is kept in meters as recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationEntry {
    /// The time the calibration was recorded.
    pub timestamp: f64,
    /// The rotation, 9 values in row-major order.
    pub rotation: [f64; 9],
    /// The translation in meters.
    pub translation: [f64; 3],
}

impl CalibrationEntry {
    /// The extrinsic with the translation converted to millimeters.
    pub fn extrinsic(&self) -> Result<CameraExtrinsic, GeometryError> {
        CameraExtrinsic::from_slices(&self.rotation, &self.translation, 1000.0)
    }
}

/// Depth-to-color extrinsics recorded at several points in time.
///
/// Entries keep the order of the table they were parsed from.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationTable {
    entries: Vec<CalibrationEntry>,
}

impl CalibrationTable {
    /// Parse a table of the form `{"<timestamp>": {"rotation": [..9], "translation": [..3]}}`.
    pub fn from_json(json: &str) -> Result<Self, CalibrationError> {
        let raw: Map<String, Value> = serde_json::from_str(json)?;
        Self::from_raw(raw)
    }

    /// Parse a table nested by recording source and camera,
    /// `{"<source>": {"<camera>": table}}`, and select one.
    pub fn from_json_nested(json: &str, source: &str, camera: &str) -> Result<Self, CalibrationError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let table = value
            .get(source)
            .and_then(|cameras| cameras.get(camera))
            .ok_or_else(|| CalibrationError::MissingCalibration {
                source_name: source.to_string(),
                camera: camera.to_string(),
            })?;
        let raw: Map<String, Value> = serde_json::from_value(table.clone())?;
        Self::from_raw(raw)
    }

    /// Load a table file, `None` when the file does not exist.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Option<Self>, CalibrationError> {
        let Some(contents) = read_optional(path.as_ref())? else {
            return Ok(None);
        };
        Self::from_json(&contents).map(Some)
    }

    /// Load a nested table file, `None` when the file does not exist.
    pub fn load_file_nested(
        path: impl AsRef<Path>,
        source: &str,
        camera: &str,
    ) -> Result<Option<Self>, CalibrationError> {
        let Some(contents) = read_optional(path.as_ref())? else {
            return Ok(None);
        };
        Self::from_json_nested(&contents, source, camera).map(Some)
    }

    fn from_raw(raw: Map<String, Value>) -> Result<Self, CalibrationError> {
        let entries = raw
            .into_iter()
            .map(|(key, value)| {
                let entry: RawEntry = serde_json::from_value(value)?;
                parse_entry(key, entry)
            })
            .collect::<Result<Vec<_>, CalibrationError>>()?;
        if entries.is_empty() {
            return Err(CalibrationError::EmptyTable);
        }
        Ok(Self { entries })
    }

    /// The entry recorded closest to `timestamp`.
    ///
    /// On a tie the entry found first in table order wins.
    pub fn nearest(&self, timestamp: f64) -> &CalibrationEntry {
        let mut best = &self.entries[0];
        let mut best_distance = (best.timestamp - timestamp).abs();
        for entry in self.entries.iter().skip(1) {
            let distance = (entry.timestamp - timestamp).abs();
            if distance < best_distance {
                best = entry;
                best_distance = distance;
            }
        }
        best
    }

    /// The entries, in table order.
    pub fn entries(&self) -> &[CalibrationEntry] {
        &self.entries
    }

    /// Number of entries. Never zero.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false, tables cannot be empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, CalibrationError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("no calibration table at {}", path.display());
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

fn parse_entry(key: String, entry: RawEntry) -> Result<CalibrationEntry, CalibrationError> {
    let malformed = |reason: String| CalibrationError::MalformedEntry {
        key: key.clone(),
        reason,
    };
    let timestamp = key
        .trim()
        .parse::<f64>()
        .map_err(|_| malformed("key is not a timestamp".to_string()))?;
    let rotation: [f64; 9] = entry
        .rotation
        .as_slice()
        .try_into()
        .map_err(|_| malformed(format!("rotation has {} values", entry.rotation.len())))?;
    let translation: [f64; 3] = entry
        .translation
        .as_slice()
        .try_into()
        .map_err(|_| malformed(format!("translation has {} values", entry.translation.len())))?;

    Ok(CalibrationEntry {
        timestamp,
        rotation,
        translation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = r#"{
        "1600000100.0": {"rotation": [1, 0, 0, 0, 1, 0, 0, 0, 1], "translation": [0.015, 0, 0]},
        "1600000000.0": {"rotation": [1, 0, 0, 0, 1, 0, 0, 0, 1], "translation": [0.014, 0, 0]},
        "1600000300.0": {"rotation": [1, 0, 0, 0, 1, 0, 0, 0, 1], "translation": [0.016, 0, 0]}
    }"#;

    #[test]
    fn test_nearest() -> Result<(), CalibrationError> {
        let table = CalibrationTable::from_json(TABLE)?;
        assert_eq!(table.len(), 3);
        assert_eq!(table.nearest(1600000010.0).timestamp, 1600000000.0);
        assert_eq!(table.nearest(1600000180.0).timestamp, 1600000100.0);
        assert_eq!(table.nearest(1700000000.0).timestamp, 1600000300.0);
        assert_eq!(table.nearest(0.0).timestamp, 1600000000.0);
        Ok(())
    }

    #[test]
    fn test_nearest_tie_takes_first_found() -> Result<(), CalibrationError> {
        let table = CalibrationTable::from_json(TABLE)?;
        let timestamps: Vec<f64> = table.entries().iter().map(|e| e.timestamp).collect();
        assert_eq!(timestamps, vec![1600000100.0, 1600000000.0, 1600000300.0]);
        assert_eq!(table.nearest(1600000050.0).timestamp, 1600000100.0);
        assert_eq!(table.nearest(1600000200.0).timestamp, 1600000100.0);

        let table = CalibrationTable::from_json(
            r#"{
                "0.0": {"rotation": [1, 0, 0, 0, 1, 0, 0, 0, 1], "translation": [0, 0, 0]},
                "100.0": {"rotation": [1, 0, 0, 0, 1, 0, 0, 0, 1], "translation": [0, 0, 0]}
            }"#,
        )?;
        assert_eq!(table.nearest(50.0).timestamp, 0.0);
        Ok(())
    }

    #[test]
    fn test_extrinsic_in_millimeters() -> Result<(), Box<dyn std::error::Error>> {
        let table = CalibrationTable::from_json(TABLE)?;
        let extrinsic = table.nearest(1600000300.0).extrinsic()?;
        approx::assert_relative_eq!(extrinsic.translation[0], 16.0, epsilon = 1e-9);
        assert_eq!(extrinsic.translation[1], 0.0);
        Ok(())
    }

    #[test]
    fn test_nested() -> Result<(), CalibrationError> {
        let nested = format!(r#"{{"bag": {{"lower": {TABLE}}}}}"#);
        let table = CalibrationTable::from_json_nested(&nested, "bag", "lower")?;
        assert_eq!(table.len(), 3);
        assert_eq!(table.nearest(1600000050.0).timestamp, 1600000100.0);
        assert!(matches!(
            CalibrationTable::from_json_nested(&nested, "bag", "upper"),
            Err(CalibrationError::MissingCalibration { camera, .. }) if camera == "upper"
        ));
        Ok(())
    }

    #[test]
    fn test_malformed() {
        assert!(matches!(
            CalibrationTable::from_json(r#"{"1.0": {"rotation": [1, 0], "translation": [0, 0, 0]}}"#),
            Err(CalibrationError::MalformedEntry { .. })
        ));
        assert!(matches!(
            CalibrationTable::from_json(
                r#"{"later": {"rotation": [1, 0, 0, 0, 1, 0, 0, 0, 1], "translation": [0, 0, 0]}}"#
            ),
            Err(CalibrationError::MalformedEntry { key, .. }) if key == "later"
        ));
        assert!(matches!(
            CalibrationTable::from_json("{}"),
            Err(CalibrationError::EmptyTable)
        ));
    }

    #[test]
    fn test_load_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("transforms.json");
        assert!(CalibrationTable::load_file(&path)?.is_none());

        std::fs::write(&path, TABLE)?;
        assert!(CalibrationTable::load_file(&path)?.is_some());

        std::fs::write(&path, "{ not json")?;
        assert!(matches!(
            CalibrationTable::load_file(&path),
            Err(CalibrationError::Json(_))
        ));
        Ok(())
    }
}
