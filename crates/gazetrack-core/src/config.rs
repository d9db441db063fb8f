//! Tracker tuning parameters.

use crate::eye::{CropPolicy, DEFAULT_CROP_MARGIN};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_TARGET_IRIS_SIZE: f64 = 0.48;
pub const DEFAULT_CALIBRATION_FRAMES: usize = 20;
pub const DEFAULT_THRESHOLD_MIN: u8 = 5;
pub const DEFAULT_THRESHOLD_MAX: u8 = 100;
pub const DEFAULT_SUSTAINED_BLINK_FRAMES: u32 = 5;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Tracker configuration. Every field has a default, so a TOML file only
/// needs the keys it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Pixels of context around each eye contour.
    pub crop_margin: u32,
    /// Paint pixels outside the eye contour white before pupil search.
    pub mask_outside_contour: bool,
    /// Learning-phase samples kept per eye before thresholds freeze.
    pub calibration_frames: usize,
    /// Dark-pixel fraction a well-chosen threshold should produce.
    pub target_iris_size: f64,
    pub threshold_min: u8,
    pub threshold_max: u8,
    /// Consecutive blinking frames before a sustained-blink anomaly.
    pub sustained_blink_frames: u32,
    /// Anomaly queue capacity; `None` is unbounded.
    pub anomaly_capacity: Option<usize>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            crop_margin: DEFAULT_CROP_MARGIN,
            mask_outside_contour: true,
            calibration_frames: DEFAULT_CALIBRATION_FRAMES,
            target_iris_size: DEFAULT_TARGET_IRIS_SIZE,
            threshold_min: DEFAULT_THRESHOLD_MIN,
            threshold_max: DEFAULT_THRESHOLD_MAX,
            sustained_blink_frames: DEFAULT_SUSTAINED_BLINK_FRAMES,
            anomaly_capacity: None,
        }
    }
}

impl TrackerConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(src: &str) -> Result<Self, ConfigError> {
        let config: TrackerConfig = toml::from_str(src)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threshold_min == 0 {
            return Err(ConfigError::Invalid {
                field: "threshold_min",
                reason: "must be at least 1".into(),
            });
        }
        if self.threshold_min > self.threshold_max {
            return Err(ConfigError::Invalid {
                field: "threshold_min",
                reason: format!(
                    "{} exceeds threshold_max {}",
                    self.threshold_min, self.threshold_max
                ),
            });
        }
        if self.calibration_frames == 0 {
            return Err(ConfigError::Invalid {
                field: "calibration_frames",
                reason: "must be at least 1".into(),
            });
        }
        if !(self.target_iris_size > 0.0 && self.target_iris_size < 1.0) {
            return Err(ConfigError::Invalid {
                field: "target_iris_size",
                reason: format!("{} is outside (0, 1)", self.target_iris_size),
            });
        }
        if self.sustained_blink_frames == 0 {
            return Err(ConfigError::Invalid {
                field: "sustained_blink_frames",
                reason: "must be at least 1".into(),
            });
        }
        if self.anomaly_capacity == Some(0) {
            return Err(ConfigError::Invalid {
                field: "anomaly_capacity",
                reason: "must be at least 1 when set".into(),
            });
        }
        Ok(())
    }

    pub fn crop_policy(&self) -> CropPolicy {
        CropPolicy {
            margin: self.crop_margin,
            mask_outside_contour: self.mask_outside_contour,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TrackerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.calibration_frames, 20);
        assert_eq!((config.threshold_min, config.threshold_max), (5, 100));
        assert!((config.target_iris_size - 0.48).abs() < 1e-12);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = TrackerConfig::from_toml_str("crop_margin = 8\nanomaly_capacity = 64\n").unwrap();
        assert_eq!(config.crop_margin, 8);
        assert_eq!(config.anomaly_capacity, Some(64));
        assert_eq!(config.calibration_frames, DEFAULT_CALIBRATION_FRAMES);
        assert!(config.mask_outside_contour);
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(TrackerConfig::from_toml_str("").unwrap(), TrackerConfig::default());
    }

    #[test]
    fn test_inverted_threshold_range_rejected() {
        let err = TrackerConfig::from_toml_str("threshold_min = 90\nthreshold_max = 10\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "threshold_min", .. }));
    }

    #[test]
    fn test_bad_target_rejected() {
        let err = TrackerConfig::from_toml_str("target_iris_size = 1.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "target_iris_size", .. }));
    }

    #[test]
    fn test_malformed_toml_rejected() {
        assert!(matches!(
            TrackerConfig::from_toml_str("crop_margin = \"wide\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_crop_policy() {
        let config = TrackerConfig { crop_margin: 7, mask_outside_contour: false, ..Default::default() };
        assert_eq!(config.crop_policy(), CropPolicy { margin: 7, mask_outside_contour: false });
    }
}
