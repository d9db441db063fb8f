use anyhow::{Context, Result};
use gazetrack_core::TrackerConfig;
use std::path::Path;

/// CLI configuration, loaded from environment variables.
pub struct Config {
    /// Tracker parameters: `GAZETRACK_CONFIG` TOML file, then per-field overrides.
    pub tracker: TrackerConfig,
    /// Depth of the request queue in front of the engine thread.
    pub queue_depth: usize,
}

impl Config {
    /// Load configuration from `GAZETRACK_*` environment variables with defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut tracker = match var("GAZETRACK_CONFIG") {
            Some(path) => load_tracker_file(Path::new(&path))?,
            None => TrackerConfig::default(),
        };

        tracker.crop_margin = parse_or(&var, "GAZETRACK_CROP_MARGIN", tracker.crop_margin);
        tracker.calibration_frames =
            parse_or(&var, "GAZETRACK_CALIBRATION_FRAMES", tracker.calibration_frames);
        tracker.target_iris_size =
            parse_or(&var, "GAZETRACK_TARGET_IRIS_SIZE", tracker.target_iris_size);
        tracker.sustained_blink_frames =
            parse_or(&var, "GAZETRACK_BLINK_FRAMES", tracker.sustained_blink_frames);

        tracker
            .validate()
            .context("invalid tracker configuration")?;

        Ok(Self {
            tracker,
            queue_depth: parse_or(&var, "GAZETRACK_QUEUE_DEPTH", 4),
        })
    }
}

fn load_tracker_file(path: &Path) -> Result<TrackerConfig> {
    let src = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    TrackerConfig::from_toml_str(&src).with_context(|| format!("failed to parse {}", path.display()))
}

fn parse_or<T: std::str::FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match var(key) {
        Some(v) => v.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %v, "ignoring unparsable override");
            default
        }),
        None => default,
    }
}
