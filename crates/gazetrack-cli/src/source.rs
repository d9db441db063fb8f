//! Recorded landmark replay.
//!
//! Landmarks come from an external detector run ahead of time and stored
//! in a JSON sidecar next to the frames:
//!
//! ```json
//! [{ "frame": "0001.png", "landmarks": [[x, y], ...] }, { "frame": "0002.png", "landmarks": null }]
//! ```

use gazetrack_core::{GrayFrame, LandmarkError, LandmarkSource, Landmarks};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

const FRAME_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed landmark sidecar: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame {frame}: {source}")]
    Landmarks {
        frame: String,
        #[source]
        source: LandmarkError,
    },
}

/// One sidecar entry. `landmarks` is `null` when no face was detected.
#[derive(Debug, Deserialize)]
pub struct FrameRecord {
    pub frame: String,
    pub landmarks: Option<Vec<(f32, f32)>>,
}

/// Image files in `dir`, sorted by file name.
pub fn list_frames(dir: &Path) -> Result<Vec<PathBuf>, SourceError> {
    let mut frames = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| FRAME_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if path.is_file() && is_image {
            frames.push(path);
        }
    }
    frames.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(frames)
}

/// Replays sidecar landmarks for whichever frame was last cued.
pub struct ReplaySource {
    by_frame: HashMap<String, Option<Landmarks>>,
    cued: Option<String>,
}

impl ReplaySource {
    pub fn load(path: &Path) -> Result<Self, SourceError> {
        let src = std::fs::read_to_string(path)?;
        Self::from_json(&src)
    }

    pub fn from_json(src: &str) -> Result<Self, SourceError> {
        let records: Vec<FrameRecord> = serde_json::from_str(src)?;
        Self::from_records(records)
    }

    pub fn from_records(records: Vec<FrameRecord>) -> Result<Self, SourceError> {
        let mut by_frame = HashMap::with_capacity(records.len());
        for record in records {
            let landmarks = match record.landmarks {
                Some(points) => Some(Landmarks::from_points(&points).map_err(|source| {
                    SourceError::Landmarks {
                        frame: record.frame.clone(),
                        source,
                    }
                })?),
                None => None,
            };
            by_frame.insert(record.frame, landmarks);
        }
        Ok(Self {
            by_frame,
            cued: None,
        })
    }

    /// Select the sidecar entry the next `detect` call answers with.
    pub fn cue(&mut self, frame: &str) {
        self.cued = Some(frame.to_string());
    }

    pub fn len(&self) -> usize {
        self.by_frame.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_frame.is_empty()
    }
}

impl LandmarkSource for ReplaySource {
    fn detect(&mut self, _frame: &GrayFrame) -> Option<Landmarks> {
        let name = self.cued.take()?;
        match self.by_frame.get(&name) {
            Some(landmarks) => landmarks.clone(),
            None => {
                tracing::warn!(frame = %name, "no sidecar entry; treating as no face");
                None
            }
        }
    }
}
