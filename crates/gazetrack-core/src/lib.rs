//! gazetrack-core: Per-frame eye analysis for webcam gaze tracking.
//!
//! Crops each eye out of a grayscale frame using 68-point facial landmarks,
//! isolates the pupil with an adaptive binarization threshold, calibrates
//! that threshold per eye and derives gaze ratios and a blink signal.
//! Face detection, landmark regression and PnP solving are supplied by
//! the caller through [`LandmarkSource`] and [`PoseSolver`].

pub mod anomaly;
pub mod calibration;
pub mod config;
pub mod engine;
pub mod eye;
pub mod frame;
pub mod head_pose;
pub mod landmarks;
pub mod pupil;
pub mod types;

pub use anomaly::{Anomaly, AnomalyDrain, AnomalyKind, AnomalySink};
pub use calibration::{Calibration, CalibrationPhase};
pub use config::{ConfigError, TrackerConfig};
pub use engine::{GazeEngine, GazeSnapshot};
pub use eye::{CropPolicy, EyeError, EyeFrame};
pub use frame::{FrameError, GrayFrame};
pub use head_pose::{CameraModel, HeadCube, Pose, PoseSolver};
pub use landmarks::{LandmarkError, LandmarkSource, Landmarks};
pub use pupil::{Pupil, PupilLocator};
pub use types::{EyeSide, GazeDirection, Point};
