//! Per-frame gaze engine.
//!
//! Drives eye extraction, calibration and pupil location for both eyes,
//! derives ratios, blink and direction, and reports transitions into
//! failure states through the anomaly log.

use crate::anomaly::{self, Anomaly, AnomalyDrain, AnomalyKind, AnomalySink};
use crate::calibration::{Calibration, CalibrationPhase};
use crate::config::{ConfigError, TrackerConfig};
use crate::eye::{CropPolicy, EyeError, EyeFrame};
use crate::frame::GrayFrame;
use crate::head_pose::{CameraModel, HeadCube, PoseSolver, MODEL_POINTS};
use crate::landmarks::{LandmarkSource, Landmarks};
use crate::pupil::{Pupil, PupilLocator};
use crate::types::{self, EyeSide, GazeDirection, Point, LEFT_RATIO_MIN, RIGHT_RATIO_MAX};
use serde::{Deserialize, Serialize};

/// Engine output for the most recent frame.
///
/// Every gaze quantity is `None` when the pupils were not located. A ratio
/// is also `None` when an eye crop is too short along that axis, which
/// happens for a fully closed eye.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GazeSnapshot {
    pub pupils_located: bool,
    /// Pupil positions in full-frame coordinates.
    pub left_pupil: Option<Point>,
    pub right_pupil: Option<Point>,
    /// 0.0 = extreme right, 0.5 = center, 1.0 = extreme left.
    pub horizontal_ratio: Option<f64>,
    /// 0.0 = extreme top, 0.5 = center, 1.0 = extreme bottom.
    pub vertical_ratio: Option<f64>,
    pub blinking: Option<bool>,
    pub direction: Option<GazeDirection>,
    pub calibration: CalibrationPhase,
    pub head_cube: Option<HeadCube>,
    /// Anomaly emitted while processing this frame.
    pub anomaly: Option<Anomaly>,
}

impl GazeSnapshot {
    fn unavailable(calibration: CalibrationPhase, anomaly: Option<Anomaly>) -> Self {
        Self {
            pupils_located: false,
            left_pupil: None,
            right_pupil: None,
            horizontal_ratio: None,
            vertical_ratio: None,
            blinking: None,
            direction: None,
            calibration,
            head_cube: None,
            anomaly,
        }
    }

    fn located(left: &EyeAnalysis, right: &EyeAnalysis, calibration: CalibrationPhase) -> Self {
        let (left_h, left_v) = left.ratios();
        let (right_h, right_v) = right.ratios();
        let horizontal = mean(left_h, right_h);
        let vertical = mean(left_v, right_v);
        let blink = (left.eye.blink_aspect + right.eye.blink_aspect) / 2.0;

        Self {
            pupils_located: true,
            left_pupil: Some(left.pupil_coords()),
            right_pupil: Some(right.pupil_coords()),
            horizontal_ratio: horizontal,
            vertical_ratio: vertical,
            blinking: Some(types::is_blinking(blink)),
            direction: horizontal.map(GazeDirection::classify),
            calibration,
            head_cube: None,
            anomaly: None,
        }
    }

    pub fn is_right(&self) -> Option<bool> {
        self.horizontal_ratio.map(|r| r <= RIGHT_RATIO_MAX)
    }

    pub fn is_left(&self) -> Option<bool> {
        self.horizontal_ratio.map(|r| r >= LEFT_RATIO_MIN)
    }

    pub fn is_center(&self) -> Option<bool> {
        self.horizontal_ratio
            .map(|r| GazeDirection::classify(r) == GazeDirection::Center)
    }

    pub fn is_blinking(&self) -> Option<bool> {
        self.blinking
    }

    /// Status line text, blink taking priority over direction.
    pub fn label(&self) -> &'static str {
        if self.blinking == Some(true) {
            return "Blinking";
        }
        match self.direction {
            Some(GazeDirection::Right) => "Looking right",
            Some(GazeDirection::Left) => "Looking left",
            Some(GazeDirection::Center) => "Looking center",
            None => "Not Found",
        }
    }
}

fn mean(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    Some((a? + b?) / 2.0)
}

/// One eye's full analysis for the current frame.
#[derive(Debug, Clone)]
struct EyeAnalysis {
    eye: EyeFrame,
    pupil: Pupil,
    threshold: u8,
}

impl EyeAnalysis {
    fn ratios(&self) -> (Option<f64>, Option<f64>) {
        self.eye.gaze_ratio(Point::new(self.pupil.x, self.pupil.y))
    }

    fn pupil_coords(&self) -> Point {
        self.eye.origin.offset(Point::new(self.pupil.x, self.pupil.y))
    }
}

/// Outcome of the last frame, used to report transitions only once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameStatus {
    Located,
    NotFound,
    EyeNotLocatable(EyeSide),
}

/// Session-scoped gaze tracker.
pub struct GazeEngine {
    policy: CropPolicy,
    sustained_blink_frames: u32,
    calibration: Calibration,
    pose_solver: Option<Box<dyn PoseSolver + Send>>,
    sink: AnomalySink,
    drain: AnomalyDrain,
    left: Option<EyeAnalysis>,
    right: Option<EyeAnalysis>,
    snapshot: GazeSnapshot,
    last_status: Option<FrameStatus>,
    blink_run: u32,
    frames: u64,
}

impl GazeEngine {
    /// Build an engine for one session. Fails if `config` does not validate.
    pub fn new(config: &TrackerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let (sink, drain) = anomaly::channel(config.anomaly_capacity);
        let calibration = Calibration::from_config(config);
        Ok(Self {
            policy: config.crop_policy(),
            sustained_blink_frames: config.sustained_blink_frames,
            snapshot: GazeSnapshot::unavailable(calibration.phase(), None),
            calibration,
            pose_solver: None,
            sink,
            drain,
            left: None,
            right: None,
            last_status: None,
            blink_run: 0,
            frames: 0,
        })
    }

    /// Attach an external PnP solver; snapshots then carry a head cube.
    pub fn with_pose_solver(mut self, solver: Box<dyn PoseSolver + Send>) -> Self {
        self.pose_solver = Some(solver);
        self
    }

    /// Run the landmark source on `frame`, then analyze it.
    pub fn refresh_with(
        &mut self,
        frame: &GrayFrame,
        source: &mut dyn LandmarkSource,
    ) -> &GazeSnapshot {
        let landmarks = source.detect(frame);
        self.refresh(frame, landmarks.as_ref())
    }

    /// Analyze one frame. `landmarks` is `None` when no face was detected.
    pub fn refresh(&mut self, frame: &GrayFrame, landmarks: Option<&Landmarks>) -> &GazeSnapshot {
        self.frames += 1;

        let Some(landmarks) = landmarks else {
            return self.lose(FrameStatus::NotFound, AnomalyKind::NotFound);
        };

        let eyes = EyeFrame::extract(frame, landmarks, EyeSide::Left, &self.policy).and_then(
            |left| {
                EyeFrame::extract(frame, landmarks, EyeSide::Right, &self.policy)
                    .map(|right| (left, right))
            },
        );
        let (left_eye, right_eye) = match eyes {
            Ok(pair) => pair,
            Err(EyeError::EyeNotLocatable { side }) => {
                return self.lose(
                    FrameStatus::EyeNotLocatable(side),
                    AnomalyKind::EyeNotLocatable { side },
                );
            }
        };

        let was_complete = self.calibration.is_complete();
        let left = self.analyze(left_eye);
        let right = self.analyze(right_eye);
        if !was_complete && self.calibration.is_complete() {
            tracing::info!(
                left = left.threshold,
                right = right.threshold,
                frames = self.frames,
                "calibration complete; thresholds frozen"
            );
        }

        let mut snapshot = GazeSnapshot::located(&left, &right, self.calibration.phase());

        if snapshot.blinking == Some(true) {
            self.blink_run = self.blink_run.saturating_add(1);
            if self.blink_run == self.sustained_blink_frames {
                snapshot.anomaly = Some(self.sink.push(AnomalyKind::BlinkSustained {
                    frames: self.blink_run,
                }));
            }
        } else {
            self.blink_run = 0;
        }

        if let Some(solver) = &self.pose_solver {
            let camera = CameraModel::for_frame(frame.width, frame.height);
            snapshot.head_cube = solver
                .solve(&MODEL_POINTS, &landmarks.pose_points(), &camera)
                .and_then(|pose| HeadCube::project(&pose, &camera));
        }

        tracing::debug!(
            frame = self.frames,
            left = ?snapshot.left_pupil,
            right = ?snapshot.right_pupil,
            horizontal = ?snapshot.horizontal_ratio,
            vertical = ?snapshot.vertical_ratio,
            "pupils located"
        );

        self.left = Some(left);
        self.right = Some(right);
        self.last_status = Some(FrameStatus::Located);
        self.snapshot = snapshot;
        &self.snapshot
    }

    fn analyze(&mut self, eye: EyeFrame) -> EyeAnalysis {
        let locator = PupilLocator::new(&eye.image);
        let threshold = self.calibration.threshold_for(eye.side, &locator);
        let pupil = locator.locate(threshold);
        EyeAnalysis {
            eye,
            pupil,
            threshold,
        }
    }

    fn lose(&mut self, status: FrameStatus, kind: AnomalyKind) -> &GazeSnapshot {
        self.left = None;
        self.right = None;
        self.blink_run = 0;

        let anomaly = if self.last_status != Some(status) {
            tracing::debug!(frame = self.frames, kind = kind.classification(), "pupils lost");
            Some(self.sink.push(kind))
        } else {
            None
        };

        self.last_status = Some(status);
        self.snapshot = GazeSnapshot::unavailable(self.calibration.phase(), anomaly);
        &self.snapshot
    }

    pub fn snapshot(&self) -> &GazeSnapshot {
        &self.snapshot
    }

    pub fn pupils_located(&self) -> bool {
        self.snapshot.pupils_located
    }

    pub fn pupil_left_coords(&self) -> Option<Point> {
        self.snapshot.left_pupil
    }

    pub fn pupil_right_coords(&self) -> Option<Point> {
        self.snapshot.right_pupil
    }

    pub fn horizontal_ratio(&self) -> Option<f64> {
        self.snapshot.horizontal_ratio
    }

    pub fn vertical_ratio(&self) -> Option<f64> {
        self.snapshot.vertical_ratio
    }

    pub fn is_right(&self) -> Option<bool> {
        self.snapshot.is_right()
    }

    pub fn is_left(&self) -> Option<bool> {
        self.snapshot.is_left()
    }

    pub fn is_center(&self) -> Option<bool> {
        self.snapshot.is_center()
    }

    pub fn is_blinking(&self) -> Option<bool> {
        self.snapshot.is_blinking()
    }

    /// Current frame's eye crop for `side`.
    pub fn eye(&self, side: EyeSide) -> Option<&EyeFrame> {
        self.analysis(side).map(|a| &a.eye)
    }

    /// Current frame's pupil for `side`, in crop-local coordinates.
    pub fn pupil(&self, side: EyeSide) -> Option<&Pupil> {
        self.analysis(side).map(|a| &a.pupil)
    }

    /// Threshold used for `side` on the current frame.
    pub fn threshold(&self, side: EyeSide) -> Option<u8> {
        self.analysis(side).map(|a| a.threshold)
    }

    fn analysis(&self, side: EyeSide) -> Option<&EyeAnalysis> {
        match side {
            EyeSide::Left => self.left.as_ref(),
            EyeSide::Right => self.right.as_ref(),
        }
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn calibration_phase(&self) -> CalibrationPhase {
        self.calibration.phase()
    }

    /// A consumer handle on the anomaly log.
    pub fn anomalies(&self) -> AnomalyDrain {
        self.drain.clone()
    }

    /// Records dropped because a bounded anomaly log was full.
    pub fn dropped_anomalies(&self) -> u64 {
        self.sink.dropped()
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames
    }
}
