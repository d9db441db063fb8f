//! Per-eye binarization threshold calibration.
//!
//! While learning, every frame sweeps the full threshold range on each eye
//! and records the threshold whose dark fraction lands closest to the
//! target iris size. The threshold used downstream is the rounded mean of
//! the recorded thresholds. Once both eyes hold a full history the
//! thresholds freeze and no further sweeps run.

use crate::config::TrackerConfig;
use crate::pupil::PupilLocator;
use crate::types::EyeSide;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::ops::RangeInclusive;

/// Best-of-sweep result for one eye on one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub threshold: u8,
    pub iris_size: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalibrationPhase {
    /// No observation recorded yet.
    Uncalibrated,
    /// Learning; ratios are computed but less reliable.
    Calibrating,
    /// Thresholds frozen.
    Calibrated,
}

/// Bounded FIFO of observations for one eye. Oldest entries are evicted first.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdHistory {
    samples: VecDeque<Observation>,
    capacity: usize,
}

impl ThresholdHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() >= self.capacity
    }

    pub fn samples(&self) -> impl Iterator<Item = &Observation> {
        self.samples.iter()
    }

    /// Rounded mean of the recorded thresholds.
    pub fn selected_threshold(&self) -> Option<u8> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: u32 = self.samples.iter().map(|o| u32::from(o.threshold)).sum();
        let mean = f64::from(sum) / self.samples.len() as f64;
        Some(mean.round() as u8)
    }
}

/// One learning step: append `observation` (evicting the oldest entry when
/// full) and return the updated history with its selected threshold.
pub fn learn(history: &ThresholdHistory, observation: Observation) -> (ThresholdHistory, u8) {
    let mut next = history.clone();
    if next.capacity > 0 && next.samples.len() >= next.capacity {
        next.samples.pop_front();
    }
    next.samples.push_back(observation);
    let selected = next.selected_threshold().unwrap_or(observation.threshold);
    (next, selected)
}

/// Evaluate every threshold in `range` and keep the one whose dark fraction
/// is closest to `target`. Ties keep the lower threshold.
pub fn sweep(locator: &PupilLocator, range: RangeInclusive<u8>, target: f64) -> Observation {
    let mut best = Observation {
        threshold: *range.start(),
        iris_size: 0.0,
    };
    let mut best_err = f64::INFINITY;

    for threshold in range {
        let iris_size = locator.iris_size(threshold);
        let err = (iris_size - target).abs();
        if err < best_err {
            best_err = err;
            best = Observation { threshold, iris_size };
        }
    }

    best
}

/// Session-scoped calibration state for both eyes.
#[derive(Debug, Clone)]
pub struct Calibration {
    left: ThresholdHistory,
    right: ThresholdHistory,
    target_iris_size: f64,
    threshold_min: u8,
    threshold_max: u8,
}

impl Calibration {
    pub fn new(frames: usize, target_iris_size: f64, threshold_min: u8, threshold_max: u8) -> Self {
        Self {
            left: ThresholdHistory::new(frames),
            right: ThresholdHistory::new(frames),
            target_iris_size,
            threshold_min,
            threshold_max,
        }
    }

    pub fn from_config(config: &TrackerConfig) -> Self {
        Self::new(
            config.calibration_frames,
            config.target_iris_size,
            config.threshold_min,
            config.threshold_max,
        )
    }

    pub fn is_complete(&self) -> bool {
        self.left.is_full() && self.right.is_full()
    }

    pub fn phase(&self) -> CalibrationPhase {
        if self.is_complete() {
            CalibrationPhase::Calibrated
        } else if self.left.is_empty() && self.right.is_empty() {
            CalibrationPhase::Uncalibrated
        } else {
            CalibrationPhase::Calibrating
        }
    }

    pub fn history(&self, side: EyeSide) -> &ThresholdHistory {
        match side {
            EyeSide::Left => &self.left,
            EyeSide::Right => &self.right,
        }
    }

    /// Currently selected threshold for `side`, if any observation exists.
    pub fn threshold(&self, side: EyeSide) -> Option<u8> {
        self.history(side).selected_threshold()
    }

    /// Threshold to binarize `eye` with. Runs a sweep-and-learn step while
    /// calibration is incomplete; afterwards returns the frozen value.
    pub fn threshold_for(&mut self, side: EyeSide, eye: &PupilLocator) -> u8 {
        if !self.is_complete() {
            let observation = sweep(
                eye,
                self.threshold_min..=self.threshold_max,
                self.target_iris_size,
            );
            let slot = match side {
                EyeSide::Left => &mut self.left,
                EyeSide::Right => &mut self.right,
            };
            let (history, selected) = learn(slot, observation);
            *slot = history;
            tracing::debug!(
                %side,
                best = observation.threshold,
                iris_size = observation.iris_size,
                selected,
                samples = slot.len(),
                "calibration sample"
            );
            return selected;
        }

        self.threshold(side).unwrap_or(self.threshold_min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eye::{CropPolicy, EyeFrame};
    use crate::frame::GrayFrame;
    use crate::landmarks::{Landmarks, NUM_LANDMARKS};

    /// 40x20 crop in three vertical bands: 10 (cols 0..10), 60 (10..20), 200 (20..40).
    ///
    /// After erosion the dark fraction is 0.225 for thresholds 11..=60 and
    /// 0.475 for 61..=100, so the best threshold is 61.
    fn banded_eye() -> GrayFrame {
        let mut img = GrayFrame::filled(40, 20, 200);
        for y in 0..20 {
            for x in 0..20 {
                img.set(x, y, if x < 10 { 10 } else { 60 });
            }
        }
        img
    }

    fn obs(threshold: u8) -> Observation {
        Observation { threshold, iris_size: 0.5 }
    }

    #[test]
    fn test_sweep_finds_known_threshold() {
        let locator = PupilLocator::new(&banded_eye());
        let best = sweep(&locator, 5..=100, 0.48);
        assert_eq!(best.threshold, 61);
        assert!((best.iris_size - 0.475).abs() < 1e-9);
    }

    #[test]
    fn test_sweep_single_threshold_range() {
        let locator = PupilLocator::new(&banded_eye());
        let best = sweep(&locator, 30..=30, 0.48);
        assert_eq!(best.threshold, 30);
    }

    #[test]
    fn test_learn_is_pure_and_bounded() {
        let mut history = ThresholdHistory::new(3);
        for t in [10, 20, 30] {
            history = learn(&history, obs(t)).0;
        }
        assert!(history.is_full());

        let before = history.clone();
        let (after, selected) = learn(&history, obs(60));
        // Input untouched; oldest (10) evicted.
        assert_eq!(history, before);
        assert_eq!(after.len(), 3);
        assert_eq!(
            after.samples().map(|o| o.threshold).collect::<Vec<_>>(),
            vec![20, 30, 60]
        );
        assert_eq!(selected, 37); // (20 + 30 + 60) / 3 = 36.67
    }

    #[test]
    fn test_selected_threshold_rounds() {
        let mut history = ThresholdHistory::new(20);
        assert_eq!(history.selected_threshold(), None);
        for t in [10, 11] {
            history = learn(&history, obs(t)).0;
        }
        assert_eq!(history.selected_threshold(), Some(11)); // 10.5 rounds up
    }

    #[test]
    fn test_calibration_converges_and_freezes() {
        let locator = PupilLocator::new(&banded_eye());
        let mut calibration = Calibration::new(20, 0.48, 5, 100);
        assert_eq!(calibration.phase(), CalibrationPhase::Uncalibrated);

        for frame in 0..20 {
            for side in EyeSide::BOTH {
                calibration.threshold_for(side, &locator);
            }
            if frame < 19 {
                assert_eq!(calibration.phase(), CalibrationPhase::Calibrating);
            }
        }

        assert!(calibration.is_complete());
        assert_eq!(calibration.phase(), CalibrationPhase::Calibrated);
        for side in EyeSide::BOTH {
            let selected = calibration.threshold(side).unwrap();
            assert!((i32::from(selected) - 61).abs() <= 2, "{side}: {selected}");
        }
    }

    #[test]
    fn test_frozen_threshold_ignores_new_frames() {
        let mut calibration = Calibration::new(2, 0.48, 5, 100);
        let banded = PupilLocator::new(&banded_eye());
        for _ in 0..2 {
            for side in EyeSide::BOTH {
                calibration.threshold_for(side, &banded);
            }
        }
        let frozen = calibration.threshold(EyeSide::Left).unwrap();

        // A very different image no longer moves the threshold.
        let bright = PupilLocator::new(&GrayFrame::filled(40, 20, 250));
        assert_eq!(calibration.threshold_for(EyeSide::Left, &bright), frozen);
        assert_eq!(calibration.history(EyeSide::Left).len(), 2);
    }

    /// 200x100 face with both eye windows banded like [`banded_eye`].
    fn banded_face() -> (GrayFrame, Landmarks) {
        let open_eye = [(35, 50), (45, 44), (55, 44), (65, 50), (55, 56), (45, 56)];
        let mut pts = vec![(100, 80); NUM_LANDMARKS];
        for i in 0..6 {
            pts[36 + i] = open_eye[i];
            pts[42 + i] = (open_eye[i].0 + 100, open_eye[i].1);
        }
        let landmarks = Landmarks::from_i32(&pts).unwrap();

        // Each crop spans x in [origin, origin + 40) and y in [39, 61).
        let mut frame = GrayFrame::filled(200, 100, 200);
        for origin in [30u32, 130] {
            for y in 39..61 {
                for x in origin..origin + 20 {
                    let value = if x < origin + 10 { 10 } else { 60 };
                    frame.set(x, y, value);
                }
            }
        }
        (frame, landmarks)
    }

    #[test]
    fn test_calibrated_threshold_reproduces_target() {
        let (frame, landmarks) = banded_face();
        let policy = CropPolicy { margin: 5, mask_outside_contour: false };
        let mut calibration = Calibration::new(20, 0.48, 5, 100);

        while !calibration.is_complete() {
            for side in EyeSide::BOTH {
                let eye = EyeFrame::extract(&frame, &landmarks, side, &policy).unwrap();
                calibration.threshold_for(side, &PupilLocator::new(&eye.image));
            }
        }

        for side in EyeSide::BOTH {
            let eye = EyeFrame::extract(&frame, &landmarks, side, &policy).unwrap();
            assert_eq!((eye.image.width, eye.image.height), (40, 22));
            let threshold = calibration.threshold(side).unwrap();
            let pupil = PupilLocator::new(&eye.image).locate(threshold);
            assert!(
                (pupil.iris_size - 0.48).abs() <= 0.02,
                "{side}: iris_size = {}",
                pupil.iris_size
            );
        }
    }

    #[test]
    fn test_occluded_eye_accumulates_best_effort() {
        // Nothing dark anywhere: every sweep yields 0.0 and the lowest threshold.
        let locator = PupilLocator::new(&GrayFrame::filled(30, 15, 250));
        let mut calibration = Calibration::new(3, 0.48, 5, 100);
        for _ in 0..3 {
            for side in EyeSide::BOTH {
                assert_eq!(calibration.threshold_for(side, &locator), 5);
            }
        }
        assert!(calibration.is_complete());
    }
}
