//! Landmark adapter: normalizes external 68-point detector output.
//!
//! Index scheme (iBUG 300-W): 36–41 left eye, 42–47 right eye, 27–35 nose,
//! 48–67 mouth, 0–16 jaw. Each eye contour is ordered outer corner, two
//! upper-lid points, inner corner, two lower-lid points.

use crate::frame::GrayFrame;
use crate::types::{EyeSide, Point};
use thiserror::Error;

pub const NUM_LANDMARKS: usize = 68;

pub const LEFT_EYE_POINTS: [usize; 6] = [36, 37, 38, 39, 40, 41];
pub const RIGHT_EYE_POINTS: [usize; 6] = [42, 43, 44, 45, 46, 47];

/// Landmarks consumed by the head-pose solver:
/// nose tip, chin, left eye left corner, right eye right corner,
/// left mouth corner, right mouth corner.
pub const POSE_POINTS: [usize; 6] = [33, 8, 36, 45, 48, 54];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LandmarkError {
    #[error("expected 68 landmarks, got {0}")]
    WrongCount(usize),
}

/// One face's landmark set in full-frame pixel coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Landmarks {
    points: [Point; NUM_LANDMARKS],
}

impl Landmarks {
    /// Build from sub-pixel detector output; coordinates are truncated to whole pixels.
    pub fn from_points(points: &[(f32, f32)]) -> Result<Self, LandmarkError> {
        if points.len() != NUM_LANDMARKS {
            return Err(LandmarkError::WrongCount(points.len()));
        }
        Ok(Self {
            points: std::array::from_fn(|i| Point::new(points[i].0 as i32, points[i].1 as i32)),
        })
    }

    pub fn from_i32(points: &[(i32, i32)]) -> Result<Self, LandmarkError> {
        if points.len() != NUM_LANDMARKS {
            return Err(LandmarkError::WrongCount(points.len()));
        }
        Ok(Self {
            points: std::array::from_fn(|i| Point::new(points[i].0, points[i].1)),
        })
    }

    #[inline]
    pub fn part(&self, index: usize) -> Point {
        self.points[index]
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// The six contour points for one eye, in scheme order.
    pub fn eye_contour(&self, side: EyeSide) -> [Point; 6] {
        let indices = match side {
            EyeSide::Left => LEFT_EYE_POINTS,
            EyeSide::Right => RIGHT_EYE_POINTS,
        };
        indices.map(|i| self.points[i])
    }

    /// Image points for PnP, in [`POSE_POINTS`] order.
    pub fn pose_points(&self) -> [[f64; 2]; 6] {
        POSE_POINTS.map(|i| {
            let p = self.points[i];
            [f64::from(p.x), f64::from(p.y)]
        })
    }
}

/// External face + landmark detector.
///
/// Returns `None` when no face is present in the frame; that is an
/// expected, recoverable condition.
pub trait LandmarkSource {
    fn detect(&mut self, frame: &GrayFrame) -> Option<Landmarks>;
}
