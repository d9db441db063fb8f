//! Eye region extraction from facial landmarks.
//!
//! Crops a tight grayscale window around one eye contour, paints
//! everything outside the contour white so eyelashes and brows cannot
//! form dark blobs, and computes the landmark-based blink aspect.

use crate::frame::GrayFrame;
use crate::landmarks::Landmarks;
use crate::types::{EyeSide, Point};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CROP_MARGIN: u32 = 5;

/// Subtracted from the crop extent when normalizing pupil position into a ratio.
pub const RATIO_EDGE_PAD: f64 = 10.0;

const MASK_FILL: u8 = 255;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EyeError {
    #[error("{side} eye not locatable: degenerate landmark geometry")]
    EyeNotLocatable { side: EyeSide },
}

/// Region-of-interest extraction policy for eye crops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropPolicy {
    /// Pixels added on every side of the contour's bounding box.
    pub margin: u32,
    /// Paint pixels outside the eye contour polygon white before cropping.
    pub mask_outside_contour: bool,
}

impl Default for CropPolicy {
    fn default() -> Self {
        Self {
            margin: DEFAULT_CROP_MARGIN,
            mask_outside_contour: true,
        }
    }
}

/// One eye, isolated from one frame.
#[derive(Debug, Clone)]
pub struct EyeFrame {
    pub side: EyeSide,
    /// Top-left corner of the crop in full-frame coordinates.
    pub origin: Point,
    /// Crop center `(width / 2, height / 2)`, the zero reference for ratios.
    pub center: (f64, f64),
    pub image: GrayFrame,
    /// Eye width over eye height; larger means more closed.
    pub blink_aspect: f64,
}

impl EyeFrame {
    /// Extract the eye on `side` from a full grayscale frame.
    pub fn extract(
        frame: &GrayFrame,
        landmarks: &Landmarks,
        side: EyeSide,
        policy: &CropPolicy,
    ) -> Result<Self, EyeError> {
        let contour = landmarks.eye_contour(side);
        let not_locatable = EyeError::EyeNotLocatable { side };

        let min_x = contour.iter().map(|p| p.x).min().unwrap_or(0) as i64;
        let max_x = contour.iter().map(|p| p.x).max().unwrap_or(0) as i64;
        let min_y = contour.iter().map(|p| p.y).min().unwrap_or(0) as i64;
        let max_y = contour.iter().map(|p| p.y).max().unwrap_or(0) as i64;
        // A level contour is a closed eye; only a horizontal collapse is degenerate.
        if max_x == min_x {
            return Err(not_locatable);
        }

        let margin = i64::from(policy.margin);
        let x0 = (min_x - margin).max(0);
        let y0 = (min_y - margin).max(0);
        let x1 = (max_x + margin).min(i64::from(frame.width));
        let y1 = (max_y + margin).min(i64::from(frame.height));

        if x1 <= x0 || y1 <= y0 {
            return Err(not_locatable);
        }

        let (x0, y0) = (x0 as u32, y0 as u32);
        let (width, height) = ((x1 as u32) - x0, (y1 as u32) - y0);
        let mut image = frame.crop(x0, y0, width, height);

        if policy.mask_outside_contour {
            for cy in 0..height {
                for cx in 0..width {
                    let fx = f64::from(x0 + cx);
                    let fy = f64::from(y0 + cy);
                    if !polygon_contains(&contour, fx, fy) {
                        image.set(cx, cy, MASK_FILL);
                    }
                }
            }
        }

        Ok(Self {
            side,
            origin: Point::new(x0 as i32, y0 as i32),
            center: crop_center(&image),
            image,
            blink_aspect: blink_aspect(&contour),
        })
    }

    /// Pupil position normalized by the crop extent minus [`RATIO_EDGE_PAD`]
    /// along each axis. An axis too short for the pad yields `None`.
    pub fn gaze_ratio(&self, pupil: Point) -> (Option<f64>, Option<f64>) {
        (
            pad_ratio(pupil.x, self.center.0),
            pad_ratio(pupil.y, self.center.1),
        )
    }
}

fn pad_ratio(position: i32, center: f64) -> Option<f64> {
    let extent = center * 2.0 - RATIO_EDGE_PAD;
    (extent > 0.0).then(|| f64::from(position) / extent)
}

fn crop_center(image: &GrayFrame) -> (f64, f64) {
    (f64::from(image.width) / 2.0, f64::from(image.height) / 2.0)
}

/// Eye width (corner to corner) over eye height (upper-lid midpoint to
/// lower-lid midpoint). A zero height reads as fully closed.
pub fn blink_aspect(contour: &[Point; 6]) -> f64 {
    let left = contour[0];
    let right = contour[3];
    let top = Point::midpoint(contour[1], contour[2]);
    let bottom = Point::midpoint(contour[5], contour[4]);

    let eye_width = left.distance(&right);
    let eye_height = top.distance(&bottom);
    if eye_height == 0.0 {
        f64::INFINITY
    } else {
        eye_width / eye_height
    }
}

/// Even-odd point-in-polygon test. Points on an edge count as inside.
fn polygon_contains(poly: &[Point], x: f64, y: f64) -> bool {
    let n = poly.len();
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = (f64::from(poly[i].x), f64::from(poly[i].y));
        let (xj, yj) = (f64::from(poly[j].x), f64::from(poly[j].y));

        let cross = (xj - xi) * (y - yi) - (yj - yi) * (x - xi);
        if cross == 0.0
            && x >= xi.min(xj)
            && x <= xi.max(xj)
            && y >= yi.min(yj)
            && y <= yi.max(yj)
        {
            return true;
        }

        if (yi > y) != (yj > y) {
            let x_cross = xi + (y - yi) * (xj - xi) / (yj - yi);
            if x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}
