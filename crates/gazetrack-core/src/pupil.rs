//! Pupil isolation by adaptive binarization.
//!
//! The eye crop is edge-preserving smoothed once, then binarized at a
//! given threshold, eroded, and split into 8-connected dark components.
//! The largest component is taken as the iris; its centroid is the pupil.

use crate::frame::GrayFrame;
use serde::{Deserialize, Serialize};

// --- Bilateral filter parameters (diameter 10) ---
const BILATERAL_RADIUS: i32 = 5;
const BILATERAL_SIGMA_COLOR: f32 = 15.0;
const BILATERAL_SIGMA_SPACE: f32 = 15.0;

/// Pupil estimate for one eye crop at one threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pupil {
    /// Centroid in crop-local coordinates.
    pub x: i32,
    pub y: i32,
    /// Fraction of crop pixels classified dark at this threshold.
    pub iris_size: f64,
    /// Pixel area of the selected blob (0 when no dark pixel survived).
    pub area: usize,
}

impl Pupil {
    /// Diameter of a disc with the selected blob's area.
    pub fn iris_diameter(&self) -> f64 {
        2.0 * (self.area as f64 / std::f64::consts::PI).sqrt()
    }
}

/// An eye crop prepared for thresholding.
///
/// Smoothing does not depend on the threshold, so a calibration sweep
/// builds one locator and evaluates every candidate threshold on it.
pub struct PupilLocator {
    smoothed: Vec<u8>,
    width: usize,
    height: usize,
}

impl PupilLocator {
    pub fn new(eye: &GrayFrame) -> Self {
        let width = eye.width as usize;
        let height = eye.height as usize;
        let smoothed = if width == 0 || height == 0 || eye.data.len() < width * height {
            Vec::new()
        } else {
            bilateral_filter(&eye.data, width, height)
        };
        Self {
            smoothed,
            width,
            height,
        }
    }

    /// Fraction of pixels that are dark after binarization and erosion.
    pub fn iris_size(&self, threshold: u8) -> f64 {
        if self.smoothed.is_empty() {
            return 0.0;
        }
        let mask = self.dark_mask(threshold);
        mask.iter().filter(|&&d| d).count() as f64 / mask.len() as f64
    }

    /// Locate the pupil at `threshold`. Never fails: with no dark blob the
    /// crop center is returned and `area` is zero.
    pub fn locate(&self, threshold: u8) -> Pupil {
        let fallback_x = (self.width / 2) as i32;
        let fallback_y = (self.height / 2) as i32;
        if self.smoothed.is_empty() {
            return Pupil {
                x: fallback_x,
                y: fallback_y,
                iris_size: 0.0,
                area: 0,
            };
        }

        let mask = self.dark_mask(threshold);
        let dark = mask.iter().filter(|&&d| d).count();
        let iris_size = dark as f64 / mask.len() as f64;

        match largest_component(&mask, self.width, self.height) {
            Some(blob) => Pupil {
                x: (blob.sum_x as f64 / blob.area as f64).round() as i32,
                y: (blob.sum_y as f64 / blob.area as f64).round() as i32,
                iris_size,
                area: blob.area,
            },
            None => Pupil {
                x: fallback_x,
                y: fallback_y,
                iris_size,
                area: 0,
            },
        }
    }

    fn dark_mask(&self, threshold: u8) -> Vec<bool> {
        let binary: Vec<bool> = self.smoothed.iter().map(|&p| p < threshold).collect();
        erode(&binary, self.width, self.height)
    }
}

/// Edge-preserving smoothing with a circular window, replicated borders.
fn bilateral_filter(src: &[u8], width: usize, height: usize) -> Vec<u8> {
    let r = BILATERAL_RADIUS;
    let space_coeff = -0.5 / (BILATERAL_SIGMA_SPACE * BILATERAL_SIGMA_SPACE);
    let color_coeff = -0.5 / (BILATERAL_SIGMA_COLOR * BILATERAL_SIGMA_COLOR);

    let color_lut: Vec<f32> = (0..256)
        .map(|d| ((d * d) as f32 * color_coeff).exp())
        .collect();

    let mut taps = Vec::new();
    for dy in -r..=r {
        for dx in -r..=r {
            let d2 = dx * dx + dy * dy;
            if d2 <= r * r {
                taps.push((dx, dy, (d2 as f32 * space_coeff).exp()));
            }
        }
    }

    let max_x = width as i32 - 1;
    let max_y = height as i32 - 1;
    let mut out = vec![0u8; width * height];

    for y in 0..height {
        for x in 0..width {
            let center = src[y * width + x];
            let mut sum = 0.0f32;
            let mut norm = 0.0f32;

            for &(dx, dy, w_space) in &taps {
                let sx = (x as i32 + dx).clamp(0, max_x) as usize;
                let sy = (y as i32 + dy).clamp(0, max_y) as usize;
                let v = src[sy * width + sx];
                let w = w_space * color_lut[(v as i32 - center as i32).unsigned_abs() as usize];
                sum += w * v as f32;
                norm += w;
            }

            // The center tap always contributes weight 1.
            out[y * width + x] = (sum / norm).round().clamp(0.0, 255.0) as u8;
        }
    }

    out
}

/// One 3×3 erosion of the dark mask. Out-of-bounds neighbors are ignored.
fn erode(mask: &[bool], width: usize, height: usize) -> Vec<bool> {
    let mut out = vec![false; mask.len()];
    for y in 0..height {
        for x in 0..width {
            if !mask[y * width + x] {
                continue;
            }
            let y_lo = y.saturating_sub(1);
            let y_hi = (y + 1).min(height - 1);
            let x_lo = x.saturating_sub(1);
            let x_hi = (x + 1).min(width - 1);
            out[y * width + x] =
                (y_lo..=y_hi).all(|ny| (x_lo..=x_hi).all(|nx| mask[ny * width + nx]));
        }
    }
    out
}

struct Blob {
    area: usize,
    sum_x: usize,
    sum_y: usize,
}

/// Largest 8-connected component of `true` pixels. Ties keep the first in scan order.
fn largest_component(mask: &[bool], width: usize, height: usize) -> Option<Blob> {
    let mut visited = vec![false; mask.len()];
    let mut stack = Vec::new();
    let mut best: Option<Blob> = None;

    for start in 0..mask.len() {
        if !mask[start] || visited[start] {
            continue;
        }

        let mut blob = Blob {
            area: 0,
            sum_x: 0,
            sum_y: 0,
        };
        visited[start] = true;
        stack.push(start);

        while let Some(idx) = stack.pop() {
            let (x, y) = (idx % width, idx / width);
            blob.area += 1;
            blob.sum_x += x;
            blob.sum_y += y;

            for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                    let n = ny * width + nx;
                    if mask[n] && !visited[n] {
                        visited[n] = true;
                        stack.push(n);
                    }
                }
            }
        }

        if best.as_ref().map_or(true, |b| blob.area > b.area) {
            best = Some(blob);
        }
    }

    best
}
