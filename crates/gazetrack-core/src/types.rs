use serde::{Deserialize, Serialize};
use std::fmt;

/// Horizontal ratio at or below which the gaze counts as "right".
pub const RIGHT_RATIO_MAX: f64 = 0.6;
/// Horizontal ratio at or above which the gaze counts as "left".
pub const LEFT_RATIO_MIN: f64 = 0.9;
/// Mean blink aspect (width / height) above which the eyes count as closed.
pub const BLINK_ASPECT_THRESHOLD: f64 = 3.8;

/// Integer pixel position in full-frame or crop-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        let dx = f64::from(self.x - other.x);
        let dy = f64::from(self.y - other.y);
        dx.hypot(dy)
    }

    /// Midpoint on the integer grid (coordinates truncated).
    pub fn midpoint(a: Point, b: Point) -> Point {
        Point::new((a.x + b.x) / 2, (a.y + b.y) / 2)
    }

    pub fn offset(&self, by: Point) -> Point {
        Point::new(self.x + by.x, self.y + by.y)
    }
}

/// Which eye, from the subject's point of view as indexed by the landmark scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EyeSide {
    Left,
    Right,
}

impl EyeSide {
    pub const BOTH: [EyeSide; 2] = [EyeSide::Left, EyeSide::Right];

    pub fn as_str(&self) -> &'static str {
        match self {
            EyeSide::Left => "left",
            EyeSide::Right => "right",
        }
    }
}

impl fmt::Display for EyeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse gaze direction derived from the horizontal ratio.
///
/// The ratio is mirrored: 0.0 is the extreme right, 1.0 the extreme left.
/// The bands are not symmetric around 0.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GazeDirection {
    Left,
    Right,
    Center,
}

impl GazeDirection {
    pub fn classify(horizontal_ratio: f64) -> Self {
        if horizontal_ratio <= RIGHT_RATIO_MAX {
            GazeDirection::Right
        } else if horizontal_ratio >= LEFT_RATIO_MIN {
            GazeDirection::Left
        } else {
            GazeDirection::Center
        }
    }
}

/// Blink decision on the mean of both eyes' blink aspects.
pub fn is_blinking(mean_blink_aspect: f64) -> bool {
    mean_blink_aspect > BLINK_ASPECT_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_left() {
        assert_eq!(GazeDirection::classify(0.95), GazeDirection::Left);
        assert_eq!(GazeDirection::classify(0.9), GazeDirection::Left);
    }

    #[test]
    fn test_classify_right() {
        assert_eq!(GazeDirection::classify(0.6), GazeDirection::Right);
        assert_eq!(GazeDirection::classify(0.1), GazeDirection::Right);
        // The right band extends past the midpoint.
        assert_eq!(GazeDirection::classify(0.5), GazeDirection::Right);
    }

    #[test]
    fn test_classify_center() {
        assert_eq!(GazeDirection::classify(0.75), GazeDirection::Center);
        assert_eq!(GazeDirection::classify(0.61), GazeDirection::Center);
        assert_eq!(GazeDirection::classify(0.89), GazeDirection::Center);
    }

    #[test]
    fn test_blink_threshold() {
        assert!(is_blinking(4.0));
        assert!(!is_blinking(3.0));
        assert!(!is_blinking(3.8));
        assert!(is_blinking(f64::INFINITY));
    }

    #[test]
    fn test_midpoint_truncates() {
        let m = Point::midpoint(Point::new(45, 44), Point::new(56, 45));
        assert_eq!(m, Point::new(50, 44));
    }

    #[test]
    fn test_distance() {
        assert!((Point::new(0, 0).distance(&Point::new(3, 4)) - 5.0).abs() < 1e-12);
    }
}
