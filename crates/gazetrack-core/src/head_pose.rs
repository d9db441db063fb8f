//! Head-pose bounding cube.
//!
//! PnP solving is delegated to a [`PoseSolver`]; this module owns the 3D
//! face model, the pinhole camera approximation and the projection of a
//! solved pose into the 2D cube that renderers draw.

use crate::types::Point;
use serde::{Deserialize, Serialize};

/// Generic 3D face model, matched to [`crate::landmarks::POSE_POINTS`].
pub const MODEL_POINTS: [[f64; 3]; 6] = [
    [0.0, 0.0, 0.0],          // nose tip
    [0.0, -330.0, -65.0],     // chin
    [-225.0, 170.0, -135.0],  // left eye left corner
    [225.0, 170.0, -135.0],   // right eye right corner
    [-150.0, -150.0, -125.0], // left mouth corner
    [150.0, -150.0, -125.0],  // right mouth corner
];

/// Rear face of the cube, in the model's coordinate frame.
const REAR_CORNERS: [[f64; 3]; 4] = [
    [350.0, 270.0, 0.0],
    [-350.0, -270.0, 0.0],
    [-350.0, 270.0, 0.0],
    [350.0, -270.0, 0.0],
];

/// Front face of the cube, offset 400 along the model's z axis.
const FRONT_CORNERS: [[f64; 3]; 4] = [
    [450.0, 350.0, 400.0],
    [-450.0, -350.0, 400.0],
    [-450.0, 350.0, 400.0],
    [450.0, -350.0, 400.0],
];

/// Pinhole intrinsics with no lens distortion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraModel {
    pub focal_length: f64,
    pub center: (f64, f64),
}

impl CameraModel {
    /// Approximate intrinsics: focal length = frame width, principal point at the frame center.
    pub fn for_frame(width: u32, height: u32) -> Self {
        Self {
            focal_length: f64::from(width),
            center: (f64::from(width) / 2.0, f64::from(height) / 2.0),
        }
    }
}

/// Rigid head pose: axis-angle rotation and translation, camera frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub rotation: [f64; 3],
    pub translation: [f64; 3],
}

impl Pose {
    /// Rodrigues' formula.
    pub fn rotation_matrix(&self) -> [[f64; 3]; 3] {
        let [rx, ry, rz] = self.rotation;
        let theta = (rx * rx + ry * ry + rz * rz).sqrt();
        if theta < 1e-12 {
            return [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        }
        let (kx, ky, kz) = (rx / theta, ry / theta, rz / theta);
        let (s, c) = theta.sin_cos();
        let v = 1.0 - c;

        [
            [c + kx * kx * v, kx * ky * v - kz * s, kx * kz * v + ky * s],
            [ky * kx * v + kz * s, c + ky * ky * v, ky * kz * v - kx * s],
            [kz * kx * v - ky * s, kz * ky * v + kx * s, c + kz * kz * v],
        ]
    }

    /// Project a model-frame point to integer pixel coordinates (truncated).
    /// Returns `None` for points on the camera plane.
    pub fn project(&self, point: [f64; 3], camera: &CameraModel) -> Option<Point> {
        let r = self.rotation_matrix();
        let t = self.translation;
        let cam: [f64; 3] = std::array::from_fn(|i| {
            r[i][0] * point[0] + r[i][1] * point[1] + r[i][2] * point[2] + t[i]
        });
        if cam[2].abs() < 1e-9 {
            return None;
        }
        let u = camera.focal_length * cam[0] / cam[2] + camera.center.0;
        let v = camera.focal_length * cam[1] / cam[2] + camera.center.1;
        if !u.is_finite() || !v.is_finite() {
            return None;
        }
        Some(Point::new(u as i32, v as i32))
    }
}

/// External perspective-n-point solver.
pub trait PoseSolver {
    fn solve(
        &self,
        model: &[[f64; 3]; 6],
        image: &[[f64; 2]; 6],
        camera: &CameraModel,
    ) -> Option<Pose>;
}

/// Projected head-pose cube.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadCube {
    pub rear: [Point; 4],
    pub front: [Point; 4],
}

impl HeadCube {
    pub fn project(pose: &Pose, camera: &CameraModel) -> Option<Self> {
        let mut rear = [Point::default(); 4];
        let mut front = [Point::default(); 4];
        for i in 0..4 {
            rear[i] = pose.project(REAR_CORNERS[i], camera)?;
            front[i] = pose.project(FRONT_CORNERS[i], camera)?;
        }
        Some(Self { rear, front })
    }

    /// The twelve cube edges: rear loop, front loop, then the four connectors.
    pub fn edges(&self) -> [(Point, Point); 12] {
        let [b1, b2, b3, b4] = self.rear;
        let [f1, f2, f3, f4] = self.front;
        [
            (b1, b3),
            (b3, b2),
            (b2, b4),
            (b4, b1),
            (f1, f3),
            (f3, f2),
            (f2, f4),
            (f4, f1),
            (f1, b1),
            (f3, b3),
            (f2, b2),
            (f4, b4),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frontal(depth: f64) -> Pose {
        Pose { rotation: [0.0; 3], translation: [0.0, 0.0, depth] }
    }

    #[test]
    fn test_camera_for_frame() {
        let cam = CameraModel::for_frame(640, 480);
        assert_eq!(cam.focal_length, 640.0);
        assert_eq!(cam.center, (320.0, 240.0));
    }

    #[test]
    fn test_identity_rotation_matrix() {
        let r = frontal(1.0).rotation_matrix();
        assert_eq!(r, [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);
    }

    #[test]
    fn test_rotation_matrix_quarter_turn_z() {
        let pose = Pose { rotation: [0.0, 0.0, std::f64::consts::FRAC_PI_2], translation: [0.0; 3] };
        let r = pose.rotation_matrix();
        // x axis maps to y axis
        assert!(r[0][0].abs() < 1e-12);
        assert!((r[1][0] - 1.0).abs() < 1e-12);
        assert!((r[0][1] + 1.0).abs() < 1e-12);
        assert!((r[2][2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_frontal_cube_projection() {
        let cam = CameraModel::for_frame(640, 480);
        let cube = HeadCube::project(&frontal(1000.0), &cam).unwrap();
        // (350, 270, 0) at depth 1000: 640 * 0.35 + 320, 640 * 0.27 + 240
        assert_eq!(cube.rear[0], Point::new(544, 412));
        // (450, 350, 400) at depth 1400
        assert_eq!(cube.front[0], Point::new(525, 400));
        // (-350, 270, 0) mirrors across the principal point.
        assert_eq!(cube.rear[2], Point::new(96, 412));
    }

    #[test]
    fn test_half_turn_mirrors_projection() {
        let cam = CameraModel::for_frame(640, 480);
        let pose = Pose { rotation: [0.0, 0.0, std::f64::consts::PI], translation: [0.0, 0.0, 1000.0] };
        let p = pose.project([350.0, 270.0, 0.0], &cam).unwrap();
        // (-350, -270) → (96, 67.2)
        assert!((p.x - 96).abs() <= 1, "x = {}", p.x);
        assert!((p.y - 67).abs() <= 1, "y = {}", p.y);
    }

    #[test]
    fn test_point_on_camera_plane() {
        let cam = CameraModel::for_frame(640, 480);
        assert!(frontal(0.0).project([0.0, 0.0, 0.0], &cam).is_none());
        assert!(HeadCube::project(&frontal(0.0), &cam).is_none());
    }

    #[test]
    fn test_edges_connect_faces() {
        let cam = CameraModel::for_frame(640, 480);
        let cube = HeadCube::project(&frontal(1000.0), &cam).unwrap();
        let edges = cube.edges();
        assert_eq!(edges[0], (cube.rear[0], cube.rear[2]));
        assert_eq!(edges[8], (cube.front[0], cube.rear[0]));
        assert_eq!(edges[11], (cube.front[3], cube.rear[3]));
    }
}
