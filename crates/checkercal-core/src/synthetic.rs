//! Deterministic synthetic checkerboard scenes.
//!
//! Used by tests and demos across the workspace: a known camera looks at a
//! planar board under a handful of poses, and the board can be rendered to a
//! grayscale frame with anti-aliased square edges.

use nalgebra::{Point2, Point3, Rotation3, Vector3};

use crate::{CameraModel, GrayImage, ImageSize, Pose};

/// Printed checkerboard as seen by the renderer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoardLayout {
    /// Inner corners along x.
    pub cols: usize,
    /// Inner corners along y.
    pub rows: usize,
    pub square_size: f64,
    /// Width of the white border around the squares, in squares.
    pub margin_squares: f64,
}

impl BoardLayout {
    pub fn new(cols: usize, rows: usize, square_size: f64) -> Self {
        Self {
            cols,
            rows,
            square_size,
            margin_squares: 1.0,
        }
    }

    /// Inner corners on the `z = 0` plane, row-major, `(0, 0)` first.
    pub fn corner_points(&self) -> Vec<Point3<f64>> {
        let mut pts = Vec::with_capacity(self.cols * self.rows);
        for r in 0..self.rows {
            for c in 0..self.cols {
                pts.push(Point3::new(
                    c as f64 * self.square_size,
                    r as f64 * self.square_size,
                    0.0,
                ));
            }
        }
        pts
    }

    /// Centre of the inner-corner grid on the board plane.
    pub fn center(&self) -> Point3<f64> {
        Point3::new(
            (self.cols - 1) as f64 * self.square_size * 0.5,
            (self.rows - 1) as f64 * self.square_size * 0.5,
            0.0,
        )
    }

    /// Board intensity at plane coordinates, or `None` off the board.
    fn shade(&self, x: f64, y: f64) -> Option<f64> {
        let s = self.square_size;
        let (w, h) = (self.cols as f64 * s, self.rows as f64 * s);
        if x >= -s && x < w && y >= -s && y < h {
            let ix = (x / s).floor() as i64 + 1;
            let iy = (y / s).floor() as i64 + 1;
            return Some(if (ix + iy) % 2 == 0 { DARK } else { LIGHT });
        }
        let m = s * (1.0 + self.margin_squares);
        if x >= -m && x < w + m - s && y >= -m && y < h + m - s {
            return Some(LIGHT);
        }
        None
    }
}

const DARK: f64 = 30.0;
const LIGHT: f64 = 225.0;
const BACKGROUND: f64 = 110.0;

/// Pose that puts the board centre at `(offset.x, offset.y, distance)` in the
/// camera frame after rotating it by the given roll/pitch/yaw.
pub fn board_pose(
    board: &BoardLayout,
    roll: f64,
    pitch: f64,
    yaw: f64,
    offset: Vector3<f64>,
) -> Pose {
    let r = Rotation3::from_euler_angles(roll, pitch, yaw);
    let t = offset - r * board.center().coords;
    Pose::from_rotation(&r, t)
}

/// A fixed spread of well-conditioned views of `board`.
pub fn standard_views(board: &BoardLayout, distance: f64) -> Vec<Pose> {
    let d = distance;
    [
        (0.0, 0.0, 0.0, Vector3::new(0.0, 0.0, d)),
        (0.25, 0.0, 0.05, Vector3::new(0.01, -0.01, d)),
        (-0.2, 0.15, -0.05, Vector3::new(-0.02, 0.01, d * 1.1)),
        (0.1, -0.25, 0.1, Vector3::new(0.015, 0.02, d * 0.95)),
        (-0.1, 0.3, 0.0, Vector3::new(-0.01, -0.015, d * 1.05)),
        (0.3, 0.2, -0.1, Vector3::new(0.0, 0.01, d * 1.15)),
    ]
    .into_iter()
    .map(|(roll, pitch, yaw, off)| board_pose(board, roll, pitch, yaw, off))
    .collect()
}

/// Project the board's inner corners through `camera`.
pub fn project_corners(
    camera: &CameraModel,
    board: &BoardLayout,
    pose: &Pose,
) -> Option<Vec<Point2<f64>>> {
    camera.project_all(pose, &board.corner_points())
}

/// Render `board` under `pose` with an `ss × ss` supersampling grid per pixel.
///
/// Lens distortion is ignored; the board is imaged through the pinhole part
/// of `camera` only.
pub fn render_checkerboard(
    camera: &CameraModel,
    board: &BoardLayout,
    pose: &Pose,
    size: ImageSize,
    ss: usize,
) -> GrayImage {
    let (w, h) = (size.width as usize, size.height as usize);
    let mut img = GrayImage::new(w, h);
    let ss = ss.max(1);

    let r = pose.rotation();
    let k = camera.intrinsics.k_matrix();
    let mut m = nalgebra::Matrix3::zeros();
    m.set_column(0, &r.matrix().column(0));
    m.set_column(1, &r.matrix().column(1));
    m.set_column(2, &pose.tvec);
    let Some(img_to_board) = (k * m).try_inverse() else {
        img.data.fill(BACKGROUND as u8);
        return img;
    };

    let step = 1.0 / ss as f64;
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for sy in 0..ss {
                for sx in 0..ss {
                    let px = x as f64 + (sx as f64 + 0.5) * step - 0.5;
                    let py = y as f64 + (sy as f64 + 0.5) * step - 0.5;
                    let q = img_to_board * Vector3::new(px, py, 1.0);
                    // q.z <= 0 means the ray hits the plane behind the camera
                    let v = if q.z > 1e-12 {
                        board.shade(q.x / q.z, q.y / q.z).unwrap_or(BACKGROUND)
                    } else {
                        BACKGROUND
                    };
                    acc += v;
                }
            }
            img.put(x, y, (acc / (ss * ss) as f64).round().clamp(0.0, 255.0) as u8);
        }
    }
    img
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BrownConrady, PinholeIntrinsics};

    fn scene() -> (CameraModel, BoardLayout) {
        (
            CameraModel::new(
                PinholeIntrinsics::new(600.0, 600.0, 320.0, 240.0),
                BrownConrady::default(),
            ),
            BoardLayout::new(9, 6, 0.02),
        )
    }

    #[test]
    fn frontal_view_centres_the_board() {
        let (cam, board) = scene();
        let pose = board_pose(&board, 0.0, 0.0, 0.0, Vector3::new(0.0, 0.0, 0.4));
        let pts = project_corners(&cam, &board, &pose).unwrap();
        let cx = pts.iter().map(|p| p.x).sum::<f64>() / pts.len() as f64;
        let cy = pts.iter().map(|p| p.y).sum::<f64>() / pts.len() as f64;
        assert!((cx - 320.0).abs() < 1e-9 && (cy - 240.0).abs() < 1e-9);
        assert!(pts[0].x < pts[1].x && pts[0].y < pts[9].y);
    }

    #[test]
    fn rendered_squares_alternate() {
        let (cam, board) = scene();
        let pose = board_pose(&board, 0.0, 0.0, 0.0, Vector3::new(0.0, 0.0, 0.4));
        let img = render_checkerboard(&cam, &board, &pose, ImageSize::new(640, 480), 2);
        let pts = project_corners(&cam, &board, &pose).unwrap();
        // Squares are 30 px wide; corner 0 touches the dark border square on its upper left.
        let p = pts[0];
        let dark = img.get((p.x - 7.0) as usize, (p.y - 7.0) as usize);
        let light = img.get((p.x + 7.0) as usize, (p.y - 7.0) as usize);
        assert!(dark < 60, "dark={dark}");
        assert!(light > 200, "light={light}");
        assert_eq!(img.get(2, 2), BACKGROUND as u8);
    }

    #[test]
    fn standard_views_keep_board_in_frame() {
        let (cam, board) = scene();
        for pose in standard_views(&board, 0.4) {
            let pts = project_corners(&cam, &board, &pose).unwrap();
            assert!(pts
                .iter()
                .all(|p| p.x > 20.0 && p.x < 620.0 && p.y > 20.0 && p.y < 460.0));
        }
    }
}
