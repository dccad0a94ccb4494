use checkercal_chessboard::ChessboardDetector;
use image::GrayImage;
use nalgebra::Point2;

use crate::pattern::GridSpec;

/// Finds every inner corner of a `grid.cols × grid.rows` board.
///
/// Corners are returned refined, row-major, in the same order as
/// [`generate_reference_pattern`](crate::generate_reference_pattern).
/// Partial boards count as not found.
pub trait CornerDetector {
    fn detect(&self, img: &GrayImage, grid: &GridSpec) -> Option<Vec<Point2<f64>>>;
}

impl CornerDetector for ChessboardDetector {
    fn detect(&self, img: &GrayImage, grid: &GridSpec) -> Option<Vec<Point2<f64>>> {
        let detection = ChessboardDetector::detect(self, img, grid.cols, grid.rows)?;
        Some(
            detection
                .corners
                .iter()
                .map(|p| Point2::new(p.x as f64, p.y as f64))
                .collect(),
        )
    }
}

/// OpenCV's `findChessboardCorners` followed by `cornerSubPix` with an
/// 11×11 window, stopping after 30 iterations or a 0.1 px update.
///
/// Corners come back in OpenCV's row-major order.
#[cfg(feature = "opencv")]
#[derive(Clone, Copy, Debug)]
pub struct OpenCvChessboard {
    /// `CALIB_CB_*` flags for `findChessboardCorners`.
    pub flags: i32,
}

#[cfg(feature = "opencv")]
impl Default for OpenCvChessboard {
    fn default() -> Self {
        use opencv::calib3d;
        Self {
            flags: calib3d::CALIB_CB_ADAPTIVE_THRESH | calib3d::CALIB_CB_NORMALIZE_IMAGE,
        }
    }
}

#[cfg(feature = "opencv")]
impl OpenCvChessboard {
    fn find(&self, img: &GrayImage, grid: &GridSpec) -> opencv::Result<Option<Vec<Point2<f64>>>> {
        use opencv::core::{Point2f, Size, TermCriteria, Vector};
        use opencv::{calib3d, imgproc, prelude::*};

        let flat = Mat::from_slice(img.as_raw())?;
        let gray = flat.reshape(1, img.height() as i32)?;
        let mut corners = Vector::<Point2f>::new();
        let pattern = Size::new(grid.cols as i32, grid.rows as i32);
        if !calib3d::find_chessboard_corners(&gray, pattern, &mut corners, self.flags)? {
            return Ok(None);
        }
        imgproc::corner_sub_pix(
            &gray,
            &mut corners,
            Size::new(11, 11),
            Size::new(-1, -1),
            TermCriteria::new(
                opencv::core::TermCriteria_COUNT + opencv::core::TermCriteria_EPS,
                30,
                0.1,
            )?,
        )?;
        Ok(Some(
            corners
                .iter()
                .map(|p| Point2::new(p.x as f64, p.y as f64))
                .collect(),
        ))
    }
}

#[cfg(feature = "opencv")]
impl CornerDetector for OpenCvChessboard {
    fn detect(&self, img: &GrayImage, grid: &GridSpec) -> Option<Vec<Point2<f64>>> {
        match self.find(img, grid) {
            Ok(corners) => corners,
            Err(e) => {
                log::warn!("OpenCV chessboard search failed: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkercal_core::synthetic::{board_pose, project_corners, render_checkerboard, BoardLayout};
    use checkercal_core::{BrownConrady, CameraModel, ImageSize, PinholeIntrinsics, Pose};
    use nalgebra::Vector3;

    fn scene() -> (GrayImage, Vec<Point2<f64>>) {
        let cam = CameraModel::new(
            PinholeIntrinsics::new(600.0, 600.0, 320.0, 240.0),
            BrownConrady::default(),
        );
        let board = BoardLayout::new(9, 6, 0.02);
        let pose: Pose = board_pose(&board, 0.1, -0.05, 0.03, Vector3::new(0.0, 0.0, 0.4));
        let img = render_checkerboard(&cam, &board, &pose, ImageSize::new(640, 480), 4);
        let gray = GrayImage::from_raw(img.width as u32, img.height as u32, img.data).unwrap();
        (gray, project_corners(&cam, &board, &pose).unwrap())
    }

    fn all_matched(found: &[Point2<f64>], truth: &[Point2<f64>], tol: f64) -> bool {
        truth
            .iter()
            .all(|t| found.iter().any(|p| (p - t).norm() < tol))
    }

    #[test]
    fn chess_detector_returns_every_corner() {
        let (img, truth) = scene();
        let grid = GridSpec::new(9, 6, 0.02).unwrap();
        let found = CornerDetector::detect(&ChessboardDetector::default(), &img, &grid)
            .expect("board");
        assert_eq!(found.len(), 54);
        assert!(all_matched(&found, &truth, 0.3));
    }

    #[cfg(feature = "opencv")]
    #[test]
    fn opencv_detector_returns_every_corner() {
        let (img, truth) = scene();
        let grid = GridSpec::new(9, 6, 0.02).unwrap();
        let found = OpenCvChessboard::default().detect(&img, &grid).expect("board");
        assert_eq!(found.len(), 54);
        assert!(all_matched(&found, &truth, 0.5));
    }
}
