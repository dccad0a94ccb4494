#![allow(dead_code)]

use checkercal::{DetectionResult, GridSpec};
use checkercal_core::synthetic::{project_corners, render_checkerboard, standard_views, BoardLayout};
use checkercal_core::{BrownConrady, CameraModel, ImageSize, PinholeIntrinsics, Pose};
use image::{Rgb, RgbImage};
use nalgebra::Point2;

pub const SIZE: ImageSize = ImageSize {
    width: 640,
    height: 480,
};

pub fn camera() -> CameraModel {
    CameraModel::new(
        PinholeIntrinsics::new(600.0, 600.0, 320.0, 240.0),
        BrownConrady::default(),
    )
}

pub fn grid() -> GridSpec {
    GridSpec::new(9, 6, 0.02).unwrap()
}

pub fn board() -> BoardLayout {
    BoardLayout::new(9, 6, 0.02)
}

pub fn views() -> Vec<Pose> {
    standard_views(&board(), 0.4)
}

/// Noiseless corners of standard view `k`.
pub fn corners(k: usize) -> Vec<Point2<f64>> {
    let poses = views();
    project_corners(&camera(), &board(), &poses[k % poses.len()]).unwrap()
}

pub fn hit(frame: usize, view: usize) -> DetectionResult {
    DetectionResult::found(frame, SIZE, corners(view))
}

pub fn miss(frame: usize) -> DetectionResult {
    DetectionResult::miss(frame, SIZE)
}

/// Standard view `k` rendered as a colour frame.
pub fn rendered_frame(k: usize) -> RgbImage {
    let poses = views();
    let gray = render_checkerboard(&camera(), &board(), &poses[k], SIZE, 3);
    RgbImage::from_fn(SIZE.width, SIZE.height, |x, y| {
        let v = gray.get(x as usize, y as usize);
        Rgb([v, v, v])
    })
}

/// `half` placed on the right of a double-width frame; the left half is flat.
pub fn side_by_side(half: &RgbImage) -> RgbImage {
    let (w, h) = half.dimensions();
    let mut out = RgbImage::from_pixel(2 * w, h, Rgb([110, 110, 110]));
    image::imageops::replace(&mut out, half, w as i64, 0);
    out
}

pub fn within(est: f64, gt: f64, rel: f64) -> bool {
    (est - gt).abs() <= rel * gt.abs()
}
