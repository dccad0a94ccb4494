//! Rendering detections on top of frames, and where rendered frames go.

use std::fs;
use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use log::debug;
use nalgebra::Point2;

use crate::frame::{Frame, FrameError};

/// Per-row colours, cycled like OpenCV's `drawChessboardCorners`.
const ROW_COLORS: [Rgb<u8>; 6] = [
    Rgb([255, 0, 0]),
    Rgb([255, 128, 0]),
    Rgb([200, 200, 0]),
    Rgb([0, 255, 0]),
    Rgb([0, 128, 255]),
    Rgb([255, 0, 255]),
];
const PROGRESS_FG: Rgb<u8> = Rgb([0, 255, 0]);
const PROGRESS_BG: Rgb<u8> = Rgb([40, 40, 40]);

/// What to draw over one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Overlay {
    /// Progress line, e.g. `Captured Image: 3/15`.
    pub text: String,
    pub captured: usize,
    pub target: usize,
    /// Corners of the current detection, row-major with `cols` per row.
    pub corners: Option<Vec<Point2<f64>>>,
    pub cols: usize,
}

impl Overlay {
    pub fn new(
        captured: usize,
        target: usize,
        corners: Option<Vec<Point2<f64>>>,
        cols: usize,
    ) -> Self {
        Self {
            text: format!("Captured Image: {captured}/{target}"),
            captured,
            target,
            corners,
            cols,
        }
    }
}

/// Consumer of rendered frames.
pub trait FrameSink {
    fn render(&mut self, frame: &Frame, overlay: &Overlay) -> Result<(), FrameError>;
}

/// Drops everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl FrameSink for NullSink {
    fn render(&mut self, _frame: &Frame, _overlay: &Overlay) -> Result<(), FrameError> {
        Ok(())
    }
}

/// Writes each annotated frame as `frame_NNNNN.png` into a directory.
#[derive(Clone, Debug)]
pub struct OverlayDirSink {
    dir: PathBuf,
}

impl OverlayDirSink {
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self, FrameError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| FrameError::Output(format!("{}: {e}", dir.display())))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl FrameSink for OverlayDirSink {
    fn render(&mut self, frame: &Frame, overlay: &Overlay) -> Result<(), FrameError> {
        let path = self.dir.join(format!("frame_{:05}.png", frame.index));
        draw_overlay(&frame.image, overlay)
            .save(&path)
            .map_err(|e| FrameError::Output(format!("{}: {e}", path.display())))?;
        debug!("{} -> {}", overlay.text, path.display());
        Ok(())
    }
}

/// Copy of `img` with the progress bar and detected corners drawn on it.
pub fn draw_overlay(img: &RgbImage, overlay: &Overlay) -> RgbImage {
    let mut out = img.clone();
    draw_progress(&mut out, overlay.captured, overlay.target);
    if let Some(corners) = &overlay.corners {
        draw_corners(&mut out, corners, overlay.cols.max(1));
    }
    out
}

fn draw_progress(img: &mut RgbImage, captured: usize, target: usize) {
    let (w, h) = img.dimensions();
    if w < 8 || h < 8 || target == 0 {
        return;
    }
    let bar_w = (w as i32 / 3).max(4);
    let filled = (bar_w as usize * captured.min(target) / target) as i32;
    for x in 0..bar_w {
        let color = if x < filled { PROGRESS_FG } else { PROGRESS_BG };
        for y in 2..6 {
            put(img, 2 + x, y, color);
        }
    }
}

fn draw_corners(img: &mut RgbImage, corners: &[Point2<f64>], cols: usize) {
    let px: Vec<(i32, i32)> = corners
        .iter()
        .map(|p| (p.x.round() as i32, p.y.round() as i32))
        .collect();
    for (i, pair) in px.windows(2).enumerate() {
        let color = ROW_COLORS[(i / cols) % ROW_COLORS.len()];
        draw_line(img, pair[0], pair[1], color);
    }
    for (i, &(x, y)) in px.iter().enumerate() {
        let color = ROW_COLORS[(i / cols) % ROW_COLORS.len()];
        draw_cross(img, x, y, 4, color);
    }
}

fn draw_line(
    img: &mut RgbImage,
    (mut x0, mut y0): (i32, i32),
    (x1, y1): (i32, i32),
    color: Rgb<u8>,
) {
    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        put(img, x0, y0, color);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

fn draw_cross(img: &mut RgbImage, x: i32, y: i32, r: i32, color: Rgb<u8>) {
    for d in -r..=r {
        put(img, x + d, y + d, color);
        put(img, x + d, y - d, color);
    }
}

#[inline]
fn put(img: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}
