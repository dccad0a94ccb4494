//! Frames and the sources that produce them.

use std::collections::VecDeque;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use checkercal_core::ImageSize;
use image::{imageops, ImageReader, RgbImage};
use log::{debug, info};
use serde::{Deserialize, Serialize};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff", "pgm", "ppm"];

#[derive(thiserror::Error, Debug)]
pub enum FrameError {
    #[error("frame source unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("end of stream")]
    EndOfStream,
    #[error("failed to acquire frame: {0}")]
    Acquisition(String),
    #[error("failed to read {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to write frame: {0}")]
    Output(String),
}

/// One captured colour frame.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Position in the stream, starting at 0.
    pub index: usize,
    pub image: RgbImage,
}

impl Frame {
    pub fn new(index: usize, image: RgbImage) -> Self {
        Self { index, image }
    }

    pub fn size(&self) -> ImageSize {
        let (w, h) = self.image.dimensions();
        ImageSize::new(w, h)
    }
}

/// Part of a side-by-side frame used for detection and display.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    #[default]
    Full,
    Left,
    Right,
}

impl Region {
    /// Crop `frame` to this region, keeping its index.
    pub fn apply(self, frame: &Frame) -> Frame {
        let image = match self {
            Region::Full => return frame.clone(),
            Region::Left => left_half(&frame.image),
            Region::Right => right_half(&frame.image),
        };
        Frame::new(frame.index, image)
    }
}

/// Columns `[0, w/2)`.
pub fn left_half(image: &RgbImage) -> RgbImage {
    let (w, h) = image.dimensions();
    imageops::crop_imm(image, 0, 0, w / 2, h).to_image()
}

/// Columns `[w/2, w)`; one column wider than the left half for odd `w`.
pub fn right_half(image: &RgbImage) -> RgbImage {
    let (w, h) = image.dimensions();
    imageops::crop_imm(image, w / 2, 0, w - w / 2, h).to_image()
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Region::Full => "full",
            Region::Left => "left",
            Region::Right => "right",
        };
        f.write_str(s)
    }
}

impl FromStr for Region {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(Region::Full),
            "left" => Ok(Region::Left),
            "right" => Ok(Region::Right),
            other => Err(format!("unknown region '{other}' (expected full|left|right)")),
        }
    }
}

/// Blocking supplier of frames.
///
/// `Err(FrameError::EndOfStream)` or any other error ends the capture loop.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Frame, FrameError>;
}

/// Replays the images of a directory in file-name order.
#[derive(Debug)]
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    next: usize,
}

impl ImageSequenceSource {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, FrameError> {
        let dir = dir.as_ref();
        let entries = fs::read_dir(dir)
            .map_err(|e| FrameError::DeviceUnavailable(format!("{}: {e}", dir.display())))?;
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && has_image_extension(p))
            .collect();
        if paths.is_empty() {
            return Err(FrameError::DeviceUnavailable(format!(
                "no images in {}",
                dir.display()
            )));
        }
        paths.sort();
        info!("replaying {} images from {}", paths.len(), dir.display());
        Ok(Self { paths, next: 0 })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Result<Frame, FrameError> {
        let Some(path) = self.paths.get(self.next) else {
            return Err(FrameError::EndOfStream);
        };
        let image = ImageReader::open(path)
            .map_err(|e| FrameError::Acquisition(format!("{}: {e}", path.display())))?
            .decode()
            .map_err(|source| FrameError::Image {
                path: path.clone(),
                source,
            })?
            .to_rgb8();
        debug!("frame {} <- {}", self.next, path.display());
        let frame = Frame::new(self.next, image);
        self.next += 1;
        Ok(frame)
    }
}

/// Frames held in memory, handed out in order.
#[derive(Debug, Default)]
pub struct InMemorySource {
    frames: VecDeque<RgbImage>,
    next: usize,
}

impl InMemorySource {
    pub fn new(frames: impl IntoIterator<Item = RgbImage>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            next: 0,
        }
    }
}

impl FrameSource for InMemorySource {
    fn next_frame(&mut self) -> Result<Frame, FrameError> {
        let image = self.frames.pop_front().ok_or(FrameError::EndOfStream)?;
        let frame = Frame::new(self.next, image);
        self.next += 1;
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn split_frame() -> Frame {
        let img = RgbImage::from_fn(8, 4, |x, _| {
            if x < 4 {
                Rgb([10, 10, 10])
            } else {
                Rgb([200, 200, 200])
            }
        });
        Frame::new(3, img)
    }

    #[test]
    fn regions_select_halves() {
        let frame = split_frame();
        let left = Region::Left.apply(&frame);
        let right = Region::Right.apply(&frame);
        assert_eq!(left.size(), ImageSize::new(4, 4));
        assert_eq!(right.size(), ImageSize::new(4, 4));
        assert_eq!(left.index, 3);
        assert!(left.image.pixels().all(|p| p.0 == [10, 10, 10]));
        assert!(right.image.pixels().all(|p| p.0 == [200, 200, 200]));
        assert_eq!(Region::Full.apply(&frame).size(), ImageSize::new(8, 4));
    }

    #[test]
    fn halves_cover_odd_widths() {
        let image = RgbImage::from_fn(5, 2, |x, _| Rgb([x as u8, 0, 0]));
        let (left, right) = (left_half(&image), right_half(&image));
        assert_eq!(left.dimensions(), (2, 2));
        assert_eq!(right.dimensions(), (3, 2));
        assert_eq!(right.get_pixel(0, 1).0[0], 2);
    }

    #[test]
    fn region_parses_case_insensitively() {
        assert_eq!("LEFT".parse::<Region>(), Ok(Region::Left));
        assert_eq!("right".parse::<Region>(), Ok(Region::Right));
        assert!("middle".parse::<Region>().is_err());
        assert_eq!(Region::Right.to_string(), "right");
    }

    #[test]
    fn in_memory_source_ends_with_end_of_stream() {
        let mut src = InMemorySource::new(vec![RgbImage::new(2, 2), RgbImage::new(2, 2)]);
        assert_eq!(src.next_frame().unwrap().index, 0);
        assert_eq!(src.next_frame().unwrap().index, 1);
        assert!(matches!(src.next_frame(), Err(FrameError::EndOfStream)));
    }

    #[test]
    fn missing_directory_is_unavailable() {
        let err = ImageSequenceSource::open("/definitely/not/here").unwrap_err();
        assert!(matches!(err, FrameError::DeviceUnavailable(_)));
    }
}
