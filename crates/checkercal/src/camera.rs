//! Live capture and display through OpenCV's `videoio` / `highgui`.

use image::RgbImage;
use log::{info, warn};
use opencv::{core, highgui, imgproc, prelude::*, videoio};

use crate::config::CaptureConfig;
use crate::control::{Signal, SignalSource};
use crate::frame::{left_half, right_half, Frame, FrameError, FrameSource};
use crate::overlay::{draw_overlay, FrameSink, Overlay};

const KEY_ESC: i32 = 27;

fn acquisition(e: opencv::Error) -> FrameError {
    FrameError::Acquisition(e.to_string())
}

fn output(e: opencv::Error) -> FrameError {
    FrameError::Output(e.to_string())
}

/// A `VideoCapture` device; released on drop.
pub struct CameraSource {
    cap: videoio::VideoCapture,
    bgr: Mat,
    rgb: Mat,
    next: usize,
}

impl CameraSource {
    pub fn open(index: i32, capture: &CaptureConfig) -> Result<Self, FrameError> {
        let unavailable = |e: opencv::Error| FrameError::DeviceUnavailable(e.to_string());
        let mut cap = videoio::VideoCapture::new(index, videoio::CAP_ANY).map_err(unavailable)?;
        if !cap.is_opened().map_err(unavailable)? {
            return Err(FrameError::DeviceUnavailable(format!(
                "camera {index} could not be opened"
            )));
        }
        // requests only; drivers may pick something else
        cap.set(videoio::CAP_PROP_FPS, capture.fps).map_err(unavailable)?;
        cap.set(videoio::CAP_PROP_FRAME_WIDTH, capture.width as f64)
            .map_err(unavailable)?;
        cap.set(videoio::CAP_PROP_FRAME_HEIGHT, capture.height as f64)
            .map_err(unavailable)?;
        info!("camera {index} opened");
        Ok(Self {
            cap,
            bgr: Mat::default(),
            rgb: Mat::default(),
            next: 0,
        })
    }
}

impl FrameSource for CameraSource {
    fn next_frame(&mut self) -> Result<Frame, FrameError> {
        if !self.cap.read(&mut self.bgr).map_err(acquisition)? || self.bgr.empty() {
            return Err(FrameError::EndOfStream);
        }
        imgproc::cvt_color_def(&self.bgr, &mut self.rgb, imgproc::COLOR_BGR2RGB)
            .map_err(acquisition)?;
        let size = self.rgb.size().map_err(acquisition)?;
        let bytes = self.rgb.data_bytes().map_err(acquisition)?.to_vec();
        let image = RgbImage::from_raw(size.width as u32, size.height as u32, bytes)
            .ok_or_else(|| FrameError::Acquisition("unexpected frame layout".to_string()))?;
        let frame = Frame::new(self.next, image);
        self.next += 1;
        Ok(frame)
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        let _ = self.cap.release();
    }
}

/// A `highgui` window showing the annotated frame and the progress text.
pub struct HighguiWindow {
    name: String,
}

impl HighguiWindow {
    pub fn create(name: &str) -> Result<Self, FrameError> {
        highgui::named_window(name, highgui::WINDOW_AUTOSIZE).map_err(output)?;
        Ok(Self {
            name: name.to_string(),
        })
    }
}

/// Convert `image` to BGR, stamp `text` in the top-left corner and show it in `window`.
fn show(window: &str, image: &RgbImage, text: &str) -> Result<(), FrameError> {
    let h = image.height() as i32;
    let flat = Mat::from_slice(image.as_raw()).map_err(output)?;
    let rgb = flat.reshape(3, h).map_err(output)?;
    let mut bgr = Mat::default();
    imgproc::cvt_color_def(&rgb, &mut bgr, imgproc::COLOR_RGB2BGR).map_err(output)?;
    if !text.is_empty() {
        imgproc::put_text(
            &mut bgr,
            text,
            core::Point::new(20, 40_i32.min(h - 4)),
            imgproc::FONT_HERSHEY_SIMPLEX,
            1.0,
            core::Scalar::new(0.0, 255.0, 0.0, 0.0),
            2,
            imgproc::LINE_8,
            false,
        )
        .map_err(output)?;
    }
    highgui::imshow(window, &bgr).map_err(output)
}

impl FrameSink for HighguiWindow {
    fn render(&mut self, frame: &Frame, overlay: &Overlay) -> Result<(), FrameError> {
        let drawn = draw_overlay(&frame.image, overlay);
        show(&self.name, &drawn, &overlay.text)
    }
}

impl Drop for HighguiWindow {
    fn drop(&mut self) {
        let _ = highgui::destroy_window(&self.name);
    }
}

/// Two `highgui` windows showing the left and right halves of a side-by-side frame.
///
/// The overlay is drawn on the whole frame before it is split; the progress
/// text goes to the left window.
pub struct SplitWindows {
    left: String,
    right: String,
}

impl SplitWindows {
    pub fn create(left: &str, right: &str) -> Result<Self, FrameError> {
        highgui::named_window(left, highgui::WINDOW_AUTOSIZE).map_err(output)?;
        highgui::named_window(right, highgui::WINDOW_AUTOSIZE).map_err(output)?;
        Ok(Self {
            left: left.to_string(),
            right: right.to_string(),
        })
    }
}

impl FrameSink for SplitWindows {
    fn render(&mut self, frame: &Frame, overlay: &Overlay) -> Result<(), FrameError> {
        let drawn = draw_overlay(&frame.image, overlay);
        show(&self.left, &left_half(&drawn), &overlay.text)?;
        show(&self.right, &right_half(&drawn), "")
    }
}

impl Drop for SplitWindows {
    fn drop(&mut self) {
        let _ = highgui::destroy_window(&self.left);
        let _ = highgui::destroy_window(&self.right);
    }
}

/// Keyboard through `waitKey`: space confirms, `c` calibrates, ESC or `q` quits.
#[derive(Clone, Copy, Debug, Default)]
pub struct HighguiKeys;

impl SignalSource for HighguiKeys {
    fn poll_signal(&mut self) -> Signal {
        signal_for_wait_key(highgui::wait_key(1))
    }
}

fn signal_for_wait_key(key: opencv::Result<i32>) -> Signal {
    match key {
        Ok(key) => signal_for_key(key),
        Err(e) => {
            warn!("waitKey failed: {e}");
            Signal::None
        }
    }
}

fn signal_for_key(key: i32) -> Signal {
    match key {
        KEY_ESC => Signal::Quit,
        k if k == ' ' as i32 => Signal::Confirm,
        k if k == 'c' as i32 => Signal::Calibrate,
        k if k == 'q' as i32 => Signal::Quit,
        _ => Signal::None,
    }
}
