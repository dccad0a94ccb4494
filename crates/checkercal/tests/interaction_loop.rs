mod common;

use std::cell::RefCell;
use std::collections::VecDeque;

use checkercal::{
    run_interaction_loop, store, AutoConfirm, CalibrationSession, CornerDetector, Frame,
    FrameError, FrameSink, FrameSource, GridSpec, InMemorySource, LoopExit, NullSink, Overlay,
    OverlayDirSink, Region, ScriptedSignals, SessionConfig, SessionState, Signal,
};
use checkercal_chessboard::ChessboardDetector;
use checkercal_solver::PlanarCalibrator;
use common::{corners, grid, rendered_frame, side_by_side, within, SIZE};
use image::{GrayImage, RgbImage};
use nalgebra::Point2;

/// Hands out pre-recorded answers, one per frame.
struct ScriptedDetector {
    answers: RefCell<VecDeque<Option<Vec<Point2<f64>>>>>,
}

impl ScriptedDetector {
    fn new(answers: Vec<Option<Vec<Point2<f64>>>>) -> Self {
        Self {
            answers: RefCell::new(answers.into()),
        }
    }
}

impl CornerDetector for ScriptedDetector {
    fn detect(&self, _img: &GrayImage, _grid: &GridSpec) -> Option<Vec<Point2<f64>>> {
        self.answers.borrow_mut().pop_front().flatten()
    }
}

/// Remembers what it was asked to show.
#[derive(Default)]
struct RecordingSink {
    texts: Vec<String>,
    marked: Vec<bool>,
}

impl FrameSink for RecordingSink {
    fn render(&mut self, _frame: &Frame, overlay: &Overlay) -> Result<(), FrameError> {
        self.texts.push(overlay.text.clone());
        self.marked.push(overlay.corners.is_some());
        Ok(())
    }
}

/// One good frame, then the device drops out.
struct FlakySource {
    served: bool,
}

impl FrameSource for FlakySource {
    fn next_frame(&mut self) -> Result<Frame, FrameError> {
        if self.served {
            return Err(FrameError::Acquisition("device unplugged".to_string()));
        }
        self.served = true;
        Ok(Frame::new(0, RgbImage::new(SIZE.width, SIZE.height)))
    }
}

fn blank_frames(n: usize) -> InMemorySource {
    InMemorySource::new((0..n).map(|_| RgbImage::new(SIZE.width, SIZE.height)))
}

fn config(dir: &tempfile::TempDir, min_required: usize) -> SessionConfig {
    SessionConfig {
        min_required,
        output_path: dir.path().join("camera_calibration.yml"),
        max_reprojection_error: None,
    }
}

#[test]
fn scripted_run_commits_confirmed_detections_only() {
    let dir = tempfile::tempdir().unwrap();
    let mut session =
        CalibrationSession::new(grid(), &config(&dir, 15), PlanarCalibrator::default()).unwrap();
    let detector = ScriptedDetector::new(vec![
        Some(corners(0)),
        None,
        Some(corners(1)),
        Some(corners(5)),
        Some(corners(2)),
        Some(corners(3)),
        Some(corners(4)),
    ]);
    let mut signals = ScriptedSignals::new([
        Signal::Confirm,   // 1
        Signal::Confirm,   // miss: rejected
        Signal::Confirm,   // 2
        Signal::Calibrate, // only 2 observations: rejected
        Signal::Confirm,   // 3
        Signal::Calibrate, // solves
        Signal::Confirm,   // ignored, already calibrated
    ]);
    let mut sink = RecordingSink::default();

    let summary = run_interaction_loop(
        &mut session,
        &detector,
        Region::Full,
        &mut blank_frames(7),
        &mut sink,
        &mut signals,
    );

    assert_eq!(summary.exit, LoopExit::EndOfStream);
    assert_eq!(summary.frames, 7);
    assert_eq!(summary.detections, 6);
    assert_eq!(summary.committed, 3);
    assert_eq!(summary.state, SessionState::Calibrated);

    let frames: Vec<usize> = session
        .accumulator()
        .observations()
        .iter()
        .map(|o| o.frame_index)
        .collect();
    assert_eq!(frames, vec![0, 2, 4]);

    let result = session.result().unwrap();
    assert!(result.reprojection_error < 1e-3);
    let stored = store::load(session.store().path()).unwrap();
    assert_eq!(stored.camera_matrix, result.camera_matrix);

    assert_eq!(sink.texts[0], "Captured Image: 0/15");
    assert_eq!(sink.texts[3], "Captured Image: 2/15");
    assert_eq!(sink.marked, vec![true, false, true, true, true, true, true]);
}

#[test]
fn quit_stops_before_the_signal_is_applied() {
    let dir = tempfile::tempdir().unwrap();
    let mut session =
        CalibrationSession::new(grid(), &config(&dir, 15), PlanarCalibrator::default()).unwrap();
    let detector = ScriptedDetector::new(vec![Some(corners(0)); 5]);
    let mut signals = ScriptedSignals::new([Signal::Confirm, Signal::Quit, Signal::Confirm]);

    let summary = run_interaction_loop(
        &mut session,
        &detector,
        Region::Full,
        &mut blank_frames(5),
        &mut NullSink,
        &mut signals,
    );

    assert_eq!(summary.exit, LoopExit::Quit);
    assert_eq!(summary.frames, 2);
    assert_eq!(summary.committed, 1);
    assert_eq!(summary.state, SessionState::Collecting);
}

#[test]
fn acquisition_failure_ends_loop_without_calibrating() {
    let dir = tempfile::tempdir().unwrap();
    let mut session =
        CalibrationSession::new(grid(), &config(&dir, 3), PlanarCalibrator::default()).unwrap();
    let detector = ScriptedDetector::new(vec![Some(corners(0))]);

    let summary = run_interaction_loop(
        &mut session,
        &detector,
        Region::Full,
        &mut FlakySource { served: false },
        &mut NullSink,
        &mut AutoConfirm,
    );

    assert!(matches!(summary.exit, LoopExit::AcquisitionFailure(_)));
    assert_eq!(summary.frames, 1);
    assert_eq!(summary.committed, 1);
    assert_eq!(summary.state, SessionState::Collecting);
    assert!(!session.store().path().exists());
}

#[test]
fn rendered_boards_calibrate_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let mut session =
        CalibrationSession::new(grid(), &config(&dir, 6), PlanarCalibrator::default()).unwrap();
    // boards sit in the right half of a side-by-side frame
    let frames: Vec<RgbImage> = (0..6).map(|k| side_by_side(&rendered_frame(k))).collect();
    let mut sink = OverlayDirSink::create(dir.path().join("overlay")).unwrap();

    let summary = run_interaction_loop(
        &mut session,
        &ChessboardDetector::default(),
        Region::Right,
        &mut InMemorySource::new(frames),
        &mut sink,
        &mut AutoConfirm,
    );

    assert_eq!(summary.detections, 6);
    assert_eq!(summary.committed, 6);
    assert_eq!(summary.state, SessionState::Calibrated);

    let result = session.result().unwrap();
    assert_eq!(result.image_size, SIZE);
    assert!(result.reprojection_error < 0.5, "rms {}", result.reprojection_error);
    let k = result.camera_matrix;
    assert!(within(k[(0, 0)], 600.0, 0.03), "{k}");
    assert!(within(k[(1, 1)], 600.0, 0.03), "{k}");
    assert!(within(k[(0, 2)], 320.0, 0.05), "{k}");
    assert!(within(k[(1, 2)], 240.0, 0.05), "{k}");

    assert!(session.store().path().exists());
    assert!(sink.dir().join("frame_00000.png").exists());
    assert!(sink.dir().join("frame_00005.png").exists());
}
