//! Per-frame capture loop around a [`CalibrationSession`].

use log::{debug, info, warn};

use crate::control::{Signal, SignalSource};
use crate::detect::CornerDetector;
use crate::frame::{FrameError, FrameSource, Region};
use crate::overlay::{FrameSink, Overlay};
use crate::session::{CalibrationSession, SessionError, SessionState};
use crate::solve::CalibrationSolver;

/// Why the loop stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoopExit {
    Quit,
    EndOfStream,
    /// The source failed mid-stream.
    AcquisitionFailure(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct LoopSummary {
    pub frames: usize,
    pub detections: usize,
    pub committed: usize,
    pub state: SessionState,
    pub exit: LoopExit,
}

/// Frame in, detect, render, poll, apply. Repeats until quit or the source
/// runs dry; the source is released when the caller drops it.
pub fn run_interaction_loop<S, D>(
    session: &mut CalibrationSession<S>,
    detector: &D,
    region: Region,
    source: &mut dyn FrameSource,
    sink: &mut dyn FrameSink,
    signals: &mut dyn SignalSource,
) -> LoopSummary
where
    S: CalibrationSolver,
    D: CornerDetector + ?Sized,
{
    let mut frames = 0;
    let mut detections = 0;

    let exit = loop {
        let frame = match source.next_frame() {
            Ok(frame) => region.apply(&frame),
            Err(FrameError::EndOfStream) => break LoopExit::EndOfStream,
            Err(e) => {
                warn!("{e}");
                break LoopExit::AcquisitionFailure(e.to_string());
            }
        };
        frames += 1;

        let detection = session.accumulator().try_detect(detector, &frame);
        if detection.is_found() {
            detections += 1;
        }

        let acc = session.accumulator();
        let overlay = Overlay::new(
            acc.committed_count(),
            acc.min_required(),
            detection.corners.clone(),
            acc.grid().cols,
        );
        if let Err(e) = sink.render(&frame, &overlay) {
            warn!("render failed: {e}");
        }

        let signal = signals.poll_signal();
        if signal == Signal::Quit {
            break LoopExit::Quit;
        }

        let outcome = session.handle(signal, &detection);
        if let Some(Err(e)) = &outcome.commit {
            report(e);
        }
        match outcome.calibration {
            Some(Ok(cal)) => {
                info!("reprojection error: {:.5}px", cal.reprojection_error);
                if let Ok(path) = cal.persisted {
                    info!("results written to {}", path.display());
                }
            }
            Some(Err(e)) => report(&e),
            None => {}
        }
    };

    let summary = LoopSummary {
        frames,
        detections,
        committed: session.accumulator().committed_count(),
        state: session.state(),
        exit,
    };
    info!(
        "loop ended ({:?}): {} frames, {} detections, {} committed, session {:?}",
        summary.exit, summary.frames, summary.detections, summary.committed, summary.state
    );
    summary
}

fn report(e: &SessionError) {
    match e {
        SessionError::Finished(_) => debug!("{e}"),
        _ => warn!("{e}"),
    }
}
