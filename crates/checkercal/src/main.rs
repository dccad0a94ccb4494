use std::path::PathBuf;
use std::process::ExitCode;

use checkercal::{
    generate_reference_pattern, run_interaction_loop, store, AppConfig, AutoConfirm,
    CalibrationResult, CalibrationSession, CaptureConfig, ConfigError, CornerDetector, FrameError,
    FrameSink, FrameSource, GridSpec, GridSpecError, ImageSequenceSource, NullSink,
    OverlayDirSink, Region, ScriptError, ScriptedSignals, SessionError, SignalSource, StoreError,
};
use checkercal_chessboard::ChessboardDetector;
use checkercal_solver::PlanarCalibrator;
use clap::{Args, Parser, Subcommand};
use log::LevelFilter;
use nalgebra::Matrix3;

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Grid(#[from] GridSpecError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[cfg_attr(feature = "opencv", allow(dead_code))]
    #[error("camera source 'camera:{0}' needs the `opencv` feature")]
    CameraUnsupported(String),
    #[cfg_attr(not(feature = "opencv"), allow(dead_code))]
    #[error("invalid camera index '{0}'")]
    BadCamera(String),
    #[error("replaying a directory needs --auto-confirm or --signals FILE")]
    NoSignals,
}

#[derive(Parser, Debug)]
#[command(name = "checkercal", version, about = "Checkerboard camera calibration")]
struct Cli {
    /// Log level: off, error, warn, info, debug, trace.
    #[arg(long, global = true, default_value = "info")]
    log_level: LevelFilter,
    /// Emit JSON logs through `tracing`.
    #[cfg(feature = "tracing")]
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Collect observations from a frame source and calibrate.
    Run(RunArgs),
    /// Print a stored calibration.
    Show {
        path: PathBuf,
    },
    /// Print the reference pattern of a board as JSON.
    Pattern {
        #[arg(long, default_value_t = 9)]
        cols: usize,
        #[arg(long, default_value_t = 6)]
        rows: usize,
        #[arg(long, default_value_t = 0.02)]
        square: f64,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Image directory (replayed in file-name order) or `camera:<index>`.
    source: String,
    /// JSON config; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    cols: Option<usize>,
    #[arg(long)]
    rows: Option<usize>,
    /// Square side length.
    #[arg(long)]
    square: Option<f64>,
    /// Observations that trigger calibration automatically.
    #[arg(long)]
    min_frames: Option<usize>,
    #[arg(long)]
    output: Option<PathBuf>,
    /// full | left | right
    #[arg(long)]
    region: Option<Region>,
    /// Reject a calibration whose RMS error exceeds this many pixels.
    #[arg(long)]
    max_error: Option<f64>,
    /// Commit every frame with a detection.
    #[arg(long, conflicts_with = "signals")]
    auto_confirm: bool,
    /// One signal per frame: none | confirm | calibrate | quit.
    #[arg(long)]
    signals: Option<PathBuf>,
    /// Write annotated frames here.
    #[arg(long)]
    overlay_dir: Option<PathBuf>,
    /// Find corners with OpenCV's `findChessboardCorners` instead of ChESS.
    #[cfg(feature = "opencv")]
    #[arg(long)]
    opencv_detector: bool,
}

impl RunArgs {
    fn resolve_config(&self) -> Result<AppConfig, CliError> {
        let mut cfg = match &self.config {
            Some(path) => AppConfig::load_json(path)?,
            None => AppConfig::default(),
        };
        if let Some(cols) = self.cols {
            cfg.grid.cols = cols;
        }
        if let Some(rows) = self.rows {
            cfg.grid.rows = rows;
        }
        if let Some(square) = self.square {
            cfg.grid.square_size = square;
        }
        if let Some(n) = self.min_frames {
            cfg.session.min_required = n;
        }
        if let Some(output) = &self.output {
            cfg.session.output_path = output.clone();
        }
        if let Some(region) = self.region {
            cfg.capture.region = region;
        }
        if let Some(max) = self.max_error {
            cfg.session.max_reprojection_error = Some(max);
        }
        cfg.grid.validate()?;
        Ok(cfg)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);
    match dispatch(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(feature = "tracing")]
fn init_logging(cli: &Cli) {
    if cli.log_json {
        checkercal_core::init_tracing(true, &cli.log_level.to_string().to_lowercase());
    } else {
        install_logger(cli.log_level);
    }
}

#[cfg(not(feature = "tracing"))]
fn init_logging(cli: &Cli) {
    install_logger(cli.log_level);
}

fn install_logger(level: LevelFilter) {
    if let Err(e) = checkercal_core::init_with_level(level) {
        eprintln!("warning: logging disabled: {e}");
    }
}

fn dispatch(command: Command) -> Result<(), CliError> {
    match command {
        Command::Run(args) => run(&args),
        Command::Show { path } => {
            let cal = store::load(&path)?;
            println!("{}", path.display());
            print_matrix(&cal.camera_matrix);
            println!("distortion_coefficients: {:?}", cal.distortion_coefficients);
            Ok(())
        }
        Command::Pattern { cols, rows, square } => {
            let grid = GridSpec::new(cols, rows, square)?;
            let pattern = generate_reference_pattern(&grid);
            println!("{}", serde_json::to_string_pretty(&*pattern)?);
            Ok(())
        }
    }
}

fn run(args: &RunArgs) -> Result<(), CliError> {
    let cfg = args.resolve_config()?;
    let camera = args.source.strip_prefix("camera:");

    let mut source: Box<dyn FrameSource> = match camera {
        Some(index) => open_camera(index, &cfg.capture)?,
        None => Box::new(ImageSequenceSource::open(&args.source)?),
    };
    let mut signals: Box<dyn SignalSource> = match (&args.signals, args.auto_confirm) {
        (_, true) => Box::new(AutoConfirm),
        (Some(path), false) => Box::new(ScriptedSignals::load(path)?),
        (None, false) if camera.is_some() => interactive_signals()?,
        (None, false) => return Err(CliError::NoSignals),
    };
    let mut sink: Box<dyn FrameSink> = match (&args.overlay_dir, camera) {
        (Some(dir), _) => Box::new(OverlayDirSink::create(dir)?),
        (None, Some(_)) => interactive_sink(cfg.capture.region)?,
        (None, None) => Box::new(NullSink),
    };

    let detector = make_detector(args, &cfg);
    let solver = PlanarCalibrator::new(cfg.solver.clone());
    let mut session = CalibrationSession::new(cfg.grid, &cfg.session, solver)?;
    log::info!(
        "board {}x{} inner corners, square {}; calibrating after {} captures",
        cfg.grid.cols,
        cfg.grid.rows,
        cfg.grid.square_size,
        cfg.session.min_required
    );

    let summary = run_interaction_loop(
        &mut session,
        detector.as_ref(),
        cfg.capture.region,
        source.as_mut(),
        sink.as_mut(),
        signals.as_mut(),
    );
    drop(source);

    println!(
        "frames: {}, detections: {}, captured: {}, state: {:?}",
        summary.frames, summary.detections, summary.committed, summary.state
    );
    if let Some(result) = session.result() {
        print_result(result);
        println!("saved to {}", session.store().path().display());
    }
    Ok(())
}

fn print_result(result: &CalibrationResult) {
    println!("reprojection error: {:.6}", result.reprojection_error);
    print_matrix(&result.camera_matrix);
    println!("distortion_coefficients: {:?}", result.distortion_coefficients);
}

fn print_matrix(k: &Matrix3<f64>) {
    println!("camera_matrix:");
    for r in 0..3 {
        println!("  [{:14.6} {:14.6} {:14.6}]", k[(r, 0)], k[(r, 1)], k[(r, 2)]);
    }
}

#[cfg(feature = "opencv")]
fn make_detector(args: &RunArgs, cfg: &AppConfig) -> Box<dyn CornerDetector> {
    if args.opencv_detector {
        Box::new(checkercal::OpenCvChessboard::default())
    } else {
        Box::new(ChessboardDetector::new(cfg.detector.clone()))
    }
}

#[cfg(not(feature = "opencv"))]
fn make_detector(_args: &RunArgs, cfg: &AppConfig) -> Box<dyn CornerDetector> {
    Box::new(ChessboardDetector::new(cfg.detector.clone()))
}

#[cfg(feature = "opencv")]
fn open_camera(index: &str, capture: &CaptureConfig) -> Result<Box<dyn FrameSource>, CliError> {
    let index: i32 = index
        .parse()
        .map_err(|_| CliError::BadCamera(index.to_string()))?;
    Ok(Box::new(checkercal::CameraSource::open(index, capture)?))
}

#[cfg(not(feature = "opencv"))]
fn open_camera(index: &str, _capture: &CaptureConfig) -> Result<Box<dyn FrameSource>, CliError> {
    Err(CliError::CameraUnsupported(index.to_string()))
}

#[cfg(feature = "opencv")]
fn interactive_signals() -> Result<Box<dyn SignalSource>, CliError> {
    println!("space: capture frame, c: calibrate, ESC/q: quit");
    Ok(Box::new(checkercal::HighguiKeys))
}

#[cfg(not(feature = "opencv"))]
fn interactive_signals() -> Result<Box<dyn SignalSource>, CliError> {
    Err(CliError::NoSignals)
}

/// A full side-by-side frame is shown as two windows, one per half.
#[cfg(feature = "opencv")]
fn interactive_sink(region: Region) -> Result<Box<dyn FrameSink>, CliError> {
    Ok(match region {
        Region::Full => Box::new(checkercal::SplitWindows::create(
            "checkercal left",
            "checkercal right",
        )?),
        Region::Left | Region::Right => Box::new(checkercal::HighguiWindow::create("checkercal")?),
    })
}

#[cfg(not(feature = "opencv"))]
fn interactive_sink(_region: Region) -> Result<Box<dyn FrameSink>, CliError> {
    Ok(Box::new(NullSink))
}
