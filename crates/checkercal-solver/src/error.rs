/// Errors returned by the planar calibrator.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SolveError {
    #[error("need at least {required} views, got {got}")]
    NotEnoughViews { required: usize, got: usize },
    #[error("view {view}: {image} image points for {object} object points")]
    MismatchedPoints {
        view: usize,
        object: usize,
        image: usize,
    },
    #[error("view {view}: need at least 4 points, got {got}")]
    TooFewPoints { view: usize, got: usize },
    #[error("view {view}: object points must lie on the z = 0 plane")]
    NonPlanarTarget { view: usize },
    #[error("invalid image size {width}x{height}")]
    InvalidImageSize { width: u32, height: u32 },
    #[error("homography estimation failed for view {view}")]
    Homography { view: usize },
    #[error("could not initialise intrinsics from the views")]
    DegenerateIntrinsics,
    #[error("pose initialisation failed for view {view}")]
    PoseInit { view: usize },
    #[error("optimisation diverged (non-finite parameters)")]
    NonFinite,
}
