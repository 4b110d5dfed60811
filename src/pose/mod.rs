pub mod estimator;
pub mod keypoint;
#[cfg(feature = "desktop")]
pub mod movenet;
pub mod smooth;

pub use estimator::{accept_pose, PoseEstimator, PoseModel};
pub use keypoint::{Keypoint, KeypointIndex, KeypointLayout, Pose};
#[cfg(feature = "desktop")]
pub use movenet::{preprocess_for_movenet, MoveNetDetector, MoveNetModel};
pub use smooth::{KeypointSmoother, Smoothed};
