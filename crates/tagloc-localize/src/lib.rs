#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! Turns the detection of a single AprilTag into the pose of the camera that saw it.
//!
//! ```text
//! detections -> CorrespondenceBuilder -> (object points, image points) -> PoseSolver -> Pose
//! ```
//!
//! Object points are expressed in the marker frame, which is also the world frame.
//! The camera frame is the optical frame: x to the right, y down, z along the
//! viewing direction. [`Pose::rotation`] maps camera axes into the world frame and
//! [`Pose::orientation`] decomposes it as `Rz(yaw)·Ry(pitch)·Rx(roll)`.

/// Detector output and the builder turning it into solver input.
pub mod correspondence;

/// Error types for the localisation pipeline.
pub mod error;

/// ZYX Euler angle conversions.
pub mod euler;

/// Camera calibration loading and saving.
pub mod intrinsics;

/// Known marker geometry and its lookup by tag ID.
pub mod marker;

/// Pose recovery and frame inversion.
pub mod solver;

pub use correspondence::{CorrespondenceBuilder, Correspondences, TagDetection};
pub use error::LocalizeError;
pub use euler::{euler_zyx_to_rotation, rotation_to_euler_zyx, EulerZyx};
pub use intrinsics::CameraIntrinsics;
pub use marker::{MarkerGeometry, MarkerGeometryTable, DEFAULT_MARKER_SIDE_MM};
pub use solver::{invert_extrinsics, solve_pose, Pose, PoseSolver};
