//! Common data types shared across Perspective-n-Point (PnP) solvers.

use crate::camera::CameraModel;
use crate::ops::{mat3_to_array, matrix_to_rodrigues, rmse_px, rodrigues_to_matrix};
use crate::refine::{refine_pose_lm, LMParams};
use nalgebra::{Matrix3, Vector3};
use thiserror::Error;

/// Error types for PnP solvers.
#[derive(Debug, Error)]
pub enum PnPError {
    /// Invalid input data - insufficient correspondences for the specific solver.
    #[error("PnP solver requires at least {required} 2D-3D correspondences, got {actual}")]
    InsufficientCorrespondences {
        /// Minimum number of correspondences required by the solver.
        required: usize,
        /// Actual number of correspondences provided.
        actual: usize,
    },

    /// Invalid input data - mismatched array lengths with descriptive labels.
    #[error("Mismatched array lengths: {left_name} ({left_len}) != {right_name} ({right_len})")]
    MismatchedArrayLengths {
        /// Label for the left-hand slice.
        left_name: &'static str,
        /// Length of the left-hand slice.
        left_len: usize,
        /// Label for the right-hand slice.
        right_name: &'static str,
        /// Length of the right-hand slice.
        right_len: usize,
    },

    /// The correspondences do not constrain a unique pose.
    #[error("Degenerate point configuration: {0}")]
    DegenerateConfiguration(String),

    /// Singular value decomposition failed.
    #[error("SVD computation failed: {0}")]
    SvdFailed(String),

    /// The recovered pose is not physically valid.
    #[error("Invalid pose: {0}")]
    InvalidPose(String),

    /// Camera model error.
    #[error("Camera model error: {0}")]
    CameraError(String),
}

/// Numeric tolerances used by linear algebra routines throughout the PnP pipeline.
#[derive(Debug, Clone)]
pub struct NumericTol {
    /// Tolerance for singular-value decomposition based least-squares solves.
    pub svd: f64,
    /// Epsilon threshold for determinant / singular-value checks.
    pub eps: f64,
    /// Relative eigenvalue ratio below which a point cloud is treated as flat.
    pub planarity: f64,
}

impl Default for NumericTol {
    fn default() -> Self {
        Self {
            svd: 1e-12,
            eps: 1e-12,
            planarity: 1e-8,
        }
    }
}

/// Result returned by any PnP solver.
///
/// The rotation matrix maps coordinates from the **world** frame to the
/// **camera** frame: `X_c = R * X_w + t`.
#[derive(Debug, Clone)]
pub struct PnPResult {
    /// Estimated rotation matrix (row-major).
    pub rotation: [[f64; 3]; 3],
    /// Estimated translation vector.
    pub translation: [f64; 3],
    /// Rodrigues axis-angle representation of the rotation.
    pub rvec: [f64; 3],
    /// Root-mean-square reprojection error in undistorted pixels (if computed).
    pub reproj_rmse: Option<f64>,
    /// Number of refinement iterations taken (if applicable).
    pub num_iterations: Option<usize>,
    /// Whether the refinement converged (if applicable).
    pub converged: Option<bool>,
}

/// Trait for PnP solvers.
pub trait PnPSolver {
    /// Solver-specific parameters.
    type Param;

    /// Solve for camera pose given 2D-3D correspondences.
    ///
    /// # Arguments
    /// - `world` – 3-D coordinates in the world frame.
    /// - `image` – Corresponding (possibly distorted) pixel coordinates.
    /// - `camera` – Camera intrinsics and optional lens distortion.
    /// - `params` – Solver-specific parameters.
    fn solve(
        world: &[[f64; 3]],
        image: &[[f64; 2]],
        camera: &CameraModel,
        params: &Self::Param,
    ) -> Result<PnPResult, PnPError>;
}

/// Minimum number of correspondences accepted by every solver in this crate.
pub const MIN_CORRESPONDENCES: usize = 4;

/// Check the basic shape of a correspondence set.
pub(crate) fn validate_correspondences(
    world: &[[f64; 3]],
    image: &[[f64; 2]],
) -> Result<(), PnPError> {
    if world.len() != image.len() {
        return Err(PnPError::MismatchedArrayLengths {
            left_name: "world points",
            left_len: world.len(),
            right_name: "image points",
            right_len: image.len(),
        });
    }
    if world.len() < MIN_CORRESPONDENCES {
        return Err(PnPError::InsufficientCorrespondences {
            required: MIN_CORRESPONDENCES,
            actual: world.len(),
        });
    }
    let finite = world.iter().flatten().chain(image.iter().flatten()).all(|v| v.is_finite());
    if !finite {
        return Err(PnPError::DegenerateConfiguration(
            "correspondences contain non-finite coordinates".to_string(),
        ));
    }
    Ok(())
}

/// Refine a closed-form estimate (optionally) and package it as a [`PnPResult`].
///
/// Rejects poses that are not finite or that place any object point on or behind
/// the image plane.
pub(crate) fn finish_pose(
    points_world: &[[f64; 3]],
    points_norm: &[[f64; 2]],
    camera: &CameraModel,
    r: Matrix3<f64>,
    t: Vector3<f64>,
    refine: Option<&LMParams>,
) -> Result<PnPResult, PnPError> {
    let mut translation: [f64; 3] = t.into();
    let mut rvec = matrix_to_rodrigues(&mat3_to_array(&r));

    let mut num_iterations = None;
    let mut converged = None;
    if let Some(lm) = refine {
        let summary = refine_pose_lm(points_world, points_norm, &mut rvec, &mut translation, lm)?;
        num_iterations = Some(summary.iterations);
        converged = Some(summary.converged);
    }

    // the reported matrix is always the exponential of the reported vector
    let rotation = rodrigues_to_matrix(&rvec);

    let finite = rotation
        .iter()
        .flatten()
        .chain(translation.iter())
        .chain(rvec.iter())
        .all(|v| v.is_finite());
    if !finite {
        return Err(PnPError::InvalidPose(
            "pose contains non-finite values".to_string(),
        ));
    }

    let r_mat = Matrix3::from_fn(|i, j| rotation[i][j]);
    let t_vec = Vector3::from(translation);
    let Some(rmse) = rmse_px(
        points_world,
        points_norm,
        &r_mat,
        &t_vec,
        camera.intrinsics.fx,
        camera.intrinsics.fy,
    ) else {
        log::warn!("rejecting pose: object points behind the camera");
        return Err(PnPError::InvalidPose(
            "object points lie behind the camera".to_string(),
        ));
    };

    Ok(PnPResult {
        rotation,
        translation,
        rvec,
        reproj_rmse: Some(rmse),
        num_iterations,
        converged,
    })
}
