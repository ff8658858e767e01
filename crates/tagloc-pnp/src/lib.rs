#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Tagloc PnP (Perspective-n-Point)
//!
//! Camera pose estimation from 2D-3D point correspondences.
//!
//! ## Key Features
//!
//! - **EPnP Algorithm**: Efficient Perspective-n-Point solver for general (non-coplanar) points
//! - **Planar Solver**: Homography-based solver for coplanar points such as fiducial markers
//! - **Distortion Handling**: Brown-Conrady lens distortion is removed before solving
//! - **Refinement**: Levenberg-Marquardt polishing of the closed-form estimates
//!
//! ## Example: marker corners
//!
//! ```rust
//! use tagloc_pnp::{solve_pnp, CameraModel, PinholeIntrinsics, PnPMethod};
//!
//! // center and corners of a 24 mm marker lying in the plane x = 0
//! let world_points = [
//!     [0.0, 0.0, 0.0],
//!     [0.0, -12.0, 12.0],
//!     [0.0, -12.0, -12.0],
//!     [0.0, 12.0, -12.0],
//!     [0.0, 12.0, 12.0],
//! ];
//!
//! // the marker seen head-on from 500 mm
//! let image_points = [
//!     [320.0, 240.0],
//!     [300.8, 220.8],
//!     [300.8, 259.2],
//!     [339.2, 259.2],
//!     [339.2, 220.8],
//! ];
//!
//! let camera = CameraModel::pinhole(PinholeIntrinsics::new(800.0, 800.0, 320.0, 240.0));
//!
//! let result = solve_pnp(&world_points, &image_points, &camera, PnPMethod::Auto)?;
//!
//! println!("Rotation: {:?}", result.rotation);
//! println!("Translation: {:?}", result.translation);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Camera intrinsics and lens distortion.
pub mod camera;

/// Efficient Perspective-n-Point (EPnP) solver implementation.
///
/// A fast and accurate method for computing camera pose from 2D-3D correspondences.
pub mod epnp;

/// Homography-based solver for coplanar object points.
pub mod planar;

/// Common data types and traits for PnP solvers.
///
/// Defines the interface and result types shared across different PnP algorithms.
pub mod pnp;

/// Levenberg–Marquardt refinement of a pose estimate.
pub mod refine;

mod ops;

pub use camera::{CameraError, CameraModel, PinholeIntrinsics, PolynomialDistortion};
pub use epnp::{EPnP, EPnPParams};
pub use ops::{matrix_to_rodrigues, rodrigues_to_matrix};
pub use planar::{PlanarHomography, PlanarParams};
pub use pnp::{NumericTol, PnPError, PnPResult, PnPSolver, MIN_CORRESPONDENCES};
pub use refine::{refine_pose_lm, LMParams, LMSummary};

use ops::{classify_layout, PointLayout};

/// Enumeration of the Perspective-n-Point algorithms available in this crate.
#[derive(Debug, Clone, Default)]
pub enum PnPMethod {
    /// Efficient PnP solver with a user-supplied parameter object.
    EPnP(EPnPParams),
    /// Efficient PnP solver with the crate's default parameters.
    EPnPDefault,
    /// Planar homography solver with a user-supplied parameter object.
    Planar(PlanarParams),
    /// Planar homography solver with the crate's default parameters.
    PlanarDefault,
    /// Pick the planar solver for coplanar points and EPnP otherwise.
    #[default]
    Auto,
}

/// Dispatch function that routes to the chosen PnP solver.
pub fn solve_pnp(
    world: &[[f64; 3]],
    image: &[[f64; 2]],
    camera: &CameraModel,
    method: PnPMethod,
) -> Result<PnPResult, PnPError> {
    match method {
        PnPMethod::EPnP(params) => EPnP::solve(world, image, camera, &params),
        PnPMethod::EPnPDefault => EPnP::solve(world, image, camera, &EPnPParams::default()),
        PnPMethod::Planar(params) => PlanarHomography::solve(world, image, camera, &params),
        PnPMethod::PlanarDefault => {
            PlanarHomography::solve(world, image, camera, &PlanarParams::default())
        }
        PnPMethod::Auto => {
            pnp::validate_correspondences(world, image)?;
            let tol = NumericTol::default();
            match classify_layout(world, tol.planarity)? {
                PointLayout::Planar { .. } => {
                    log::debug!("auto: {} coplanar points, using planar solver", world.len());
                    PlanarHomography::solve(world, image, camera, &PlanarParams::default())
                }
                PointLayout::General => {
                    log::debug!("auto: {} non-coplanar points, using EPnP", world.len());
                    EPnP::solve(world, image, camera, &EPnPParams::default())
                }
            }
        }
    }
}
