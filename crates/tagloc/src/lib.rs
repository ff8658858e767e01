//! Camera localisation from AprilTag detections.
//!
//! - [`pnp`]: Perspective-n-Point solvers and the camera model.
//! - [`localize`]: marker geometry, correspondence building, camera pose and Euler angles.

#[doc(inline)]
pub use tagloc_pnp as pnp;

#[doc(inline)]
pub use tagloc_localize as localize;
