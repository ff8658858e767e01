//! Homography-based PnP for coplanar object points.
//!
//! The object points are expressed in an orthonormal frame attached to their plane,
//! the plane→image homography is estimated with a normalised DLT, and the pose is
//! read from its columns: `H ∝ K⁻¹·[r1 r2 t]` (here `K = I` on the normalized plane).

use crate::camera::CameraModel;
use crate::ops::{classify_layout, project_to_so3, PointLayout};
use crate::pnp::{
    finish_pose, validate_correspondences, NumericTol, PnPError, PnPResult, PnPSolver,
};
use crate::refine::LMParams;
use nalgebra::{DMatrix, Matrix3, Vector3};

/// Marker type representing the planar homography solver.
pub struct PlanarHomography;

impl PnPSolver for PlanarHomography {
    type Param = PlanarParams;

    fn solve(
        world: &[[f64; 3]],
        image: &[[f64; 2]],
        camera: &CameraModel,
        params: &Self::Param,
    ) -> Result<PnPResult, PnPError> {
        solve_planar(world, image, camera, params)
    }
}

/// Parameters for the planar solver.
#[derive(Debug, Clone)]
pub struct PlanarParams {
    /// Shared numeric tolerances.
    pub tol: NumericTol,
    /// Optional Levenberg–Marquardt refinement of the homography estimate.
    pub refine_lm: Option<LMParams>,
}

impl Default for PlanarParams {
    fn default() -> Self {
        Self {
            tol: NumericTol::default(),
            refine_lm: Some(LMParams::default()),
        }
    }
}

/// Solve PnP for object points lying on a common plane.
///
/// # Arguments
/// * `points_world` – Coplanar 3-D points in the world frame, `N≥4`.
/// * `points_image` – Corresponding pixel coordinates.
/// * `camera` – Camera intrinsics and optional distortion.
///
/// # Errors
/// [`PnPError::DegenerateConfiguration`] when the points are not coplanar, are
/// collinear, or do not determine a homography.
pub fn solve_planar(
    points_world: &[[f64; 3]],
    points_image: &[[f64; 2]],
    camera: &CameraModel,
    params: &PlanarParams,
) -> Result<PnPResult, PnPError> {
    validate_correspondences(points_world, points_image)?;

    let PointLayout::Planar { centroid, frame } =
        classify_layout(points_world, params.tol.planarity)?
    else {
        return Err(PnPError::DegenerateConfiguration(
            "planar solver requires coplanar object points".to_string(),
        ));
    };

    let points_norm = camera.normalize_points(points_image);

    let points_plane: Vec<[f64; 2]> = points_world
        .iter()
        .map(|p| {
            let q = frame * (Vector3::from(*p) - centroid);
            [q.x, q.y]
        })
        .collect();

    let h = estimate_homography(&points_plane, &points_norm, params.tol.eps)?;
    let (r_plane, t) = decompose_homography(&h, params.tol.eps)?;

    // X_c = R·F·(X_w − c) + t
    let r = r_plane * frame;
    let t = t - r * centroid;

    log::debug!("planar solver: homography decomposed, t = {:?}", t.as_slice());

    finish_pose(
        points_world,
        &points_norm,
        camera,
        r,
        t,
        params.refine_lm.as_ref(),
    )
}

/// Similarity transform moving the points' centroid to the origin with mean
/// distance √2 (Hartley normalisation).
fn hartley_transform(points: &[[f64; 2]], eps: f64) -> Result<Matrix3<f64>, PnPError> {
    let n = points.len() as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p[0], sy + p[1]));
    let (cx, cy) = (sx / n, sy / n);

    let mean_dist = points
        .iter()
        .map(|p| (p[0] - cx).hypot(p[1] - cy))
        .sum::<f64>()
        / n;
    if mean_dist <= eps {
        return Err(PnPError::DegenerateConfiguration(
            "points collapse to a single location".to_string(),
        ));
    }

    let s = std::f64::consts::SQRT_2 / mean_dist;
    Ok(Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0))
}

fn apply(t: &Matrix3<f64>, p: &[f64; 2]) -> [f64; 2] {
    let q = t * Vector3::new(p[0], p[1], 1.0);
    [q.x / q.z, q.y / q.z]
}

/// Direct linear transform estimate of `dst ≈ H·src`.
fn estimate_homography(
    src: &[[f64; 2]],
    dst: &[[f64; 2]],
    eps: f64,
) -> Result<Matrix3<f64>, PnPError> {
    let t_src = hartley_transform(src, eps)?;
    let t_dst = hartley_transform(dst, eps)?;

    // the SVD only yields a full V for tall matrices, pad with zero rows
    let rows = (2 * src.len()).max(9);
    let mut a = DMatrix::<f64>::zeros(rows, 9);
    for (i, (s, d)) in src.iter().zip(dst.iter()).enumerate() {
        let [x, y] = apply(&t_src, s);
        let [u, v] = apply(&t_dst, d);
        let r0 = [-x, -y, -1.0, 0.0, 0.0, 0.0, u * x, u * y, u];
        let r1 = [0.0, 0.0, 0.0, -x, -y, -1.0, v * x, v * y, v];
        for j in 0..9 {
            a[(2 * i, j)] = r0[j];
            a[(2 * i + 1, j)] = r1[j];
        }
    }

    let svd = a.svd(false, true);
    let Some(v_t) = svd.v_t else {
        return Err(PnPError::SvdFailed(
            "failed to decompose the DLT system".to_string(),
        ));
    };
    let imin = svd.singular_values.imin();
    let h = v_t.row(imin);
    let h_norm = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);

    let Some(t_dst_inv) = t_dst.try_inverse() else {
        return Err(PnPError::DegenerateConfiguration(
            "image normalisation is not invertible".to_string(),
        ));
    };
    Ok(t_dst_inv * h_norm * t_src)
}

/// Read `(R, t)` from a homography between the plane `z = 0` and the normalized image.
fn decompose_homography(
    h: &Matrix3<f64>,
    eps: f64,
) -> Result<(Matrix3<f64>, Vector3<f64>), PnPError> {
    let h1: Vector3<f64> = h.column(0).into_owned();
    let h2: Vector3<f64> = h.column(1).into_owned();
    let h3: Vector3<f64> = h.column(2).into_owned();

    let norm_sum = h1.norm() + h2.norm();
    if !norm_sum.is_finite() || norm_sum <= eps {
        return Err(PnPError::DegenerateConfiguration(
            "homography has a vanishing rotation part".to_string(),
        ));
    }

    let mut scale = 2.0 / norm_sum;
    // the plane origin must lie in front of the camera
    if h3.z * scale < 0.0 {
        scale = -scale;
    }

    let r1 = h1 * scale;
    let r2 = h2 * scale;
    let r3 = r1.cross(&r2);
    let r = project_to_so3(&Matrix3::from_columns(&[r1, r2, r3]))?;
    Ok((r, h3 * scale))
}
