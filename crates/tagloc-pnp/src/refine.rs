//! Levenberg–Marquardt pose refinement for PnP solutions.

use crate::pnp::{validate_correspondences, PnPError};
use nalgebra::{Matrix6, Rotation3, Vector3, Vector6};

/// Parameters controlling the LM pose refinement.
#[derive(Debug, Clone)]
pub struct LMParams {
    /// Maximum number of LM iterations.
    pub max_iters: usize,
    /// Convergence threshold on squared reprojection error decrease.
    pub eps: f64,
    /// Initial damping factor (lambda).
    pub lambda_init: f64,
    /// Multiplicative factor to increase/decrease lambda.
    pub lambda_mul: f64,
}

impl Default for LMParams {
    fn default() -> Self {
        Self {
            max_iters: 30,
            eps: 1e-20,
            lambda_init: 1e-3,
            lambda_mul: 10.0,
        }
    }
}

/// Outcome of a refinement run.
#[derive(Debug, Clone, Copy)]
pub struct LMSummary {
    /// Final RMS residual on the normalized image plane.
    pub rmse: f64,
    /// Iterations performed.
    pub iterations: usize,
    /// Whether the error decrease fell below `eps`.
    pub converged: bool,
}

/// Refine a pose (rvec, t) with Levenberg–Marquardt to minimize reprojection error
/// on the normalized image plane.
///
/// - `points_world`: World points (N,3)
/// - `points_norm`: Undistorted normalized image points (N,2)
/// - `rvec`: Initial axis-angle rotation (input/output)
/// - `t`: Initial translation (input/output)
///
/// Writes the refined `rvec` and `t` in place.
pub fn refine_pose_lm(
    points_world: &[[f64; 3]],
    points_norm: &[[f64; 2]],
    rvec: &mut [f64; 3],
    t: &mut [f64; 3],
    params: &LMParams,
) -> Result<LMSummary, PnPError> {
    validate_correspondences(points_world, points_norm)?;
    let n = points_world.len();

    // Parameters vector x = [rx, ry, rz, tx, ty, tz]
    let mut x = Vector6::new(rvec[0], rvec[1], rvec[2], t[0], t[1], t[2]);

    let project_all_in_place = |x: &Vector6<f64>, out: &mut [f64]| -> f64 {
        let r_mat = Rotation3::new(Vector3::new(x[0], x[1], x[2]));
        let t_vec = Vector3::new(x[3], x[4], x[5]);

        let mut sum_sq = 0.0;
        for (i, (pw, uv)) in points_world.iter().zip(points_norm.iter()).enumerate() {
            let pc = r_mat * Vector3::from(*pw) + t_vec;
            let du = pc.x / pc.z - uv[0];
            let dv = pc.y / pc.z - uv[1];
            out[2 * i] = du;
            out[2 * i + 1] = dv;
            sum_sq += du.mul_add(du, dv * dv);
        }
        sum_sq
    };

    let mut residuals = vec![0.0; 2 * n];
    let mut residuals_p = vec![0.0; 2 * n];
    let mut residuals_m = vec![0.0; 2 * n];
    let mut jac = vec![[0.0; 6]; 2 * n];

    let mut lambda = params.lambda_init;
    let mut err_sq_base = project_all_in_place(&x, &mut residuals);
    if !err_sq_base.is_finite() {
        return Err(PnPError::InvalidPose(
            "initial pose projects points onto the camera plane".to_string(),
        ));
    }

    let mut iters = 0usize;
    let mut converged = err_sq_base <= params.eps;

    while !converged && iters < params.max_iters {
        iters += 1;

        const H_ROT: f64 = 1e-7; // radians
        let t_scale = x[3].abs().max(x[4].abs()).max(x[5].abs()).max(1.0);
        let h_trans = 1e-7 * t_scale; // world units

        for k_idx in 0..6 {
            // Central differences
            let h = if k_idx < 3 { H_ROT } else { h_trans };
            let mut x_plus = x;
            let mut x_minus = x;
            x_plus[k_idx] += h;
            x_minus[k_idx] -= h;
            project_all_in_place(&x_plus, &mut residuals_p);
            project_all_in_place(&x_minus, &mut residuals_m);
            for (row, (rp, rm)) in jac
                .iter_mut()
                .zip(residuals_p.iter().zip(residuals_m.iter()))
            {
                row[k_idx] = (rp - rm) / (2.0 * h);
            }
        }

        // Normal equations: (J^T J + lambda I) delta = -J^T r
        let mut a = Matrix6::<f64>::zeros();
        let mut b = Vector6::<f64>::zeros();
        for (row, &r_val) in jac.iter().zip(residuals.iter()) {
            let j_row = Vector6::from_column_slice(row);
            a += j_row * j_row.transpose();
            b += j_row * r_val;
        }
        for d in 0..6 {
            a[(d, d)] += lambda;
        }

        let Some(delta) = a.lu().solve(&(-b)) else {
            lambda *= params.lambda_mul;
            continue;
        };

        let x_new = x + delta;
        let err_sq_new = project_all_in_place(&x_new, &mut residuals_p);
        if err_sq_new.is_finite() && err_sq_new < err_sq_base {
            x = x_new;
            residuals.copy_from_slice(&residuals_p);
            converged = (err_sq_base - err_sq_new) < params.eps;
            err_sq_base = err_sq_new;
            lambda = (lambda / params.lambda_mul).max(1e-12);
        } else {
            lambda *= params.lambda_mul;
            // the damping has grown so far that steps no longer move the pose
            if lambda > 1e12 {
                converged = true;
            }
        }
    }

    rvec.copy_from_slice(&x.as_slice()[0..3]);
    t.copy_from_slice(&x.as_slice()[3..6]);

    let rmse = (err_sq_base / (2.0 * n as f64)).sqrt();
    log::debug!(
        "LM refinement: rmse={rmse:.3e} (normalized) after {iters} iterations, converged={converged}"
    );

    Ok(LMSummary {
        rmse,
        iterations: iters,
        converged,
    })
}
