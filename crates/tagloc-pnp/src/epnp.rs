//! Efficient Perspective-n-Point (EPnP) solver
//! Paper: https://www.tugraz.at/fileadmin/user_upload/Institute/ICG/Images/team_lepetit/publications/lepetit_ijcv08.pdf
//! Reference: https://github.com/opencv/opencv/blob/4.x/modules/calib3d/src/epnp.cpp

use crate::camera::CameraModel;
use crate::ops::{compute_centroid, rigid_align, rmse_px};
use crate::pnp::{
    finish_pose, validate_correspondences, NumericTol, PnPError, PnPResult, PnPSolver,
};
use crate::refine::LMParams;
use nalgebra::{DMatrix, DVector, Matrix3, Matrix4, SymmetricEigen, Vector3, Vector4};

/// Marker type representing the Efficient PnP algorithm.
pub struct EPnP;

impl PnPSolver for EPnP {
    type Param = EPnPParams;

    fn solve(
        world: &[[f64; 3]],
        image: &[[f64; 2]],
        camera: &CameraModel,
        params: &Self::Param,
    ) -> Result<PnPResult, PnPError> {
        solve_epnp(world, image, camera, params)
    }
}

/// Parameters controlling the EPnP solver.
#[derive(Debug, Clone)]
pub struct EPnPParams {
    /// Shared numeric tolerances.
    pub tol: NumericTol,
    /// Optional Levenberg–Marquardt refinement of the closed-form estimate.
    pub refine_lm: Option<LMParams>,
}

impl Default for EPnPParams {
    fn default() -> Self {
        Self {
            tol: NumericTol::default(),
            refine_lm: Some(LMParams::default()),
        }
    }
}

/// Null-space vectors of `MᵀM` ordered by increasing eigenvalue, each split into
/// the four 3-vectors of the control points.
type NullSpace = [[Vector3<f64>; 4]; 4];

const CP_PAIRS: [(usize, usize); 6] = [(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)];

/// Solve Perspective-n-Point (EPnP) for non-coplanar object points.
///
/// # Arguments
/// * `points_world` – 3-D coordinates in the world frame, shape *(N,3)* with `N≥4`.
/// * `points_image` – Corresponding pixel coordinates, shape *(N,2)*.
/// * `camera` – Camera intrinsics and optional distortion.
///
/// # Returns
/// A [`PnPResult`] with `R` mapping **world → camera**.
pub fn solve_epnp(
    points_world: &[[f64; 3]],
    points_image: &[[f64; 2]],
    camera: &CameraModel,
    params: &EPnPParams,
) -> Result<PnPResult, PnPError> {
    validate_correspondences(points_world, points_image)?;

    let points_norm = camera.normalize_points(points_image);

    let cw = select_control_points(points_world, params.tol.planarity)?;
    let alphas = compute_barycentric(points_world, &cw)?;

    let mtm = build_mtm(&alphas, &points_norm);
    let null4 = null_space(mtm)?;

    let l = build_l6x10(&null4);
    let rho = rho_ctrlpts(&cw);
    let rho_vec = DVector::from_column_slice(&rho);

    let betas = [
        estimate_beta_n1(&l, &rho_vec, params.tol.svd),
        estimate_beta_n2(&l, &rho_vec, params.tol.svd),
        estimate_beta_n3(&l, &rho_vec, params.tol.svd),
    ];

    let mut best: Option<(f64, Matrix3<f64>, Vector3<f64>)> = None;
    for beta in betas.into_iter().flatten() {
        let beta = gauss_newton(beta, &null4, &rho);
        let Ok((r, t)) = pose_from_betas(&beta, &null4, &alphas, points_world) else {
            continue;
        };
        let Some(err) = rmse_px(points_world, &points_norm, &r, &t, 1.0, 1.0) else {
            continue;
        };
        if best.as_ref().is_none_or(|(best_err, _, _)| err < *best_err) {
            best = Some((err, r, t));
        }
    }

    let Some((_, r, t)) = best else {
        return Err(PnPError::InvalidPose(
            "no EPnP candidate places every point in front of the camera".to_string(),
        ));
    };

    finish_pose(
        points_world,
        &points_norm,
        camera,
        r,
        t,
        params.refine_lm.as_ref(),
    )
}

/// Choose the four EPnP control points: the centroid and the centroid displaced
/// along each principal axis by the standard deviation along it.
fn select_control_points(
    points_world: &[[f64; 3]],
    planarity_tol: f64,
) -> Result<[Vector3<f64>; 4], PnPError> {
    let n = points_world.len() as f64;
    let c = compute_centroid(points_world);

    let mut cov = Matrix3::<f64>::zeros();
    for p in points_world {
        let d = Vector3::from(*p) - c;
        cov += d * d.transpose();
    }
    cov /= n;

    let eig = SymmetricEigen::new(cov);
    let l_max = eig.eigenvalues.max();
    if eig.eigenvalues.min() <= planarity_tol * l_max {
        return Err(PnPError::DegenerateConfiguration(
            "EPnP requires object points that are not coplanar".to_string(),
        ));
    }

    let mut cw = [c; 4];
    for (i, cp) in cw.iter_mut().skip(1).enumerate() {
        let axis: Vector3<f64> = eig.eigenvectors.column(i).into_owned();
        *cp = c + axis * eig.eigenvalues[i].sqrt();
    }
    Ok(cw)
}

/// Compute barycentric coordinates of world-space points with respect to the
/// 4 control points returned by `select_control_points`.
///
/// Each element is `[α0, α1, α2, α3]` such that `α0 + α1 + α2 + α3 = 1` and
/// `pw_i = Σ αj Cw_j`.
fn compute_barycentric(
    points_world: &[[f64; 3]],
    cw: &[Vector3<f64>; 4],
) -> Result<Vec<[f64; 4]>, PnPError> {
    let b = Matrix3::from_columns(&[cw[1] - cw[0], cw[2] - cw[0], cw[3] - cw[0]]);
    let b_inv = b.try_inverse().ok_or_else(|| {
        PnPError::DegenerateConfiguration("control points are not independent".to_string())
    })?;

    Ok(points_world
        .iter()
        .map(|p| {
            let lamb = b_inv * (Vector3::from(*p) - cw[0]);
            [1.0 - (lamb.x + lamb.y + lamb.z), lamb.x, lamb.y, lamb.z]
        })
        .collect())
}

/// Accumulate `MᵀM` for the 2N×12 EPnP design matrix **M** on the normalized plane.
fn build_mtm(alphas: &[[f64; 4]], points_norm: &[[f64; 2]]) -> DMatrix<f64> {
    let mut mtm = DMatrix::<f64>::zeros(12, 12);

    for (a, uv) in alphas.iter().zip(points_norm.iter()) {
        let mut row_x = [0.0; 12];
        let mut row_y = [0.0; 12];
        for (j, &alpha) in a.iter().enumerate() {
            let base = 3 * j;
            row_x[base] = alpha;
            row_x[base + 2] = -alpha * uv[0];
            row_y[base + 1] = alpha;
            row_y[base + 2] = -alpha * uv[1];
        }
        for row in [row_x, row_y] {
            for r in 0..12 {
                if row[r] == 0.0 {
                    continue;
                }
                for c in 0..12 {
                    mtm[(r, c)] += row[r] * row[c];
                }
            }
        }
    }

    mtm
}

/// Extract the four eigenvectors of `MᵀM` with the smallest eigenvalues.
fn null_space(mtm: DMatrix<f64>) -> Result<NullSpace, PnPError> {
    let eig = mtm.symmetric_eigen();
    if !eig.eigenvalues.iter().all(|v| v.is_finite()) {
        return Err(PnPError::SvdFailed(
            "eigen-decomposition of MᵀM produced non-finite values".to_string(),
        ));
    }

    let mut order: Vec<usize> = (0..12).collect();
    order.sort_by(|&a, &b| eig.eigenvalues[a].total_cmp(&eig.eigenvalues[b]));

    let mut null4 = [[Vector3::zeros(); 4]; 4];
    for (k, blocks) in null4.iter_mut().enumerate() {
        let col = eig.eigenvectors.column(order[k]);
        for (i, block) in blocks.iter_mut().enumerate() {
            *block = Vector3::new(col[3 * i], col[3 * i + 1], col[3 * i + 2]);
        }
    }
    Ok(null4)
}

/// Build the 6×10 matrix **L** relating the products `βa·βb` to control-point distances.
fn build_l6x10(null4: &NullSpace) -> [[f64; 10]; 6] {
    let dv: Vec<[Vector3<f64>; 6]> = null4
        .iter()
        .map(|v| CP_PAIRS.map(|(a, b)| v[a] - v[b]))
        .collect();

    let mut l = [[0.0; 10]; 6];
    for (j, row) in l.iter_mut().enumerate() {
        row[0] = dv[0][j].dot(&dv[0][j]);
        row[1] = 2.0 * dv[0][j].dot(&dv[1][j]);
        row[2] = dv[1][j].dot(&dv[1][j]);
        row[3] = 2.0 * dv[0][j].dot(&dv[2][j]);
        row[4] = 2.0 * dv[1][j].dot(&dv[2][j]);
        row[5] = dv[2][j].dot(&dv[2][j]);
        row[6] = 2.0 * dv[0][j].dot(&dv[3][j]);
        row[7] = 2.0 * dv[1][j].dot(&dv[3][j]);
        row[8] = 2.0 * dv[2][j].dot(&dv[3][j]);
        row[9] = dv[3][j].dot(&dv[3][j]);
    }
    l
}

/// Least-squares solve of the 6×k system made of the selected columns of **L**.
fn solve_l_subset(
    l: &[[f64; 10]; 6],
    cols: &[usize],
    rho: &DVector<f64>,
    tol_svd: f64,
) -> Option<DVector<f64>> {
    let l_sub = DMatrix::from_fn(6, cols.len(), |r, c| l[r][cols[c]]);
    let sol = l_sub.svd(true, true).solve(rho, tol_svd).ok()?;
    sol.iter().all(|v| v.is_finite()).then_some(sol)
}

/// One-dimensional null space: unknowns `[B11, B12, B13, B14]`.
fn estimate_beta_n1(l: &[[f64; 10]; 6], rho: &DVector<f64>, tol_svd: f64) -> Option<[f64; 4]> {
    let x = solve_l_subset(l, &[0, 1, 3, 6], rho, tol_svd)?;
    if x[0] < 0.0 {
        let b0 = (-x[0]).sqrt();
        Some([b0, -x[1] / b0, -x[2] / b0, -x[3] / b0])
    } else {
        let b0 = x[0].sqrt();
        (b0 > 0.0).then(|| [b0, x[1] / b0, x[2] / b0, x[3] / b0])
    }
}

/// Two-dimensional null space: unknowns `[B11, B12, B22]`.
fn estimate_beta_n2(l: &[[f64; 10]; 6], rho: &DVector<f64>, tol_svd: f64) -> Option<[f64; 4]> {
    let x = solve_l_subset(l, &[0, 1, 2], rho, tol_svd)?;
    let mut beta = [0.0; 4];
    if x[0] < 0.0 {
        beta[0] = (-x[0]).sqrt();
        beta[1] = if x[2] < 0.0 { (-x[2]).sqrt() } else { 0.0 };
    } else {
        beta[0] = x[0].sqrt();
        beta[1] = if x[2] > 0.0 { x[2].sqrt() } else { 0.0 };
    }
    if x[1] < 0.0 {
        beta[0] = -beta[0];
    }
    Some(beta)
}

/// Three-dimensional null space: unknowns `[B11, B12, B22, B13, B23]`.
fn estimate_beta_n3(l: &[[f64; 10]; 6], rho: &DVector<f64>, tol_svd: f64) -> Option<[f64; 4]> {
    let x = solve_l_subset(l, &[0, 1, 2, 3, 4], rho, tol_svd)?;
    let mut beta = [0.0; 4];
    if x[0] < 0.0 {
        beta[0] = (-x[0]).sqrt();
        beta[1] = if x[2] < 0.0 { (-x[2]).sqrt() } else { 0.0 };
    } else {
        beta[0] = x[0].sqrt();
        beta[1] = if x[2] > 0.0 { x[2].sqrt() } else { 0.0 };
    }
    if x[1] < 0.0 {
        beta[0] = -beta[0];
    }
    if beta[0] == 0.0 {
        return None;
    }
    beta[2] = x[3] / beta[0];
    Some(beta)
}

/// Gauss–Newton refinement of the betas on the control-point distance constraints.
fn gauss_newton(beta_init: [f64; 4], null4: &NullSpace, rho: &[f64; 6]) -> [f64; 4] {
    const MAX_ITERATIONS: usize = 10;
    const STOP_EPS: f64 = 1e-14;

    let mut bet = Vector4::from(beta_init);

    for _ in 0..MAX_ITERATIONS {
        let ccs = control_points_camera(&bet, null4);

        let mut jtj = Matrix4::<f64>::zeros();
        let mut jtf = Vector4::<f64>::zeros();
        for (r, &(a, b)) in CP_PAIRS.iter().enumerate() {
            let diff = ccs[a] - ccs[b];
            let f = diff.norm_squared() - rho[r];
            let j = Vector4::from_fn(|k, _| 2.0 * diff.dot(&(null4[k][a] - null4[k][b])));
            jtj += j * j.transpose();
            jtf += j * f;
        }

        let Some(delta) = jtj.cholesky().map(|c| c.solve(&jtf)) else {
            break;
        };
        bet -= delta;
        if delta.norm() < STOP_EPS {
            break;
        }
    }

    bet.into()
}

/// Control points in the camera frame for a given set of betas.
fn control_points_camera(betas: &Vector4<f64>, null4: &NullSpace) -> [Vector3<f64>; 4] {
    let mut ccs = [Vector3::zeros(); 4];
    for (k, v) in null4.iter().enumerate() {
        for (cc, vk) in ccs.iter_mut().zip(v.iter()) {
            *cc += vk * betas[k];
        }
    }
    ccs
}

/// Compute pose (R, t) from a set of betas by aligning the world points with their
/// camera-frame reconstruction.
fn pose_from_betas(
    betas: &[f64; 4],
    null4: &NullSpace,
    alphas: &[[f64; 4]],
    points_world: &[[f64; 3]],
) -> Result<(Matrix3<f64>, Vector3<f64>), PnPError> {
    let ccs = control_points_camera(&Vector4::from(*betas), null4);

    let mut pcs: Vec<Vector3<f64>> = alphas
        .iter()
        .map(|a| {
            a.iter()
                .zip(ccs.iter())
                .fold(Vector3::zeros(), |acc, (&alpha, cc)| acc + cc * alpha)
        })
        .collect();

    // the reconstruction is defined up to sign; keep the points in front
    if pcs[0].z < 0.0 {
        for p in pcs.iter_mut() {
            *p = -*p;
        }
    }

    rigid_align(points_world, &pcs)
}

/// Compute the six squared distances (ρ vector) between the 4 control points.
fn rho_ctrlpts(cw: &[Vector3<f64>; 4]) -> [f64; 6] {
    CP_PAIRS.map(|(i, j)| (cw[i] - cw[j]).norm_squared())
}
