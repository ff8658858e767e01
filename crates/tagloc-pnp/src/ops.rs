use crate::pnp::PnPError;
use nalgebra::{Matrix3, Rotation3, SymmetricEigen, UnitQuaternion, Vector3};

/// Compute the centroid of a set of points.
pub(crate) fn compute_centroid(pts: &[[f64; 3]]) -> Vector3<f64> {
    let n = pts.len() as f64;
    let sum = pts
        .iter()
        .fold(Vector3::zeros(), |acc, p| acc + Vector3::from(*p));
    sum / n
}

/// Row-major array to matrix.
pub(crate) fn mat3_from_array(r: &[[f64; 3]; 3]) -> Matrix3<f64> {
    Matrix3::from_fn(|i, j| r[i][j])
}

/// Matrix to row-major array.
pub(crate) fn mat3_to_array(m: &Matrix3<f64>) -> [[f64; 3]; 3] {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, val) in row.iter_mut().enumerate() {
            *val = m[(i, j)];
        }
    }
    out
}

/// Convert a Rodrigues rotation vector into a rotation matrix.
///
/// The rotation angle is the norm of `rvec` and the axis its direction, i.e. the
/// matrix exponential of the skew-symmetric matrix of `rvec`.
pub fn rodrigues_to_matrix(rvec: &[f64; 3]) -> [[f64; 3]; 3] {
    let rot = Rotation3::new(Vector3::from(*rvec));
    mat3_to_array(rot.matrix())
}

/// Convert a rotation matrix into its Rodrigues rotation vector.
///
/// The logarithm map is taken through the unit quaternion, which stays well
/// defined at rotation angles of π where the antisymmetric part of the matrix vanishes.
/// The returned angle lies in `[0, π]`.
///
/// PRECONDITION: `rotation` is orthonormal with determinant +1.
pub fn matrix_to_rodrigues(rotation: &[[f64; 3]; 3]) -> [f64; 3] {
    let rot = Rotation3::from_matrix_unchecked(mat3_from_array(rotation));
    let q = UnitQuaternion::from_rotation_matrix(&rot);

    // q and -q describe the same rotation, keep the one with w >= 0
    let (w, vec) = if q.w < 0.0 {
        (-q.w, -q.imag())
    } else {
        (q.w, q.imag())
    };

    let sin_half = vec.norm();
    let omega = if sin_half > 1e-12 {
        vec * (2.0 * sin_half.atan2(w) / sin_half)
    } else {
        vec * (2.0 / w)
    };
    omega.into()
}

/// Project an arbitrary 3x3 matrix onto the closest rotation (Frobenius norm).
pub(crate) fn project_to_so3(m: &Matrix3<f64>) -> Result<Matrix3<f64>, PnPError> {
    let svd = m.svd(true, true);
    let (Some(mut u), Some(v_t)) = (svd.u, svd.v_t) else {
        return Err(PnPError::SvdFailed(
            "failed to decompose rotation candidate".to_string(),
        ));
    };

    let r = u * v_t;
    if r.determinant() >= 0.0 {
        return Ok(r);
    }

    // flip the direction associated with the smallest singular value
    let s = svd.singular_values;
    let imin = s.imin();
    for x in u.column_mut(imin).iter_mut() {
        *x = -*x;
    }
    Ok(u * v_t)
}

/// Least-squares rigid alignment `dst ≈ R * src + t` (Kabsch).
pub(crate) fn rigid_align(
    src: &[[f64; 3]],
    dst: &[Vector3<f64>],
) -> Result<(Matrix3<f64>, Vector3<f64>), PnPError> {
    let cs = compute_centroid(src);
    let cd = dst.iter().fold(Vector3::zeros(), |acc, p| acc + p) / dst.len() as f64;

    let mut h = Matrix3::<f64>::zeros();
    for (s, d) in src.iter().zip(dst.iter()) {
        h += (d - cd) * (Vector3::from(*s) - cs).transpose();
    }

    let r = project_to_so3(&h)?;
    let t = cd - r * cs;
    Ok((r, t))
}

/// Shape of a 3D point set, classified from the eigen-spectrum of its covariance.
#[derive(Debug, Clone)]
pub(crate) enum PointLayout {
    /// Points span a plane; `frame` rows are the in-plane axes followed by the normal.
    Planar {
        centroid: Vector3<f64>,
        frame: Matrix3<f64>,
    },
    /// Points span all three dimensions.
    General,
}

/// Classify a point set as planar or general, rejecting collinear and coincident sets.
pub(crate) fn classify_layout(
    points: &[[f64; 3]],
    planarity_tol: f64,
) -> Result<PointLayout, PnPError> {
    let centroid = compute_centroid(points);
    let mut cov = Matrix3::<f64>::zeros();
    for p in points {
        let d = Vector3::from(*p) - centroid;
        cov += d * d.transpose();
    }
    cov /= points.len() as f64;

    let eig = SymmetricEigen::new(cov);
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| eig.eigenvalues[b].total_cmp(&eig.eigenvalues[a]));
    let [i_max, i_mid, i_min] = order;
    let (l_max, l_mid, l_min) = (
        eig.eigenvalues[i_max],
        eig.eigenvalues[i_mid],
        eig.eigenvalues[i_min],
    );

    if l_max.is_nan() || l_max <= 0.0 {
        return Err(PnPError::DegenerateConfiguration(
            "all object points coincide".to_string(),
        ));
    }
    if l_mid <= planarity_tol * l_max {
        return Err(PnPError::DegenerateConfiguration(
            "object points are collinear".to_string(),
        ));
    }

    if l_min <= planarity_tol * l_max {
        let e1: Vector3<f64> = eig.eigenvectors.column(i_max).into_owned();
        let e2: Vector3<f64> = eig.eigenvectors.column(i_mid).into_owned();
        let n = e1.cross(&e2);
        let frame = Matrix3::from_rows(&[e1.transpose(), e2.transpose(), n.transpose()]);
        return Ok(PointLayout::Planar { centroid, frame });
    }

    Ok(PointLayout::General)
}

/// Root-mean-square reprojection error expressed in undistorted pixels.
///
/// Returns `None` when any point lies behind the camera.
pub(crate) fn rmse_px(
    points_world: &[[f64; 3]],
    points_norm: &[[f64; 2]],
    r_mat: &Matrix3<f64>,
    t_vec: &Vector3<f64>,
    fx: f64,
    fy: f64,
) -> Option<f64> {
    let mut sum_sq = 0.0;
    for (pw, uv) in points_world.iter().zip(points_norm.iter()) {
        let pc = r_mat * Vector3::from(*pw) + t_vec;
        if pc.z <= 0.0 {
            return None;
        }
        let du = fx * (pc.x / pc.z - uv[0]);
        let dv = fy * (pc.y / pc.z - uv[1]);
        sum_sq += du.mul_add(du, dv * dv);
    }
    Some((sum_sq / points_world.len() as f64).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_compute_centroid() {
        let pts = [[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]];
        let c = compute_centroid(&pts);
        assert_eq!(c, Vector3::new(4.0, 5.0, 6.0));
    }

    #[test]
    fn test_rodrigues_quarter_turn_about_x() {
        let r = rodrigues_to_matrix(&[std::f64::consts::FRAC_PI_2, 0.0, 0.0]);
        let expected = [[1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]];
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(r[i][j], expected[i][j], epsilon = 1e-12);
            }
        }
        let rvec = matrix_to_rodrigues(&r);
        assert_relative_eq!(rvec[0], std::f64::consts::FRAC_PI_2, epsilon = 1e-12);
        assert_relative_eq!(rvec[1], 0.0, epsilon = 1e-12);
        assert_relative_eq!(rvec[2], 0.0, epsilon = 1e-12);
    }

    fn assert_rodrigues_round_trip(rvec: [f64; 3]) {
        let r = rodrigues_to_matrix(&rvec);
        let back = matrix_to_rodrigues(&r);
        assert!(back.iter().all(|v| v.is_finite()), "non-finite {back:?}");
        let r_back = rodrigues_to_matrix(&back);
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(r_back[i][j], r[i][j], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_rodrigues_near_half_turn() {
        let s = std::f64::consts::FRAC_1_SQRT_2;
        let pi = std::f64::consts::PI;
        for angle in [pi, pi - 1e-15, pi - 1e-9, pi - 3e-9, pi - 1e-6, 3.0] {
            assert_rodrigues_round_trip([s * angle, 0.0, -s * angle]);
        }
        assert_rodrigues_round_trip([0.3 * pi, -0.4 * pi, (1.0f64 - 0.25).sqrt() * pi]);
    }

    #[test]
    fn test_rodrigues_exact_half_turn_matrix() {
        // half turn about (1, 0, -1) / sqrt(2)
        let r = [[0.0, 0.0, -1.0], [0.0, -1.0, 0.0], [-1.0, 0.0, 0.0]];
        let rvec = matrix_to_rodrigues(&r);
        let norm = rvec.iter().map(|v| v * v).sum::<f64>().sqrt();
        assert_relative_eq!(norm, std::f64::consts::PI, epsilon = 1e-12);
        assert_relative_eq!(rvec[0].abs(), rvec[2].abs(), epsilon = 1e-12);
        assert_relative_eq!(rvec[1], 0.0, epsilon = 1e-12);

        let back = rodrigues_to_matrix(&rvec);
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(back[i][j], r[i][j], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_rodrigues_small_angles() {
        for scale in [1e-3, 1e-8, 1e-13] {
            let rvec = [0.2 * scale, -0.5 * scale, 0.1 * scale];
            let back = matrix_to_rodrigues(&rodrigues_to_matrix(&rvec));
            for i in 0..3 {
                assert_relative_eq!(back[i], rvec[i], epsilon = 1e-15, max_relative = 1e-6);
            }
        }
    }

    #[test]
    fn test_rodrigues_zero_vector_is_identity() {
        let r = rodrigues_to_matrix(&[0.0, 0.0, 0.0]);
        assert_eq!(r, [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);
    }

    #[test]
    fn test_project_to_so3_fixes_reflection() -> Result<(), PnPError> {
        let m = Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, -1.0));
        let r = project_to_so3(&m)?;
        assert_relative_eq!(r.determinant(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(r * r.transpose(), Matrix3::identity(), epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn test_rigid_align_recovers_transform() -> Result<(), PnPError> {
        let r_gt = Rotation3::from_euler_angles(0.3, -0.2, 0.9).into_inner();
        let t_gt = Vector3::new(0.5, -1.0, 2.0);
        let src = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 2.0, 0.0],
            [0.0, 0.0, 3.0],
            [1.0, 1.0, 1.0],
        ];
        let dst: Vec<Vector3<f64>> = src
            .iter()
            .map(|p| r_gt * Vector3::from(*p) + t_gt)
            .collect();

        let (r, t) = rigid_align(&src, &dst)?;
        assert_relative_eq!(r, r_gt, epsilon = 1e-10);
        assert_relative_eq!(t, t_gt, epsilon = 1e-10);
        Ok(())
    }

    #[test]
    fn test_classify_layout() -> Result<(), PnPError> {
        let plane = [
            [0.0, 0.0, 0.0],
            [0.0, -12.0, 12.0],
            [0.0, -12.0, -12.0],
            [0.0, 12.0, -12.0],
            [0.0, 12.0, 12.0],
        ];
        match classify_layout(&plane, 1e-8)? {
            PointLayout::Planar { centroid, frame } => {
                assert_relative_eq!(centroid, Vector3::zeros(), epsilon = 1e-12);
                // the normal row is the world x axis up to sign
                assert_relative_eq!(frame[(2, 0)].abs(), 1.0, epsilon = 1e-12);
                assert_relative_eq!(frame.determinant(), 1.0, epsilon = 1e-12);
            }
            PointLayout::General => panic!("marker corners must be classified as planar"),
        }

        let cube = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ];
        assert!(matches!(classify_layout(&cube, 1e-8)?, PointLayout::General));

        let line = [[0.0, 0.0, 0.0], [1.0, 1.0, 1.0], [2.0, 2.0, 2.0], [3.0, 3.0, 3.0]];
        assert!(classify_layout(&line, 1e-8).is_err());

        let point = [[1.0, 2.0, 3.0]; 4];
        assert!(classify_layout(&point, 1e-8).is_err());
        Ok(())
    }
}
