use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use tagloc_pnp::{solve_pnp, CameraModel, PnPMethod, PnPResult};

use crate::correspondence::Correspondences;
use crate::error::LocalizeError;
use crate::euler::{euler_zyx_to_rotation, rotation_to_euler_zyx, EulerZyx};
use crate::intrinsics::CameraIntrinsics;

/// Camera pose in the marker (world) frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Camera position in the world frame.
    pub position: [f64; 3],
    /// Camera orientation in the world frame.
    pub orientation: EulerZyx,
    /// Camera-to-world rotation; its columns are the camera axes in the world frame.
    pub rotation: [[f64; 3]; 3],
    /// Root-mean-square reprojection error of the solve, in pixels.
    pub reprojection_rmse: Option<f64>,
}

impl Pose {
    /// Pose of a camera at `position` with camera-to-world rotation `rotation`.
    pub fn new(position: [f64; 3], rotation: [[f64; 3]; 3]) -> Self {
        Self {
            position,
            orientation: rotation_to_euler_zyx(&rotation),
            rotation,
            reprojection_rmse: None,
        }
    }

    /// Invert a solver result (`X_c = R·X_w + t`) into the pose of the camera.
    ///
    /// The camera rotation is `Rᵀ` and its position `−Rᵀ·t`.
    pub fn from_pnp(result: &PnPResult) -> Self {
        let (rotation, position) = invert_extrinsics(&result.rotation, &result.translation);
        Self {
            reprojection_rmse: result.reproj_rmse,
            ..Self::new(position, rotation)
        }
    }

    /// Pixel coordinates of world points as seen from this pose.
    ///
    /// Returns `None` if any point is on or behind the image plane.
    pub fn project_points(
        &self,
        points: &[[f64; 3]],
        camera: &CameraModel,
    ) -> Option<Vec<[f64; 2]>> {
        let r_wc = mat3(&self.rotation).transpose();
        let center = Vector3::from(self.position);
        points
            .iter()
            .map(|p| {
                let pc: [f64; 3] = (r_wc * (Vector3::from(*p) - center)).into();
                camera.project_point(&pc)
            })
            .collect()
    }

    /// Homogeneous camera-to-world transform `[R | t; 0 0 0 1]` built from the
    /// orientation angles and the position.
    pub fn extrinsic_matrix(&self) -> [[f64; 4]; 4] {
        let EulerZyx { yaw, pitch, roll } = self.orientation;
        let r = euler_zyx_to_rotation(yaw, pitch, roll);
        let p = self.position;
        [
            [r[0][0], r[0][1], r[0][2], p[0]],
            [r[1][0], r[1][1], r[1][2], p[1]],
            [r[2][0], r[2][1], r[2][2], p[2]],
            [0.0, 0.0, 0.0, 1.0],
        ]
    }
}

fn mat3(m: &[[f64; 3]; 3]) -> Matrix3<f64> {
    Matrix3::from_fn(|i, j| m[i][j])
}

fn rows(m: &Matrix3<f64>) -> [[f64; 3]; 3] {
    std::array::from_fn(|i| std::array::from_fn(|j| m[(i, j)]))
}

/// Swap the direction of a rigid transform: returns `(Rᵀ, −Rᵀ·t)`.
pub fn invert_extrinsics(rotation: &[[f64; 3]; 3], translation: &[f64; 3]) -> ([[f64; 3]; 3], [f64; 3]) {
    let rt = mat3(rotation).transpose();
    let position = -(rt * Vector3::from(*translation));
    (rows(&rt), position.into())
}

/// Recovers the camera pose from marker correspondences.
#[derive(Debug, Clone)]
pub struct PoseSolver {
    camera: CameraModel,
    method: PnPMethod,
}

impl PoseSolver {
    /// Create a solver for a calibrated camera.
    pub fn new(intrinsics: &CameraIntrinsics) -> Self {
        Self::from_camera(intrinsics.camera_model().clone())
    }

    /// Create a solver from a camera model.
    pub fn from_camera(camera: CameraModel) -> Self {
        Self {
            camera,
            method: PnPMethod::Auto,
        }
    }

    /// Use a specific PnP method instead of picking one from the point layout.
    pub fn with_method(mut self, method: PnPMethod) -> Self {
        self.method = method;
        self
    }

    /// The camera model the solver projects through.
    pub fn camera(&self) -> &CameraModel {
        &self.camera
    }

    /// Solve the pose of the camera from built correspondences.
    pub fn solve(&self, correspondences: &Correspondences) -> Result<Pose, LocalizeError> {
        self.solve_points(
            correspondences.object_points(),
            correspondences.image_points(),
        )
    }

    /// Solve the pose of the camera from raw object and image points.
    ///
    /// # Errors
    ///
    /// [`LocalizeError::SolveFailure`] when fewer than 4 points are given, the
    /// lengths differ, the points are degenerate, or no valid pose is found.
    pub fn solve_points(
        &self,
        object_points: &[[f64; 3]],
        image_points: &[[f64; 2]],
    ) -> Result<Pose, LocalizeError> {
        let result = solve_pnp(
            object_points,
            image_points,
            &self.camera,
            self.method.clone(),
        )?;
        let pose = Pose::from_pnp(&result);

        log::debug!(
            "camera at {:?}, yaw/pitch/roll {:?}, rmse {:?}px",
            pose.position,
            pose.orientation.to_array(),
            pose.reprojection_rmse
        );
        Ok(pose)
    }
}

/// Solve the camera pose in one call.
pub fn solve_pose(
    object_points: &[[f64; 3]],
    image_points: &[[f64; 2]],
    intrinsics: &CameraIntrinsics,
) -> Result<Pose, LocalizeError> {
    PoseSolver::new(intrinsics).solve_points(object_points, image_points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correspondence::{CorrespondenceBuilder, TagDetection};
    use crate::marker::MarkerGeometry;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;
    use tagloc_pnp::PnPError;

    const IDENTITY_K: [[f64; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

    fn observe(
        points: &[[f64; 3]],
        rotation: &[[f64; 3]; 3],
        position: &[f64; 3],
        camera: &CameraModel,
    ) -> Vec<[f64; 2]> {
        Pose::new(*position, *rotation)
            .project_points(points, camera)
            .expect("marker must be in front of the camera")
    }

    #[test]
    fn invert_extrinsics_round_trip() {
        let r = euler_zyx_to_rotation(0.3, -0.2, 0.9);
        let t = [1.0, -2.0, 3.0];
        let (rt, p) = invert_extrinsics(&r, &t);
        let (r2, t2) = invert_extrinsics(&rt, &p);
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(r2[i][j], r[i][j], epsilon = 1e-15);
            }
            assert_relative_eq!(t2[i], t[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn camera_facing_marker_along_x() -> Result<(), LocalizeError> {
        // optical frame: x right = world +Y, y down = world -Z, z forward = world -X
        let rotation = [[0.0, 0.0, -1.0], [1.0, 0.0, 0.0], [0.0, -1.0, 0.0]];
        let position = [1000.0, 0.0, 0.0];

        let intrinsics = CameraIntrinsics::new(IDENTITY_K, vec![0.0; 5])?;
        let marker = MarkerGeometry::default();
        let image = observe(marker.points(), &rotation, &position, intrinsics.camera_model());

        let pose = solve_pose(marker.points(), &image, &intrinsics)?;

        assert_relative_eq!(pose.position[0], 1000.0, epsilon = 1e-6);
        assert_relative_eq!(pose.position[1], 0.0, epsilon = 1e-6);
        assert_relative_eq!(pose.position[2], 0.0, epsilon = 1e-6);
        assert_relative_eq!(pose.orientation.yaw, FRAC_PI_2, epsilon = 1e-9);
        assert_relative_eq!(pose.orientation.pitch, 0.0, epsilon = 1e-9);
        assert_relative_eq!(pose.orientation.roll, -FRAC_PI_2, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn invert_extrinsics_matches_known_pose() {
        // world->camera of a camera at (1000, 0, 0) facing the marker
        let r = [[0.0, 1.0, 0.0], [0.0, 0.0, -1.0], [-1.0, 0.0, 0.0]];
        let t = [0.0, 0.0, 1000.0];
        let (rt, p) = invert_extrinsics(&r, &t);
        assert_eq!(rt, [[0.0, 0.0, -1.0], [1.0, 0.0, 0.0], [0.0, -1.0, 0.0]]);
        assert_eq!(p, [1000.0, 0.0, 0.0]);
    }

    #[test]
    fn project_points_rejects_points_behind_camera() -> Result<(), LocalizeError> {
        let rotation = [[0.0, 0.0, -1.0], [1.0, 0.0, 0.0], [0.0, -1.0, 0.0]];
        let pose = Pose::new([1000.0, 0.0, 0.0], rotation);
        let intrinsics = CameraIntrinsics::new(IDENTITY_K, vec![0.0; 5])?;
        let camera = intrinsics.camera_model();

        let image = pose
            .project_points(&[[0.0, 0.0, 0.0], [0.0, 10.0, 0.0]], camera)
            .expect("marker points are in front of the camera");
        assert_relative_eq!(image[0][0], 0.0, epsilon = 1e-15);
        assert_relative_eq!(image[0][1], 0.0, epsilon = 1e-15);
        assert_relative_eq!(image[1][0], 0.01, epsilon = 1e-15);
        assert_relative_eq!(image[1][1], 0.0, epsilon = 1e-15);
        assert!(pose.project_points(&[[2000.0, 0.0, 0.0]], camera).is_none());
        Ok(())
    }

    #[test]
    fn camera_rolled_half_turn_facing_marker() -> Result<(), LocalizeError> {
        // world->camera is a half turn about (1, 0, -1) / sqrt(2); the matrix is symmetric
        let rotation = [[0.0, 0.0, -1.0], [0.0, -1.0, 0.0], [-1.0, 0.0, 0.0]];
        let position = [1000.0, 0.0, 0.0];

        let intrinsics = CameraIntrinsics::new(
            [[1000.0, 0.0, 640.0], [0.0, 1000.0, 360.0], [0.0, 0.0, 1.0]],
            vec![0.0; 5],
        )?;
        let marker = MarkerGeometry::default();
        let image = observe(marker.points(), &rotation, &position, intrinsics.camera_model());

        let pose = solve_pose(marker.points(), &image, &intrinsics)?;

        for i in 0..3 {
            assert_relative_eq!(pose.position[i], position[i], epsilon = 1e-6);
            for j in 0..3 {
                assert_relative_eq!(pose.rotation[i][j], rotation[i][j], epsilon = 1e-9);
            }
        }
        assert!(pose.reprojection_rmse.is_some_and(|e| e < 1e-6));
        Ok(())
    }

    #[test]
    fn recovers_oblique_pose_with_distortion() -> Result<(), LocalizeError> {
        let truth = EulerZyx::new(FRAC_PI_2 + 0.2, 0.1, -FRAC_PI_2 + 0.15);
        let rotation = truth.to_rotation();
        let position = [900.0, 150.0, -120.0];

        let intrinsics = CameraIntrinsics::new(
            [[1400.0, 0.0, 960.0], [0.0, 1400.0, 540.0], [0.0, 0.0, 1.0]],
            vec![-0.12, 0.03, 4e-4, -2e-4, 0.0],
        )?;
        let detection = {
            let image = observe(
                MarkerGeometry::default().points(),
                &rotation,
                &position,
                intrinsics.camera_model(),
            );
            TagDetection {
                id: 0,
                center: image[0],
                corners: [image[1], image[2], image[3], image[4]],
            }
        };

        let corr = CorrespondenceBuilder::default().build(&[detection])?;
        let pose = PoseSolver::new(&intrinsics).solve(&corr)?;

        for i in 0..3 {
            assert_relative_eq!(pose.position[i], position[i], epsilon = 1e-3);
        }
        assert_relative_eq!(pose.orientation.yaw, truth.yaw, epsilon = 1e-6);
        assert_relative_eq!(pose.orientation.pitch, truth.pitch, epsilon = 1e-6);
        assert_relative_eq!(pose.orientation.roll, truth.roll, epsilon = 1e-6);
        assert!(pose.reprojection_rmse.is_some_and(|e| e < 1e-6));
        Ok(())
    }

    #[test]
    fn three_points_fail_to_solve() -> Result<(), LocalizeError> {
        let intrinsics = CameraIntrinsics::new(IDENTITY_K, vec![0.0; 4])?;
        let object = [[0.0, 0.0, 0.0], [0.0, -12.0, 12.0], [0.0, -12.0, -12.0]];
        let image = [[0.0, 0.0], [-0.012, -0.012], [-0.012, 0.012]];
        assert!(matches!(
            solve_pose(&object, &image, &intrinsics),
            Err(LocalizeError::SolveFailure(
                PnPError::InsufficientCorrespondences { actual: 3, .. }
            ))
        ));
        Ok(())
    }

    #[test]
    fn collapsed_image_fails_to_solve() -> Result<(), LocalizeError> {
        let intrinsics = CameraIntrinsics::new(IDENTITY_K, vec![0.0; 4])?;
        let marker = MarkerGeometry::default();
        let image = [[0.5, 0.5]; 5];
        assert!(matches!(
            solve_pose(marker.points(), &image, &intrinsics),
            Err(LocalizeError::SolveFailure(_))
        ));
        Ok(())
    }

    #[test]
    fn extrinsic_matrix_layout() {
        let orientation = EulerZyx::new(0.4, -0.3, 0.2);
        let pose = Pose {
            position: [10.0, 20.0, 30.0],
            orientation,
            rotation: orientation.to_rotation(),
            reprojection_rmse: None,
        };
        let m = pose.extrinsic_matrix();
        let r = orientation.to_rotation();

        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(m[i][j], r[i][j]);
            }
            assert_eq!(m[i][3], pose.position[i]);
        }
        assert_eq!(m[3], [0.0, 0.0, 0.0, 1.0]);
    }
}
