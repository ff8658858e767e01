//! Camera models and distortion handling for PnP solvers.
use thiserror::Error;

/// Error types for camera operations.
#[derive(Debug, Error)]
pub enum CameraError {
    /// Invalid camera intrinsics matrix
    #[error("Invalid camera intrinsics matrix: {0}")]
    InvalidIntrinsics(String),

    /// Invalid distortion parameters
    #[error("Invalid distortion parameters: {0}")]
    InvalidDistortion(String),
}

/// Result type for camera operations.
pub type CameraResult<T> = Result<T, CameraError>;

/// Represents the intrinsic parameters of a pinhole camera.
#[derive(Debug, Clone, PartialEq)]
pub struct PinholeIntrinsics {
    /// Focal length in x direction
    pub fx: f64,
    /// Focal length in y direction
    pub fy: f64,
    /// Principal point x coordinate
    pub cx: f64,
    /// Principal point y coordinate
    pub cy: f64,
}

impl PinholeIntrinsics {
    /// Create camera intrinsics from focal lengths and principal point.
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// Create camera intrinsics from a 3x3 intrinsics matrix.
    pub fn from_matrix(k: &[[f64; 3]; 3]) -> CameraResult<Self> {
        if !k.iter().flatten().all(|v| v.is_finite()) {
            return Err(CameraError::InvalidIntrinsics(
                "intrinsics matrix contains non-finite values".to_string(),
            ));
        }

        if k[0][1] != 0.0 || k[1][0] != 0.0 || k[2][0] != 0.0 || k[2][1] != 0.0 || k[2][2] != 1.0
        {
            return Err(CameraError::InvalidIntrinsics(
                "Intrinsics matrix must have form [[fx, 0, cx], [0, fy, cy], [0, 0, 1]]"
                    .to_string(),
            ));
        }

        if k[0][0] <= 0.0 || k[1][1] <= 0.0 {
            return Err(CameraError::InvalidIntrinsics(format!(
                "focal lengths must be positive, got fx={} fy={}",
                k[0][0], k[1][1]
            )));
        }

        Ok(Self {
            fx: k[0][0],
            fy: k[1][1],
            cx: k[0][2],
            cy: k[1][2],
        })
    }

    /// Convert to 3x3 intrinsics matrix.
    pub fn to_matrix(&self) -> [[f64; 3]; 3] {
        [
            [self.fx, 0.0, self.cx],
            [0.0, self.fy, self.cy],
            [0.0, 0.0, 1.0],
        ]
    }
}

/// Represents polynomial distortion parameters using the Brown-Conrady model.
#[derive(Debug, Clone, Default, PartialEq)]
#[allow(missing_docs)]
pub struct PolynomialDistortion {
    /// Radial distortion coefficients
    pub k1: f64,
    pub k2: f64,
    pub k3: f64,
    pub k4: f64,
    pub k5: f64,
    pub k6: f64,
    /// Tangential distortion coefficients
    pub p1: f64,
    pub p2: f64,
}

impl PolynomialDistortion {
    /// Create distortion parameters with all coefficients set to zero (no distortion).
    pub fn none() -> Self {
        Self::default()
    }

    /// Create distortion parameters with only first two radial coefficients.
    pub fn radial(k1: f64, k2: f64) -> Self {
        Self {
            k1,
            k2,
            ..Self::default()
        }
    }

    /// Create distortion parameters with radial and tangential coefficients.
    pub fn radial_tangential(k1: f64, k2: f64, p1: f64, p2: f64) -> Self {
        Self {
            k1,
            k2,
            p1,
            p2,
            ..Self::default()
        }
    }

    /// Create distortion parameters from an OpenCV-ordered coefficient vector.
    ///
    /// The accepted layouts are `(k1, k2, p1, p2)`, `(k1, k2, p1, p2, k3)` and
    /// `(k1, k2, p1, p2, k3, k4, k5, k6)`.
    pub fn from_coefficients(coeffs: &[f64]) -> CameraResult<Self> {
        if !coeffs.iter().all(|c| c.is_finite()) {
            return Err(CameraError::InvalidDistortion(
                "distortion coefficients contain non-finite values".to_string(),
            ));
        }

        match *coeffs {
            [k1, k2, p1, p2] => Ok(Self::radial_tangential(k1, k2, p1, p2)),
            [k1, k2, p1, p2, k3] => Ok(Self {
                k3,
                ..Self::radial_tangential(k1, k2, p1, p2)
            }),
            [k1, k2, p1, p2, k3, k4, k5, k6] => Ok(Self {
                k1,
                k2,
                k3,
                k4,
                k5,
                k6,
                p1,
                p2,
            }),
            _ => Err(CameraError::InvalidDistortion(format!(
                "expected 4, 5 or 8 coefficients, got {}",
                coeffs.len()
            ))),
        }
    }

    /// Check if there is any distortion.
    pub fn has_distortion(&self) -> bool {
        [
            self.k1, self.k2, self.k3, self.k4, self.k5, self.k6, self.p1, self.p2,
        ]
        .iter()
        .any(|&c| c != 0.0)
    }

    /// Apply the distortion to a point on the normalized image plane.
    fn distort_normalized(&self, x: f64, y: f64) -> (f64, f64) {
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;

        let kr = (1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6)
            / (1.0 + self.k4 * r2 + self.k5 * r4 + self.k6 * r6);

        let xd = x * kr + 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let yd = y * kr + self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        (xd, yd)
    }

    /// Invert the distortion on the normalized image plane with fixed-point iterations.
    fn undistort_normalized(&self, xd: f64, yd: f64) -> (f64, f64) {
        const MAX_ITERATIONS: usize = 20;
        const EPSILON: f64 = 1e-14;

        let mut x = xd;
        let mut y = yd;

        for _ in 0..MAX_ITERATIONS {
            let r2 = x * x + y * y;
            let r4 = r2 * r2;
            let r6 = r4 * r2;

            let icdist = (1.0 + self.k4 * r2 + self.k5 * r4 + self.k6 * r6)
                / (1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6);
            let dx = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
            let dy = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;

            let x_new = (xd - dx) * icdist;
            let y_new = (yd - dy) * icdist;

            let converged = (x_new - x).abs() < EPSILON && (y_new - y).abs() < EPSILON;
            x = x_new;
            y = y_new;
            if converged {
                break;
            }
        }

        (x, y)
    }
}

/// A complete camera model with intrinsics and optional distortion.
#[derive(Debug, Clone)]
pub struct CameraModel {
    /// Camera intrinsics
    pub intrinsics: PinholeIntrinsics,
    /// Distortion parameters (None for no distortion)
    pub distortion: Option<PolynomialDistortion>,
}

impl CameraModel {
    /// Create a camera model without distortion.
    pub fn pinhole(intrinsics: PinholeIntrinsics) -> Self {
        Self {
            intrinsics,
            distortion: None,
        }
    }

    /// Create a camera model with distortion.
    pub fn with_distortion(intrinsics: PinholeIntrinsics, distortion: PolynomialDistortion) -> Self {
        Self {
            intrinsics,
            distortion: Some(distortion),
        }
    }

    /// Check if the camera has distortion.
    pub fn has_distortion(&self) -> bool {
        self.distortion
            .as_ref()
            .is_some_and(|d| d.has_distortion())
    }

    /// Get the intrinsics matrix.
    pub fn intrinsics_matrix(&self) -> [[f64; 3]; 3] {
        self.intrinsics.to_matrix()
    }

    /// Map a distorted pixel to undistorted normalized image-plane coordinates.
    pub fn normalize_point(&self, u: f64, v: f64) -> [f64; 2] {
        let PinholeIntrinsics { fx, fy, cx, cy } = self.intrinsics;
        let xd = (u - cx) / fx;
        let yd = (v - cy) / fy;
        match &self.distortion {
            Some(d) if d.has_distortion() => {
                let (x, y) = d.undistort_normalized(xd, yd);
                [x, y]
            }
            _ => [xd, yd],
        }
    }

    /// Map a set of distorted pixels to undistorted normalized coordinates.
    pub fn normalize_points(&self, points: &[[f64; 2]]) -> Vec<[f64; 2]> {
        points
            .iter()
            .map(|&[u, v]| self.normalize_point(u, v))
            .collect()
    }

    /// Undistort a pixel, returning the pixel an ideal pinhole camera would observe.
    pub fn undistort_point(&self, u: f64, v: f64) -> (f64, f64) {
        let [x, y] = self.normalize_point(u, v);
        (
            self.intrinsics.fx * x + self.intrinsics.cx,
            self.intrinsics.fy * y + self.intrinsics.cy,
        )
    }

    /// Undistort multiple points.
    pub fn undistort_points(&self, points: &[[f64; 2]]) -> Vec<[f64; 2]> {
        points
            .iter()
            .map(|&[u, v]| {
                let (x, y) = self.undistort_point(u, v);
                [x, y]
            })
            .collect()
    }

    /// Apply distortion to an ideal pinhole pixel.
    pub fn distort_point(&self, u: f64, v: f64) -> (f64, f64) {
        let PinholeIntrinsics { fx, fy, cx, cy } = self.intrinsics;
        match &self.distortion {
            Some(d) => {
                let (xd, yd) = d.distort_normalized((u - cx) / fx, (v - cy) / fy);
                (fx * xd + cx, fy * yd + cy)
            }
            None => (u, v),
        }
    }

    /// Project a camera-frame point to a (distorted) pixel.
    ///
    /// Returns `None` for points on or behind the image plane.
    pub fn project_point(&self, point_camera: &[f64; 3]) -> Option<[f64; 2]> {
        let [x, y, z] = *point_camera;
        if z <= 0.0 {
            return None;
        }
        let (xn, yn) = match &self.distortion {
            Some(d) => d.distort_normalized(x / z, y / z),
            None => (x / z, y / z),
        };
        Some([
            self.intrinsics.fx * xn + self.intrinsics.cx,
            self.intrinsics.fy * yn + self.intrinsics.cy,
        ])
    }
}

impl Default for CameraModel {
    fn default() -> Self {
        Self::pinhole(PinholeIntrinsics::new(1000.0, 1000.0, 640.0, 480.0))
    }
}
