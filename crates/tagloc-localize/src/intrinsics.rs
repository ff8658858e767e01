use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tagloc_pnp::{CameraModel, PinholeIntrinsics, PolynomialDistortion};

use crate::error::LocalizeError;

/// File name of the calibration stored in each profile directory.
pub const PARAMS_FILE_NAME: &str = "params.json";

/// Camera calibration: a 3x3 camera matrix and lens distortion coefficients.
///
/// The distortion vector follows the OpenCV order `(k1, k2, p1, p2[, k3[, k4, k5, k6]])`
/// and must hold 4, 5 or 8 values. Instances are validated on construction and
/// are immutable afterwards.
#[derive(Debug, Clone)]
pub struct CameraIntrinsics {
    camera_matrix: [[f64; 3]; 3],
    distortion: Vec<f64>,
    model: CameraModel,
}

/// On-disk layout; every field is optional so that missing entries can be reported.
#[derive(Serialize, Deserialize)]
struct IntrinsicsFile {
    camera_matrix: Option<Vec<Vec<f64>>>,
    distortion: Option<Vec<f64>>,
}

impl CameraIntrinsics {
    /// Validate a calibration.
    ///
    /// # Errors
    ///
    /// [`LocalizeError::MalformedIntrinsics`] when the matrix is not of the form
    /// `[[fx, 0, cx], [0, fy, cy], [0, 0, 1]]` with positive focal lengths, or the
    /// distortion vector has the wrong length or non-finite values.
    pub fn new(camera_matrix: [[f64; 3]; 3], distortion: Vec<f64>) -> Result<Self, LocalizeError> {
        let intrinsics = PinholeIntrinsics::from_matrix(&camera_matrix)
            .map_err(|e| LocalizeError::MalformedIntrinsics(e.to_string()))?;
        let lens = PolynomialDistortion::from_coefficients(&distortion)
            .map_err(|e| LocalizeError::MalformedIntrinsics(e.to_string()))?;

        Ok(Self {
            camera_matrix,
            distortion,
            model: CameraModel::with_distortion(intrinsics, lens),
        })
    }

    /// The 3x3 camera matrix.
    pub fn camera_matrix(&self) -> &[[f64; 3]; 3] {
        &self.camera_matrix
    }

    /// The distortion coefficients as stored.
    pub fn distortion(&self) -> &[f64] {
        &self.distortion
    }

    /// Camera model used by the solvers.
    pub fn camera_model(&self) -> &CameraModel {
        &self.model
    }

    /// Location of the calibration of `user` below `root`: `<root>/<user>/params.json`.
    pub fn params_path(root: impl AsRef<Path>, user: &str) -> PathBuf {
        root.as_ref().join(user).join(PARAMS_FILE_NAME)
    }

    /// Parse a calibration from its JSON representation.
    pub fn from_json_str(json: &str) -> Result<Self, LocalizeError> {
        let file: IntrinsicsFile = serde_json::from_str(json)
            .map_err(|e| LocalizeError::MalformedIntrinsics(e.to_string()))?;

        let Some(rows) = file.camera_matrix else {
            return Err(LocalizeError::MalformedIntrinsics(
                "missing field `camera_matrix`".to_string(),
            ));
        };
        let Some(distortion) = file.distortion else {
            return Err(LocalizeError::MalformedIntrinsics(
                "missing field `distortion`".to_string(),
            ));
        };

        if rows.len() != 3 || rows.iter().any(|row| row.len() != 3) {
            return Err(LocalizeError::MalformedIntrinsics(format!(
                "camera matrix must be 3x3, got {} rows",
                rows.len()
            )));
        }
        let mut camera_matrix = [[0.0; 3]; 3];
        for (dst, src) in camera_matrix.iter_mut().zip(rows.iter()) {
            dst.copy_from_slice(src);
        }

        Self::new(camera_matrix, distortion)
    }

    /// JSON representation, as written by [`CameraIntrinsics::save`].
    pub fn to_json_string(&self) -> Result<String, LocalizeError> {
        let file = IntrinsicsFile {
            camera_matrix: Some(self.camera_matrix.iter().map(|r| r.to_vec()).collect()),
            distortion: Some(self.distortion.clone()),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    /// Read a calibration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LocalizeError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)?;
        let intrinsics = Self::from_json_str(&json)?;
        log::debug!("loaded camera intrinsics from {}", path.display());
        Ok(intrinsics)
    }

    /// Write the calibration, creating the parent directory if needed.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), LocalizeError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json_string()?)?;
        Ok(())
    }
}

impl PartialEq for CameraIntrinsics {
    fn eq(&self, other: &Self) -> bool {
        self.camera_matrix == other.camera_matrix && self.distortion == other.distortion
    }
}
