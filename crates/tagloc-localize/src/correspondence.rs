use serde::{Deserialize, Serialize};
use tagloc_pnp::PnPError;

use crate::error::LocalizeError;
use crate::marker::MarkerGeometryTable;

/// One tag reported by the detector.
///
/// Corners are in pixels, ordered top-left, bottom-left, bottom-right, top-right.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagDetection {
    /// Decoded tag ID.
    pub id: u32,
    /// Tag center in pixels.
    pub center: [f64; 2],
    /// Tag corners in pixels.
    pub corners: [[f64; 2]; 4],
}

impl TagDetection {
    /// Image points in marker order: center first, then the corners.
    pub fn image_points(&self) -> [[f64; 2]; 5] {
        let [tl, bl, br, tr] = self.corners;
        [self.center, tl, bl, br, tr]
    }
}

/// Index-aligned object and image points.
#[derive(Debug, Clone, PartialEq)]
pub struct Correspondences {
    object_points: Vec<[f64; 3]>,
    image_points: Vec<[f64; 2]>,
}

impl Correspondences {
    /// Pair object points with image points.
    ///
    /// # Errors
    ///
    /// Fails with [`LocalizeError::SolveFailure`] when the two sequences differ in length.
    pub fn new(
        object_points: Vec<[f64; 3]>,
        image_points: Vec<[f64; 2]>,
    ) -> Result<Self, LocalizeError> {
        if object_points.len() != image_points.len() {
            return Err(PnPError::MismatchedArrayLengths {
                left_name: "object points",
                left_len: object_points.len(),
                right_name: "image points",
                right_len: image_points.len(),
            }
            .into());
        }
        Ok(Self {
            object_points,
            image_points,
        })
    }

    /// 3D points in the marker frame.
    pub fn object_points(&self) -> &[[f64; 3]] {
        &self.object_points
    }

    /// 2D points in pixels.
    pub fn image_points(&self) -> &[[f64; 2]] {
        &self.image_points
    }

    /// Number of correspondences.
    pub fn len(&self) -> usize {
        self.object_points.len()
    }

    /// Whether there are no correspondences.
    pub fn is_empty(&self) -> bool {
        self.object_points.is_empty()
    }
}

/// Builds solver input from detector output using known marker geometry.
#[derive(Debug, Clone, Default)]
pub struct CorrespondenceBuilder {
    geometry: MarkerGeometryTable,
}

impl CorrespondenceBuilder {
    /// Create a builder resolving marker geometry through `geometry`.
    pub fn new(geometry: MarkerGeometryTable) -> Self {
        Self { geometry }
    }

    /// The geometry lookup used by the builder.
    pub fn geometry(&self) -> &MarkerGeometryTable {
        &self.geometry
    }

    /// Build the correspondences of a frame that shows exactly one tag.
    ///
    /// # Errors
    ///
    /// - [`LocalizeError::NoDetection`] when `detections` is empty.
    /// - [`LocalizeError::UnsupportedMultiTag`] when more than one tag is present.
    pub fn build(&self, detections: &[TagDetection]) -> Result<Correspondences, LocalizeError> {
        let detection = match detections {
            [] => return Err(LocalizeError::NoDetection),
            [detection] => detection,
            _ => return Err(LocalizeError::UnsupportedMultiTag(detections.len())),
        };

        let marker = self.geometry.get(detection.id);
        log::debug!(
            "tag {}: using {} geometry",
            detection.id,
            if self.geometry.contains(detection.id) {
                "registered"
            } else {
                "fallback"
            }
        );

        Correspondences::new(
            marker.points().to_vec(),
            detection.image_points().to_vec(),
        )
    }
}
