use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Side length of the marker printed for the default profile, in millimeters.
pub const DEFAULT_MARKER_SIDE_MM: f64 = 24.0;

/// Number of object points contributed by one marker: the center and four corners.
pub const POINTS_PER_MARKER: usize = 5;

/// Known 3D points of a marker in its own frame.
///
/// The points are ordered center, top-left, bottom-left, bottom-right, top-right.
/// Detected image points must follow the same order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerGeometry {
    points: [[f64; 3]; POINTS_PER_MARKER],
}

impl MarkerGeometry {
    /// Create a geometry from its center and its corners (TL, BL, BR, TR).
    pub fn new(center: [f64; 3], corners: [[f64; 3]; 4]) -> Self {
        let [tl, bl, br, tr] = corners;
        Self {
            points: [center, tl, bl, br, tr],
        }
    }

    /// Square marker of the given side lying in the plane `x = 0`, centered on the origin.
    ///
    /// The marker's left edge is at `y = -side/2` and its top edge at `z = +side/2`.
    pub fn square(side: f64) -> Self {
        let h = side / 2.0;
        Self::new(
            [0.0, 0.0, 0.0],
            [[0.0, -h, h], [0.0, -h, -h], [0.0, h, -h], [0.0, h, h]],
        )
    }

    /// All object points, center first.
    pub fn points(&self) -> &[[f64; 3]; POINTS_PER_MARKER] {
        &self.points
    }

    /// The marker center.
    pub fn center(&self) -> [f64; 3] {
        self.points[0]
    }

    /// The four corners (TL, BL, BR, TR).
    pub fn corners(&self) -> [[f64; 3]; 4] {
        [self.points[1], self.points[2], self.points[3], self.points[4]]
    }
}

impl Default for MarkerGeometry {
    fn default() -> Self {
        Self::square(DEFAULT_MARKER_SIDE_MM)
    }
}

/// Marker geometries keyed by tag ID, with a fallback for unknown IDs.
#[derive(Debug, Clone, Default)]
pub struct MarkerGeometryTable {
    fallback: MarkerGeometry,
    by_id: HashMap<u32, MarkerGeometry>,
}

impl MarkerGeometryTable {
    /// Create a table where every ID resolves to `fallback`.
    pub fn new(fallback: MarkerGeometry) -> Self {
        Self {
            fallback,
            by_id: HashMap::new(),
        }
    }

    /// Builder-style [`MarkerGeometryTable::insert`].
    pub fn with(mut self, id: u32, geometry: MarkerGeometry) -> Self {
        self.insert(id, geometry);
        self
    }

    /// Register the geometry of a tag ID, returning the geometry it replaces.
    pub fn insert(&mut self, id: u32, geometry: MarkerGeometry) -> Option<MarkerGeometry> {
        self.by_id.insert(id, geometry)
    }

    /// Geometry of the given tag, or the fallback when the ID is not registered.
    pub fn get(&self, id: u32) -> &MarkerGeometry {
        self.by_id.get(&id).unwrap_or(&self.fallback)
    }

    /// Whether a geometry was registered for the ID.
    pub fn contains(&self, id: u32) -> bool {
        self.by_id.contains_key(&id)
    }

    /// The geometry used for unregistered IDs.
    pub fn fallback(&self) -> &MarkerGeometry {
        &self.fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_marker_points() {
        let marker = MarkerGeometry::default();
        assert_eq!(
            marker.points(),
            &[
                [0.0, 0.0, 0.0],
                [0.0, -12.0, 12.0],
                [0.0, -12.0, -12.0],
                [0.0, 12.0, -12.0],
                [0.0, 12.0, 12.0],
            ]
        );
        assert_eq!(marker.center(), [0.0, 0.0, 0.0]);
        assert_eq!(marker.corners()[0], [0.0, -12.0, 12.0]);
    }

    #[test]
    fn table_falls_back_for_unknown_ids() {
        let big = MarkerGeometry::square(100.0);
        let table = MarkerGeometryTable::default().with(7, big.clone());

        assert!(table.contains(7));
        assert!(!table.contains(3));
        assert_eq!(table.get(7), &big);
        assert_eq!(table.get(3), &MarkerGeometry::default());
        assert_eq!(table.fallback(), &MarkerGeometry::default());
    }

    #[test]
    fn table_insert_replaces() {
        let mut table = MarkerGeometryTable::new(MarkerGeometry::square(10.0));
        assert!(table.insert(1, MarkerGeometry::square(20.0)).is_none());
        let old = table.insert(1, MarkerGeometry::square(30.0));
        assert_eq!(old, Some(MarkerGeometry::square(20.0)));
        assert_eq!(table.get(1).corners()[3], [0.0, 15.0, 15.0]);
    }
}
