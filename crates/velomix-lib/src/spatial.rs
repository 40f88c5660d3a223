//! KD-tree spatial index over stored geo-points.
//!
//! Points are indexed by their earth-centred cartesian coordinates on the mean
//! sphere, so a great-circle radius maps onto a straight chord radius and can
//! be answered by a plain euclidean range query. Results are re-checked with
//! the haversine distance before they are returned.
//!
//! # Example
//!
//! ```no_run
//! use velomix_lib::{GeoPoint, SpatialIndex, SqliteStore};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteStore::open(std::path::Path::new("velomix.db"))?;
//! let index = SpatialIndex::build(store.load_geo()?);
//! let nearby = index.within_radius(GeoPoint::new(49.2354, 6.9969), 280.0);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use kiddo::float::kdtree::KdTree;
use kiddo::SquaredEuclidean;
use tracing::info;

use crate::error::Result;
use crate::geo::{chord_length, Geo, GeoPoint};
use crate::services::SpatialQuery;

/// KD-tree bucket size (kiddo default).
const BUCKET_SIZE: usize = 32;

/// In-memory radius index over geo-points.
pub struct SpatialIndex {
    /// Items are indices into `geos`.
    tree: KdTree<f64, usize, 3, BUCKET_SIZE, u32>,
    geos: Vec<Geo>,
}

impl SpatialIndex {
    /// Build an index over `geos`. Points outside the WGS84 range are skipped.
    pub fn build(geos: Vec<Geo>) -> Self {
        let total = geos.len();
        let geos: Vec<Geo> = geos.into_iter().filter(|geo| geo.point.is_valid()).collect();

        let mut tree: KdTree<f64, usize, 3, BUCKET_SIZE, u32> = KdTree::new();
        for (index, geo) in geos.iter().enumerate() {
            tree.add(&geo.point.to_cartesian(), index);
        }

        info!(
            indexed = geos.len(),
            skipped = total - geos.len(),
            "built spatial index"
        );
        Self { tree, geos }
    }

    pub fn len(&self) -> usize {
        self.geos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.geos.is_empty()
    }

    /// Geo-points within `radius` meters of `center`, nearest first, paired
    /// with their great-circle distance.
    pub fn within_radius(&self, center: GeoPoint, radius: f64) -> Vec<(&Geo, f64)> {
        if radius <= 0.0 || self.geos.is_empty() {
            return Vec::new();
        }

        let chord = chord_length(radius);
        let candidates = self
            .tree
            .within::<SquaredEuclidean>(&center.to_cartesian(), chord * chord);

        let mut neighbours: Vec<(&Geo, f64)> = candidates
            .into_iter()
            .filter_map(|neighbour| {
                let geo = &self.geos[neighbour.item];
                let distance = center.distance_to(&geo.point);
                (distance <= radius).then_some((geo, distance))
            })
            .collect();

        neighbours.sort_by(|a, b| a.1.total_cmp(&b.1));
        neighbours
    }
}

#[async_trait]
impl SpatialQuery for SpatialIndex {
    async fn find_within_radius(&self, center: GeoPoint, radius_m: f64) -> Result<Vec<Geo>> {
        Ok(self
            .within_radius(center, radius_m)
            .into_iter()
            .map(|(geo, _)| geo.clone())
            .collect())
    }
}
