//! Integration tests for the spatial index module.
//!
//! These tests verify:
//! - Building an index from stored geo-points
//! - Radius queries against brute-force haversine distances
//! - Nearest-first ordering

use velomix_lib::{FragmentImport, FragmentKind, Geo, GeoPoint, SpatialIndex, SpatialQuery, SqliteStore};

const CENTER: GeoPoint = GeoPoint {
    lat: 49.2335,
    lng: 6.9967,
};

/// Grid of points roughly 110 m apart around `CENTER`.
fn grid() -> Vec<Geo> {
    let mut geos = Vec::new();
    let mut id = 0;
    for row in -5..=5 {
        for col in -5..=5 {
            id += 1;
            geos.push(Geo {
                id,
                point: GeoPoint::new(
                    CENTER.lat + row as f64 * 0.001,
                    CENTER.lng + col as f64 * 0.0015,
                ),
                fragments: Vec::new(),
            });
        }
    }
    geos
}

#[test]
fn radius_query_matches_brute_force() {
    let geos = grid();
    let index = SpatialIndex::build(geos.clone());
    assert_eq!(index.len(), geos.len());

    for radius in [50.0, 150.0, 280.0, 600.0] {
        let mut expected: Vec<i64> = geos
            .iter()
            .filter(|geo| CENTER.distance_to(&geo.point) <= radius)
            .map(|geo| geo.id)
            .collect();
        let mut found: Vec<i64> = index
            .within_radius(CENTER, radius)
            .into_iter()
            .map(|(geo, _)| geo.id)
            .collect();
        expected.sort_unstable();
        found.sort_unstable();
        assert_eq!(found, expected, "radius {radius}");
    }
}

#[test]
fn results_are_nearest_first() {
    let index = SpatialIndex::build(grid());
    let hits = index.within_radius(CENTER, 400.0);
    assert!(hits.len() > 1);
    assert_eq!(hits[0].0.point, CENTER);
    assert_eq!(hits[0].1, 0.0);
    assert!(hits.windows(2).all(|pair| pair[0].1 <= pair[1].1));
}

#[test]
fn invalid_points_and_radii_are_ignored() {
    let mut geos = grid();
    geos.push(Geo {
        id: 1_000,
        point: GeoPoint::new(120.0, 7.0),
        fragments: Vec::new(),
    });
    let index = SpatialIndex::build(geos);
    assert_eq!(index.len(), 121);
    assert!(index.within_radius(CENTER, 0.0).is_empty());
    assert!(SpatialIndex::build(Vec::new()).within_radius(CENTER, 500.0).is_empty());
}

#[tokio::test]
async fn index_built_from_store_knows_fragments() {
    let store = SqliteStore::open_in_memory().expect("in-memory store");
    let shared = GeoPoint::new(CENTER.lat + 0.0005, CENTER.lng);
    let fragment = |id: i64, kind: FragmentKind, points: Vec<GeoPoint>| FragmentImport {
        id,
        title: format!("fragment {id}"),
        kind,
        distance: 1200.0,
        owner: None,
        points,
        start_latlng: None,
        end_latlng: None,
    };
    store
        .import_fragments(&[
            fragment(1, FragmentKind::Route, vec![CENTER, shared]),
            fragment(2, FragmentKind::Segment, vec![shared, GeoPoint::new(49.3, 7.1)]),
        ])
        .unwrap();

    let index = SpatialIndex::build(store.load_geo().unwrap());
    assert_eq!(index.len(), 3);

    let nearby = index.find_within_radius(shared, 10.0).await.unwrap();
    assert_eq!(nearby.len(), 1);
    assert_eq!(nearby[0].fragments, vec![1, 2]);

    let around = index.find_within_radius(CENTER, 280.0).await.unwrap();
    assert_eq!(around.len(), 2);
}
