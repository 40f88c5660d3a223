#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use velomix_lib::{
    Error, FragmentCriteria, FragmentImport, FragmentKind, FragmentStore, GeoPoint, Result,
    RoutedPath, RoutingService, SqliteStore, VisitedGeography,
};

/// Saarbrücken, St. Johanner Markt.
pub const START: GeoPoint = GeoPoint {
    lat: 49.2335,
    lng: 6.9967,
};

pub const RIDER: &str = "rider-42";

/// Small closed loop of `distance` meters whose points stay within roughly
/// 100 m of `START`.
pub fn loop_fragment(id: i64, kind: FragmentKind, distance: f64) -> FragmentImport {
    let step = 0.0002 * (1 + id % 4) as f64;
    let points = vec![
        GeoPoint::new(START.lat + step, START.lng),
        GeoPoint::new(START.lat + step, START.lng + step),
        GeoPoint::new(START.lat, START.lng + step),
        GeoPoint::new(START.lat + step, START.lng),
    ];
    FragmentImport {
        id,
        title: format!("{kind} {id}"),
        kind,
        distance,
        owner: (kind == FragmentKind::Activity).then(|| RIDER.to_string()),
        points,
        start_latlng: None,
        end_latlng: None,
    }
}

/// Four explorative fragments plus three activities of [`RIDER`].
pub fn neighbourhood() -> Vec<FragmentImport> {
    vec![
        loop_fragment(1, FragmentKind::Route, 1500.0),
        loop_fragment(2, FragmentKind::Route, 1500.0),
        loop_fragment(3, FragmentKind::Segment, 1500.0),
        loop_fragment(4, FragmentKind::Segment, 1500.0),
        loop_fragment(5, FragmentKind::Activity, 1600.0),
        loop_fragment(6, FragmentKind::Activity, 1600.0),
        loop_fragment(7, FragmentKind::Activity, 1600.0),
    ]
}

pub fn seeded_store(fragments: &[FragmentImport]) -> Arc<SqliteStore> {
    let store = SqliteStore::open_in_memory().expect("in-memory store");
    store.import_fragments(fragments).expect("import fixtures");
    Arc::new(store)
}

/// Routing service answering every request with a fixed distance and the
/// submitted waypoints as geometry.
pub struct FakeRouting {
    distance: f64,
    failures: usize,
    calls: AtomicUsize,
}

impl FakeRouting {
    pub fn new(distance: f64) -> Self {
        Self {
            distance,
            failures: 0,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fail the first `failures` requests.
    pub fn failing_first(distance: f64, failures: usize) -> Self {
        Self {
            failures,
            ..Self::new(distance)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RoutingService for FakeRouting {
    async fn find_route(&self, waypoints: &[GeoPoint]) -> Result<RoutedPath> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(Error::RoutingResponse {
                reason: "NoRoute".to_string(),
            });
        }
        Ok(RoutedPath {
            distance: self.distance,
            waypoints: waypoints.to_vec(),
        })
    }
}

/// Fragment store whose every call fails.
pub struct BrokenStore;

#[async_trait]
impl FragmentStore for BrokenStore {
    async fn list(&self, _criteria: &FragmentCriteria) -> Result<Vec<velomix_lib::Fragment>> {
        Err(Error::StoreUnavailable)
    }

    async fn visited_geo(&self, _user: &str) -> Result<VisitedGeography> {
        Err(Error::StoreUnavailable)
    }
}
