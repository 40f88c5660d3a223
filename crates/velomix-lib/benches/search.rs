use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use velomix_lib::filter::filter_fragments;
use velomix_lib::{
    build_graph, search_paths, FeasibleFragment, FilterOptions, Fragment, FragmentKind,
    FragmentRecord, GeoPoint, Graph, GraphBuildOptions, GraphMode, SearchOptions, TrackPoint,
};

const START: GeoPoint = GeoPoint {
    lat: 49.2335,
    lng: 6.9967,
};
const TARGET: f64 = 40_000.0;

static FEASIBLE: Lazy<Vec<FeasibleFragment>> = Lazy::new(|| {
    let mut rng = StdRng::seed_from_u64(2024);
    let fragments: Vec<Arc<Fragment>> = (0..40)
        .filter_map(|id| {
            let from = GeoPoint::new(
                START.lat + rng.gen_range(-0.05..0.05),
                START.lng + rng.gen_range(-0.05..0.05),
            );
            let to = GeoPoint::new(
                from.lat + rng.gen_range(-0.02..0.02),
                from.lng + rng.gen_range(-0.02..0.02),
            );
            let record = FragmentRecord {
                id,
                title: format!("fragment {id}"),
                kind: if id % 4 == 0 {
                    FragmentKind::Activity
                } else {
                    FragmentKind::Route
                },
                distance: rng.gen_range(4_500.0..12_000.0),
                owner: None,
                points: vec![
                    TrackPoint { id: id * 2, point: from },
                    TrackPoint { id: id * 2 + 1, point: to },
                ],
                start_latlng: None,
                end_latlng: None,
            };
            Fragment::from_record(record).map(Arc::new)
        })
        .collect();
    filter_fragments(&fragments, START, TARGET, &FilterOptions::default())
});

static EXPLORATIVE: Lazy<Graph> = Lazy::new(|| {
    build_graph(
        GraphMode::Explorative,
        &FEASIBLE,
        START,
        START,
        &GraphBuildOptions::default(),
    )
});

static OPTIONS: Lazy<SearchOptions> = Lazy::new(|| SearchOptions {
    expansion_budget: 20_000,
    ..SearchOptions::default()
});

fn benchmark_search(c: &mut Criterion) {
    c.bench_function("build_graph_40_fragments", |b| {
        b.iter(|| {
            let graph = build_graph(
                GraphMode::Explorative,
                &FEASIBLE,
                START,
                START,
                &GraphBuildOptions::default(),
            );
            black_box(graph.edge_count())
        });
    });

    c.bench_function("search_explorative_40km", |b| {
        let graph = &*EXPLORATIVE;
        let options = &*OPTIONS;
        b.iter(|| {
            let mut rng = StdRng::seed_from_u64(7);
            let paths = search_paths(graph, TARGET, options, &mut rng);
            black_box(paths.len())
        });
    });
}

criterion_group!(benches, benchmark_search);
criterion_main!(benches);
