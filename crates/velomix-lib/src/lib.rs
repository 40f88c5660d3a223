//! velomix library entry points.
//!
//! This crate synthesises cycling routes of a requested length from stored
//! route, segment, and activity fragments. It exposes the fragment store, the
//! spatial index, the directions client, and the generation pipeline that ties
//! them together. Higher-level consumers (the CLI) should only depend on the
//! items exported here instead of reimplementing behavior.
//!

#![deny(warnings)]

pub mod candidate;
pub mod combo;
pub mod db;
pub mod directions;
pub mod error;
pub mod familiarity;
pub mod filter;
pub mod fragment;
pub mod geo;
pub mod graph;
pub mod materialize;
pub mod output;
pub mod path;
pub mod pipeline;
pub mod services;
pub mod spatial;

pub use candidate::{Candidate, CandidateOptions};
pub use combo::{Combo, PartRef, PopulatedCombo};
pub use db::{
    default_database_path, read_fragment_imports, resolve_database_path, FragmentImport,
    ImportSummary, SqliteStore, StoreStats,
};
pub use directions::{DirectionsClient, DirectionsConfig};
pub use error::{Error, Result};
pub use familiarity::{FamiliarityOptions, VisitedGeography};
pub use filter::{FeasibleFragment, FilterOptions};
pub use fragment::{Fragment, FragmentId, FragmentKind, FragmentRecord, TrackPoint};
pub use geo::{Geo, GeoId, GeoPoint};
pub use graph::{build_graph, Direction, Graph, GraphBuildOptions, GraphMode};
pub use materialize::{materialize, route_id, MaterializedRoute};
pub use output::{GeneratedRoute, GenerationReport, ReportRenderMode};
pub use path::{search_paths, DedupKey, SearchOptions};
pub use pipeline::{Generation, GenerationQuery, GeneratorConfig, Preference, RouteGenerator};
pub use services::{
    FragmentCriteria, FragmentStore, NewRoute, RoutedPath, RouteRepository, RoutingService,
    SpatialQuery, StoredRoute,
};
pub use spatial::SpatialIndex;
