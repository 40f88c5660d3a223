//! Route generation pipeline.
//!
//! A request flows through
//! `load → filter → graph → search → reduce → populate → route → score → materialize`.
//! Every stage takes the per-request [`Generation`] accumulator by value and
//! hands it on, so stages never share hidden state. The explorative track
//! works on routes and segments; the familiar track works on the requesting
//! user's activities and routes and only keeps combos that include at least
//! one activity.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::candidate::{generate_candidates, Candidate, CandidateOptions};
use crate::combo::{reduce_combos, Combo, PopulatedCombo};
use crate::error::{Error, Result};
use crate::familiarity::{score_candidates, FamiliarityOptions, VisitedGeography};
use crate::filter::{filter_fragments, FeasibleFragment, FilterOptions};
use crate::fragment::{Fragment, FragmentKind};
use crate::geo::GeoPoint;
use crate::graph::{build_graph, Graph, GraphBuildOptions, GraphMode};
use crate::materialize::{materialize, MaterializedRoute};
use crate::output::GenerationReport;
use crate::path::{search_paths, SearchOptions};
use crate::services::{
    FragmentCriteria, FragmentStore, RouteRepository, RoutingService, SpatialQuery,
};

/// How the final routes are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Preference {
    /// Explorative routes first.
    Discover,
    /// Closest to the requested distance first.
    Distance,
    /// Familiar routes first.
    #[default]
    Familiar,
}

impl Preference {
    pub fn as_str(self) -> &'static str {
        match self {
            Preference::Discover => "discover",
            Preference::Distance => "distance",
            Preference::Familiar => "familiar",
        }
    }
}

impl fmt::Display for Preference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown values fall back to [`Preference::Familiar`].
impl FromStr for Preference {
    type Err = std::convert::Infallible;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match value.trim().to_ascii_lowercase().as_str() {
            "discover" => Preference::Discover,
            "distance" => Preference::Distance,
            _ => Preference::Familiar,
        })
    }
}

/// A route generation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationQuery {
    pub start: GeoPoint,
    pub end: GeoPoint,
    /// Requested length in meters.
    pub distance: f64,
    pub preference: Preference,
    pub difficulty: String,
    /// Owner of the activities used by the familiar track.
    pub user: Option<String>,
}

impl GenerationQuery {
    /// Round trip starting and ending at `start`.
    pub fn round_trip(start: GeoPoint, distance: f64) -> Self {
        Self {
            start,
            end: start,
            distance,
            preference: Preference::default(),
            difficulty: "advanced".to_string(),
            user: None,
        }
    }

    pub fn with_end(mut self, end: GeoPoint) -> Self {
        self.end = end;
        self
    }

    pub fn with_preference(mut self, preference: Preference) -> Self {
        self.preference = preference;
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_difficulty(mut self, difficulty: impl Into<String>) -> Self {
        self.difficulty = difficulty.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Err(Error::InvalidQuery { reason });
        if !self.start.is_valid() {
            return invalid(format!("start {:?} is not a WGS84 coordinate", self.start));
        }
        if !self.end.is_valid() {
            return invalid(format!("end {:?} is not a WGS84 coordinate", self.end));
        }
        if !(self.distance.is_finite() && self.distance > 0.0) {
            return invalid(format!("distance must be positive, got {}", self.distance));
        }
        Ok(())
    }
}

/// Tuning of every pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorConfig {
    pub filter: FilterOptions,
    pub graph: GraphBuildOptions,
    pub search: SearchOptions,
    /// Combos kept per mode after reduction.
    pub combo_keep_best: usize,
    pub candidate: CandidateOptions,
    pub explorative_keep_best: usize,
    pub familiar_keep_best: usize,
    pub familiarity: FamiliarityOptions,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            filter: FilterOptions::default(),
            graph: GraphBuildOptions::default(),
            search: SearchOptions::default(),
            combo_keep_best: 3,
            candidate: CandidateOptions::default(),
            explorative_keep_best: 2,
            familiar_keep_best: 1,
            familiarity: FamiliarityOptions::default(),
        }
    }
}

impl GeneratorConfig {
    fn candidate_keep_best(&self, mode: GraphMode) -> usize {
        match mode {
            GraphMode::Explorative => self.explorative_keep_best,
            GraphMode::Familiar => self.familiar_keep_best,
        }
    }
}

/// Intermediate results of one search mode.
#[derive(Debug, Clone)]
pub struct Track {
    pub mode: GraphMode,
    pub fragments: Vec<Arc<Fragment>>,
    pub feasible: Vec<FeasibleFragment>,
    pub graph: Option<Graph>,
    pub combos: Vec<Combo>,
    pub populated: Vec<PopulatedCombo>,
    pub candidates: Vec<Candidate>,
}

impl Track {
    fn new(mode: GraphMode) -> Self {
        Self {
            mode,
            fragments: Vec::new(),
            feasible: Vec::new(),
            graph: None,
            combos: Vec::new(),
            populated: Vec::new(),
            candidates: Vec::new(),
        }
    }

    /// Fragment kinds the track draws from.
    pub fn kinds(mode: GraphMode) -> &'static [FragmentKind] {
        match mode {
            GraphMode::Explorative => &[FragmentKind::Route, FragmentKind::Segment],
            GraphMode::Familiar => &[FragmentKind::Activity, FragmentKind::Route],
        }
    }
}

/// Per-request accumulator threaded through every stage.
#[derive(Debug, Clone)]
pub struct Generation {
    pub query: GenerationQuery,
    pub explorative: Track,
    pub familiar: Track,
    pub visited: VisitedGeography,
    pub routes: Vec<MaterializedRoute>,
}

impl Generation {
    pub fn new(query: GenerationQuery) -> Self {
        Self {
            query,
            explorative: Track::new(GraphMode::Explorative),
            familiar: Track::new(GraphMode::Familiar),
            visited: VisitedGeography::default(),
            routes: Vec::new(),
        }
    }

    pub fn tracks(&self) -> [&Track; 2] {
        [&self.explorative, &self.familiar]
    }

    fn tracks_mut(&mut self) -> [&mut Track; 2] {
        [&mut self.explorative, &mut self.familiar]
    }
}

/// Load fragments for both tracks and the user's visited geography.
///
/// Without a user the familiar track stays empty.
pub async fn load_stage(
    mut generation: Generation,
    store: &dyn FragmentStore,
) -> Result<Generation> {
    let distance = generation.query.distance;
    let criteria = FragmentCriteria::shorter_than(distance, Track::kinds(GraphMode::Explorative));
    generation.explorative.fragments = store
        .list(&criteria)
        .await?
        .into_iter()
        .map(Arc::new)
        .collect();

    if let Some(user) = generation.query.user.clone() {
        let criteria = FragmentCriteria::shorter_than(distance, Track::kinds(GraphMode::Familiar))
            .with_activity_owner(user.as_str());
        generation.familiar.fragments = store
            .list(&criteria)
            .await?
            .into_iter()
            .map(Arc::new)
            .collect();
        generation.visited = store.visited_geo(&user).await?;
    }

    debug!(
        explorative = generation.explorative.fragments.len(),
        familiar = generation.familiar.fragments.len(),
        visited = generation.visited.len(),
        "loaded fragments"
    );
    Ok(generation)
}

pub fn filter_stage(mut generation: Generation, config: &GeneratorConfig) -> Generation {
    let start = generation.query.start;
    let distance = generation.query.distance;
    for track in generation.tracks_mut() {
        track.feasible = filter_fragments(&track.fragments, start, distance, &config.filter);
    }
    generation
}

pub fn graph_stage(mut generation: Generation, config: &GeneratorConfig) -> Generation {
    let start = generation.query.start;
    let end = generation.query.end;
    for track in generation.tracks_mut() {
        track.graph = Some(build_graph(
            track.mode,
            &track.feasible,
            start,
            end,
            &config.graph,
        ));
    }
    generation
}

pub fn search_stage<R: Rng + ?Sized>(
    mut generation: Generation,
    config: &GeneratorConfig,
    rng: &mut R,
) -> Generation {
    let distance = generation.query.distance;
    for track in generation.tracks_mut() {
        let Some(graph) = &track.graph else {
            continue;
        };
        track.combos = search_paths(graph, distance, &config.search, rng)
            .into_iter()
            .map(|path| Combo::from_path(track.mode, path))
            .collect();
    }
    generation
}

pub fn reduce_stage(mut generation: Generation, config: &GeneratorConfig) -> Generation {
    let distance = generation.query.distance;
    for track in generation.tracks_mut() {
        let combos = std::mem::take(&mut track.combos);
        track.combos = reduce_combos(combos, config.combo_keep_best, distance);
    }
    generation
}

pub fn populate_stage(mut generation: Generation) -> Generation {
    for track in generation.tracks_mut() {
        let Some(graph) = &track.graph else {
            continue;
        };
        track.populated = track.combos.iter().map(|combo| combo.populate(graph)).collect();
    }
    generation
}

pub async fn candidate_stage(
    mut generation: Generation,
    config: &GeneratorConfig,
    routing: &dyn RoutingService,
) -> Generation {
    let query = generation.query.clone();
    for track in generation.tracks_mut() {
        track.candidates = generate_candidates(
            &track.populated,
            query.start,
            query.end,
            query.distance,
            config.candidate_keep_best(track.mode),
            routing,
            &config.candidate,
        )
        .await;
    }
    generation
}

pub async fn familiarity_stage(
    mut generation: Generation,
    config: &GeneratorConfig,
    spatial: &dyn SpatialQuery,
) -> Generation {
    let visited = std::mem::take(&mut generation.visited);
    for track in generation.tracks_mut() {
        let candidates = std::mem::take(&mut track.candidates);
        track.candidates =
            score_candidates(track.mode, candidates, &visited, spatial, &config.familiarity).await;
    }
    generation.visited = visited;
    generation
}

/// Persist the final candidates, or only compute their identifiers when no
/// repository is configured.
pub async fn materialize_stage(
    mut generation: Generation,
    repository: Option<&dyn RouteRepository>,
) -> Result<Generation> {
    let start = generation.query.start;
    let end = generation.query.end;
    let candidates: Vec<Candidate> = generation
        .tracks()
        .iter()
        .flat_map(|track| track.candidates.iter().cloned())
        .collect();

    let mut routes = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let route = match repository {
            Some(repository) => materialize(candidate, start, end, repository).await?,
            None => MaterializedRoute::transient(candidate, start, end),
        };
        routes.push(route);
    }
    order_routes(&mut routes, generation.query.preference, generation.query.distance);
    generation.routes = routes;
    Ok(generation)
}

/// Order final routes according to the requested preference.
pub fn order_routes(routes: &mut [MaterializedRoute], preference: Preference, distance: f64) {
    match preference {
        Preference::Discover => {
            routes.sort_by_key(|route| route.candidate.mode != GraphMode::Explorative)
        }
        Preference::Familiar => {
            routes.sort_by_key(|route| route.candidate.mode != GraphMode::Familiar)
        }
        Preference::Distance => routes.sort_by(|a, b| {
            a.candidate
                .deviation(distance)
                .total_cmp(&b.candidate.deviation(distance))
        }),
    }
}

/// Entry point tying the pipeline to its collaborators.
pub struct RouteGenerator {
    store: Arc<dyn FragmentStore>,
    spatial: Arc<dyn SpatialQuery>,
    routing: Arc<dyn RoutingService>,
    repository: Option<Arc<dyn RouteRepository>>,
    config: GeneratorConfig,
    seed: Option<u64>,
}

impl RouteGenerator {
    pub fn new(
        store: Arc<dyn FragmentStore>,
        spatial: Arc<dyn SpatialQuery>,
        routing: Arc<dyn RoutingService>,
    ) -> Self {
        Self {
            store,
            spatial,
            routing,
            repository: None,
            config: GeneratorConfig::default(),
            seed: None,
        }
    }

    /// Persist generated routes through `repository`.
    pub fn with_repository(mut self, repository: Arc<dyn RouteRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn with_config(mut self, config: GeneratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Fix the search jitter so runs are reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Run every stage and return the accumulator.
    ///
    /// The CPU-bound stages from filtering to population run on the blocking
    /// thread pool so a long search does not stall other requests.
    pub async fn run(&self, query: GenerationQuery) -> Result<Generation> {
        query.validate()?;
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        info!(
            lat = query.start.lat,
            lng = query.start.lng,
            distance = query.distance,
            preference = %query.preference,
            "generating routes"
        );

        let generation = load_stage(Generation::new(query), self.store.as_ref()).await?;
        let config = self.config.clone();
        let generation = tokio::task::spawn_blocking(move || {
            let generation = filter_stage(generation, &config);
            let generation = graph_stage(generation, &config);
            let generation = search_stage(generation, &config, &mut rng);
            let generation = reduce_stage(generation, &config);
            populate_stage(generation)
        })
        .await?;
        let generation = candidate_stage(generation, &self.config, self.routing.as_ref()).await;
        let generation =
            familiarity_stage(generation, &self.config, self.spatial.as_ref()).await;
        let generation = materialize_stage(generation, self.repository.as_deref()).await?;

        if generation.routes.is_empty() {
            warn!("no route could be generated for the request");
        } else {
            info!(routes = generation.routes.len(), "route generation finished");
        }
        Ok(generation)
    }

    /// Run the pipeline and summarise it as a report.
    pub async fn generate(&self, query: GenerationQuery) -> Result<GenerationReport> {
        let generation = self.run(query).await?;
        Ok(GenerationReport::from_generation(&generation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combo::PartRef;

    fn route(mode: GraphMode, distance: f64) -> MaterializedRoute {
        let start = GeoPoint::new(49.0, 7.0);
        let candidate = Candidate {
            mode,
            distance,
            waypoints: vec![start, start],
            parts: Vec::<PartRef>::new(),
            lower_bound_distance: distance,
            familiarity_score: Some(0.0),
        };
        MaterializedRoute::transient(candidate, start, start)
    }

    #[test]
    fn unknown_preferences_mean_familiar() {
        assert_eq!("discover".parse::<Preference>().unwrap(), Preference::Discover);
        assert_eq!("Distance".parse::<Preference>().unwrap(), Preference::Distance);
        assert_eq!("whatever".parse::<Preference>().unwrap(), Preference::Familiar);
    }

    #[test]
    fn validate_rejects_bad_queries() {
        let start = GeoPoint::new(49.0, 7.0);
        assert!(GenerationQuery::round_trip(start, 10_000.0).validate().is_ok());
        assert!(GenerationQuery::round_trip(start, 0.0).validate().is_err());
        assert!(GenerationQuery::round_trip(start, f64::NAN).validate().is_err());
        assert!(GenerationQuery::round_trip(GeoPoint::new(91.0, 7.0), 10_000.0)
            .validate()
            .is_err());
    }

    #[test]
    fn discover_lists_explorative_routes_first() {
        let mut routes = vec![
            route(GraphMode::Familiar, 10_000.0),
            route(GraphMode::Explorative, 12_000.0),
        ];
        order_routes(&mut routes, Preference::Discover, 10_000.0);
        assert_eq!(routes[0].candidate.mode, GraphMode::Explorative);
        order_routes(&mut routes, Preference::Familiar, 10_000.0);
        assert_eq!(routes[0].candidate.mode, GraphMode::Familiar);
    }

    #[test]
    fn distance_preference_orders_by_deviation() {
        let mut routes = vec![
            route(GraphMode::Explorative, 13_000.0),
            route(GraphMode::Familiar, 9_500.0),
            route(GraphMode::Explorative, 10_800.0),
        ];
        order_routes(&mut routes, Preference::Distance, 10_000.0);
        let distances: Vec<f64> = routes.iter().map(|r| r.candidate.distance).collect();
        assert_eq!(distances, vec![9_500.0, 10_800.0, 13_000.0]);
    }
}
