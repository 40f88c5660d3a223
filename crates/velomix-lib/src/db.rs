use std::collections::HashMap;
use std::env;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::familiarity::VisitedGeography;
use crate::fragment::{Fragment, FragmentId, FragmentKind, FragmentRecord, TrackPoint};
use crate::geo::{Geo, GeoId, GeoPoint};
use crate::services::{FragmentCriteria, FragmentStore, NewRoute, RouteRepository, StoredRoute};

/// Environment variable overriding the database location.
pub const DATABASE_ENV: &str = "VELOMIX_DATABASE";

const DATABASE_FILENAME: &str = "velomix.db";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS fragments (
    id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    kind TEXT NOT NULL,
    distance REAL NOT NULL,
    owner TEXT,
    start_lat REAL,
    start_lng REAL,
    end_lat REAL,
    end_lng REAL
);
CREATE TABLE IF NOT EXISTS geo (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    lat REAL NOT NULL,
    lng REAL NOT NULL,
    UNIQUE (lat, lng)
);
CREATE TABLE IF NOT EXISTS fragment_geo (
    fragment_id INTEGER NOT NULL REFERENCES fragments (id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    geo_id INTEGER NOT NULL REFERENCES geo (id),
    PRIMARY KEY (fragment_id, position)
);
CREATE INDEX IF NOT EXISTS fragment_geo_by_geo ON fragment_geo (geo_id);
CREATE TABLE IF NOT EXISTS routes (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    mode TEXT NOT NULL,
    distance REAL NOT NULL,
    start_lat REAL NOT NULL,
    start_lng REAL NOT NULL,
    end_lat REAL NOT NULL,
    end_lng REAL NOT NULL,
    familiarity_score REAL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS route_geo (
    route_id TEXT NOT NULL REFERENCES routes (id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    geo_id INTEGER NOT NULL REFERENCES geo (id),
    PRIMARY KEY (route_id, position)
);
CREATE INDEX IF NOT EXISTS route_geo_by_geo ON route_geo (geo_id);
CREATE TABLE IF NOT EXISTS route_parts (
    route_id TEXT NOT NULL REFERENCES routes (id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    fragment_id INTEGER NOT NULL,
    direction TEXT NOT NULL,
    PRIMARY KEY (route_id, position)
);
";

/// Resolve the default database location using platform-specific project directories.
pub fn default_database_path() -> Result<PathBuf> {
    let dirs =
        ProjectDirs::from("org", "velomix", "velomix").ok_or(Error::ProjectDirsUnavailable)?;
    Ok(dirs.data_dir().join(DATABASE_FILENAME))
}

/// Resolve the database path: explicit argument, then `VELOMIX_DATABASE`,
/// then the platform data directory.
pub fn resolve_database_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Some(path) = env::var_os(DATABASE_ENV).filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    default_database_path()
}

/// Fragment as accepted by [`SqliteStore::import_fragments`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FragmentImport {
    pub id: FragmentId,
    pub title: String,
    pub kind: FragmentKind,
    pub distance: f64,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub points: Vec<GeoPoint>,
    #[serde(default)]
    pub start_latlng: Option<GeoPoint>,
    #[serde(default)]
    pub end_latlng: Option<GeoPoint>,
}

impl FragmentImport {
    fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| Error::InvalidFragment {
            title: self.title.clone(),
            reason: reason.to_string(),
        };
        if !(self.distance.is_finite() && self.distance > 0.0) {
            return Err(invalid("distance must be positive"));
        }
        let has_endpoints = self.start_latlng.is_some() && self.end_latlng.is_some();
        if self.points.is_empty() && !has_endpoints {
            return Err(invalid("neither geometry nor start/end coordinates"));
        }
        let mut all_points = self
            .points
            .iter()
            .chain(self.start_latlng.iter())
            .chain(self.end_latlng.iter());
        if all_points.any(|point| !point.is_valid()) {
            return Err(invalid("coordinate outside the WGS84 range"));
        }
        Ok(())
    }
}

/// Parse a JSON array of fragments.
pub fn read_fragment_imports<R: Read>(reader: R) -> Result<Vec<FragmentImport>> {
    Ok(serde_json::from_reader(reader)?)
}

/// Outcome of an import run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
    pub points: usize,
}

/// Row counts of the main tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub fragments: usize,
    pub geo: usize,
    pub routes: usize,
}

/// SQLite-backed fragment store and route repository.
///
/// Clones share one connection. The async trait impls run each query on
/// tokio's blocking thread pool.
#[derive(Clone)]
pub struct SqliteStore {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) a database file and ensure the schema exists.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let connection = Connection::open(path)?;
        debug!(path = %path.display(), "opened fragment database");
        Self::from_connection(connection)
    }

    /// Open a database that must already exist.
    pub fn open_existing(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::DatabaseNotFound {
                path: path.to_path_buf(),
            });
        }
        Self::open(path)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(connection: Connection) -> Result<Self> {
        connection.pragma_update(None, "foreign_keys", true)?;
        connection.execute_batch(SCHEMA)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.connection.lock().map_err(|_| Error::StoreUnavailable)
    }

    /// Insert or replace fragments together with their geometry.
    ///
    /// Fragments failing validation are logged and skipped. Geo-points are
    /// shared between fragments with identical coordinates.
    pub fn import_fragments(&self, fragments: &[FragmentImport]) -> Result<ImportSummary> {
        let mut connection = self.connection()?;
        let tx = connection.transaction()?;
        let mut summary = ImportSummary::default();

        for fragment in fragments {
            if let Err(error) = fragment.validate() {
                warn!(fragment = fragment.id, %error, "skipping fragment");
                summary.skipped += 1;
                continue;
            }

            tx.execute(
                "DELETE FROM fragment_geo WHERE fragment_id = ?1",
                params![fragment.id],
            )?;
            tx.execute(
                "INSERT INTO fragments
                    (id, title, kind, distance, owner, start_lat, start_lng, end_lat, end_lng)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT (id) DO UPDATE SET
                    title = excluded.title,
                    kind = excluded.kind,
                    distance = excluded.distance,
                    owner = excluded.owner,
                    start_lat = excluded.start_lat,
                    start_lng = excluded.start_lng,
                    end_lat = excluded.end_lat,
                    end_lng = excluded.end_lng",
                params![
                    fragment.id,
                    fragment.title,
                    fragment.kind.as_str(),
                    fragment.distance,
                    fragment.owner,
                    fragment.start_latlng.map(|p| p.lat),
                    fragment.start_latlng.map(|p| p.lng),
                    fragment.end_latlng.map(|p| p.lat),
                    fragment.end_latlng.map(|p| p.lng),
                ],
            )?;
            for (position, point) in fragment.points.iter().enumerate() {
                let geo_id = upsert_geo(&tx, *point)?;
                tx.execute(
                    "INSERT INTO fragment_geo (fragment_id, position, geo_id) VALUES (?1, ?2, ?3)",
                    params![fragment.id, position as i64, geo_id],
                )?;
            }
            summary.imported += 1;
            summary.points += fragment.points.len();
        }

        tx.commit()?;
        info!(
            imported = summary.imported,
            skipped = summary.skipped,
            points = summary.points,
            "imported fragments"
        );
        Ok(summary)
    }

    /// Fragments matching `criteria`, ordered by identifier.
    pub fn list_fragments(&self, criteria: &FragmentCriteria) -> Result<Vec<Fragment>> {
        let connection = self.connection()?;

        let mut stmt = connection.prepare(
            "SELECT id, title, kind, distance, owner, start_lat, start_lng, end_lat, end_lng
             FROM fragments
             WHERE (?1 IS NULL OR distance > ?1) AND (?2 IS NULL OR distance < ?2)
             ORDER BY id",
        )?;
        let rows = stmt.query_map(
            params![criteria.min_distance, criteria.max_distance],
            row_to_fragment,
        )?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }

        let mut points = load_fragment_points(&connection)?;
        let mut fragments = Vec::with_capacity(records.len());
        for row in records {
            let id = row.id;
            let geometry = points.remove(&id).unwrap_or_default();
            match Fragment::from_record(row.into_record(geometry)?) {
                Some(fragment) if criteria.matches(&fragment) => fragments.push(fragment),
                Some(_) => {}
                None => warn!(fragment = id, "fragment has no coordinates, ignoring"),
            }
        }

        debug!(count = fragments.len(), "listed fragments");
        Ok(fragments)
    }

    /// Geo-points touched by the activities `user` owns.
    pub fn visited_geography(&self, user: &str) -> Result<VisitedGeography> {
        let connection = self.connection()?;
        let mut stmt = connection.prepare(
            "SELECT DISTINCT fg.geo_id
             FROM fragment_geo fg
             JOIN fragments f ON f.id = fg.fragment_id
             WHERE f.kind = ?1 AND f.owner = ?2",
        )?;
        let rows = stmt.query_map(params![FragmentKind::Activity.as_str(), user], |row| {
            row.get::<_, GeoId>(0)
        })?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(VisitedGeography::new(ids))
    }

    /// Every stored geo-point with the fragments that reference it.
    pub fn load_geo(&self) -> Result<Vec<Geo>> {
        let connection = self.connection()?;
        let mut stmt = connection.prepare(
            "SELECT g.id, g.lat, g.lng, fg.fragment_id
             FROM geo g
             LEFT JOIN fragment_geo fg ON fg.geo_id = g.id
             ORDER BY g.id, fg.fragment_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, GeoId>(0)?,
                GeoPoint::new(row.get(1)?, row.get(2)?),
                row.get::<_, Option<FragmentId>>(3)?,
            ))
        })?;

        let mut geos: Vec<Geo> = Vec::new();
        for row in rows {
            let (id, point, fragment) = row?;
            if geos.last().map(|geo| geo.id) != Some(id) {
                geos.push(Geo {
                    id,
                    point,
                    fragments: Vec::new(),
                });
            }
            if let (Some(fragment), Some(geo)) = (fragment, geos.last_mut()) {
                if geo.fragments.last() != Some(&fragment) {
                    geo.fragments.push(fragment);
                }
            }
        }
        Ok(geos)
    }

    pub fn route(&self, id: &str) -> Result<Option<StoredRoute>> {
        let connection = self.connection()?;
        let route = connection
            .query_row(
                "SELECT id, title, mode, distance, familiarity_score, created_at
                 FROM routes WHERE id = ?1",
                params![id],
                |row| {
                    Ok(StoredRoute {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        mode: row.get(2)?,
                        distance: row.get(3)?,
                        familiarity_score: row.get(4)?,
                        created_at: row.get(5)?,
                        part_ids: Vec::new(),
                    })
                },
            )
            .optional()?;

        let Some(mut route) = route else {
            return Ok(None);
        };
        let mut stmt = connection
            .prepare("SELECT fragment_id FROM route_parts WHERE route_id = ?1 ORDER BY position")?;
        let rows = stmt.query_map(params![id], |row| row.get::<_, i64>(0))?;
        for row in rows {
            route.part_ids.push(row?);
        }
        Ok(Some(route))
    }

    /// Persist a generated route with its geometry and parts.
    pub fn save_route(&self, route: &NewRoute) -> Result<()> {
        let mut connection = self.connection()?;
        let tx = connection.transaction()?;
        tx.execute(
            "INSERT INTO routes
                (id, title, mode, distance, start_lat, start_lng, end_lat, end_lng,
                 familiarity_score, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                route.id,
                route.title,
                route.mode.to_string(),
                route.distance,
                route.start.lat,
                route.start.lng,
                route.end.lat,
                route.end.lng,
                route.familiarity_score,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        for (position, point) in route.waypoints.iter().enumerate() {
            let geo_id = upsert_geo(&tx, *point)?;
            tx.execute(
                "INSERT INTO route_geo (route_id, position, geo_id) VALUES (?1, ?2, ?3)",
                params![route.id, position as i64, geo_id],
            )?;
        }
        for (position, part) in route.parts.iter().enumerate() {
            tx.execute(
                "INSERT INTO route_parts (route_id, position, fragment_id, direction)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    route.id,
                    position as i64,
                    part.fragment_id,
                    part.direction.as_str(),
                ],
            )?;
        }
        tx.commit()?;
        debug!(route = %route.id, waypoints = route.waypoints.len(), "saved route");
        Ok(())
    }

    pub fn set_familiarity(&self, id: &str, score: Option<f64>) -> Result<()> {
        let connection = self.connection()?;
        connection.execute(
            "UPDATE routes SET familiarity_score = ?2 WHERE id = ?1",
            params![id, score],
        )?;
        Ok(())
    }

    /// Delete geo-points no fragment or route references any longer.
    pub fn prune_orphan_geo(&self) -> Result<usize> {
        let connection = self.connection()?;
        let removed = connection.execute(
            "DELETE FROM geo
             WHERE id NOT IN (SELECT geo_id FROM fragment_geo)
               AND id NOT IN (SELECT geo_id FROM route_geo)",
            [],
        )?;
        info!(removed, "pruned orphan geo-points");
        Ok(removed)
    }

    /// Delete routes and activities that were stored without geometry.
    pub fn delete_empty_fragments(&self) -> Result<usize> {
        let connection = self.connection()?;
        let removed = connection.execute(
            "DELETE FROM fragments
             WHERE kind IN (?1, ?2)
               AND id NOT IN (SELECT fragment_id FROM fragment_geo)",
            params![
                FragmentKind::Route.as_str(),
                FragmentKind::Activity.as_str()
            ],
        )?;
        info!(removed, "deleted fragments without geometry");
        Ok(removed)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let connection = self.connection()?;
        let count = |table: &str| -> Result<usize> {
            let sql = format!("SELECT COUNT(*) FROM {table}");
            let value: i64 = connection.query_row(&sql, [], |row| row.get(0))?;
            Ok(value as usize)
        };
        Ok(StoreStats {
            fragments: count("fragments")?,
            geo: count("geo")?,
            routes: count("routes")?,
        })
    }
}

impl SqliteStore {
    async fn run_blocking<T, F>(&self, operation: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&SqliteStore) -> Result<T> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || operation(&store)).await?
    }
}

#[async_trait]
impl FragmentStore for SqliteStore {
    async fn list(&self, criteria: &FragmentCriteria) -> Result<Vec<Fragment>> {
        let criteria = criteria.clone();
        self.run_blocking(move |store| store.list_fragments(&criteria))
            .await
    }

    async fn visited_geo(&self, user: &str) -> Result<VisitedGeography> {
        let user = user.to_string();
        self.run_blocking(move |store| store.visited_geography(&user))
            .await
    }
}

#[async_trait]
impl RouteRepository for SqliteStore {
    async fn find_route(&self, id: &str) -> Result<Option<StoredRoute>> {
        let id = id.to_string();
        self.run_blocking(move |store| store.route(&id)).await
    }

    async fn insert_route(&self, route: &NewRoute) -> Result<StoredRoute> {
        let route = route.clone();
        self.run_blocking(move |store| {
            store.save_route(&route)?;
            store
                .route(&route.id)?
                .ok_or_else(|| Error::Sqlite(rusqlite::Error::QueryReturnedNoRows))
        })
        .await
    }

    async fn update_familiarity(&self, id: &str, score: Option<f64>) -> Result<()> {
        let id = id.to_string();
        self.run_blocking(move |store| store.set_familiarity(&id, score))
            .await
    }
}

/// Fragment row before its kind is parsed and geometry attached.
struct FragmentRow {
    id: FragmentId,
    title: String,
    kind: String,
    distance: f64,
    owner: Option<String>,
    start: Option<GeoPoint>,
    end: Option<GeoPoint>,
}

impl FragmentRow {
    fn into_record(self, points: Vec<TrackPoint>) -> Result<FragmentRecord> {
        Ok(FragmentRecord {
            id: self.id,
            title: self.title,
            kind: self.kind.parse()?,
            distance: self.distance,
            owner: self.owner,
            points,
            start_latlng: self.start,
            end_latlng: self.end,
        })
    }
}

fn row_to_fragment(row: &Row<'_>) -> rusqlite::Result<FragmentRow> {
    let point = |lat: Option<f64>, lng: Option<f64>| {
        lat.zip(lng).map(|(lat, lng)| GeoPoint::new(lat, lng))
    };
    Ok(FragmentRow {
        id: row.get(0)?,
        title: row.get(1)?,
        kind: row.get(2)?,
        distance: row.get(3)?,
        owner: row.get(4)?,
        start: point(row.get(5)?, row.get(6)?),
        end: point(row.get(7)?, row.get(8)?),
    })
}

fn load_fragment_points(connection: &Connection) -> Result<HashMap<FragmentId, Vec<TrackPoint>>> {
    let mut stmt = connection.prepare(
        "SELECT fg.fragment_id, g.id, g.lat, g.lng
         FROM fragment_geo fg
         JOIN geo g ON g.id = fg.geo_id
         ORDER BY fg.fragment_id, fg.position",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, FragmentId>(0)?,
            TrackPoint {
                id: row.get(1)?,
                point: GeoPoint::new(row.get(2)?, row.get(3)?),
            },
        ))
    })?;

    let mut points: HashMap<FragmentId, Vec<TrackPoint>> = HashMap::new();
    for row in rows {
        let (fragment, point) = row?;
        points.entry(fragment).or_default().push(point);
    }
    Ok(points)
}

fn upsert_geo(tx: &Transaction<'_>, point: GeoPoint) -> Result<GeoId> {
    tx.prepare_cached(
        "INSERT INTO geo (lat, lng) VALUES (?1, ?2) ON CONFLICT (lat, lng) DO NOTHING",
    )?
    .execute(params![point.lat, point.lng])?;
    let id = tx
        .prepare_cached("SELECT id FROM geo WHERE lat = ?1 AND lng = ?2")?
        .query_row(params![point.lat, point.lng], |row| row.get(0))?;
    Ok(id)
}
