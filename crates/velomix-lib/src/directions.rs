//! Client for Mapbox/OSRM-style directions services.
//!
//! Waypoints are sent as a `lng,lat;lng,lat;...` path segment after the
//! routing profile. A response is only accepted when it reports `code ==
//! "Ok"` and carries at least one route with at least one leg; every other
//! outcome is a routing failure the pipeline treats like a network error.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::geo::GeoPoint;
use crate::services::{RoutedPath, RoutingService};

const DIRECTIONS_URL_ENV: &str = "VELOMIX_DIRECTIONS_URL";
const DIRECTIONS_PROFILE_ENV: &str = "VELOMIX_DIRECTIONS_PROFILE";
const ACCESS_TOKEN_ENV: &str = "MAPBOX_ACCESS_TOKEN";

pub const DEFAULT_DIRECTIONS_URL: &str = "https://api.mapbox.com/directions/v5/mapbox";
pub const DEFAULT_PROFILE: &str = "cycling";

/// Connection settings for the directions service.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectionsConfig {
    pub base_url: String,
    pub profile: String,
    pub access_token: Option<String>,
    /// Deadline for a single request, body included.
    pub timeout: Duration,
    /// Extra attempts after a transient failure.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further retry.
    pub backoff: Duration,
}

impl Default for DirectionsConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_DIRECTIONS_URL.to_string(),
            profile: DEFAULT_PROFILE.to_string(),
            access_token: None,
            timeout: Duration::from_secs(10),
            max_retries: 2,
            backoff: Duration::from_millis(250),
        }
    }
}

impl DirectionsConfig {
    /// Defaults overridden by `VELOMIX_DIRECTIONS_URL`,
    /// `VELOMIX_DIRECTIONS_PROFILE`, and `MAPBOX_ACCESS_TOKEN`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(url) = non_empty_env(DIRECTIONS_URL_ENV) {
            config.base_url = url;
        }
        if let Some(profile) = non_empty_env(DIRECTIONS_PROFILE_ENV) {
            config.profile = profile;
        }
        config.access_token = non_empty_env(ACCESS_TOKEN_ENV);
        config
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// [`RoutingService`] backed by an HTTP directions API.
#[derive(Debug, Clone)]
pub struct DirectionsClient {
    client: Client,
    config: DirectionsConfig,
}

impl DirectionsClient {
    pub fn new(config: DirectionsConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.timeout)
            .user_agent(concat!("velomix/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &DirectionsConfig {
        &self.config
    }

    /// Request URL without query parameters.
    pub fn route_url(&self, waypoints: &[GeoPoint]) -> String {
        let coordinates: Vec<String> = waypoints.iter().map(GeoPoint::to_lng_lat).collect();
        format!(
            "{}/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.profile,
            coordinates.join(";")
        )
    }

    async fn request(&self, waypoints: &[GeoPoint]) -> Result<RoutedPath> {
        let mut query = vec![
            ("continue_straight", "true"),
            ("geometries", "geojson"),
            ("overview", "full"),
            ("steps", "false"),
        ];
        if let Some(token) = &self.config.access_token {
            query.push(("access_token", token.as_str()));
        }

        let call = async {
            let response = self
                .client
                .get(self.route_url(waypoints))
                .query(&query)
                .send()
                .await?;
            let status = response.status();
            if !status.is_success() {
                return Err(Error::RoutingStatus {
                    status: status.as_u16(),
                });
            }
            let body = response.text().await?;
            parse_directions(&body)
        };

        tokio::time::timeout(self.config.timeout, call)
            .await
            .map_err(|_| Error::RoutingTimeout {
                millis: self.config.timeout.as_millis(),
            })?
    }
}

#[async_trait]
impl RoutingService for DirectionsClient {
    async fn find_route(&self, waypoints: &[GeoPoint]) -> Result<RoutedPath> {
        if waypoints.len() < 2 {
            return Err(Error::RoutingResponse {
                reason: format!("need at least two waypoints, got {}", waypoints.len()),
            });
        }

        let mut attempt = 0;
        loop {
            match self.request(waypoints).await {
                Ok(path) => {
                    debug!(
                        waypoints = waypoints.len(),
                        distance = path.distance,
                        attempt,
                        "routing request succeeded"
                    );
                    return Ok(path);
                }
                Err(error) if error.is_transient() && attempt < self.config.max_retries => {
                    let delay = retry_delay(self.config.backoff, attempt);
                    attempt += 1;
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        %error,
                        "routing request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

/// Exponential backoff before retry `attempt + 1`, saturating instead of
/// overflowing for large attempt counts.
fn retry_delay(backoff: Duration, attempt: u32) -> Duration {
    backoff.saturating_mul(2u32.checked_pow(attempt).unwrap_or(u32::MAX))
}

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<DirectionsRoute>,
}

#[derive(Debug, Deserialize)]
struct DirectionsRoute {
    distance: f64,
    #[serde(default)]
    geometry: Option<LineString>,
    #[serde(default)]
    legs: Vec<RouteLeg>,
}

#[derive(Debug, Deserialize)]
struct LineString {
    coordinates: Vec<[f64; 2]>,
}

#[derive(Debug, Deserialize)]
struct RouteLeg {
    #[serde(default)]
    steps: Vec<RouteStep>,
}

#[derive(Debug, Deserialize)]
struct RouteStep {
    maneuver: Maneuver,
}

#[derive(Debug, Deserialize)]
struct Maneuver {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    modifier: Option<String>,
    #[serde(default)]
    location: Option<[f64; 2]>,
}

/// Decode a directions response body into a routed path.
pub fn parse_directions(body: &str) -> Result<RoutedPath> {
    let response: DirectionsResponse = serde_json::from_str(body)?;
    if response.code != "Ok" {
        let reason = match response.message {
            Some(message) => format!("{}: {}", response.code, message),
            None => response.code,
        };
        return Err(Error::RoutingResponse { reason });
    }

    let route = response
        .routes
        .into_iter()
        .next()
        .ok_or_else(|| Error::RoutingResponse {
            reason: "response contains no routes".to_string(),
        })?;
    if route.legs.is_empty() {
        return Err(Error::RoutingResponse {
            reason: "route contains no legs".to_string(),
        });
    }

    for maneuver in route
        .legs
        .iter()
        .flat_map(|leg| &leg.steps)
        .map(|step| &step.maneuver)
        .filter(|maneuver| maneuver.modifier.as_deref() == Some("uturn"))
    {
        debug!(
            kind = %maneuver.kind,
            location = ?maneuver.location,
            "route contains a u-turn"
        );
    }

    let geometry = route.geometry.ok_or_else(|| Error::RoutingResponse {
        reason: "route has no geometry".to_string(),
    })?;

    Ok(RoutedPath {
        distance: route.distance,
        waypoints: geometry
            .coordinates
            .into_iter()
            .map(|[lng, lat]| GeoPoint::new(lat, lng))
            .collect(),
    })
}
