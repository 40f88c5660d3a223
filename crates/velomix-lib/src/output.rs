use std::fmt::Write;

use serde::Serialize;

use crate::combo::PartRef;
use crate::geo::GeoPoint;
use crate::graph::GraphMode;
use crate::pipeline::{Generation, Preference};

/// Presentation style for turning a [`GenerationReport`] into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportRenderMode {
    PlainText,
    RichText,
}

/// Stage counters of one track, useful when no route came out.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct TrackStats {
    pub mode: GraphMode,
    pub fragments: usize,
    pub feasible: usize,
    pub combos: usize,
    pub candidates: usize,
}

/// A generated route as presented to the rider.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GeneratedRoute {
    pub id: String,
    pub title: String,
    pub mode: GraphMode,
    pub distance: f64,
    pub familiarity_score: Option<f64>,
    pub reused: bool,
    pub parts: Vec<PartRef>,
    pub waypoints: Vec<GeoPoint>,
    /// Rider feedback, filled in once the route has been ridden.
    pub rating: Option<u8>,
}

/// Outcome of one generation request.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GenerationReport {
    pub start: GeoPoint,
    pub end: GeoPoint,
    pub distance: f64,
    pub preference: Preference,
    pub difficulty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    pub generated_at: String,
    pub tracks: Vec<TrackStats>,
    pub routes: Vec<GeneratedRoute>,
}

impl GenerationReport {
    pub fn from_generation(generation: &Generation) -> Self {
        let query = &generation.query;
        let tracks = generation
            .tracks()
            .iter()
            .map(|track| TrackStats {
                mode: track.mode,
                fragments: track.fragments.len(),
                feasible: track.feasible.len(),
                combos: track.combos.len(),
                candidates: track.candidates.len(),
            })
            .collect();
        let routes = generation
            .routes
            .iter()
            .map(|route| GeneratedRoute {
                id: route.id.clone(),
                title: route.title.clone(),
                mode: route.candidate.mode,
                distance: route.candidate.distance,
                familiarity_score: route.candidate.familiarity_score,
                reused: route.reused,
                parts: route.candidate.parts.clone(),
                waypoints: route.candidate.waypoints.clone(),
                rating: None,
            })
            .collect();

        Self {
            start: query.start,
            end: query.end,
            distance: query.distance,
            preference: query.preference,
            difficulty: query.difficulty.clone(),
            user: query.user.clone(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            tracks,
            routes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Render the report using the requested textual mode.
    pub fn render(&self, mode: ReportRenderMode) -> String {
        match mode {
            ReportRenderMode::PlainText => self.render_plain(),
            ReportRenderMode::RichText => self.render_rich(),
        }
    }

    fn render_plain(&self) -> String {
        let mut buffer = String::new();
        let _ = writeln!(
            buffer,
            "Routes from {:.5},{:.5} to {:.5},{:.5} ({:.1} km, preference: {})",
            self.start.lat,
            self.start.lng,
            self.end.lat,
            self.end.lng,
            self.distance / 1000.0,
            self.preference
        );

        if self.routes.is_empty() {
            let _ = writeln!(buffer, "No route found.");
            for track in &self.tracks {
                let _ = writeln!(
                    buffer,
                    "  {}: {} fragments, {} feasible, {} combos, {} candidates",
                    track.mode, track.fragments, track.feasible, track.combos, track.candidates
                );
            }
            return buffer;
        }

        for (index, route) in self.routes.iter().enumerate() {
            let _ = writeln!(
                buffer,
                "{:>2}: {} [{}] {:.2} km, familiarity {}",
                index + 1,
                route.title,
                route.mode,
                route.distance / 1000.0,
                format_score(route.familiarity_score)
            );
            let parts = route
                .parts
                .iter()
                .map(|part| part.title.as_str())
                .collect::<Vec<_>>()
                .join(" -> ");
            let _ = writeln!(buffer, "    via {parts}");
        }
        buffer
    }

    fn render_rich(&self) -> String {
        let mut buffer = String::new();
        let _ = writeln!(
            buffer,
            "**{:.1} km** around _{:.5}, {:.5}_ (`{}`)",
            self.distance / 1000.0,
            self.start.lat,
            self.start.lng,
            self.preference
        );
        if self.routes.is_empty() {
            let _ = writeln!(buffer, "_No route found._");
        }
        for route in &self.routes {
            let _ = writeln!(
                buffer,
                "* **{}** ({}, familiarity {}) `{}`",
                route.title,
                route.mode,
                format_score(route.familiarity_score),
                &route.id[..route.id.len().min(12)]
            );
            for part in &route.parts {
                let _ = writeln!(
                    buffer,
                    "  * {} _{}_ ({})",
                    part.title,
                    part.kind,
                    part.direction.as_str()
                );
            }
        }
        buffer
    }
}

fn format_score(score: Option<f64>) -> String {
    score.map_or_else(|| "n/a".to_string(), |score| format!("{:.0}%", score * 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::GenerationQuery;

    #[test]
    fn empty_report_explains_itself() {
        let query = GenerationQuery::round_trip(GeoPoint::new(49.2354, 6.9969), 20_000.0);
        let report = GenerationReport::from_generation(&Generation::new(query));
        assert!(report.is_empty());
        assert_eq!(report.tracks.len(), 2);
        let text = report.render(ReportRenderMode::PlainText);
        assert!(text.contains("No route found."));
        assert!(text.contains("explorative: 0 fragments"));
    }

    #[test]
    fn json_omits_anonymous_user() {
        let query = GenerationQuery::round_trip(GeoPoint::new(49.2354, 6.9969), 20_000.0);
        let report = GenerationReport::from_generation(&Generation::new(query));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["preference"], "familiar");
        assert!(json["routes"].as_array().unwrap().is_empty());
        assert!(json.get("user").is_none());
    }

    #[test]
    fn scores_render_as_percentages() {
        assert_eq!(format_score(Some(0.4)), "40%");
        assert_eq!(format_score(None), "n/a");
    }
}
