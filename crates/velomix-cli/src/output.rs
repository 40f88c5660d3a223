//! Output formatting for generation reports and store summaries.

use std::fmt::Write;

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;
use velomix_lib::{GeneratedRoute, GenerationReport, GraphMode, ReportRenderMode};

use crate::terminal::{format_with_separators, ColorPalette};

/// Output format selected with `--format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Plain text listing.
    #[default]
    Text,
    /// Markdown-flavoured text.
    Rich,
    /// Colored tree view of each route and its fragments.
    Enhanced,
    /// Pretty-printed JSON.
    Json,
}

/// Render a generation report in the requested format.
pub fn render_report(
    report: &GenerationReport,
    format: OutputFormat,
    palette: &ColorPalette,
) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(report.render(ReportRenderMode::PlainText)),
        OutputFormat::Rich => Ok(report.render(ReportRenderMode::RichText)),
        OutputFormat::Enhanced => Ok(render_enhanced(report, palette)),
        OutputFormat::Json => render_json(report),
    }
}

/// Serialize any summary value as pretty JSON followed by a newline.
pub fn render_json<T: Serialize>(value: &T) -> Result<String> {
    let mut json = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    json.push('\n');
    Ok(json)
}

fn render_enhanced(report: &GenerationReport, p: &ColorPalette) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}{} m{} from {:.5},{:.5} ({}, {})",
        p.cyan,
        format_with_separators(report.distance.round() as u64),
        p.reset,
        report.start.lat,
        report.start.lng,
        report.preference,
        report.difficulty
    );

    if report.is_empty() {
        let _ = writeln!(out, "{}No route found.{}", p.gray, p.reset);
        for track in &report.tracks {
            let _ = writeln!(
                out,
                "{}  {}: {} fragments, {} feasible, {} combos, {} candidates{}",
                p.gray,
                track.mode,
                track.fragments,
                track.feasible,
                track.combos,
                track.candidates,
                p.reset
            );
        }
        return out;
    }

    for route in &report.routes {
        render_enhanced_route(&mut out, route, p);
    }
    out
}

fn render_enhanced_route(out: &mut String, route: &GeneratedRoute, p: &ColorPalette) {
    let (tag_color, tag) = match route.mode {
        GraphMode::Explorative => (p.tag_explorative, "EXPL"),
        GraphMode::Familiar => (p.tag_familiar, "FAML"),
    };
    let score = route
        .familiarity_score
        .map_or_else(|| "n/a".to_string(), |s| format!("{:.0}%", s * 100.0));
    let _ = writeln!(
        out,
        "{tag_color} {tag} {reset} {bold}{title}{reset} {cyan}{distance} m{reset} {orange}familiar {score}{reset}{reused}",
        reset = p.reset,
        bold = p.white_bold,
        title = route.title,
        cyan = p.cyan,
        distance = format_with_separators(route.distance.round() as u64),
        orange = p.orange,
        reused = if route.reused { " (stored)" } else { "" },
    );

    let last = route.parts.len().saturating_sub(1);
    for (index, part) in route.parts.iter().enumerate() {
        let branch = if index == last { "└─" } else { "├─" };
        let _ = writeln!(
            out,
            "  {}{}{} {} {}({}, {}){}",
            p.gray,
            branch,
            p.reset,
            part.title,
            p.gray,
            part.kind,
            part.direction.as_str(),
            p.reset
        );
    }
}

/// Print the footer with elapsed time to stderr.
pub fn print_footer(elapsed: std::time::Duration, palette: &ColorPalette) {
    let elapsed_ms = elapsed.as_millis();
    let time_str = if elapsed_ms < 1000 {
        format!("{}ms", elapsed_ms)
    } else {
        format!("{:.2}s", elapsed.as_secs_f64())
    };
    eprintln!("{}Completed in {}{}", palette.gray, time_str, palette.reset);
}

#[cfg(test)]
mod tests {
    use super::*;
    use velomix_lib::{Generation, GenerationQuery, GeoPoint};

    fn empty_report() -> GenerationReport {
        let query = GenerationQuery::round_trip(GeoPoint::new(49.2335, 6.9967), 42_195.0);
        GenerationReport::from_generation(&Generation::new(query))
    }

    #[test]
    fn enhanced_plain_output_has_no_escape_codes() {
        let text = render_report(
            &empty_report(),
            OutputFormat::Enhanced,
            &ColorPalette::plain(),
        )
        .unwrap();
        assert!(text.starts_with("42,195 m from 49.23350,6.99670"));
        assert!(text.contains("No route found."));
        assert!(!text.contains('\x1b'));
    }

    #[test]
    fn json_output_is_parseable() {
        let text = render_report(&empty_report(), OutputFormat::Json, &ColorPalette::plain())
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["distance"], 42_195.0);
        assert_eq!(value["difficulty"], "advanced");
    }
}
