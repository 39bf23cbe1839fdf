//! pollexam-report — Rendering of finalized exam results.
//!
//! [`ReportRenderer`] implements the core `Renderer` trait: an SVG
//! leaderboard for the group, a self-contained HTML report for the report
//! recipients, and a plain-text breakdown for each participant.

pub mod breakdown;
pub mod html;
pub mod leaderboard;

use pollexam_core::report::{ExamSummary, ParticipantBreakdown, RankedResult};
use pollexam_core::traits::{Artifact, Renderer};

pub use breakdown::render_breakdown;
pub use html::{generate_html, write_html_report};
pub use leaderboard::generate_leaderboard_svg;

/// Renderer used by the bot and the simulator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportRenderer;

impl ReportRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl Renderer for ReportRenderer {
    fn render_leaderboard(
        &self,
        summary: &ExamSummary,
        ranked: &[RankedResult],
        top_n: usize,
    ) -> anyhow::Result<Artifact> {
        let svg = generate_leaderboard_svg(summary, ranked, top_n);
        Ok(Artifact::new(
            format!("leaderboard_{}.svg", summary.group),
            "image/svg+xml",
            svg.into_bytes(),
        ))
    }

    fn render_report(
        &self,
        summary: &ExamSummary,
        ranked: &[RankedResult],
    ) -> anyhow::Result<Artifact> {
        let html = generate_html(summary, ranked);
        Ok(Artifact::new(
            format!("report_{}.html", summary.group),
            "text/html",
            html.into_bytes(),
        ))
    }

    fn render_breakdown(&self, breakdown: &ParticipantBreakdown) -> anyhow::Result<String> {
        Ok(render_breakdown(breakdown))
    }
}

/// Escape a string for safe HTML and SVG insertion.
pub(crate) fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// Shorten `name` to at most `max` characters, marking the cut with an ellipsis.
pub(crate) fn truncate_name(name: &str, max: usize) -> String {
    if name.chars().count() <= max {
        return name.to_string();
    }
    let mut short: String = name.chars().take(max.saturating_sub(1)).collect();
    short.push('…');
    short
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_and_truncate() {
        assert_eq!(html_escape("<a href=\"x\">&</a>"), "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;");
        assert_eq!(truncate_name("short", 10), "short");
        assert_eq!(truncate_name("abcdefghijk", 5), "abcd…");
        assert_eq!(truncate_name("ÄÖÜäöü", 6), "ÄÖÜäöü");
    }

    #[test]
    fn renderer_artifacts() {
        let renderer = ReportRenderer::new();
        let summary = fixtures::summary();
        let ranked = fixtures::ranked();

        let board = renderer.render_leaderboard(&summary, &ranked, 10).unwrap();
        assert_eq!(board.file_name, "leaderboard_-1001234567890.svg");
        assert_eq!(board.content_type, "image/svg+xml");
        assert!(board.bytes.starts_with(b"<svg"));

        let report = renderer.render_report(&summary, &ranked).unwrap();
        assert_eq!(report.file_name, "report_-1001234567890.html");
        assert_eq!(report.content_type, "text/html");
        assert!(!report.bytes.is_empty());
    }
}
