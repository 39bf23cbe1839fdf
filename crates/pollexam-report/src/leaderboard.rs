//! SVG leaderboard posted to the group after an exam.

use pollexam_core::report::{ExamSummary, RankedResult};

use crate::{html_escape, truncate_name};

const WIDTH: usize = 760;
const ROW_HEIGHT: usize = 56;
const HEADER_HEIGHT: usize = 120;
const BAR_X: usize = 300;
const BAR_MAX: usize = 320;

/// Render the top `top_n` entries as a standalone SVG document.
///
/// Bars are scaled against the best positive score; zero and negative
/// scores get no bar. An empty ranking renders a single placeholder row.
pub fn generate_leaderboard_svg(
    summary: &ExamSummary,
    ranked: &[RankedResult],
    top_n: usize,
) -> String {
    let shown = &ranked[..ranked.len().min(top_n)];
    let rows = shown.len().max(1);
    let height = HEADER_HEIGHT + rows * ROW_HEIGHT + 20;

    let mut svg = format!(
        "<svg width=\"{WIDTH}\" height=\"{height}\" viewBox=\"0 0 {WIDTH} {height}\" xmlns=\"http://www.w3.org/2000/svg\" font-family=\"sans-serif\">\n"
    );
    svg.push_str(&format!(
        "  <rect width=\"{WIDTH}\" height=\"{height}\" fill=\"#0a0c12\"/>\n"
    ));
    svg.push_str(&format!(
        "  <text x=\"30\" y=\"50\" font-size=\"28\" font-weight=\"bold\" fill=\"#e6f5ff\">LEADERBOARD - {}</text>\n",
        html_escape(&truncate_name(&summary.exam_name, 40))
    ));
    svg.push_str(&format!(
        "  <text x=\"30\" y=\"82\" font-size=\"14\" fill=\"#aab4c8\">{} questions | +{} per correct | -{} per wrong</text>\n",
        summary.total_questions, summary.mark_per_correct, summary.penalty_per_wrong
    ));

    if shown.is_empty() {
        let y = HEADER_HEIGHT;
        svg.push_str(&format!(
            "  <rect x=\"20\" y=\"{y}\" width=\"{}\" height=\"{}\" rx=\"12\" fill=\"#0e121c\"/>\n",
            WIDTH - 40,
            ROW_HEIGHT - 8
        ));
        svg.push_str(&format!(
            "  <text x=\"40\" y=\"{}\" font-size=\"18\" fill=\"#e6ebfa\" dominant-baseline=\"middle\">No participants</text>\n",
            y + (ROW_HEIGHT - 8) / 2
        ));
        svg.push_str("</svg>\n");
        return svg;
    }

    let best = shown
        .iter()
        .map(|r| r.result.score)
        .fold(0.0_f64, f64::max);

    for (i, entry) in shown.iter().enumerate() {
        let y = HEADER_HEIGHT + i * ROW_HEIGHT;
        let mid = y + (ROW_HEIGHT - 8) / 2;
        let result = &entry.result;

        // Podium rows are highlighted.
        let card = if entry.rank <= 3 { "#14243a" } else { "#0e121c" };
        svg.push_str(&format!(
            "  <rect x=\"20\" y=\"{y}\" width=\"{}\" height=\"{}\" rx=\"12\" fill=\"{card}\"/>\n",
            WIDTH - 40,
            ROW_HEIGHT - 8
        ));
        svg.push_str(&format!(
            "  <text x=\"40\" y=\"{mid}\" font-size=\"18\" font-weight=\"bold\" fill=\"#e6ebfa\" dominant-baseline=\"middle\">{}</text>\n",
            entry.rank
        ));
        svg.push_str(&format!(
            "  <text x=\"80\" y=\"{}\" font-size=\"16\" fill=\"#e6ebfa\">{}</text>\n",
            mid - 2,
            html_escape(&truncate_name(&result.participant.display_name(), 26))
        ));
        svg.push_str(&format!(
            "  <text x=\"80\" y=\"{}\" font-size=\"12\" fill=\"#96a0b9\">C:{}  W:{}  S:{}</text>\n",
            mid + 16,
            result.correct,
            result.wrong,
            result.skipped
        ));

        let width = if best > 0.0 && result.score > 0.0 {
            (result.score / best * BAR_MAX as f64) as usize
        } else {
            0
        };
        let color = if result.score >= best * 0.8 && result.score > 0.0 {
            "#22c55e"
        } else if result.score > 0.0 {
            "#eab308"
        } else {
            "#ef4444"
        };
        svg.push_str(&format!(
            "  <rect x=\"{BAR_X}\" y=\"{}\" width=\"{width}\" height=\"16\" fill=\"{color}\" rx=\"4\"/>\n",
            mid - 8
        ));
        svg.push_str(&format!(
            "  <text x=\"{}\" y=\"{mid}\" font-size=\"16\" fill=\"#d2ffdc\" dominant-baseline=\"middle\">{:.2}</text>\n",
            BAR_X + BAR_MAX + 20,
            result.score
        ));
    }

    svg.push_str("</svg>\n");
    svg
}
