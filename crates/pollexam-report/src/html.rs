//! HTML report generator.
//!
//! Produces a self-contained HTML file with all CSS/JS inlined.

use anyhow::Result;
use std::path::Path;

use pollexam_core::report::{ExamSummary, RankedResult};

use crate::html_escape;

/// Generate the full tabular report for a finalized exam.
pub fn generate_html(summary: &ExamSummary, ranked: &[RankedResult]) -> String {
    let mut html = String::new();

    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    html.push_str(&format!(
        "<title>Exam Report - {}</title>\n",
        html_escape(&summary.exam_name)
    ));
    html.push_str("<style>\n");
    html.push_str(CSS);
    html.push_str("</style>\n");
    html.push_str("</head>\n<body>\n");

    // Header
    html.push_str("<header>\n");
    html.push_str(&format!(
        "<h1>Exam Report - {}</h1>\n",
        html_escape(&summary.exam_name)
    ));
    html.push_str(&format!(
        "<p class=\"meta\">{} questions | {}s per question | +{} per correct | -{} per wrong | {} participants | {}</p>\n",
        summary.total_questions,
        summary.time_per_question,
        summary.mark_per_correct,
        summary.penalty_per_wrong,
        ranked.len(),
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    ));
    html.push_str("</header>\n");

    html.push_str("<section class=\"results\">\n");
    html.push_str("<h2>Results</h2>\n");
    if ranked.is_empty() {
        html.push_str("<p class=\"empty\">No participants</p>\n");
    } else {
        html.push_str("<table class=\"results-table\" id=\"results\">\n");
        html.push_str("<thead><tr><th onclick=\"sortTable(0)\">#</th><th onclick=\"sortTable(1)\">Name</th><th onclick=\"sortTable(2)\">Score</th><th onclick=\"sortTable(3)\">C</th><th onclick=\"sortTable(4)\">W</th><th onclick=\"sortTable(5)\">S</th><th>Answers</th></tr></thead>\n");
        html.push_str("<tbody>\n");

        for entry in ranked {
            let r = &entry.result;
            let score_class = if r.score < 0.0 { "fail" } else { "pass" };
            let answers: String = r.answers.values().map(|o| o.to_string()).collect();
            html.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td class=\"{}\">{:.2}</td><td>{}</td><td>{}</td><td>{}</td><td><code>{}</code></td></tr>\n",
                entry.rank,
                html_escape(&r.participant.display_name()),
                score_class,
                r.score,
                r.correct,
                r.wrong,
                r.skipped,
                answers
            ));
        }

        html.push_str("</tbody></table>\n");
    }
    html.push_str("</section>\n");

    // Raw JSON
    html.push_str("<section class=\"raw-data\">\n");
    html.push_str("<details>\n<summary>Raw JSON Data</summary>\n");
    html.push_str("<pre><code>");
    html.push_str(&html_escape(
        &serde_json::to_string_pretty(ranked).unwrap_or_default(),
    ));
    html.push_str("</code></pre>\n");
    html.push_str("</details>\n</section>\n");

    html.push_str("<script>\n");
    html.push_str(JS);
    html.push_str("</script>\n");

    html.push_str("</body>\n</html>");
    html
}

/// Write an HTML report to a file.
pub fn write_html_report(summary: &ExamSummary, ranked: &[RankedResult], path: &Path) -> Result<()> {
    let html = generate_html(summary, ranked);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, html)?;
    Ok(())
}

const CSS: &str = r#"
:root { --bg: #fff; --fg: #0f172a; --border: #e5e7eb; --stripe: #eef2ff; --pass: #065f46; --fail: #b91c1c; }
@media (prefers-color-scheme: dark) {
  :root { --bg: #0b1020; --fg: #f9fafb; --border: #374151; --stripe: #111827; --pass: #6ee7b7; --fail: #fca5a5; }
}
body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif; margin: 0; padding: 2rem; background: var(--bg); color: var(--fg); }
h1, h2 { margin-top: 2rem; }
.meta, .empty { color: #6b7280; }
table { border-collapse: collapse; width: 100%; margin: 1rem 0; }
th, td { border: 1px solid var(--border); padding: 0.5rem 1rem; text-align: left; }
th { background: var(--border); cursor: pointer; }
tbody tr:nth-child(even) { background: var(--stripe); }
.pass { color: var(--pass); font-weight: bold; }
.fail { color: var(--fail); font-weight: bold; }
pre { overflow-x: auto; padding: 1rem; background: var(--border); border-radius: 8px; }
code { font-family: 'JetBrains Mono', 'Fira Code', monospace; font-size: 0.85rem; }
details { margin: 1rem 0; }
summary { cursor: pointer; font-weight: bold; }
"#;

const JS: &str = r#"
function sortTable(col) {
  const table = document.getElementById('results');
  const tbody = table.querySelector('tbody');
  const rows = Array.from(tbody.querySelectorAll('tr'));
  const asc = table.dataset.sortCol == col && table.dataset.sortDir == 'asc' ? false : true;
  rows.sort((a, b) => {
    const va = a.cells[col].textContent;
    const vb = b.cells[col].textContent;
    const na = parseFloat(va), nb = parseFloat(vb);
    if (!isNaN(na) && !isNaN(nb)) return asc ? na - nb : nb - na;
    return asc ? va.localeCompare(vb) : vb.localeCompare(va);
  });
  table.dataset.sortCol = col;
  table.dataset.sortDir = asc ? 'asc' : 'desc';
  rows.forEach(r => tbody.appendChild(r));
}
"#;
