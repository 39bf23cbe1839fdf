//! Private per-participant result message.

use std::fmt::Write;

use pollexam_core::report::{ParticipantBreakdown, QuestionRef};

const MOTIVATION: &str = "Keep going. Small progress every day adds up to big results. \
Review the questions you missed and your next attempt will be better.";

/// Plain-text breakdown sent privately after an exam.
pub fn render_breakdown(breakdown: &ParticipantBreakdown) -> String {
    let summary = &breakdown.summary;
    let result = &breakdown.result;
    let mut text = String::new();

    let _ = writeln!(text, "Exam: {}", summary.exam_name);
    let _ = writeln!(text, "Rank: {}", breakdown.rank);
    text.push('\n');
    let _ = writeln!(text, "Total questions: {}", summary.total_questions);
    let _ = writeln!(text, "Correct: {}", result.correct);
    let _ = writeln!(text, "Wrong: {}", result.wrong);
    let _ = writeln!(text, "Skipped: {}", result.skipped);
    text.push('\n');
    let _ = writeln!(text, "Mark per question: +{}", summary.mark_per_correct);
    let _ = writeln!(text, "Negative: -{}", summary.penalty_per_wrong);
    let _ = writeln!(text, "Total score: {:.2}", result.score);
    text.push('\n');
    let _ = writeln!(text, "Motivation\n{MOTIVATION}");
    text.push('\n');
    push_section(&mut text, "Correct", &breakdown.correct);
    text.push('\n');
    push_section(&mut text, "Wrong", &breakdown.wrong);
    text.push('\n');
    push_section(&mut text, "Skipped", &breakdown.skipped);

    text.truncate(text.trim_end().len());
    text
}

fn push_section(text: &mut String, title: &str, items: &[QuestionRef]) {
    let _ = writeln!(text, "{title} (serial + link)");
    if items.is_empty() {
        text.push_str("None\n");
        return;
    }
    for item in items {
        match &item.link {
            Some(link) => {
                let _ = writeln!(text, "{} - {link}", item.number);
            }
            None => {
                let _ = writeln!(text, "{}", item.number);
            }
        }
    }
}
