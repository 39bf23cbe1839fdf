//! Scoring and ranking.
//!
//! Negative marking: a wrong answer subtracts the penalty, a skipped question
//! costs nothing. Scores are never clamped.

use std::cmp::Ordering;

use crate::model::{Outcome, UserResult};
use crate::report::RankedResult;

/// Score one chosen option against the question's correct index.
pub fn apply_answer(
    result: &mut UserResult,
    index: usize,
    correct_index: usize,
    chosen: usize,
    mark_per_correct: f64,
    penalty_per_wrong: f64,
) -> Outcome {
    let outcome = if chosen == correct_index {
        result.correct += 1;
        result.score += mark_per_correct;
        Outcome::Correct
    } else {
        result.wrong += 1;
        result.score -= penalty_per_wrong;
        Outcome::Wrong
    };
    result.answers.insert(index, outcome);
    outcome
}

/// Fill in skipped counts and tag every unanswered index as skipped.
pub fn settle(result: &mut UserResult, total_questions: usize) {
    let total = u32::try_from(total_questions).unwrap_or(u32::MAX);
    result.skipped = total.saturating_sub(result.answered());
    for index in 0..total_questions {
        result.answers.entry(index).or_insert(Outcome::Skipped);
    }
}

/// Order by score, then by correct count, both descending.
///
/// The sort is stable: participants equal on both keys keep the order in
/// which they first appeared.
pub fn rank(mut results: Vec<UserResult>) -> Vec<RankedResult> {
    results.sort_by(compare);
    results
        .into_iter()
        .enumerate()
        .map(|(i, result)| RankedResult { rank: i + 1, result })
        .collect()
}

fn compare(a: &UserResult, b: &UserResult) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.correct.cmp(&a.correct))
}
