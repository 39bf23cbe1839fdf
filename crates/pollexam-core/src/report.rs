//! Exam report types with JSON persistence.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{GroupId, Outcome, Question, UserResult};
use crate::traits::MessageId;

/// Session parameters shared by announcements, renderers and reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamSummary {
    pub session_id: Uuid,
    pub group: GroupId,
    pub exam_name: String,
    pub total_questions: usize,
    pub time_per_question: u32,
    pub mark_per_correct: f64,
    pub penalty_per_wrong: f64,
}

/// A finalized result with its 1-based leaderboard position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub rank: usize,
    pub result: UserResult,
}

/// How a session came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEnd {
    /// Every question was presented and its window ran out.
    Completed,
    /// An admin stopped the session.
    Stopped,
    /// Presenting a question failed and the run was cut short.
    TransportFailed,
}

impl SessionEnd {
    pub fn ended_early(self) -> bool {
        !matches!(self, SessionEnd::Completed)
    }
}

/// Everything a finalized session produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamReport {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub summary: ExamSummary,
    pub ended: SessionEnd,
    /// Number of questions actually presented.
    pub presented: usize,
    pub questions: Vec<Question>,
    /// Question index → message holding its poll.
    #[serde(default)]
    pub question_messages: BTreeMap<usize, MessageId>,
    pub ranked: Vec<RankedResult>,
    /// Wall-clock duration of the session in milliseconds.
    pub duration_ms: u64,
}

/// A question reference inside a private breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionRef {
    /// 1-based question number.
    pub number: usize,
    #[serde(default)]
    pub link: Option<String>,
}

/// One participant's private view of the results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantBreakdown {
    pub summary: ExamSummary,
    pub rank: usize,
    pub result: UserResult,
    pub correct: Vec<QuestionRef>,
    pub wrong: Vec<QuestionRef>,
    pub skipped: Vec<QuestionRef>,
}

impl ExamReport {
    /// Build the private breakdown for every ranked participant.
    ///
    /// `public_username` selects `t.me/<name>/<id>` links; without it the
    /// private `t.me/c/...` form is used.
    pub fn breakdowns(&self, public_username: Option<&str>) -> Vec<ParticipantBreakdown> {
        self.ranked
            .iter()
            .map(|ranked| {
                let mut breakdown = ParticipantBreakdown {
                    summary: self.summary.clone(),
                    rank: ranked.rank,
                    result: ranked.result.clone(),
                    correct: Vec::new(),
                    wrong: Vec::new(),
                    skipped: Vec::new(),
                };
                for index in 0..self.summary.total_questions {
                    let item = QuestionRef {
                        number: index + 1,
                        link: self.question_messages.get(&index).map(|&msg| {
                            message_link(self.summary.group, msg, public_username)
                        }),
                    };
                    match ranked.result.answers.get(&index) {
                        Some(Outcome::Correct) => breakdown.correct.push(item),
                        Some(Outcome::Wrong) => breakdown.wrong.push(item),
                        _ => breakdown.skipped.push(item),
                    }
                }
                breakdown
            })
            .collect()
    }

    /// Look up a participant's ranked entry.
    pub fn result_for(&self, user: i64) -> Option<&RankedResult> {
        self.ranked.iter().find(|r| r.result.participant.id == user)
    }

    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: ExamReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }
}

/// Deep link to a message in a group.
pub fn message_link(group: GroupId, message: MessageId, public_username: Option<&str>) -> String {
    if let Some(name) = public_username.filter(|n| !n.is_empty()) {
        return format!("https://t.me/{}/{message}", name.trim_start_matches('@'));
    }
    // Supergroup ids carry a -100 prefix that the c/ form omits.
    let raw = group.unsigned_abs().to_string();
    let internal = raw.strip_prefix("100").unwrap_or(&raw);
    format!("https://t.me/c/{internal}/{message}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Participant;
    use crate::scoring::{apply_answer, rank, settle};

    fn summary(total: usize) -> ExamSummary {
        ExamSummary {
            session_id: Uuid::nil(),
            group: -1001234567890,
            exam_name: "Chemistry".into(),
            total_questions: total,
            time_per_question: 30,
            mark_per_correct: 1.0,
            penalty_per_wrong: 0.25,
        }
    }

    fn report() -> ExamReport {
        let mut a = UserResult::new(Participant::new(1, "A"));
        apply_answer(&mut a, 0, 0, 0, 1.0, 0.25);
        apply_answer(&mut a, 2, 1, 0, 1.0, 0.25);
        settle(&mut a, 3);
        let questions = (0..3)
            .map(|i| Question::new(format!("q{i}"), vec!["x".into(), "y".into()], 0).unwrap())
            .collect();
        ExamReport {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            summary: summary(3),
            ended: SessionEnd::Completed,
            presented: 3,
            questions,
            question_messages: BTreeMap::from([(0, 10), (1, 11), (2, 12)]),
            ranked: rank(vec![a]),
            duration_ms: 1000,
        }
    }

    #[test]
    fn private_message_link() {
        assert_eq!(
            message_link(-1001234567890, 42, None),
            "https://t.me/c/1234567890/42"
        );
    }

    #[test]
    fn public_message_link() {
        assert_eq!(
            message_link(-1001234567890, 42, Some("@physics_club")),
            "https://t.me/physics_club/42"
        );
    }

    #[test]
    fn breakdown_partitions_questions() {
        let report = report();
        let breakdowns = report.breakdowns(None);
        assert_eq!(breakdowns.len(), 1);
        let b = &breakdowns[0];
        assert_eq!(b.rank, 1);
        assert_eq!(b.correct.len(), 1);
        assert_eq!(b.wrong.len(), 1);
        assert_eq!(b.skipped.len(), 1);
        assert_eq!(b.skipped[0].number, 2);
        assert_eq!(
            b.wrong[0].link.as_deref(),
            Some("https://t.me/c/1234567890/12")
        );
    }

    #[test]
    fn save_and_load_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports/report.json");
        let report = report();
        report.save_json(&path).unwrap();

        let loaded = ExamReport::load_json(&path).unwrap();
        assert_eq!(loaded.id, report.id);
        assert_eq!(loaded.ranked, report.ranked);
        assert_eq!(loaded.ended, SessionEnd::Completed);
    }
}
