//! Collaborator traits the session engine is wired against.
//!
//! Storage and transport are async and implemented in `pollexam-transport`;
//! rendering is synchronous and implemented in `pollexam-report`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::{GroupId, Preset, Question, UserId};
use crate::report::{ExamSummary, ParticipantBreakdown, RankedResult};

/// Opaque identifier the transport assigns to a presented poll.
pub type PollId = String;

/// Chat-platform message identifier.
pub type MessageId = i64;

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Ordered collection of quiz items shared by all groups.
#[async_trait]
pub trait QuestionBank: Send + Sync {
    /// Copy of the current questions, in order.
    async fn snapshot(&self) -> anyhow::Result<Vec<Question>>;

    /// Append questions; returns the new total.
    async fn import(&self, questions: Vec<Question>) -> anyhow::Result<usize>;

    /// Remove every question.
    async fn clear(&self) -> anyhow::Result<()>;

    async fn len(&self) -> anyhow::Result<usize>;
}

/// Per-group preset records.
#[async_trait]
pub trait PresetStore: Send + Sync {
    /// The group's preset, or the default one if the group was never configured.
    async fn get(&self, group: GroupId) -> anyhow::Result<Preset>;

    async fn save(&self, group: GroupId, preset: &Preset) -> anyhow::Result<()>;

    /// Every stored preset, ordered by group id.
    async fn list(&self) -> anyhow::Result<Vec<(GroupId, Preset)>>;
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// What the transport hands back after posting a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentedQuestion {
    /// Identifier later carried by answer events for this poll.
    pub poll_id: PollId,
    /// Message holding the poll, used for links in breakdowns.
    #[serde(default)]
    pub message_id: Option<MessageId>,
}

/// Outbound side of the chat platform.
///
/// Only `present_question` failures affect a session; everything else is
/// best-effort and merely logged by the engine.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Human-readable transport name (e.g. "telegram").
    fn name(&self) -> &str;

    /// Post `question` as a single-choice poll open for `window_secs`.
    async fn present_question(
        &self,
        group: GroupId,
        index: usize,
        total: usize,
        question: &Question,
        window_secs: u32,
    ) -> anyhow::Result<PresentedQuestion>;

    /// Post the intro message. Returns its id when the countdown can be edited.
    async fn announce_start(
        &self,
        group: GroupId,
        summary: &ExamSummary,
        countdown_secs: u32,
    ) -> anyhow::Result<Option<MessageId>>;

    /// Rewrite the intro message with the remaining countdown.
    async fn update_countdown(
        &self,
        group: GroupId,
        message: MessageId,
        summary: &ExamSummary,
        seconds_left: u32,
    ) -> anyhow::Result<()>;

    async fn pin_message(&self, _group: GroupId, _message: MessageId) -> anyhow::Result<()> {
        Ok(())
    }

    /// Post the leaderboard artifact to the group.
    async fn announce_result(
        &self,
        group: GroupId,
        leaderboard: &Artifact,
        caption: &str,
    ) -> anyhow::Result<()>;

    /// Privately send a participant their breakdown.
    async fn notify_participant(&self, user: UserId, text: &str) -> anyhow::Result<()>;

    /// Privately send the full report to one recipient.
    async fn deliver_report(
        &self,
        recipient: UserId,
        report: &Artifact,
        caption: &str,
    ) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// A rendered file ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Suggested file name (e.g. "leaderboard_-100123.svg").
    pub file_name: String,
    /// MIME type of `bytes`.
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Artifact {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }
}

/// Pure rendering of finalized results.
pub trait Renderer: Send + Sync {
    /// Render the top `top_n` entries. An empty ranking still yields an artifact.
    fn render_leaderboard(
        &self,
        summary: &ExamSummary,
        ranked: &[RankedResult],
        top_n: usize,
    ) -> anyhow::Result<Artifact>;

    /// Render the full tabular report.
    fn render_report(&self, summary: &ExamSummary, ranked: &[RankedResult])
        -> anyhow::Result<Artifact>;

    /// Render one participant's private breakdown message.
    fn render_breakdown(&self, breakdown: &ParticipantBreakdown) -> anyhow::Result<String>;
}

/// Renderer producing empty artifacts.
pub struct NoopRenderer;

impl Renderer for NoopRenderer {
    fn render_leaderboard(
        &self,
        summary: &ExamSummary,
        _: &[RankedResult],
        _: usize,
    ) -> anyhow::Result<Artifact> {
        Ok(Artifact::new(
            format!("leaderboard_{}.txt", summary.group),
            "text/plain",
            Vec::new(),
        ))
    }

    fn render_report(&self, summary: &ExamSummary, _: &[RankedResult]) -> anyhow::Result<Artifact> {
        Ok(Artifact::new(
            format!("report_{}.txt", summary.group),
            "text/plain",
            Vec::new(),
        ))
    }

    fn render_breakdown(&self, _: &ParticipantBreakdown) -> anyhow::Result<String> {
        Ok(String::new())
    }
}
