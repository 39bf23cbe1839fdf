//! Test doubles shared by the engine and finalizer tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::watch;

use crate::engine::{EngineConfig, SessionEngine};
use crate::memory::{InMemoryPresetStore, InMemoryQuestionBank};
use crate::model::{GroupId, Question, UserId};
use crate::report::ExamSummary;
use crate::session::lock;
use crate::traits::{Artifact, MessageId, PresentedQuestion, Renderer, Transport};

pub(crate) fn question(correct: usize) -> Question {
    Question::new(
        format!("which is option {correct}?"),
        vec!["a".into(), "b".into(), "c".into(), "d".into()],
        correct,
    )
    .unwrap()
}

pub(crate) fn engine_with(
    transport: Arc<dyn Transport>,
    renderer: Arc<dyn Renderer>,
    config: EngineConfig,
) -> SessionEngine {
    SessionEngine::new(
        Arc::new(InMemoryQuestionBank::new()),
        Arc::new(InMemoryPresetStore::new()),
        transport,
        renderer,
        config,
    )
}

#[derive(Default)]
struct Log {
    announcements: usize,
    countdown: Vec<u32>,
    presented: Vec<(usize, String)>,
    results: Vec<String>,
    notified: Vec<(UserId, String)>,
    reports: Vec<UserId>,
}

/// Transport that records calls in memory.
pub(crate) struct RecordingTransport {
    fail_at: Option<usize>,
    fail_notifications: bool,
    log: Mutex<Log>,
    questions_tx: watch::Sender<usize>,
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self {
            fail_at: None,
            fail_notifications: false,
            log: Mutex::new(Log::default()),
            questions_tx: watch::channel(0).0,
        }
    }
}

impl RecordingTransport {
    pub(crate) fn failing_at(index: usize) -> Self {
        Self {
            fail_at: Some(index),
            ..Default::default()
        }
    }

    pub(crate) fn failing_notifications() -> Self {
        Self {
            fail_notifications: true,
            ..Default::default()
        }
    }

    pub(crate) async fn wait_for_questions(&self, n: usize) {
        let mut rx = self.questions_tx.subscribe();
        let _ = rx.wait_for(|count| *count >= n).await;
    }

    pub(crate) fn presented_indices(&self) -> Vec<usize> {
        lock(&self.log).presented.iter().map(|(i, _)| *i).collect()
    }

    pub(crate) fn poll_id(&self, index: usize) -> Option<String> {
        lock(&self.log)
            .presented
            .iter()
            .find(|(i, _)| *i == index)
            .map(|(_, poll)| poll.clone())
    }

    pub(crate) fn countdown_updates(&self) -> Vec<u32> {
        lock(&self.log).countdown.clone()
    }

    pub(crate) fn announcements(&self) -> usize {
        lock(&self.log).announcements
    }

    pub(crate) fn results_announced(&self) -> usize {
        lock(&self.log).results.len()
    }

    pub(crate) fn result_captions(&self) -> Vec<String> {
        lock(&self.log).results.clone()
    }

    pub(crate) fn notified(&self) -> Vec<(UserId, String)> {
        lock(&self.log).notified.clone()
    }

    pub(crate) fn reports_delivered(&self) -> Vec<UserId> {
        lock(&self.log).reports.clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn name(&self) -> &str {
        "recording"
    }

    async fn present_question(
        &self,
        group: GroupId,
        index: usize,
        _total: usize,
        _question: &Question,
        _window_secs: u32,
    ) -> anyhow::Result<PresentedQuestion> {
        if self.fail_at == Some(index) {
            anyhow::bail!("send failed");
        }
        let poll_id = format!("poll-{group}-{index}");
        let count = {
            let mut log = lock(&self.log);
            log.presented.push((index, poll_id.clone()));
            log.presented.len()
        };
        self.questions_tx.send_replace(count);
        Ok(PresentedQuestion {
            poll_id,
            message_id: Some(100 + index as MessageId),
        })
    }

    async fn announce_start(
        &self,
        _group: GroupId,
        _summary: &ExamSummary,
        _countdown_secs: u32,
    ) -> anyhow::Result<Option<MessageId>> {
        lock(&self.log).announcements += 1;
        Ok(Some(1))
    }

    async fn update_countdown(
        &self,
        _group: GroupId,
        _message: MessageId,
        _summary: &ExamSummary,
        seconds_left: u32,
    ) -> anyhow::Result<()> {
        lock(&self.log).countdown.push(seconds_left);
        Ok(())
    }

    async fn announce_result(
        &self,
        _group: GroupId,
        _leaderboard: &Artifact,
        caption: &str,
    ) -> anyhow::Result<()> {
        lock(&self.log).results.push(caption.to_string());
        Ok(())
    }

    async fn notify_participant(&self, user: UserId, text: &str) -> anyhow::Result<()> {
        if self.fail_notifications {
            anyhow::bail!("user {user} blocked the bot");
        }
        lock(&self.log).notified.push((user, text.to_string()));
        Ok(())
    }

    async fn deliver_report(
        &self,
        recipient: UserId,
        _report: &Artifact,
        _caption: &str,
    ) -> anyhow::Result<()> {
        lock(&self.log).reports.push(recipient);
        Ok(())
    }
}
