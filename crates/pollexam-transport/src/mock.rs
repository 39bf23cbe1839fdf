//! Mock transport for tests and offline simulation.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::watch;

use pollexam_core::model::{GroupId, Question, UserId};
use pollexam_core::report::ExamSummary;
use pollexam_core::traits::{Artifact, MessageId, PresentedQuestion, Transport};

/// Everything the mock was asked to send, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum MockEvent {
    Announced { group: GroupId, message: MessageId },
    Countdown { group: GroupId, seconds_left: u32 },
    Pinned { group: GroupId, message: MessageId },
    Question { group: GroupId, index: usize, poll_id: String },
    Leaderboard { group: GroupId, artifact: Artifact, caption: String },
    Notified { user: UserId, text: String },
    Report { recipient: UserId, artifact: Artifact },
}

/// A transport that records calls instead of sending anything.
///
/// Poll ids are `poll-{group}-{index}`; message ids count up from 1.
pub struct MockTransport {
    fail_question_at: Option<usize>,
    fail_notifications: bool,
    call_count: AtomicU32,
    events: Mutex<Vec<MockEvent>>,
    questions: watch::Sender<usize>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self {
            fail_question_at: None,
            fail_notifications: false,
            call_count: AtomicU32::new(0),
            events: Mutex::new(Vec::new()),
            questions: watch::channel(0).0,
        }
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail presenting the question at `index` (zero-based).
    pub fn failing_question_at(index: usize) -> Self {
        Self {
            fail_question_at: Some(index),
            ..Self::default()
        }
    }

    /// Fail every private notification, as if every user blocked the bot.
    pub fn failing_notifications() -> Self {
        Self {
            fail_notifications: true,
            ..Self::default()
        }
    }

    /// Total number of transport calls made.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn events(&self) -> Vec<MockEvent> {
        self.lock().clone()
    }

    /// Resolve once at least `n` questions have been presented.
    pub async fn wait_for_questions(&self, n: usize) {
        let mut rx = self.questions.subscribe();
        // The sender lives in `self`, so this only ends when the count is reached.
        let _ = rx.wait_for(|count| *count >= n).await;
    }

    pub fn questions_presented(&self) -> usize {
        *self.questions.borrow()
    }

    /// Poll id of the question at `index` in `group`, once presented.
    pub fn poll_id(&self, group: GroupId, index: usize) -> Option<String> {
        self.lock().iter().find_map(|e| match e {
            MockEvent::Question {
                group: g,
                index: i,
                poll_id,
            } if *g == group && *i == index => Some(poll_id.clone()),
            _ => None,
        })
    }

    pub fn leaderboards(&self) -> Vec<(Artifact, String)> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                MockEvent::Leaderboard {
                    artifact, caption, ..
                } => Some((artifact.clone(), caption.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn notifications(&self) -> Vec<(UserId, String)> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                MockEvent::Notified { user, text } => Some((*user, text.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn reports(&self) -> Vec<(UserId, Artifact)> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                MockEvent::Report {
                    recipient,
                    artifact,
                } => Some((*recipient, artifact.clone())),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<MockEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, event: MockEvent) -> usize {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        let mut events = self.lock();
        events.push(event);
        events.len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn present_question(
        &self,
        group: GroupId,
        index: usize,
        _total: usize,
        _question: &Question,
        _window_secs: u32,
    ) -> anyhow::Result<PresentedQuestion> {
        if self.fail_question_at == Some(index) {
            self.call_count.fetch_add(1, Ordering::Relaxed);
            anyhow::bail!("mock failure presenting question {index}");
        }
        let poll_id = format!("poll-{group}-{index}");
        let message = self.record(MockEvent::Question {
            group,
            index,
            poll_id: poll_id.clone(),
        });
        self.questions.send_modify(|count| *count += 1);
        Ok(PresentedQuestion {
            poll_id,
            message_id: Some(message as MessageId),
        })
    }

    async fn announce_start(
        &self,
        group: GroupId,
        _summary: &ExamSummary,
        _countdown_secs: u32,
    ) -> anyhow::Result<Option<MessageId>> {
        let message = self.lock().len() as MessageId + 1;
        self.record(MockEvent::Announced { group, message });
        Ok(Some(message))
    }

    async fn update_countdown(
        &self,
        group: GroupId,
        _message: MessageId,
        _summary: &ExamSummary,
        seconds_left: u32,
    ) -> anyhow::Result<()> {
        self.record(MockEvent::Countdown {
            group,
            seconds_left,
        });
        Ok(())
    }

    async fn pin_message(&self, group: GroupId, message: MessageId) -> anyhow::Result<()> {
        self.record(MockEvent::Pinned { group, message });
        Ok(())
    }

    async fn announce_result(
        &self,
        group: GroupId,
        leaderboard: &Artifact,
        caption: &str,
    ) -> anyhow::Result<()> {
        self.record(MockEvent::Leaderboard {
            group,
            artifact: leaderboard.clone(),
            caption: caption.to_string(),
        });
        Ok(())
    }

    async fn notify_participant(&self, user: UserId, text: &str) -> anyhow::Result<()> {
        if self.fail_notifications {
            self.call_count.fetch_add(1, Ordering::Relaxed);
            anyhow::bail!("mock: user {user} blocked the bot");
        }
        self.record(MockEvent::Notified {
            user,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn deliver_report(
        &self,
        recipient: UserId,
        report: &Artifact,
        _caption: &str,
    ) -> anyhow::Result<()> {
        self.record(MockEvent::Report {
            recipient,
            artifact: report.clone(),
        });
        Ok(())
    }
}
