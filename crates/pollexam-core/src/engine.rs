//! Session engine: start, dispatch, stop and scheduled starts.
//!
//! One tokio task per running session drives the question sequence. Answers
//! are recorded synchronously from whatever task receives them.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{ScheduleError, StartError};
use crate::model::{GroupId, Participant, PresetOverride, UserId};
use crate::registry::SessionRegistry;
use crate::report::{ExamReport, SessionEnd};
use crate::scheduler::{Scheduler, SCHEDULED_START};
use crate::session::{read, write, AnswerEvent, ExamSession, RecordOutcome};
use crate::traits::{PresetStore, QuestionBank, Renderer, Transport};

/// Configuration for the session engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Extra wait after each answer window before the next question.
    pub grace: Duration,
    /// Length of the intro countdown in seconds. Zero skips the wait.
    pub countdown_secs: u32,
    /// Entries shown on the group leaderboard.
    pub leaderboard_top_n: usize,
    /// Users who privately receive the full report.
    pub report_recipients: Vec<UserId>,
    /// Public usernames of groups, used for question links.
    pub group_usernames: HashMap<GroupId, String>,
    /// Where finalized reports are saved as JSON, if anywhere.
    pub report_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(2),
            countdown_secs: 5,
            leaderboard_top_n: 10,
            report_recipients: Vec::new(),
            group_usernames: HashMap::new(),
            report_dir: None,
        }
    }
}

/// Handle to a started session.
#[derive(Debug)]
pub struct SessionHandle {
    pub session_id: Uuid,
    pub group: GroupId,
    /// The dispatch task. Yields the report when the task itself finalized
    /// the session, `None` when `stop_session` got there first.
    pub task: JoinHandle<Option<ExamReport>>,
}

pub(crate) struct EngineInner {
    pub(crate) bank: Arc<dyn QuestionBank>,
    pub(crate) presets: Arc<dyn PresetStore>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) renderer: Arc<dyn Renderer>,
    pub(crate) registry: SessionRegistry,
    pub(crate) scheduler: Scheduler,
    pub(crate) config: EngineConfig,
    /// Usernames seen on inbound commands; these win over the configured ones.
    pub(crate) learned_usernames: RwLock<HashMap<GroupId, String>>,
}

/// The session engine. Cheap to clone; clones share registry and scheduler.
#[derive(Clone)]
pub struct SessionEngine {
    pub(crate) inner: Arc<EngineInner>,
}

impl SessionEngine {
    pub fn new(
        bank: Arc<dyn QuestionBank>,
        presets: Arc<dyn PresetStore>,
        transport: Arc<dyn Transport>,
        renderer: Arc<dyn Renderer>,
        config: EngineConfig,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                bank,
                presets,
                transport,
                renderer,
                registry: SessionRegistry::new(),
                scheduler: Scheduler::new(),
                config,
                learned_usernames: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Start a session for `group` and spawn its dispatch task.
    ///
    /// Nothing is changed when a precondition fails.
    pub async fn start_session(
        &self,
        group: GroupId,
        initiator: UserId,
    ) -> Result<SessionHandle, StartError> {
        if self.inner.registry.get(group).is_some() {
            return Err(StartError::AlreadyRunning(group));
        }
        let questions = self.inner.bank.snapshot().await.map_err(StartError::Store)?;
        if questions.is_empty() {
            return Err(StartError::EmptyBank);
        }
        let preset = self.inner.presets.get(group).await.map_err(StartError::Store)?;
        if !preset.ready {
            return Err(StartError::PresetNotReady(group));
        }

        let session = Arc::new(ExamSession::new(group, &preset, questions));
        self.inner.registry.try_register(Arc::clone(&session))?;

        tracing::info!(
            group,
            initiator,
            session = %session.id(),
            exam = %preset.exam_name,
            questions = session.total_questions(),
            "exam session started"
        );

        let engine = self.clone();
        let task_session = Arc::clone(&session);
        let task = tokio::spawn(async move { engine.run(task_session).await });

        Ok(SessionHandle {
            session_id: session.id(),
            group,
            task,
        })
    }

    /// Apply a one-shot preset override, then start.
    ///
    /// The override is validated and the start preconditions that do not
    /// depend on the preset are checked before anything is saved.
    pub async fn start_with_override(
        &self,
        group: GroupId,
        initiator: UserId,
        overrides: PresetOverride,
    ) -> Result<SessionHandle, StartError> {
        if self.inner.registry.get(group).is_some() {
            return Err(StartError::AlreadyRunning(group));
        }
        if self.inner.bank.len().await.map_err(StartError::Store)? == 0 {
            return Err(StartError::EmptyBank);
        }
        let mut preset = self.inner.presets.get(group).await.map_err(StartError::Store)?;
        preset.apply_override(overrides)?;
        self.inner
            .presets
            .save(group, &preset)
            .await
            .map_err(StartError::Store)?;
        self.start_session(group, initiator).await
    }

    /// Stop the group's running session and finalize it right away.
    ///
    /// Returns `false` if no active session exists; repeated calls are no-ops.
    pub async fn stop_session(&self, group: GroupId) -> bool {
        let Some(session) = self.inner.registry.get(group) else {
            return false;
        };
        if !session.request_stop() {
            return false;
        }
        tracing::info!(group, session = %session.id(), "exam session stopped");
        self.finalize(&session, SessionEnd::Stopped).await;
        true
    }

    /// Route an inbound poll answer to its session.
    pub fn record_answer(&self, event: AnswerEvent) -> RecordOutcome {
        let Some((session, index)) = self.inner.registry.route(&event.poll_id) else {
            tracing::debug!(poll = %event.poll_id, "answer for unknown poll");
            return RecordOutcome::UnknownPoll;
        };
        let user = event.participant.id;
        let outcome = session.record(index, event.participant, event.choice);
        tracing::debug!(group = session.group(), user, index, ?outcome, "answer recorded");
        outcome
    }

    /// Make a participant show up in the group's results without answering.
    pub fn register_participant(&self, group: GroupId, participant: Participant) -> bool {
        self.inner
            .registry
            .get(group)
            .is_some_and(|s| s.register_participant(participant))
    }

    /// Remember the group's public username for question links.
    pub fn set_group_username(&self, group: GroupId, username: Option<&str>) {
        let mut learned = write(&self.inner.learned_usernames);
        match username.filter(|u| !u.is_empty()) {
            Some(name) => {
                learned.insert(group, name.to_string());
            }
            None => {
                learned.remove(&group);
            }
        }
    }

    /// Public username used in links to the group's messages.
    pub fn group_username(&self, group: GroupId) -> Option<String> {
        read(&self.inner.learned_usernames)
            .get(&group)
            .or_else(|| self.inner.config.group_usernames.get(&group))
            .cloned()
    }

    /// Start the group's session at `fire_at`, replacing any pending schedule.
    ///
    /// Start failures at fire time are logged, not surfaced.
    pub fn schedule_start(
        &self,
        group: GroupId,
        fire_at: DateTime<Utc>,
        initiator: UserId,
    ) -> Result<(), ScheduleError> {
        let engine = self.clone();
        self.inner
            .scheduler
            .schedule(group, SCHEDULED_START, fire_at, move || async move {
                if let Err(e) = engine.start_session(group, initiator).await {
                    tracing::warn!(group, "scheduled exam did not start: {e}");
                }
            })?;
        tracing::info!(group, initiator, %fire_at, "exam start scheduled");
        Ok(())
    }

    pub fn cancel_scheduled_start(&self, group: GroupId) -> bool {
        self.inner.scheduler.cancel(group, SCHEDULED_START)
    }

    pub fn pending_start(&self, group: GroupId) -> Option<DateTime<Utc>> {
        self.inner.scheduler.pending(group, SCHEDULED_START)
    }

    /// The group's registered session, if any.
    pub fn session(&self, group: GroupId) -> Option<Arc<ExamSession>> {
        self.inner.registry.get(group)
    }

    /// Number of sessions still dispatching questions.
    pub fn active_sessions(&self) -> usize {
        self.inner.registry.active_count()
    }

    pub fn running_groups(&self) -> Vec<GroupId> {
        self.inner.registry.groups()
    }

    pub fn scheduled_count(&self) -> usize {
        self.inner.scheduler.pending_count()
    }

    /// Cancel every pending schedule and stop every running session.
    pub async fn shutdown(&self) {
        self.inner.scheduler.shutdown();
        for group in self.inner.registry.groups() {
            self.stop_session(group).await;
        }
    }

    async fn run(self, session: Arc<ExamSession>) -> Option<ExamReport> {
        let mut stop = session.stop_signal();
        let end = if self.introduce(&session, &mut stop).await {
            SessionEnd::Stopped
        } else {
            self.dispatch(&session, &mut stop).await
        };
        session.deactivate();
        self.finalize(&session, end).await
    }

    /// Announce, pin and count down. Every failure here is swallowed.
    /// Returns `true` if the session was stopped meanwhile.
    async fn introduce(&self, session: &ExamSession, stop: &mut watch::Receiver<bool>) -> bool {
        let group = session.group();
        let summary = session.summary();
        let countdown = self.inner.config.countdown_secs;
        let transport = &self.inner.transport;

        let message = match transport.announce_start(group, &summary, countdown).await {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(group, "failed to announce exam: {e:#}");
                None
            }
        };
        if let Some(message) = message {
            if let Err(e) = transport.pin_message(group, message).await {
                tracing::warn!(group, "failed to pin announcement: {e:#}");
            }
        }

        for seconds_left in (1..countdown).rev() {
            if wait_or_stop(stop, Duration::from_secs(1)).await {
                return true;
            }
            if let Some(message) = message {
                if let Err(e) = transport
                    .update_countdown(group, message, &summary, seconds_left)
                    .await
                {
                    tracing::debug!(group, "countdown edit failed: {e:#}");
                }
            }
        }
        countdown > 0 && wait_or_stop(stop, Duration::from_secs(1)).await
    }

    async fn dispatch(
        &self,
        session: &Arc<ExamSession>,
        stop: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        let group = session.group();
        let total = session.total_questions();
        let window_secs = session.time_per_question();
        let wait = Duration::from_secs(u64::from(window_secs)) + self.inner.config.grace;

        for (index, question) in session.questions().iter().enumerate() {
            if !session.is_active() {
                return SessionEnd::Stopped;
            }
            session.set_current_index(index);

            let presented = match self
                .inner
                .transport
                .present_question(group, index, total, question, window_secs)
                .await
            {
                Ok(presented) => presented,
                Err(e) => {
                    tracing::error!(
                        group,
                        session = %session.id(),
                        index,
                        "failed to present question, ending exam early: {e:#}"
                    );
                    session.deactivate();
                    return SessionEnd::TransportFailed;
                }
            };
            session.begin_question(index, &presented);
            self.inner
                .registry
                .index_poll(presented.poll_id.clone(), session, index);
            tracing::debug!(group, index, poll = %presented.poll_id, "question presented");

            if wait_or_stop(stop, wait).await {
                return SessionEnd::Stopped;
            }
        }
        SessionEnd::Completed
    }
}

/// Sleep for `duration` unless the stop signal fires first.
/// Returns `true` if stopped.
async fn wait_or_stop(stop: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    let sleep = tokio::time::sleep(duration);
    tokio::pin!(sleep);
    let stopped = tokio::select! {
        _ = &mut sleep => return false,
        changed = stop.wait_for(|stopped| *stopped) => changed.is_ok(),
    };
    if !stopped {
        // Sender gone; nothing can interrupt the wait any more.
        sleep.await;
    }
    stopped
}
