//! Session finalization: settle, rank, publish, clean up.
//!
//! Runs at most once per session. Rendering and delivery are fail-open;
//! cleanup always happens.

use std::sync::Arc;

use futures::future::join_all;

use crate::engine::SessionEngine;
use crate::report::{ExamReport, SessionEnd};
use crate::scoring::rank;
use crate::session::ExamSession;

impl SessionEngine {
    /// Finalize `session`. Returns `None` if it was already finalized.
    pub(crate) async fn finalize(
        &self,
        session: &Arc<ExamSession>,
        end: SessionEnd,
    ) -> Option<ExamReport> {
        if !session.try_finish() {
            tracing::debug!(group = session.group(), "session already finalized");
            return None;
        }
        // Wakes the dispatch task if it is still waiting.
        session.request_stop();

        let ranked = rank(session.settle_results());
        let report = ExamReport {
            id: session.id(),
            created_at: chrono::Utc::now(),
            summary: session.summary(),
            ended: end,
            presented: session.presented(),
            questions: session.questions().to_vec(),
            question_messages: session.question_messages(),
            ranked,
            duration_ms: session.elapsed_ms(),
        };
        tracing::info!(
            group = report.summary.group,
            session = %report.id,
            ended = ?end,
            presented = report.presented,
            participants = report.ranked.len(),
            "exam session finished"
        );

        self.publish(&report).await;
        self.cleanup(session).await;
        Some(report)
    }

    async fn publish(&self, report: &ExamReport) {
        let inner = &self.inner;
        let summary = &report.summary;
        let group = summary.group;
        let top_n = inner.config.leaderboard_top_n;

        match inner
            .renderer
            .render_leaderboard(summary, &report.ranked, top_n)
        {
            Ok(leaderboard) => {
                let caption = format!("{} - Top {top_n}", summary.exam_name);
                if let Err(e) = inner
                    .transport
                    .announce_result(group, &leaderboard, &caption)
                    .await
                {
                    tracing::warn!(group, "failed to post leaderboard: {e:#}");
                }
            }
            Err(e) => tracing::warn!(group, "failed to render leaderboard: {e:#}"),
        }

        let username = self.group_username(group);
        let transport = &inner.transport;
        let notes = report
            .breakdowns(username.as_deref())
            .into_iter()
            .filter_map(|breakdown| {
                let user = breakdown.result.participant.id;
                match inner.renderer.render_breakdown(&breakdown) {
                    Ok(text) => Some((user, text)),
                    Err(e) => {
                        tracing::warn!(group, user, "failed to render breakdown: {e:#}");
                        None
                    }
                }
            })
            .map(|(user, text)| async move {
                if let Err(e) = transport.notify_participant(user, &text).await {
                    tracing::warn!(group, user, "failed to send breakdown: {e:#}");
                }
            });
        join_all(notes).await;

        if !inner.config.report_recipients.is_empty() {
            match inner.renderer.render_report(summary, &report.ranked) {
                Ok(artifact) => {
                    let caption = format!("Full report: {}", summary.exam_name);
                    for &recipient in &inner.config.report_recipients {
                        if let Err(e) = transport
                            .deliver_report(recipient, &artifact, &caption)
                            .await
                        {
                            tracing::warn!(group, recipient, "failed to deliver report: {e:#}");
                        }
                    }
                }
                Err(e) => tracing::warn!(group, "failed to render report: {e:#}"),
            }
        }

        if let Some(dir) = &inner.config.report_dir {
            let path = dir.join(format!("exam_{group}_{}.json", report.id));
            match report.save_json(&path) {
                Ok(()) => tracing::info!(group, path = %path.display(), "report saved"),
                Err(e) => tracing::warn!(group, "failed to save report: {e:#}"),
            }
        }
    }

    /// Reset the group's preset and the bank before dropping the session,
    /// so a start racing with cleanup cannot reuse them.
    async fn cleanup(&self, session: &ExamSession) {
        let inner = &self.inner;
        let group = session.group();

        match inner.presets.get(group).await {
            Ok(mut preset) => {
                preset.ready = false;
                if let Err(e) = inner.presets.save(group, &preset).await {
                    tracing::warn!(group, "failed to reset preset: {e:#}");
                }
            }
            Err(e) => tracing::warn!(group, "failed to load preset for reset: {e:#}"),
        }
        if let Err(e) = inner.bank.clear().await {
            tracing::warn!(group, "failed to clear question bank: {e:#}");
        }
        inner.registry.remove(group, session.id());
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::engine::EngineConfig;
    use crate::model::{Outcome, Participant, Preset, Question};
    use crate::report::{ExamSummary, ParticipantBreakdown, RankedResult};
    use crate::session::AnswerEvent;
    use crate::testing::{engine_with, question, RecordingTransport};
    use crate::traits::{Artifact, NoopRenderer, Renderer, Transport};

    struct BrokenRenderer;

    impl Renderer for BrokenRenderer {
        fn render_leaderboard(
            &self,
            _: &ExamSummary,
            _: &[RankedResult],
            _: usize,
        ) -> anyhow::Result<Artifact> {
            anyhow::bail!("font missing")
        }

        fn render_report(&self, _: &ExamSummary, _: &[RankedResult]) -> anyhow::Result<Artifact> {
            anyhow::bail!("font missing")
        }

        fn render_breakdown(&self, _: &ParticipantBreakdown) -> anyhow::Result<String> {
            anyhow::bail!("template missing")
        }
    }

    async fn prepare(engine: &SessionEngine, questions: Vec<Question>) {
        engine.inner.bank.import(questions).await.unwrap();
        let mut preset = Preset::default();
        preset.set_time(5).unwrap();
        preset.set_marks(1.0, 0.25).unwrap();
        preset.mark_ready().unwrap();
        engine.inner.presets.save(-1, &preset).await.unwrap();
    }

    fn config() -> EngineConfig {
        EngineConfig {
            countdown_secs: 0,
            report_recipients: vec![900, 901],
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn three_question_scenario() {
        let transport = Arc::new(RecordingTransport::default());
        let engine = engine_with(
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::new(NoopRenderer),
            config(),
        );
        prepare(&engine, vec![question(0), question(1), question(2)]).await;

        let handle = engine.start_session(-1, 1).await.unwrap();
        let a = Participant::new(1, "A");
        let b = Participant::new(2, "B");

        transport.wait_for_questions(1).await;
        assert!(engine.register_participant(-1, b));
        engine.record_answer(AnswerEvent::chose(transport.poll_id(0).unwrap(), a.clone(), 0));
        transport.wait_for_questions(2).await;
        engine.record_answer(AnswerEvent::chose(transport.poll_id(1).unwrap(), a.clone(), 1));
        transport.wait_for_questions(3).await;
        engine.record_answer(AnswerEvent::chose(transport.poll_id(2).unwrap(), a, 0));

        let report = handle.task.await.unwrap().unwrap();
        let ranking: Vec<&str> = report
            .ranked
            .iter()
            .map(|r| r.result.participant.full_name.as_str())
            .collect();
        assert_eq!(ranking, vec!["A", "B"]);

        let a = &report.ranked[0].result;
        assert_eq!((a.correct, a.wrong, a.skipped), (2, 1, 0));
        assert_eq!(a.score, 1.75);
        let b = &report.ranked[1].result;
        assert_eq!((b.correct, b.wrong, b.skipped), (0, 0, 3));
        assert_eq!(b.score, 0.0);
        assert!(b.answers.values().all(|o| *o == Outcome::Skipped));
    }

    #[tokio::test(start_paused = true)]
    async fn finalize_runs_once() {
        let transport = Arc::new(RecordingTransport::default());
        let engine = engine_with(
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::new(NoopRenderer),
            config(),
        );
        prepare(&engine, vec![question(0)]).await;
        let handle = engine.start_session(-1, 1).await.unwrap();
        let session = engine.session(-1).unwrap();

        let (first, second) = tokio::join!(
            engine.finalize(&session, SessionEnd::Stopped),
            engine.finalize(&session, SessionEnd::Stopped),
        );
        assert_eq!(
            usize::from(first.is_some()) + usize::from(second.is_some()),
            1
        );
        assert!(handle.task.await.unwrap().is_none());
        assert_eq!(transport.results_announced(), 1);
        assert_eq!(transport.reports_delivered(), vec![900, 901]);
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_resets_preset_and_bank() {
        let transport = Arc::new(RecordingTransport::default());
        let engine = engine_with(
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::new(NoopRenderer),
            config(),
        );
        prepare(&engine, vec![question(0), question(1)]).await;

        engine.start_session(-1, 1).await.unwrap().task.await.unwrap();

        assert!(!engine.inner.presets.get(-1).await.unwrap().ready);
        assert_eq!(engine.inner.bank.len().await.unwrap(), 0);
        assert_eq!(engine.active_sessions(), 0);
        assert!(matches!(
            engine.start_session(-1, 1).await,
            Err(crate::error::StartError::EmptyBank)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn publishing_failures_do_not_block_cleanup() {
        let transport = Arc::new(RecordingTransport::failing_notifications());
        let engine = engine_with(
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::new(BrokenRenderer),
            config(),
        );
        prepare(&engine, vec![question(0)]).await;

        let handle = engine.start_session(-1, 1).await.unwrap();
        transport.wait_for_questions(1).await;
        engine.record_answer(AnswerEvent::chose(
            transport.poll_id(0).unwrap(),
            Participant::new(5, "E"),
            0,
        ));
        let report = handle.task.await.unwrap().unwrap();

        assert_eq!(report.ranked.len(), 1);
        assert_eq!(transport.results_announced(), 0);
        assert!(transport.reports_delivered().is_empty());
        assert!(engine.session(-1).is_none());
        assert!(!engine.inner.presets.get(-1).await.unwrap().ready);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_session_still_publishes() {
        let transport = Arc::new(RecordingTransport::default());
        let engine = engine_with(
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::new(NoopRenderer),
            config(),
        );
        prepare(&engine, vec![question(0)]).await;

        let report = engine
            .start_session(-1, 1)
            .await
            .unwrap()
            .task
            .await
            .unwrap()
            .unwrap();
        assert!(report.ranked.is_empty());
        assert_eq!(transport.result_captions(), vec!["Untitled Exam - Top 10"]);
        assert!(transport.notified().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn breakdowns_go_to_every_participant() {
        let transport = Arc::new(RecordingTransport::default());
        let engine = engine_with(
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::new(NoopRenderer),
            config(),
        );
        prepare(&engine, vec![question(3)]).await;

        let handle = engine.start_session(-1, 1).await.unwrap();
        transport.wait_for_questions(1).await;
        let poll = transport.poll_id(0).unwrap();
        engine.record_answer(AnswerEvent::chose(poll.clone(), Participant::new(1, "A"), 3));
        engine.record_answer(AnswerEvent::empty(poll, Participant::new(2, "B")));
        handle.task.await.unwrap();

        let mut users: Vec<i64> = transport.notified().iter().map(|(u, _)| *u).collect();
        users.sort_unstable();
        assert_eq!(users, vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn report_saved_to_configured_dir() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::default());
        let engine = engine_with(
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::new(NoopRenderer),
            EngineConfig {
                countdown_secs: 0,
                grace: Duration::ZERO,
                report_dir: Some(dir.path().to_path_buf()),
                ..Default::default()
            },
        );
        prepare(&engine, vec![question(0)]).await;

        let report = engine
            .start_session(-1, 1)
            .await
            .unwrap()
            .task
            .await
            .unwrap()
            .unwrap();
        let path = dir.path().join(format!("exam_-1_{}.json", report.id));
        let loaded = ExamReport::load_json(&path).unwrap();
        assert_eq!(loaded.ended, SessionEnd::Completed);
    }
}
