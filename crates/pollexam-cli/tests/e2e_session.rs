//! End-to-end session tests: engine, mock transport, renderer and stores
//! wired together the way `serve` and `simulate` wire them.
//!
//! Time is paused, so windows and countdowns elapse instantly.

use std::sync::Arc;
use std::time::Duration;

use pollexam_core::engine::{EngineConfig, SessionEngine};
use pollexam_core::memory::{InMemoryPresetStore, InMemoryQuestionBank};
use pollexam_core::model::{GroupId, Participant, Preset, Question};
use pollexam_core::report::{ExamReport, SessionEnd};
use pollexam_core::session::{AnswerEvent, RecordOutcome};
use pollexam_core::traits::{PresetStore, QuestionBank, Transport};
use pollexam_core::StartError;
use pollexam_report::ReportRenderer;
use pollexam_transport::mock::{MockEvent, MockTransport};
use pollexam_transport::store::{JsonFilePresetStore, JsonFileQuestionBank};

const GROUP: GroupId = -1001234567890;

fn question(text: &str, correct: usize) -> Question {
    Question::new(
        text,
        vec!["a".into(), "b".into(), "c".into(), "d".into()],
        correct,
    )
    .unwrap()
}

fn ready_preset(name: &str) -> Preset {
    let mut preset = Preset::default();
    preset.set_name(name).unwrap();
    preset.set_time(10).unwrap();
    preset.set_marks(1.0, 0.25).unwrap();
    preset.mark_ready().unwrap();
    preset
}

struct Harness {
    engine: SessionEngine,
    transport: Arc<MockTransport>,
    bank: Arc<InMemoryQuestionBank>,
    presets: Arc<InMemoryPresetStore>,
}

async fn harness(questions: Vec<Question>, transport: MockTransport) -> Harness {
    let transport = Arc::new(transport);
    let bank = Arc::new(InMemoryQuestionBank::with_questions(questions));
    let presets = Arc::new(InMemoryPresetStore::new());
    presets.save(GROUP, &ready_preset("Chemistry")).await.unwrap();
    let engine = SessionEngine::new(
        Arc::clone(&bank) as Arc<dyn QuestionBank>,
        Arc::clone(&presets) as Arc<dyn PresetStore>,
        Arc::clone(&transport) as Arc<dyn Transport>,
        Arc::new(ReportRenderer::new()),
        EngineConfig {
            report_recipients: vec![99],
            group_usernames: [(GROUP, "chem_club".to_string())].into(),
            ..EngineConfig::default()
        },
    );
    Harness {
        engine,
        transport,
        bank,
        presets,
    }
}

async fn answer(h: &Harness, index: usize, who: &Participant, choice: usize) -> RecordOutcome {
    h.transport.wait_for_questions(index + 1).await;
    let poll_id = h.transport.poll_id(GROUP, index).unwrap();
    h.engine
        .record_answer(AnswerEvent::chose(poll_id, who.clone(), choice))
}

#[tokio::test(start_paused = true)]
async fn three_question_exam_end_to_end() {
    let h = harness(
        vec![question("q1", 0), question("q2", 1), question("q3", 2)],
        MockTransport::new(),
    )
    .await;
    let alice = Participant::new(1, "Alice").with_username("alice");
    let bob = Participant::new(2, "Bob");

    let handle = h.engine.start_session(GROUP, 99).await.unwrap();
    assert!(h.engine.register_participant(GROUP, bob.clone()));

    assert!(matches!(
        answer(&h, 0, &alice, 0).await,
        RecordOutcome::Scored(_)
    ));
    // A second vote on the same poll is discarded.
    assert_eq!(answer(&h, 0, &alice, 3).await, RecordOutcome::Duplicate);
    answer(&h, 1, &alice, 0).await;
    answer(&h, 2, &alice, 2).await;

    let report = handle.task.await.unwrap().unwrap();
    assert_eq!(report.ended, SessionEnd::Completed);
    assert_eq!(report.presented, 3);

    let names: Vec<&str> = report
        .ranked
        .iter()
        .map(|r| r.result.participant.full_name.as_str())
        .collect();
    assert_eq!(names, vec!["Alice", "Bob"]);

    let a = &report.ranked[0].result;
    assert_eq!((a.correct, a.wrong, a.skipped), (2, 1, 0));
    assert!((a.score - 1.75).abs() < 1e-9);
    let b = &report.ranked[1].result;
    assert_eq!((b.correct, b.wrong, b.skipped), (0, 0, 3));
    assert_eq!(b.score, 0.0);

    // Group leaderboard, private breakdowns, full report.
    let boards = h.transport.leaderboards();
    assert_eq!(boards.len(), 1);
    assert_eq!(boards[0].1, "Chemistry - Top 10");
    let svg = String::from_utf8(boards[0].0.bytes.clone()).unwrap();
    assert!(svg.contains("Alice (@alice)"));
    assert!(svg.contains("1.75"));

    let notes = h.transport.notifications();
    assert_eq!(notes.len(), 2);
    let (_, alice_note) = notes.iter().find(|(user, _)| *user == 1).unwrap();
    assert!(alice_note.contains("Rank: 1"));
    assert!(alice_note.contains("Total score: 1.75"));
    assert!(alice_note.contains("https://t.me/chem_club/"));

    let reports = h.transport.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].0, 99);
    assert_eq!(reports[0].1.content_type, "text/html");

    // The session is discarded and the group must confirm a new setup.
    assert!(h.engine.session(GROUP).is_none());
    assert_eq!(h.bank.len().await.unwrap(), 0);
    assert!(!h.presets.get(GROUP).await.unwrap().ready);
    assert_eq!(
        answer(&h, 2, &bob, 2).await,
        RecordOutcome::UnknownPoll
    );
}

#[tokio::test(start_paused = true)]
async fn stop_finalizes_once() {
    let h = harness(
        vec![question("q1", 0), question("q2", 1), question("q3", 2)],
        MockTransport::new(),
    )
    .await;
    let alice = Participant::new(1, "Alice");

    let handle = h.engine.start_session(GROUP, 99).await.unwrap();
    answer(&h, 0, &alice, 1).await;

    assert!(h.engine.stop_session(GROUP).await);
    assert!(!h.engine.stop_session(GROUP).await);

    // The stop already finalized; the dispatch task just exits.
    assert!(handle.task.await.unwrap().is_none());
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(h.transport.questions_presented(), 1);
    assert_eq!(h.transport.leaderboards().len(), 1);
    let notes = h.transport.notifications();
    assert_eq!(notes.len(), 1);
    assert!(notes[0].1.contains("Total score: -0.25"));
    assert!(notes[0].1.contains("Skipped: 2"));
}

#[tokio::test(start_paused = true)]
async fn failed_question_ends_the_session_early() {
    let h = harness(
        vec![question("q1", 0), question("q2", 1), question("q3", 2)],
        MockTransport::failing_question_at(1),
    )
    .await;
    let alice = Participant::new(1, "Alice");

    let handle = h.engine.start_session(GROUP, 99).await.unwrap();
    answer(&h, 0, &alice, 0).await;

    let report = handle.task.await.unwrap().unwrap();
    assert_eq!(report.ended, SessionEnd::TransportFailed);
    assert_eq!(report.presented, 1);
    // Unpresented questions still count as skipped.
    let a = &report.ranked[0].result;
    assert_eq!((a.correct, a.wrong, a.skipped), (1, 0, 2));
    assert_eq!(h.transport.leaderboards().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn unreachable_participants_do_not_block_cleanup() {
    let h = harness(vec![question("q1", 0)], MockTransport::failing_notifications()).await;
    let alice = Participant::new(1, "Alice");

    let handle = h.engine.start_session(GROUP, 99).await.unwrap();
    answer(&h, 0, &alice, 0).await;

    let report = handle.task.await.unwrap().unwrap();
    assert_eq!(report.ranked.len(), 1);
    assert!(h.transport.notifications().is_empty());
    assert_eq!(h.transport.reports().len(), 1);
    assert!(h.engine.session(GROUP).is_none());
}

#[tokio::test(start_paused = true)]
async fn scheduled_start_fires_once_at_the_latest_time() {
    let h = harness(vec![question("q1", 0)], MockTransport::new()).await;
    let now = chrono::Utc::now();

    h.engine
        .schedule_start(GROUP, now + chrono::Duration::seconds(10), 99)
        .unwrap();
    h.engine
        .schedule_start(GROUP, now + chrono::Duration::seconds(5), 99)
        .unwrap();
    assert_eq!(h.engine.scheduled_count(), 1);

    h.transport.wait_for_questions(1).await;
    assert!(h.engine.session(GROUP).is_some());
    assert_eq!(h.engine.pending_start(GROUP), None);

    tokio::time::sleep(Duration::from_secs(60)).await;
    let announcements = h
        .transport
        .events()
        .into_iter()
        .filter(|e| matches!(e, MockEvent::Announced { .. }))
        .count();
    assert_eq!(announcements, 1);
    assert_eq!(h.transport.leaderboards().len(), 1);
}

#[tokio::test]
async fn past_schedule_is_rejected() {
    let h = harness(vec![question("q1", 0)], MockTransport::new()).await;
    let past = chrono::Utc::now() - chrono::Duration::seconds(1);
    assert!(h.engine.schedule_start(GROUP, past, 99).is_err());
    assert_eq!(h.engine.scheduled_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn start_preconditions() {
    let h = harness(vec![question("q1", 0)], MockTransport::new()).await;

    let mut unconfirmed = ready_preset("Chemistry");
    unconfirmed.set_time(20).unwrap();
    h.presets.save(GROUP, &unconfirmed).await.unwrap();
    assert!(matches!(
        h.engine.start_session(GROUP, 99).await,
        Err(StartError::PresetNotReady(GROUP))
    ));

    h.presets.save(GROUP, &ready_preset("Chemistry")).await.unwrap();
    let handle = h.engine.start_session(GROUP, 99).await.unwrap();
    assert!(matches!(
        h.engine.start_session(GROUP, 99).await,
        Err(StartError::AlreadyRunning(GROUP))
    ));
    handle.task.await.unwrap();

    // The bank was used up by the finished exam.
    h.presets.save(GROUP, &ready_preset("Chemistry")).await.unwrap();
    assert!(matches!(
        h.engine.start_session(GROUP, 99).await,
        Err(StartError::EmptyBank)
    ));
}

#[tokio::test(start_paused = true)]
async fn file_stores_and_saved_report() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data");
    let reports = dir.path().join("reports");

    let bank = Arc::new(JsonFileQuestionBank::in_dir(&data));
    let presets = Arc::new(JsonFilePresetStore::in_dir(&data));
    bank.import(vec![question("q1", 2), question("q2", 0)])
        .await
        .unwrap();
    presets.save(GROUP, &ready_preset("Biology")).await.unwrap();

    let transport = Arc::new(MockTransport::new());
    let engine = SessionEngine::new(
        Arc::clone(&bank) as Arc<dyn QuestionBank>,
        Arc::clone(&presets) as Arc<dyn PresetStore>,
        Arc::clone(&transport) as Arc<dyn Transport>,
        Arc::new(ReportRenderer::new()),
        EngineConfig {
            report_dir: Some(reports.clone()),
            ..EngineConfig::default()
        },
    );

    let handle = engine.start_session(GROUP, 1).await.unwrap();
    transport.wait_for_questions(1).await;
    let poll_id = transport.poll_id(GROUP, 0).unwrap();
    engine.record_answer(AnswerEvent::chose(poll_id, Participant::new(5, "Eve"), 2));
    let report = handle.task.await.unwrap().unwrap();

    // Reopened stores see the cleanup.
    assert_eq!(JsonFileQuestionBank::in_dir(&data).len().await.unwrap(), 0);
    let preset = JsonFilePresetStore::in_dir(&data).get(GROUP).await.unwrap();
    assert!(!preset.ready);
    assert_eq!(preset.exam_name, "Biology");

    let saved =
        ExamReport::load_json(&reports.join(format!("exam_{GROUP}_{}.json", report.id))).unwrap();
    assert_eq!(saved.summary.exam_name, "Biology");
    assert_eq!(saved.ranked[0].result.participant.full_name, "Eve");
    assert!((saved.ranked[0].result.score - 1.0).abs() < 1e-9);
    assert_eq!(saved.ranked[0].result.skipped, 1);
}
