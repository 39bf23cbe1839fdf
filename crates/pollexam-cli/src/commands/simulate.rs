//! The `pollexam simulate` command.
//!
//! Runs one real session against the mock transport with scripted
//! participants, then prints the ranking. Time passes for real, so a
//! session takes roughly `questions x time` seconds.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use pollexam_core::engine::{EngineConfig, SessionEngine};
use pollexam_core::memory::{InMemoryPresetStore, InMemoryQuestionBank};
use pollexam_core::model::{GroupId, Participant, Preset, Question, UserId};
use pollexam_core::parser::parse_questions;
use pollexam_core::report::ExamReport;
use pollexam_core::session::AnswerEvent;
use pollexam_core::traits::{PresetStore, Transport};
use pollexam_report::{write_html_report, ReportRenderer};
use pollexam_transport::mock::MockTransport;

const SIM_GROUP: GroupId = -1_000_000_000_001;
const SIM_ADMIN: UserId = 1;

pub async fn execute(
    questions_path: PathBuf,
    participants: usize,
    time: u32,
    name: String,
    mark: f64,
    penalty: f64,
    output: Option<PathBuf>,
) -> Result<()> {
    anyhow::ensure!(participants >= 1, "participants must be at least 1");

    let questions = parse_questions(&questions_path)?;
    anyhow::ensure!(!questions.is_empty(), "question file contains no questions");

    let mut preset = Preset::default();
    preset.set_name(&name)?;
    preset.set_time(time)?;
    preset.set_marks(mark, penalty)?;
    preset.mark_ready()?;
    let presets = Arc::new(InMemoryPresetStore::new());
    presets.save(SIM_GROUP, &preset).await?;

    let transport = Arc::new(MockTransport::new());
    let engine = SessionEngine::new(
        Arc::new(InMemoryQuestionBank::with_questions(questions.clone())),
        presets,
        Arc::clone(&transport) as Arc<dyn Transport>,
        Arc::new(ReportRenderer::new()),
        EngineConfig {
            grace: Duration::ZERO,
            countdown_secs: 0,
            report_recipients: vec![SIM_ADMIN],
            report_dir: output.clone(),
            ..EngineConfig::default()
        },
    );

    eprintln!(
        "pollexam simulate: {} questions x {} participants, {}s per question",
        questions.len(),
        participants,
        time
    );

    let handle = engine.start_session(SIM_GROUP, SIM_ADMIN).await?;
    let people: Vec<Participant> = (0..participants)
        .map(|i| Participant::new(1000 + i as UserId, format!("Participant {}", i + 1)))
        .collect();
    for person in &people {
        engine.register_participant(SIM_GROUP, person.clone());
    }

    let per_question = Duration::from_secs(u64::from(time) + 30);
    for (index, question) in questions.iter().enumerate() {
        if tokio::time::timeout(per_question, transport.wait_for_questions(index + 1))
            .await
            .is_err()
        {
            break;
        }
        let Some(poll_id) = transport.poll_id(SIM_GROUP, index) else {
            break;
        };
        for (p, person) in people.iter().enumerate() {
            if let Some(choice) = scripted_choice(p, index, question) {
                engine.record_answer(AnswerEvent::chose(poll_id.clone(), person.clone(), choice));
            }
        }
        eprintln!("  Question {}/{} answered", index + 1, questions.len());
    }

    let report = handle
        .task
        .await
        .context("session task failed")?
        .context("session was finalized elsewhere")?;

    print_ranking(&report);

    let (leaderboard, caption) = transport
        .leaderboards()
        .pop()
        .context("no leaderboard was posted")?;
    eprintln!(
        "\nLeaderboard posted: \"{caption}\" ({} bytes)",
        leaderboard.bytes.len()
    );
    eprintln!(
        "Breakdowns sent: {}, reports delivered: {}",
        transport.notifications().len(),
        transport.reports().len()
    );

    if let Some(dir) = &output {
        std::fs::create_dir_all(dir)?;
        let svg = dir.join(&leaderboard.file_name);
        std::fs::write(&svg, &leaderboard.bytes)?;
        eprintln!("Leaderboard: {}", svg.display());
        let html = dir.join(format!("report_{}.html", report.id));
        write_html_report(&report.summary, &report.ranked, &html)?;
        eprintln!("HTML report: {}", html.display());
    }

    Ok(())
}

/// Deterministic answer pattern: mostly right, some wrong, some silent.
fn scripted_choice(participant: usize, index: usize, question: &Question) -> Option<usize> {
    if (participant + index) % 4 == 3 {
        return None;
    }
    if (participant * 7 + index) % 3 == 0 {
        Some((question.correct + 1) % question.options.len())
    } else {
        Some(question.correct)
    }
}

fn print_ranking(report: &ExamReport) {
    use comfy_table::{Cell, Table};

    let mut table = Table::new();
    table.set_header(vec!["Rank", "Name", "Score", "Correct", "Wrong", "Skipped"]);

    for entry in &report.ranked {
        let r = &entry.result;
        table.add_row(vec![
            Cell::new(entry.rank),
            Cell::new(r.participant.display_name()),
            Cell::new(format!("{:.2}", r.score)),
            Cell::new(r.correct),
            Cell::new(r.wrong),
            Cell::new(r.skipped),
        ]);
    }

    println!("{} ({} questions)", report.summary.exam_name, report.presented);
    println!("{table}");
}
