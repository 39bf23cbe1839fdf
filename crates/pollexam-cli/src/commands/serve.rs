//! The `pollexam serve` command: the Telegram bot loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use pollexam_core::engine::SessionEngine;
use pollexam_core::model::{GroupId, Participant, Question};
use pollexam_core::parser::{parse_questions_json, validate_questions};
use pollexam_core::traits::{QuestionBank, Transport};
use pollexam_report::ReportRenderer;
use pollexam_transport::config::{create_transport, load_config_from, ConfiguredTransport};
use pollexam_transport::store::{JsonFilePresetStore, JsonFileQuestionBank};
use pollexam_transport::telegram::TelegramTransport;
use pollexam_transport::updates::{BotCommand, BotEvent, CommandMessage};
use pollexam_transport::{CommandError, PollexamConfig, TransportError};

use super::status::BotStatus;

const RETRY_DELAY: Duration = Duration::from_secs(5);

pub async fn execute(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let ConfiguredTransport::Telegram(telegram) =
        create_transport(&config.transport, config.poll_timeout_secs)?
    else {
        anyhow::bail!(
            "serve needs the telegram transport; set [transport] type = \"telegram\" \
             or POLLEXAM_BOT_TOKEN (use `pollexam simulate` to try sessions offline)"
        );
    };

    let bank: Arc<dyn QuestionBank> = Arc::new(JsonFileQuestionBank::in_dir(&config.data_dir));
    let engine = SessionEngine::new(
        Arc::clone(&bank),
        Arc::new(JsonFilePresetStore::in_dir(&config.data_dir)),
        Arc::clone(&telegram) as Arc<dyn Transport>,
        Arc::new(ReportRenderer::new()),
        config.engine_config()?,
    );
    let bot = Bot {
        engine: engine.clone(),
        bank,
        telegram,
        config: Arc::new(config),
    };

    tracing::info!(data_dir = %bot.config.data_dir.display(), "pollexam bot started");
    let result = tokio::select! {
        result = bot.run() => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
            Ok(())
        }
    };

    engine.shutdown().await;
    bot.write_status();
    result
}

/// Routes inbound updates to the session engine.
#[derive(Clone)]
pub struct Bot {
    pub engine: SessionEngine,
    /// The bank the engine draws from; private chats add to it.
    pub bank: Arc<dyn QuestionBank>,
    pub telegram: Arc<TelegramTransport>,
    pub config: Arc<PollexamConfig>,
}

impl Bot {
    /// Long-poll forever. Only an invalid token ends the loop.
    pub async fn run(&self) -> Result<()> {
        let mut offset = None;
        let mut last_status = None;
        loop {
            match self
                .telegram
                .get_updates(offset, self.config.poll_timeout_secs)
                .await
            {
                Ok(updates) => {
                    for update in updates {
                        offset = Some(update.update_id + 1);
                        if let Some(event) = update.into_event() {
                            self.handle(event);
                        }
                    }
                }
                Err(TransportError::RateLimited { retry_after_secs }) => {
                    tracing::warn!(retry_after_secs, "rate limited while polling updates");
                    tokio::time::sleep(Duration::from_secs(retry_after_secs)).await;
                }
                Err(TransportError::Unauthorized(_)) => {
                    anyhow::bail!("the bot token was rejected by Telegram");
                }
                Err(e) => {
                    tracing::warn!("failed to poll updates: {e}");
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            }

            let snapshot = (self.engine.running_groups(), self.engine.scheduled_count());
            if last_status.as_ref() != Some(&snapshot) {
                self.write_status();
                last_status = Some(snapshot);
            }
        }
    }

    /// Answers are recorded inline; commands run on their own task so a
    /// finalizing stop does not hold up polling.
    pub fn handle(&self, event: BotEvent) {
        match event {
            BotEvent::Answer(answer) => {
                self.engine.record_answer(answer);
            }
            BotEvent::Command(message) => {
                let bot = self.clone();
                tokio::spawn(async move { bot.handle_command(message).await });
            }
            BotEvent::ImportPoll { from, question } => {
                let bot = self.clone();
                tokio::spawn(async move { bot.import_poll(from, question).await });
            }
            BotEvent::ImportDocument {
                from,
                file_id,
                file_name,
            } => {
                let bot = self.clone();
                tokio::spawn(async move { bot.import_document(from, &file_id, &file_name).await });
            }
        }
    }

    pub async fn handle_command(&self, message: CommandMessage) {
        let CommandMessage {
            chat_id,
            chat_username,
            from,
            private,
            command,
        } = message;
        if !private {
            self.engine
                .set_group_username(chat_id, chat_username.as_deref());
        }

        let command = match command {
            Ok(command) => command,
            Err(e) => {
                self.reply(chat_id, &format!("Could not read that command: {e}"))
                    .await;
                return;
            }
        };

        if command == BotCommand::Join {
            self.engine.register_participant(chat_id, from);
            return;
        }

        if command == BotCommand::QuestionCount {
            if private && !self.config.is_admin(from.id) {
                self.reply(chat_id, "Only bot admins can see the question bank.")
                    .await;
                return;
            }
            let text = match self.bank.len().await {
                Ok(count) => format!("Saved questions: {count}"),
                Err(e) => {
                    tracing::warn!(chat_id, "failed to count questions: {e:#}");
                    "Could not read the question bank.".to_string()
                }
            };
            self.reply(chat_id, &text).await;
            return;
        }

        if !self.is_admin(chat_id, from.id).await {
            self.reply(chat_id, "Only group admins can manage exams.")
                .await;
            return;
        }

        match command {
            BotCommand::StartExam(overrides) => {
                let started = match overrides {
                    Some(ov) => self.engine.start_with_override(chat_id, from.id, ov).await,
                    None => self.engine.start_session(chat_id, from.id).await,
                };
                if let Err(e) = started {
                    self.reply(chat_id, &format!("Cannot start the exam: {e}"))
                        .await;
                }
            }
            BotCommand::StopExam => {
                if !self.engine.stop_session(chat_id).await {
                    self.reply(chat_id, "No exam is running.").await;
                }
            }
            BotCommand::ScheduleExam(at) => match self.engine.schedule_start(chat_id, at, from.id) {
                Ok(()) => {
                    let when = at.format("%Y-%m-%d %H:%M UTC");
                    self.reply(chat_id, &format!("Exam scheduled for {when}."))
                        .await;
                }
                Err(e) => self.reply(chat_id, &format!("Cannot schedule: {e}")).await,
            },
            BotCommand::CancelSchedule => {
                let text = if self.engine.cancel_scheduled_start(chat_id) {
                    "Scheduled exam cancelled."
                } else {
                    "No exam is scheduled."
                };
                self.reply(chat_id, text).await;
            }
            BotCommand::Join | BotCommand::QuestionCount => {}
        }
    }

    /// Save a quiz poll an admin sent privately.
    pub async fn import_poll(&self, from: Participant, question: Result<Question, CommandError>) {
        if !self.config.is_admin(from.id) {
            return;
        }
        let question = match question {
            Ok(question) => question,
            Err(e) => {
                self.reply(from.id, &format!("Not saved: {e}")).await;
                return;
            }
        };
        match self.bank.import(vec![question]).await {
            Ok(total) => {
                tracing::info!(user = from.id, total, "question saved from poll");
                self.reply(from.id, &format!("Question saved. Total: {total}"))
                    .await;
            }
            Err(e) => {
                tracing::warn!(user = from.id, "failed to save question: {e:#}");
                self.reply(from.id, "Could not save the question.").await;
            }
        }
    }

    /// Import a JSON question file an admin sent privately. Nothing is
    /// saved unless every item is valid.
    pub async fn import_document(&self, from: Participant, file_id: &str, file_name: &str) {
        if !self.config.is_admin(from.id) {
            return;
        }
        let raw = match self.telegram.download_file(file_id).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(user = from.id, file_name, "failed to download: {e}");
                self.reply(from.id, &format!("Could not download {file_name}: {e}"))
                    .await;
                return;
            }
        };
        let questions = match String::from_utf8(raw)
            .map_err(anyhow::Error::from)
            .and_then(|content| parse_questions_json(&content))
        {
            Ok(questions) => questions,
            Err(e) => {
                self.reply(from.id, &format!("Import of {file_name} failed: {e:#}"))
                    .await;
                return;
            }
        };

        let mut text = String::new();
        for w in validate_questions(&questions) {
            let prefix = w.item.map(|n| format!("[#{n}] ")).unwrap_or_default();
            text.push_str(&format!("Warning: {prefix}{}\n", w.message));
        }
        let imported = questions.len();
        match self.bank.import(questions).await {
            Ok(total) => {
                tracing::info!(user = from.id, file_name, imported, total, "questions imported");
                text.push_str(&format!("Imported {imported} questions. Total: {total}"));
            }
            Err(e) => {
                tracing::warn!(user = from.id, file_name, "failed to import: {e:#}");
                text.push_str("Could not save the questions.");
            }
        }
        self.reply(from.id, &text).await;
    }

    async fn is_admin(&self, chat_id: GroupId, user: i64) -> bool {
        if self.config.is_admin(user) {
            return true;
        }
        match self.telegram.is_chat_admin(chat_id, user).await {
            Ok(admin) => admin,
            Err(e) => {
                tracing::warn!(chat_id, user, "admin check failed: {e}");
                false
            }
        }
    }

    async fn reply(&self, chat_id: GroupId, text: &str) {
        if let Err(e) = self.telegram.send_text(chat_id, text).await {
            tracing::warn!(chat_id, "failed to reply: {e}");
        }
    }

    fn write_status(&self) {
        let status = BotStatus {
            updated_at: chrono::Utc::now(),
            running_groups: self.engine.running_groups(),
            active_sessions: self.engine.active_sessions(),
            scheduled_starts: self.engine.scheduled_count(),
        };
        if let Err(e) = status.write(&self.config.data_dir) {
            tracing::warn!("failed to write status: {e:#}");
        }
    }
}
