//! Telegram Bot API transport.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;

use pollexam_core::model::{GroupId, Question, UserId};
use pollexam_core::report::ExamSummary;
use pollexam_core::traits::{Artifact, MessageId, PresentedQuestion, Transport};

use crate::error::TransportError;
use crate::updates::Update;

const DEFAULT_BASE_URL: &str = "https://api.telegram.org";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_POLL_QUESTION: usize = 300;
const MAX_POLL_OPTION: usize = 100;
const MAX_POLL_EXPLANATION: usize = 200;

/// Telegram Bot API client implementing [`Transport`].
pub struct TelegramTransport {
    token: String,
    base_url: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl TelegramTransport {
    /// Build a client. `poll_timeout_secs` is the long-poll timeout used by
    /// [`get_updates`](Self::get_updates); the HTTP timeout leaves room for it.
    pub fn new(
        token: &str,
        base_url: Option<String>,
        poll_timeout_secs: u64,
    ) -> anyhow::Result<Self> {
        let timeout_secs = DEFAULT_TIMEOUT_SECS.max(poll_timeout_secs + 10);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build HTTP client: {e}"))?;

        Ok(Self {
            token: token.to_string(),
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            client,
            timeout_secs,
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.base_url, self.token)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<T, TransportError> {
        let response = self
            .client
            .post(self.endpoint(method))
            .json(body)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;
        self.parse_response(response).await
    }

    fn request_error(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout(self.timeout_secs)
        } else {
            // Strip the URL; it carries the token.
            TransportError::NetworkError(e.without_url().to_string())
        }
    }

    async fn parse_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, TransportError> {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| self.request_error(e))?;

        let parsed: ApiResponse<T> =
            serde_json::from_str(&body).map_err(|e| TransportError::ApiError {
                status,
                message: format!("failed to parse response: {e}"),
            })?;

        match parsed.result {
            Some(result) if parsed.ok => Ok(result),
            _ => Err(classify(
                parsed.error_code.unwrap_or(status),
                parsed.description.unwrap_or_default(),
                parsed.parameters.and_then(|p| p.retry_after),
            )),
        }
    }

    async fn send_document(
        &self,
        chat_id: i64,
        artifact: &Artifact,
        caption: &str,
    ) -> Result<SentMessage, TransportError> {
        let part = reqwest::multipart::Part::bytes(artifact.bytes.clone())
            .file_name(artifact.file_name.clone())
            .mime_str(&artifact.content_type)
            .map_err(|e| TransportError::ApiError {
                status: 0,
                message: format!("invalid content type {}: {e}", artifact.content_type),
            })?;
        let form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", truncate_chars(caption, 1024))
            .part("document", part);

        let response = self
            .client
            .post(self.endpoint("sendDocument"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;
        self.parse_response(response).await
    }

    /// Send a plain text message.
    #[instrument(skip(self, text))]
    pub async fn send_text(&self, chat_id: i64, text: &str) -> Result<MessageId, TransportError> {
        let sent: SentMessage = self
            .call(
                "sendMessage",
                &json!({
                    "chat_id": chat_id,
                    "text": text,
                    "link_preview_options": { "is_disabled": true },
                }),
            )
            .await?;
        Ok(sent.message_id)
    }

    /// Long-poll for updates after `offset`.
    #[instrument(skip(self))]
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, TransportError> {
        self.call(
            "getUpdates",
            &json!({
                "offset": offset,
                "timeout": timeout_secs,
                "allowed_updates": ["message", "poll_answer"],
            }),
        )
        .await
    }

    /// Whether `user` administers the chat.
    #[instrument(skip(self))]
    pub async fn is_chat_admin(&self, chat_id: i64, user: UserId) -> Result<bool, TransportError> {
        let member: ChatMember = self
            .call(
                "getChatMember",
                &json!({ "chat_id": chat_id, "user_id": user }),
            )
            .await?;
        Ok(matches!(member.status.as_str(), "creator" | "administrator"))
    }

    /// Fetch the contents of a file sent to the bot.
    #[instrument(skip(self))]
    pub async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, TransportError> {
        let file: FileInfo = self.call("getFile", &json!({ "file_id": file_id })).await?;
        let file_path = file.file_path.ok_or_else(|| TransportError::ApiError {
            status: 200,
            message: "file is not available for download".into(),
        })?;

        let response = self
            .client
            .get(format!("{}/file/bot{}/{file_path}", self.base_url, self.token))
            .send()
            .await
            .map_err(|e| self.request_error(e))?;
        let status = response.status().as_u16();
        if !response.status().is_success() {
            return Err(TransportError::ApiError {
                status,
                message: format!("download of {file_path} failed"),
            });
        }
        let bytes = response.bytes().await.map_err(|e| self.request_error(e))?;
        Ok(bytes.to_vec())
    }
}

#[derive(Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<u16>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

#[derive(Deserialize)]
struct SentMessage {
    message_id: MessageId,
    #[serde(default)]
    poll: Option<SentPoll>,
}

#[derive(Deserialize)]
struct SentPoll {
    id: String,
}

#[derive(Deserialize)]
struct FileInfo {
    #[serde(default)]
    file_path: Option<String>,
}

#[derive(Deserialize)]
struct ChatMember {
    status: String,
}

#[derive(Serialize)]
struct PollOption {
    text: String,
}

fn classify(status: u16, description: String, retry_after: Option<u64>) -> TransportError {
    match status {
        429 => TransportError::RateLimited {
            retry_after_secs: retry_after.unwrap_or(5),
        },
        401 | 404 => TransportError::Unauthorized(description),
        403 => TransportError::Forbidden(description),
        400 if description.contains("chat not found") => TransportError::ChatNotFound(description),
        _ => TransportError::ApiError {
            status,
            message: description,
        },
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

/// Poll question text: `Q{n}/{total}: {text}`.
pub fn poll_question_text(index: usize, total: usize, question: &Question) -> String {
    truncate_chars(
        &format!("Q{}/{total}: {}", index + 1, question.text),
        MAX_POLL_QUESTION,
    )
}

/// Intro message, re-rendered for every countdown tick.
pub fn intro_text(summary: &ExamSummary, seconds_left: u32) -> String {
    let mut text = format!(
        "{}\n\nQuestions: {}\nTime per question: {}s\nMarks: +{} / -{}\n",
        summary.exam_name,
        summary.total_questions,
        summary.time_per_question,
        summary.mark_per_correct,
        summary.penalty_per_wrong,
    );
    if seconds_left > 0 {
        text.push_str(&format!("\nStarting in {seconds_left}s..."));
    } else {
        text.push_str("\nStarting now!");
    }
    text
}

#[async_trait]
impl Transport for TelegramTransport {
    fn name(&self) -> &str {
        "telegram"
    }

    #[instrument(skip(self, question))]
    async fn present_question(
        &self,
        group: GroupId,
        index: usize,
        total: usize,
        question: &Question,
        window_secs: u32,
    ) -> anyhow::Result<PresentedQuestion> {
        let options: Vec<PollOption> = question
            .options
            .iter()
            .map(|o| PollOption {
                text: truncate_chars(o, MAX_POLL_OPTION),
            })
            .collect();
        let mut body = json!({
            "chat_id": group,
            "question": poll_question_text(index, total, question),
            "options": options,
            "type": "quiz",
            "is_anonymous": false,
            "correct_option_id": question.correct,
            "open_period": window_secs,
        });
        if let Some(explanation) = &question.explanation {
            body["explanation"] = json!(truncate_chars(explanation, MAX_POLL_EXPLANATION));
        }

        let sent: SentMessage = self.call("sendPoll", &body).await?;
        let poll = sent.poll.ok_or_else(|| TransportError::ApiError {
            status: 200,
            message: "sendPoll response carried no poll".into(),
        })?;
        Ok(PresentedQuestion {
            poll_id: poll.id,
            message_id: Some(sent.message_id),
        })
    }

    #[instrument(skip(self, summary))]
    async fn announce_start(
        &self,
        group: GroupId,
        summary: &ExamSummary,
        countdown_secs: u32,
    ) -> anyhow::Result<Option<MessageId>> {
        let id = self
            .send_text(group, &intro_text(summary, countdown_secs))
            .await?;
        Ok(Some(id))
    }

    async fn update_countdown(
        &self,
        group: GroupId,
        message: MessageId,
        summary: &ExamSummary,
        seconds_left: u32,
    ) -> anyhow::Result<()> {
        let _: serde_json::Value = self
            .call(
                "editMessageText",
                &json!({
                    "chat_id": group,
                    "message_id": message,
                    "text": intro_text(summary, seconds_left),
                }),
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn pin_message(&self, group: GroupId, message: MessageId) -> anyhow::Result<()> {
        let _: bool = self
            .call(
                "pinChatMessage",
                &json!({
                    "chat_id": group,
                    "message_id": message,
                    "disable_notification": true,
                }),
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self, leaderboard, caption), fields(file = %leaderboard.file_name))]
    async fn announce_result(
        &self,
        group: GroupId,
        leaderboard: &Artifact,
        caption: &str,
    ) -> anyhow::Result<()> {
        self.send_document(group, leaderboard, caption).await?;
        Ok(())
    }

    #[instrument(skip(self, text))]
    async fn notify_participant(&self, user: UserId, text: &str) -> anyhow::Result<()> {
        self.send_text(user, text).await?;
        Ok(())
    }

    #[instrument(skip(self, report, caption), fields(file = %report.file_name))]
    async fn deliver_report(
        &self,
        recipient: UserId,
        report: &Artifact,
        caption: &str,
    ) -> anyhow::Result<()> {
        self.send_document(recipient, report, caption).await?;
        Ok(())
    }
}
