//! Transport error types.

use thiserror::Error;

/// Errors that can occur when talking to the chat platform.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The API returned a 429 flood-control response.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// The bot token was rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The target chat does not exist or the bot is not a member.
    #[error("chat not found: {0}")]
    ChatNotFound(String),

    /// The bot may not write to the chat (e.g. the user never started it).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),
}

/// Why a chat command could not be parsed.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CommandError {
    #[error("unterminated quote in arguments")]
    UnterminatedQuote,

    #[error("'{value}' is not a valid {field}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("expected a time like 2026-10-20T10:00:00Z or \"2026-10-20 10:00\", got '{0}'")]
    InvalidTime(String),

    #[error("missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("only quiz polls with a correct answer can be saved")]
    NotAQuiz,

    #[error("invalid question: {0}")]
    InvalidQuestion(String),
}
