//! Error types for the session engine.
//!
//! Precondition and validation failures are typed so callers can report a
//! distinct reason for each. Collaborator failures travel as `anyhow::Error`.

use thiserror::Error;

use crate::model::GroupId;

/// Why a session could not be started. No state is changed on any of these.
#[derive(Debug, Error)]
pub enum StartError {
    /// The question bank has nothing to ask.
    #[error("no questions available; import questions before starting an exam")]
    EmptyBank,

    /// The group's preset has not been confirmed.
    #[error("preset for group {0} is not ready; confirm the exam setup first")]
    PresetNotReady(GroupId),

    /// A session for the group is still registered.
    #[error("an exam is already running in group {0}")]
    AlreadyRunning(GroupId),

    /// A one-shot override carried out-of-range values.
    #[error("invalid exam setup: {0}")]
    InvalidPreset(#[from] PresetError),

    /// Loading the bank or the preset failed.
    #[error("failed to load exam configuration: {0:#}")]
    Store(anyhow::Error),
}

impl StartError {
    /// Returns `true` for failures caused by exam preconditions rather than
    /// a broken collaborator.
    pub fn is_precondition(&self) -> bool {
        !matches!(self, StartError::Store(_))
    }
}

/// Errors raised when arming a scheduled start.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// The requested instant is now or already past.
    #[error("scheduled time {0} is not in the future")]
    NotInFuture(chrono::DateTime<chrono::Utc>),
}

/// Rejected preset edits.
#[derive(Debug, Error, PartialEq)]
pub enum PresetError {
    #[error("exam name must not be empty")]
    EmptyName,

    #[error("time per question must be 5..600 seconds, got {0}")]
    TimeOutOfRange(u32),

    #[error("mark per correct answer must be greater than zero, got {0}")]
    InvalidMark(f64),

    #[error("penalty per wrong answer must not be negative, got {0}")]
    InvalidPenalty(f64),
}

/// Malformed questions.
#[derive(Debug, Error, PartialEq)]
pub enum QuestionError {
    #[error("question text must not be empty")]
    EmptyText,

    #[error("a question needs 2..10 options, got {0}")]
    OptionCount(usize),

    #[error("correct option {correct} is out of range for {options} options")]
    CorrectOutOfRange { correct: usize, options: usize },
}
