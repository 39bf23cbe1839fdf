//! Core data model types for pollexam.
//!
//! Questions, per-group presets, participants and their per-session results.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PresetError, QuestionError};

/// Chat identifier of the group an exam runs in.
pub type GroupId = i64;

/// Chat-platform identifier of a participant or admin.
pub type UserId = i64;

/// Fewest options a question may carry.
pub const MIN_OPTIONS: usize = 2;
/// Most options a question may carry.
pub const MAX_OPTIONS: usize = 10;
/// Shortest allowed answer window in seconds.
pub const MIN_TIME_PER_QUESTION: u32 = 5;
/// Longest allowed answer window in seconds.
pub const MAX_TIME_PER_QUESTION: u32 = 600;

/// A single multiple-choice quiz item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    /// The question text.
    pub text: String,
    /// Answer options in display order.
    pub options: Vec<String>,
    /// Zero-based index of the correct option.
    pub correct: usize,
    /// Optional explanation shown after the window closes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl Question {
    /// Build a question, rejecting malformed option lists.
    pub fn new(
        text: impl Into<String>,
        options: Vec<String>,
        correct: usize,
    ) -> Result<Self, QuestionError> {
        let question = Self {
            text: text.into(),
            options,
            correct,
            explanation: None,
        };
        question.validate()?;
        Ok(question)
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }

    pub fn validate(&self) -> Result<(), QuestionError> {
        if self.text.trim().is_empty() {
            return Err(QuestionError::EmptyText);
        }
        if !(MIN_OPTIONS..=MAX_OPTIONS).contains(&self.options.len()) {
            return Err(QuestionError::OptionCount(self.options.len()));
        }
        if self.correct >= self.options.len() {
            return Err(QuestionError::CorrectOutOfRange {
                correct: self.correct,
                options: self.options.len(),
            });
        }
        Ok(())
    }
}

/// Per-group exam configuration.
///
/// Every edit clears `ready`, so an admin has to confirm the configuration
/// again before the next session can start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    #[serde(default = "default_exam_name")]
    pub exam_name: String,
    #[serde(default = "default_time_per_question")]
    pub time_per_question: u32,
    #[serde(default = "default_mark")]
    pub mark_per_correct: f64,
    #[serde(default = "default_penalty")]
    pub penalty_per_wrong: f64,
    #[serde(default)]
    pub ready: bool,
}

fn default_exam_name() -> String {
    "Untitled Exam".to_string()
}
fn default_time_per_question() -> u32 {
    30
}
fn default_mark() -> f64 {
    1.0
}
fn default_penalty() -> f64 {
    0.25
}

impl Default for Preset {
    fn default() -> Self {
        Self {
            exam_name: default_exam_name(),
            time_per_question: default_time_per_question(),
            mark_per_correct: default_mark(),
            penalty_per_wrong: default_penalty(),
            ready: false,
        }
    }
}

/// One-shot preset override, as accepted by `/start_exam "Name" 30 1 0.25`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresetOverride {
    pub exam_name: Option<String>,
    pub time_per_question: Option<u32>,
    pub mark_per_correct: Option<f64>,
    pub penalty_per_wrong: Option<f64>,
}

impl Preset {
    pub fn set_name(&mut self, name: &str) -> Result<(), PresetError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PresetError::EmptyName);
        }
        self.exam_name = name.to_string();
        self.ready = false;
        Ok(())
    }

    pub fn set_time(&mut self, seconds: u32) -> Result<(), PresetError> {
        check_time(seconds)?;
        self.time_per_question = seconds;
        self.ready = false;
        Ok(())
    }

    pub fn set_marks(&mut self, mark: f64, penalty: f64) -> Result<(), PresetError> {
        check_marks(mark, penalty)?;
        self.mark_per_correct = mark;
        self.penalty_per_wrong = penalty;
        self.ready = false;
        Ok(())
    }

    /// Confirm the current configuration so a session may start.
    pub fn mark_ready(&mut self) -> Result<(), PresetError> {
        self.validate()?;
        self.ready = true;
        Ok(())
    }

    /// Apply an override. Missing time and marks fall back to the defaults,
    /// matching the `/start_exam` argument form. The preset ends up ready.
    pub fn apply_override(&mut self, ov: PresetOverride) -> Result<(), PresetError> {
        let time = ov.time_per_question.unwrap_or_else(default_time_per_question);
        let mark = ov.mark_per_correct.unwrap_or_else(default_mark);
        let penalty = ov.penalty_per_wrong.unwrap_or_else(default_penalty);
        check_time(time)?;
        check_marks(mark, penalty)?;
        if let Some(name) = ov.exam_name {
            self.set_name(&name)?;
        }
        self.time_per_question = time;
        self.mark_per_correct = mark;
        self.penalty_per_wrong = penalty;
        self.ready = true;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), PresetError> {
        if self.exam_name.trim().is_empty() {
            return Err(PresetError::EmptyName);
        }
        check_time(self.time_per_question)?;
        check_marks(self.mark_per_correct, self.penalty_per_wrong)
    }
}

fn check_time(seconds: u32) -> Result<(), PresetError> {
    if (MIN_TIME_PER_QUESTION..=MAX_TIME_PER_QUESTION).contains(&seconds) {
        Ok(())
    } else {
        Err(PresetError::TimeOutOfRange(seconds))
    }
}

fn check_marks(mark: f64, penalty: f64) -> Result<(), PresetError> {
    if !mark.is_finite() || mark <= 0.0 {
        return Err(PresetError::InvalidMark(mark));
    }
    if !penalty.is_finite() || penalty < 0.0 {
        return Err(PresetError::InvalidPenalty(penalty));
    }
    Ok(())
}

/// Identity of someone answering polls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: UserId,
    pub full_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

impl Participant {
    pub fn new(id: UserId, full_name: impl Into<String>) -> Self {
        Self {
            id,
            full_name: full_name.into(),
            username: None,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Name as shown on leaderboards: `Full Name (@handle)`.
    pub fn display_name(&self) -> String {
        match &self.username {
            Some(handle) => format!("{} (@{handle})", self.full_name),
            None => self.full_name.clone(),
        }
    }
}

/// How a participant fared on one question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Correct,
    Wrong,
    Skipped,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Correct => write!(f, "C"),
            Outcome::Wrong => write!(f, "W"),
            Outcome::Skipped => write!(f, "S"),
        }
    }
}

/// A participant's tally within one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserResult {
    pub participant: Participant,
    pub correct: u32,
    pub wrong: u32,
    pub skipped: u32,
    pub score: f64,
    /// Question index → outcome. Complete only after finalization.
    #[serde(default)]
    pub answers: BTreeMap<usize, Outcome>,
}

impl UserResult {
    pub fn new(participant: Participant) -> Self {
        Self {
            participant,
            correct: 0,
            wrong: 0,
            skipped: 0,
            score: 0.0,
            answers: BTreeMap::new(),
        }
    }

    pub fn answered(&self) -> u32 {
        self.correct + self.wrong
    }
}
