//! pollexam-core — Exam session engine, scoring, and scheduling.
//!
//! This crate defines the data model, the collaborator traits, and the
//! session state machine that runs timed quizzes in chat groups.

pub mod engine;
pub mod error;
pub mod finalize;
pub mod memory;
pub mod model;
pub mod parser;
pub mod registry;
pub mod report;
pub mod scheduler;
pub mod scoring;
pub mod session;
pub mod traits;

#[cfg(test)]
mod testing;

pub use engine::{EngineConfig, SessionEngine, SessionHandle};
pub use error::{PresetError, QuestionError, ScheduleError, StartError};
pub use session::{AnswerEvent, RecordOutcome};
