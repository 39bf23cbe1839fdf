//! Question file parser.
//!
//! Two formats are accepted:
//!
//! - the JSON import template, an array of
//!   `{"question", "options": {"A".."D"}, "correct_answer", "explanation"?}`
//! - the native format, `{"text", "options": [..], "correct", "explanation"?}`
//!   items either as a JSON array or as `[[questions]]` tables in TOML.
//!
//! JSON items may mix both shapes. Errors name the offending 1-based item.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::model::Question;

const TEMPLATE_KEYS: [&str; 4] = ["A", "B", "C", "D"];

/// Intermediate TOML structure for native question files.
#[derive(Debug, Deserialize)]
struct TomlQuestionFile {
    #[serde(default)]
    questions: Vec<NativeQuestion>,
}

#[derive(Debug, Deserialize)]
struct NativeQuestion {
    text: String,
    options: Vec<String>,
    correct: usize,
    #[serde(default)]
    explanation: Option<String>,
}

/// Parse a question file, picking the format from its extension.
pub fn parse_questions(path: &Path) -> Result<Vec<Question>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read question file: {}", path.display()))?;

    if path.extension().is_some_and(|ext| ext == "toml") {
        parse_questions_toml(&content, path)
    } else {
        parse_questions_json(&content)
    }
}

/// Parse native `[[questions]]` tables.
pub fn parse_questions_toml(content: &str, source_path: &Path) -> Result<Vec<Question>> {
    let parsed: TomlQuestionFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    parsed
        .questions
        .into_iter()
        .enumerate()
        .map(|(i, q)| native_to_question(i + 1, q))
        .collect()
}

/// Parse a JSON array of template or native items.
pub fn parse_questions_json(content: &str) -> Result<Vec<Question>> {
    let root: Value = serde_json::from_str(content).context("invalid JSON (parse failed)")?;
    let Value::Array(items) = root else {
        anyhow::bail!("root must be a JSON array");
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| parse_item(i + 1, item))
        .collect()
}

fn parse_item(n: usize, item: Value) -> Result<Question> {
    let Value::Object(fields) = item else {
        anyhow::bail!("Item #{n} must be an object");
    };
    if fields.contains_key("question") {
        parse_template_item(n, &fields)
    } else {
        let native: NativeQuestion = serde_json::from_value(Value::Object(fields))
            .with_context(|| format!("Item #{n}: not a template or native question"))?;
        native_to_question(n, native)
    }
}

fn parse_template_item(n: usize, fields: &serde_json::Map<String, Value>) -> Result<Question> {
    let text = fields
        .get("question")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .with_context(|| format!("Item #{n}: 'question' must be a non-empty string"))?;

    let Some(Value::Object(options)) = fields.get("options") else {
        anyhow::bail!("Item #{n}: 'options' must be an object with keys A/B/C/D");
    };
    let mut ordered = Vec::with_capacity(TEMPLATE_KEYS.len());
    for key in TEMPLATE_KEYS {
        let option = options
            .get(key)
            .and_then(Value::as_str)
            .with_context(|| format!("Item #{n}: options must include '{key}' as string"))?;
        ordered.push(option.to_string());
    }
    if let Some(extra) = options.keys().find(|k| !TEMPLATE_KEYS.contains(&k.as_str())) {
        anyhow::bail!("Item #{n}: unexpected option key '{extra}'");
    }

    let correct = fields
        .get("correct_answer")
        .and_then(Value::as_str)
        .and_then(|letter| TEMPLATE_KEYS.iter().position(|k| *k == letter.trim()))
        .with_context(|| format!("Item #{n}: 'correct_answer' must be one of A/B/C/D"))?;

    let mut question =
        Question::new(text, ordered, correct).with_context(|| format!("Item #{n}"))?;
    if let Some(explanation) = fields
        .get("explanation")
        .and_then(Value::as_str)
        .filter(|e| !e.trim().is_empty())
    {
        question = question.with_explanation(explanation);
    }
    Ok(question)
}

fn native_to_question(n: usize, q: NativeQuestion) -> Result<Question> {
    let mut question = Question::new(q.text.trim(), q.options, q.correct)
        .with_context(|| format!("Item #{n}"))?;
    question.explanation = q.explanation.filter(|e| !e.trim().is_empty());
    Ok(question)
}

/// The import template shown to admins.
pub fn json_template() -> String {
    let template = serde_json::json!([{
        "question": "What is the capital of France?",
        "options": { "A": "Paris", "B": "Lyon", "C": "Marseille", "D": "Nice" },
        "correct_answer": "A",
        "explanation": "Optional"
    }]);
    serde_json::to_string_pretty(&template).unwrap_or_default()
}

/// A warning from question validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// 1-based question number, if the warning concerns one question.
    pub item: Option<usize>,
    pub message: String,
}

/// Check a parsed question list for issues that do not prevent import.
pub fn validate_questions(questions: &[Question]) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    if questions.is_empty() {
        warnings.push(ValidationWarning {
            item: None,
            message: "file contains no questions".into(),
        });
    }

    let mut seen = HashSet::new();
    for (i, q) in questions.iter().enumerate() {
        if !seen.insert(q.text.to_lowercase()) {
            warnings.push(ValidationWarning {
                item: Some(i + 1),
                message: format!("duplicate question text: {}", q.text),
            });
        }
    }

    for (i, q) in questions.iter().enumerate() {
        let mut options = HashSet::new();
        if q.options.iter().any(|o| !options.insert(o.trim())) {
            warnings.push(ValidationWarning {
                item: Some(i + 1),
                message: "options repeat the same text".into(),
            });
        }
        if q.options.iter().any(|o| o.trim().is_empty()) {
            warnings.push(ValidationWarning {
                item: Some(i + 1),
                message: "an option is empty".into(),
            });
        }
    }

    // Polls reject longer question text.
    for (i, q) in questions.iter().enumerate() {
        if q.text.chars().count() > 300 {
            warnings.push(ValidationWarning {
                item: Some(i + 1),
                message: "question text exceeds 300 characters and will be cut".into(),
            });
        }
    }

    warnings
}
