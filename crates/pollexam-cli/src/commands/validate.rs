//! The `pollexam validate` command.

use std::path::PathBuf;

use anyhow::Result;

use pollexam_core::parser::{parse_questions, validate_questions};

pub fn execute(questions_path: PathBuf) -> Result<()> {
    let questions = parse_questions(&questions_path)?;
    println!(
        "Question file: {} ({} questions)",
        questions_path.display(),
        questions.len()
    );

    let warnings = validate_questions(&questions);
    for w in &warnings {
        let prefix = w
            .item
            .map(|n| format!("  [#{n}]"))
            .unwrap_or_else(|| "  ".to_string());
        println!("{prefix} WARNING: {}", w.message);
    }

    if warnings.is_empty() {
        println!("All questions valid.");
    } else {
        println!("\n{} warning(s) found.", warnings.len());
    }

    Ok(())
}
