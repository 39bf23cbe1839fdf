//! The `pollexam import` command.

use std::path::PathBuf;

use anyhow::Result;

use pollexam_core::parser::{parse_questions, validate_questions};
use pollexam_core::traits::QuestionBank;
use pollexam_transport::config::load_config_from;
use pollexam_transport::store::JsonFileQuestionBank;

pub async fn execute(
    questions_path: PathBuf,
    replace: bool,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let questions = parse_questions(&questions_path)?;

    for w in validate_questions(&questions) {
        let prefix = w
            .item
            .map(|n| format!("[#{n}] "))
            .unwrap_or_default();
        eprintln!("Warning: {prefix}{}", w.message);
    }

    let bank = JsonFileQuestionBank::in_dir(&config.data_dir);
    if replace {
        bank.clear().await?;
    }
    let imported = questions.len();
    let total = bank.import(questions).await?;

    println!("Imported {imported} questions ({total} in bank)");
    println!("Bank file: {}", bank.path().display());
    Ok(())
}
