//! The `pollexam status` command.
//!
//! A running `pollexam serve` keeps a small status snapshot next to the
//! bank; this command reads it together with the stores.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pollexam_core::model::GroupId;
use pollexam_core::traits::{PresetStore, QuestionBank};
use pollexam_transport::config::load_config_from;
use pollexam_transport::store::{JsonFilePresetStore, JsonFileQuestionBank};

pub const STATUS_FILE: &str = "status.json";

/// What the bot process last reported about itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotStatus {
    pub updated_at: DateTime<Utc>,
    /// Groups with a registered session.
    pub running_groups: Vec<GroupId>,
    /// Sessions still dispatching questions.
    pub active_sessions: usize,
    pub scheduled_starts: usize,
}

impl BotStatus {
    pub fn write(&self, data_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join(STATUS_FILE);
        std::fs::write(&path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("failed to write {}", path.display()))
    }

    pub fn read(data_dir: &Path) -> Result<Option<Self>> {
        let path = data_dir.join(STATUS_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Ok(Some(serde_json::from_str(&content).with_context(|| {
            format!("failed to parse {}", path.display())
        })?))
    }
}

pub async fn execute(config_path: Option<PathBuf>) -> Result<()> {
    use comfy_table::Table;

    let config = load_config_from(config_path.as_deref())?;
    let bank = JsonFileQuestionBank::in_dir(&config.data_dir);
    let presets = JsonFilePresetStore::in_dir(&config.data_dir);

    println!("Data directory: {}", config.data_dir.display());
    println!("Questions in bank: {}", bank.len().await?);

    let presets = presets.list().await?;
    if presets.is_empty() {
        println!("No presets configured.");
    } else {
        let mut table = Table::new();
        table.set_header(vec!["Group", "Exam", "Time", "Mark", "Negative", "Ready"]);
        for (group, preset) in &presets {
            table.add_row(vec![
                group.to_string(),
                preset.exam_name.clone(),
                format!("{}s", preset.time_per_question),
                format!("+{}", preset.mark_per_correct),
                format!("-{}", preset.penalty_per_wrong),
                if preset.ready { "yes" } else { "no" }.to_string(),
            ]);
        }
        println!("{table}");
    }

    match BotStatus::read(&config.data_dir)? {
        Some(status) => {
            println!(
                "Active sessions: {} (as of {})",
                status.active_sessions,
                status.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            for group in &status.running_groups {
                println!("  running in group {group}");
            }
            println!("Scheduled starts: {}", status.scheduled_starts);
        }
        None => println!("Active sessions: 0 (bot has not reported)"),
    }

    Ok(())
}
