//! The `pollexam preset` command.

use std::path::PathBuf;

use anyhow::Result;
use clap::Subcommand;

use pollexam_core::model::{GroupId, Preset};
use pollexam_core::traits::PresetStore;
use pollexam_transport::config::load_config_from;
use pollexam_transport::store::JsonFilePresetStore;

#[derive(Subcommand)]
pub enum PresetAction {
    /// Print the preset
    Show,
    /// Set the exam name
    SetName { name: String },
    /// Set seconds per question (5-600)
    SetTime { seconds: u32 },
    /// Set mark per correct answer and penalty per wrong answer
    SetMarks { mark: f64, penalty: f64 },
    /// Confirm the preset so an exam can start
    Ready,
}

pub async fn execute(
    group: GroupId,
    action: PresetAction,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let store = JsonFilePresetStore::in_dir(&config.data_dir);
    let mut preset = store.get(group).await?;

    match action {
        PresetAction::Show => {
            print_preset(group, &preset);
            return Ok(());
        }
        PresetAction::SetName { name } => preset.set_name(&name)?,
        PresetAction::SetTime { seconds } => preset.set_time(seconds)?,
        PresetAction::SetMarks { mark, penalty } => preset.set_marks(mark, penalty)?,
        PresetAction::Ready => preset.mark_ready()?,
    }

    store.save(group, &preset).await?;
    print_preset(group, &preset);
    if !preset.ready {
        println!("\nRun `pollexam preset --group={group} ready` to confirm.");
    }
    Ok(())
}

fn print_preset(group: GroupId, preset: &Preset) {
    println!("Group {group}");
    println!("  Name:              {}", preset.exam_name);
    println!("  Time per question: {}s", preset.time_per_question);
    println!("  Mark per correct:  +{}", preset.mark_per_correct);
    println!("  Penalty per wrong: -{}", preset.penalty_per_wrong);
    println!(
        "  Ready:             {}",
        if preset.ready { "yes" } else { "no" }
    );
}
