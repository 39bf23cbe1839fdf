//! pollexam CLI — runs the exam bot and manages its questions and presets.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "pollexam", version, about = "Timed quiz exams for chat groups")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot: long-poll updates and drive exam sessions
    Serve {
        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Run an offline exam against the mock transport with simulated participants
    Simulate {
        /// Question file (.json or .toml)
        #[arg(long)]
        questions: PathBuf,

        /// Number of simulated participants
        #[arg(long, default_value = "5")]
        participants: usize,

        /// Seconds per question
        #[arg(long, default_value = "5")]
        time: u32,

        /// Exam name
        #[arg(long, default_value = "Simulated Exam")]
        name: String,

        /// Mark per correct answer
        #[arg(long, default_value = "1.0")]
        mark: f64,

        /// Penalty per wrong answer
        #[arg(long, default_value = "0.25")]
        penalty: f64,

        /// Directory for the JSON report, HTML report and leaderboard
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Validate a question file without importing it
    Validate {
        /// Question file (.json or .toml)
        #[arg(long)]
        questions: PathBuf,
    },

    /// Add questions to the bank
    Import {
        /// Question file (.json or .toml)
        #[arg(long)]
        questions: PathBuf,

        /// Clear the bank first
        #[arg(long)]
        replace: bool,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the JSON question import template
    Template,

    /// Show or edit a group's exam preset
    Preset {
        /// Group (chat) id
        #[arg(long, allow_negative_numbers = true)]
        group: i64,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,

        #[command(subcommand)]
        action: commands::preset::PresetAction,
    },

    /// Show bank size, presets and running sessions
    Status {
        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create a starter config and an example question file
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pollexam=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve { config } => commands::serve::execute(config).await,
        Commands::Simulate {
            questions,
            participants,
            time,
            name,
            mark,
            penalty,
            output,
        } => {
            commands::simulate::execute(
                questions,
                participants,
                time,
                name,
                mark,
                penalty,
                output,
            )
            .await
        }
        Commands::Validate { questions } => commands::validate::execute(questions),
        Commands::Import {
            questions,
            replace,
            config,
        } => commands::import::execute(questions, replace, config).await,
        Commands::Template => commands::template::execute(),
        Commands::Preset {
            group,
            config,
            action,
        } => commands::preset::execute(group, action, config).await,
        Commands::Status { config } => commands::status::execute(config).await,
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
