//! The `pollexam init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    if std::path::Path::new("pollexam.toml").exists() {
        println!("pollexam.toml already exists, skipping.");
    } else {
        std::fs::write("pollexam.toml", SAMPLE_CONFIG)?;
        println!("Created pollexam.toml");
    }

    std::fs::create_dir_all("questions")?;
    let example_path = std::path::Path::new("questions/example.json");
    if example_path.exists() {
        println!("questions/example.json already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_QUESTIONS)?;
        println!("Created questions/example.json");
    }

    println!("\nNext steps:");
    println!("  1. Put your bot token in POLLEXAM_BOT_TOKEN (or edit pollexam.toml)");
    println!("  2. Run: pollexam import --questions questions/example.json");
    println!("  3. Run: pollexam preset --group=<chat id> ready");
    println!("  4. Run: pollexam serve");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# pollexam configuration

data_dir = "./pollexam-data"
output_dir = "./pollexam-reports"

# Users allowed to run exam commands in any group, besides group admins.
admins = []
# Users who privately receive the full report after every exam.
report_recipients = []

grace_secs = 2
countdown_secs = 5
leaderboard_top_n = 10
poll_timeout_secs = 25

[transport]
type = "telegram"
bot_token = "${POLLEXAM_BOT_TOKEN}"

# Public group usernames for question links, keyed by chat id.
[group_usernames]
"#;

const EXAMPLE_QUESTIONS: &str = r#"[
  {
    "question": "What is the chemical symbol for gold?",
    "options": { "A": "Ag", "B": "Au", "C": "Gd", "D": "Go" },
    "correct_answer": "B",
    "explanation": "From the Latin aurum."
  },
  {
    "question": "How many bones are in the adult human body?",
    "options": { "A": "186", "B": "206", "C": "226", "D": "246" },
    "correct_answer": "B"
  },
  {
    "question": "Which planet has the shortest year?",
    "options": { "A": "Venus", "B": "Mars", "C": "Mercury", "D": "Earth" },
    "correct_answer": "C"
  }
]
"#;
