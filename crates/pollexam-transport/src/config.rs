//! Configuration loading and transport factory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use pollexam_core::engine::EngineConfig;
use pollexam_core::model::{GroupId, UserId};
use pollexam_core::traits::Transport;

use crate::mock::MockTransport;
use crate::telegram::TelegramTransport;

/// Which chat transport to use.
///
/// Note: Custom Debug impl masks the bot token to prevent accidental exposure in logs.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    Telegram {
        bot_token: String,
        #[serde(default)]
        base_url: Option<String>,
    },
    #[default]
    Mock,
}

impl std::fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportConfig::Telegram {
                bot_token: _,
                base_url,
            } => f
                .debug_struct("Telegram")
                .field("bot_token", &"***")
                .field("base_url", base_url)
                .finish(),
            TransportConfig::Mock => f.write_str("Mock"),
        }
    }
}

/// Top-level pollexam configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollexamConfig {
    #[serde(default)]
    pub transport: TransportConfig,
    /// Where the question bank and presets are stored.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Where finalized exam reports are written.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Users allowed to run exam commands in any group.
    #[serde(default)]
    pub admins: Vec<UserId>,
    /// Users who privately receive every full report.
    #[serde(default)]
    pub report_recipients: Vec<UserId>,
    /// Extra seconds after each answer window.
    #[serde(default = "default_grace")]
    pub grace_secs: u64,
    /// Intro countdown length in seconds.
    #[serde(default = "default_countdown")]
    pub countdown_secs: u32,
    /// Entries shown on the group leaderboard.
    #[serde(default = "default_top_n")]
    pub leaderboard_top_n: usize,
    /// Long-poll timeout for inbound updates.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
    /// Public usernames of groups, keyed by group id, for question links.
    #[serde(default)]
    pub group_usernames: HashMap<String, String>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./pollexam-data")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./pollexam-reports")
}
fn default_grace() -> u64 {
    2
}
fn default_countdown() -> u32 {
    5
}
fn default_top_n() -> usize {
    10
}
fn default_poll_timeout() -> u64 {
    25
}

impl Default for PollexamConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            data_dir: default_data_dir(),
            output_dir: default_output_dir(),
            admins: Vec::new(),
            report_recipients: Vec::new(),
            grace_secs: default_grace(),
            countdown_secs: default_countdown(),
            leaderboard_top_n: default_top_n(),
            poll_timeout_secs: default_poll_timeout(),
            group_usernames: HashMap::new(),
        }
    }
}

impl PollexamConfig {
    pub fn is_admin(&self, user: UserId) -> bool {
        self.admins.contains(&user)
    }

    /// Engine settings derived from this configuration.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let group_usernames = self
            .group_usernames
            .iter()
            .map(|(group, name)| {
                let id: GroupId = group
                    .parse()
                    .with_context(|| format!("group_usernames: '{group}' is not a group id"))?;
                Ok((id, name.clone()))
            })
            .collect::<Result<HashMap<_, _>>>()?;

        Ok(EngineConfig {
            grace: Duration::from_secs(self.grace_secs),
            countdown_secs: self.countdown_secs,
            leaderboard_top_n: self.leaderboard_top_n,
            report_recipients: self.report_recipients.clone(),
            group_usernames,
            report_dir: Some(self.output_dir.clone()),
        })
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
/// Substituted values are not scanned again.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    let mut from = 0;
    while let Some(offset) = result[from..].find("${") {
        let start = from + offset;
        let Some(end) = result[start..].find('}') else {
            break;
        };
        let var_name = &result[start + 2..start + end];
        let value = std::env::var(var_name).unwrap_or_default();
        result = format!("{}{}{}", &result[..start], value, &result[start + end + 1..]);
        from = start + value.len();
    }
    result
}

fn resolve_transport_config(config: &TransportConfig) -> TransportConfig {
    match config {
        TransportConfig::Telegram {
            bot_token,
            base_url,
        } => TransportConfig::Telegram {
            bot_token: resolve_env_vars(bot_token),
            base_url: base_url.as_ref().map(|u| resolve_env_vars(u)),
        },
        TransportConfig::Mock => TransportConfig::Mock,
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `pollexam.toml` in the current directory
/// 2. `~/.config/pollexam/config.toml`
///
/// `POLLEXAM_BOT_TOKEN` overrides the bot token and selects the Telegram
/// transport when none is configured.
pub fn load_config() -> Result<PollexamConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<PollexamConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from("pollexam.toml");
            if local.exists() {
                Some(local)
            } else {
                dirs_path()
                    .map(|home| home.join("config.toml"))
                    .filter(|global| global.exists())
            }
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            parse_config(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => PollexamConfig::default(),
    };

    if let Ok(token) = std::env::var("POLLEXAM_BOT_TOKEN") {
        config.transport = match config.transport {
            TransportConfig::Telegram { base_url, .. } => TransportConfig::Telegram {
                bot_token: token,
                base_url,
            },
            TransportConfig::Mock => TransportConfig::Telegram {
                bot_token: token,
                base_url: None,
            },
        };
    }

    config.transport = resolve_transport_config(&config.transport);
    Ok(config)
}

/// Parse a configuration document.
pub fn parse_config(content: &str) -> Result<PollexamConfig> {
    Ok(toml::from_str(content)?)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("pollexam"))
}

/// A transport built from configuration.
pub enum ConfiguredTransport {
    Telegram(Arc<TelegramTransport>),
    Mock(Arc<MockTransport>),
}

impl ConfiguredTransport {
    pub fn as_transport(&self) -> Arc<dyn Transport> {
        match self {
            ConfiguredTransport::Telegram(t) => Arc::clone(t) as Arc<dyn Transport>,
            ConfiguredTransport::Mock(m) => Arc::clone(m) as Arc<dyn Transport>,
        }
    }
}

/// Create a transport instance from its configuration.
pub fn create_transport(
    config: &TransportConfig,
    poll_timeout_secs: u64,
) -> Result<ConfiguredTransport> {
    match config {
        TransportConfig::Telegram {
            bot_token,
            base_url,
        } => {
            if bot_token.trim().is_empty() {
                anyhow::bail!("telegram transport needs a bot_token (or POLLEXAM_BOT_TOKEN)");
            }
            Ok(ConfiguredTransport::Telegram(Arc::new(
                TelegramTransport::new(bot_token, base_url.clone(), poll_timeout_secs)?,
            )))
        }
        TransportConfig::Mock => Ok(ConfiguredTransport::Mock(Arc::new(MockTransport::new()))),
    }
}
