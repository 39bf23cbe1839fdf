//! pollexam-transport — Chat platform integration and storage.
//!
//! Implements the core `Transport` trait for the Telegram Bot API and a mock,
//! parses inbound updates into answer and command events, and provides JSON
//! file stores plus configuration loading.

pub mod config;
pub mod error;
pub mod mock;
pub mod store;
pub mod telegram;
pub mod updates;

pub use config::{
    create_transport, load_config, load_config_from, ConfiguredTransport, PollexamConfig,
    TransportConfig,
};
pub use error::{CommandError, TransportError};
