//! SplitPay Settings
//!
//! Configuration for the SplitPay CLI and services.
//!
//! ## Features
//!
//! - RPC endpoints (primary + fallbacks), commitment and retry policy
//! - Cluster selection (devnet/mainnet) and USDC mint override
//! - Wallet keypair location
//! - JSON file storage with environment overrides
//!
//! ## Usage
//!
//! ```no_run
//! use splitpay_settings::Settings;
//!
//! // Load or create default settings, then apply SPLITPAY_* overrides
//! let settings = Settings::load_or_default()?.with_env_overrides();
//!
//! // Build the settlement client config
//! let config = settings.to_settlement_config()?;
//! # Ok::<(), splitpay_settings::SettingsError>(())
//! ```

mod config;

pub use config::{Cluster, RpcSettings, Settings, TokenSettings, WalletSettings};

use std::path::PathBuf;

use thiserror::Error;

/// Environment variable replacing the primary RPC endpoint
pub const ENV_RPC_URL: &str = "SPLITPAY_RPC_URL";

/// Environment variable replacing the wallet keypair path
pub const ENV_KEYPAIR: &str = "SPLITPAY_KEYPAIR";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings: {0}")]
    ReadError(std::io::Error),

    #[error("Failed to write settings: {0}")]
    WriteError(std::io::Error),

    #[error("Failed to parse settings: {0}")]
    ParseError(serde_json::Error),

    #[error("Failed to create config directory: {0}")]
    CreateDirError(std::io::Error),

    #[error("Invalid setting {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, SettingsError>;

/// `~/.splitpay`, or `./.splitpay` when no home directory is known
pub fn default_config_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".splitpay")
}

/// Get the default settings file path
pub fn default_settings_path() -> PathBuf {
    default_config_dir().join("settings.json")
}

/// Expand a leading `~/` to the home directory
pub fn expand_path(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(path),
    }
}
