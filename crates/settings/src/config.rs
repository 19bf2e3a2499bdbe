//! Configuration types

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use splitpay_settlement::token::{USDC_MINT_DEVNET, USDC_MINT_MAINNET};
use splitpay_settlement::{SettlementConfig, SettlementMode};
use tracing::{debug, info};

use crate::{default_settings_path, expand_path, Result, SettingsError, ENV_KEYPAIR, ENV_RPC_URL};

/// Main settings structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// RPC endpoint settings
    #[serde(default)]
    pub rpc: RpcSettings,

    /// Token and cluster settings
    #[serde(default)]
    pub token: TokenSettings,

    /// Local wallet settings
    #[serde(default)]
    pub wallet: WalletSettings,

    /// Custom settings file path (not serialized)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

impl Settings {
    /// Load settings from the default path, or create defaults
    pub fn load_or_default() -> Result<Self> {
        Self::load_from(&default_settings_path())
    }

    /// Load settings from a specific path, or create defaults
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path).map_err(SettingsError::ReadError)?;
            let mut settings: Settings = serde_json::from_str(&content).map_err(SettingsError::ParseError)?;
            settings.config_path = Some(path.clone());
            info!("Loaded settings from {:?}", path);
            Ok(settings)
        } else {
            debug!("No settings at {:?}, using defaults", path);
            Ok(Self {
                config_path: Some(path.clone()),
                ..Self::default()
            })
        }
    }

    /// Path these settings were loaded from, if any
    pub fn path(&self) -> Option<&PathBuf> {
        self.config_path.as_ref()
    }

    /// Save settings to the configured path
    pub fn save(&self) -> Result<()> {
        let path = self.config_path.clone().unwrap_or_else(default_settings_path);
        self.save_to(&path)
    }

    /// Save settings to a specific path
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(SettingsError::CreateDirError)?;
            }
        }

        let content = serde_json::to_string_pretty(self).map_err(SettingsError::ParseError)?;
        std::fs::write(path, content).map_err(SettingsError::WriteError)?;
        info!("Saved settings to {:?}", path);
        Ok(())
    }

    /// Apply `SPLITPAY_*` environment overrides
    pub fn with_env_overrides(self) -> Self {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup. Empty values are ignored.
    pub fn apply_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let present = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = present(ENV_RPC_URL) {
            debug!("RPC endpoint overridden by {}", ENV_RPC_URL);
            self.rpc.primary_url = Some(url);
        }
        if let Some(path) = present(ENV_KEYPAIR) {
            debug!("Keypair path overridden by {}", ENV_KEYPAIR);
            self.wallet.keypair_path = Some(path);
        }
        self
    }

    /// Keypair file to sign with, `~` expanded
    pub fn keypair_path(&self) -> Option<PathBuf> {
        self.wallet.keypair_path.as_deref().map(expand_path)
    }

    /// Settlement client configuration for the selected cluster
    pub fn to_settlement_config(&self) -> Result<SettlementConfig> {
        let mut config = match self.token.cluster {
            Cluster::Devnet => SettlementConfig::devnet(),
            Cluster::Mainnet => SettlementConfig::mainnet(),
        };

        if let Some(url) = &self.rpc.primary_url {
            config.rpc_url = url.clone();
        }
        if let Some(fallbacks) = &self.rpc.fallback_urls {
            config.fallback_urls = fallbacks.clone();
        }
        if let Some(commitment) = &self.rpc.commitment {
            match commitment.as_str() {
                "processed" | "confirmed" | "finalized" => config.commitment = commitment.clone(),
                other => {
                    return Err(SettingsError::InvalidValue {
                        field: "rpc.commitment",
                        reason: format!("unknown commitment level {:?}", other),
                    })
                }
            }
        }
        config.usdc_mint = self.token.mint()?;
        config.max_retries = self.rpc.max_retries;
        config.retry_backoff = Duration::from_millis(self.rpc.retry_backoff_ms);

        if self.rpc.mock {
            config.mode = SettlementMode::Mock;
            config.retry_backoff = Duration::ZERO;
        }

        Ok(config)
    }
}

/// RPC endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcSettings {
    /// Primary endpoint. Cluster default when unset.
    #[serde(default)]
    pub primary_url: Option<String>,

    /// Fallback endpoints in order. Cluster defaults when unset.
    #[serde(default)]
    pub fallback_urls: Option<Vec<String>>,

    /// processed, confirmed or finalized. Cluster default when unset.
    #[serde(default)]
    pub commitment: Option<String>,

    /// Retries after a rate-limited lookup
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff between retries in milliseconds
    #[serde(default = "default_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Use the in-memory ledger instead of the network
    #[serde(default)]
    pub mock: bool,
}

fn default_max_retries() -> u32 {
    2
}

fn default_backoff_ms() -> u64 {
    1000
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            primary_url: None,
            fallback_urls: None,
            commitment: None,
            max_retries: default_max_retries(),
            retry_backoff_ms: default_backoff_ms(),
            mock: false,
        }
    }
}

/// Solana cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Cluster {
    #[default]
    Devnet,
    Mainnet,
}

impl FromStr for Cluster {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "devnet" => Ok(Self::Devnet),
            "mainnet" | "mainnet-beta" => Ok(Self::Mainnet),
            other => Err(SettingsError::InvalidValue {
                field: "token.cluster",
                reason: format!("unknown cluster {:?}", other),
            }),
        }
    }
}

/// Token settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenSettings {
    #[serde(default)]
    pub cluster: Cluster,

    /// USDC mint override (base58)
    #[serde(default)]
    pub mint: Option<String>,
}

impl TokenSettings {
    /// Configured mint, or the cluster's USDC mint
    pub fn mint(&self) -> Result<Pubkey> {
        match &self.mint {
            Some(mint) => Pubkey::from_str(mint.trim()).map_err(|e| SettingsError::InvalidValue {
                field: "token.mint",
                reason: e.to_string(),
            }),
            None => Ok(match self.cluster {
                Cluster::Devnet => USDC_MINT_DEVNET,
                Cluster::Mainnet => USDC_MINT_MAINNET,
            }),
        }
    }
}

/// Wallet settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletSettings {
    /// Keypair file or base58 secret key used by `pay`
    #[serde(default)]
    pub keypair_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("splitpay-settings-{}-{}", name, std::process::id()))
            .join("settings.json")
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.token.cluster, Cluster::Devnet);
        assert_eq!(settings.rpc.max_retries, 2);
        assert_eq!(settings.rpc.retry_backoff_ms, 1000);
        assert!(!settings.rpc.mock);
        assert!(settings.wallet.keypair_path.is_none());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"token": {"cluster": "mainnet"}}"#).unwrap();
        assert_eq!(settings.token.cluster, Cluster::Mainnet);
        assert_eq!(settings.rpc.max_retries, 2);
    }

    #[test]
    fn test_save_and_load() {
        let path = temp_path("roundtrip");
        let mut settings = Settings::default();
        settings.rpc.primary_url = Some("https://rpc.example.com".to_string());
        settings.wallet.keypair_path = Some("/tmp/id.json".to_string());
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded.rpc.primary_url.as_deref(), Some("https://rpc.example.com"));
        assert_eq!(loaded.wallet.keypair_path.as_deref(), Some("/tmp/id.json"));
        assert_eq!(loaded.path(), Some(&path));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let path = temp_path("missing");
        let settings = Settings::load_from(&path).unwrap();
        assert!(settings.rpc.primary_url.is_none());
        assert_eq!(settings.path(), Some(&path));
    }

    #[test]
    fn test_env_overrides() {
        let settings = Settings::default().apply_overrides_from(|key| match key {
            ENV_RPC_URL => Some("https://override.example.com".to_string()),
            ENV_KEYPAIR => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(settings.rpc.primary_url.as_deref(), Some("https://override.example.com"));
        assert!(settings.wallet.keypair_path.is_none());
    }

    #[test]
    fn test_to_settlement_config_devnet() {
        let config = Settings::default().to_settlement_config().unwrap();
        assert_eq!(config.mode, SettlementMode::Live);
        assert_eq!(config.rpc_url, SettlementConfig::DEVNET_URL);
        assert_eq!(config.usdc_mint, USDC_MINT_DEVNET);
        assert_eq!(config.retry_backoff, Duration::from_secs(1));
        assert_eq!(config.fallback_urls.len(), 3);
    }

    #[test]
    fn test_to_settlement_config_overrides() {
        let mut settings = Settings::default();
        settings.token.cluster = Cluster::Mainnet;
        settings.rpc.primary_url = Some("https://primary.example.com".to_string());
        settings.rpc.fallback_urls = Some(vec!["https://fallback.example.com".to_string()]);
        settings.rpc.mock = true;

        let config = settings.to_settlement_config().unwrap();
        assert_eq!(config.mode, SettlementMode::Mock);
        assert_eq!(config.usdc_mint, USDC_MINT_MAINNET);
        assert_eq!(config.commitment, "finalized");
        assert_eq!(
            config.endpoints(),
            vec!["https://primary.example.com", "https://fallback.example.com"]
        );
        assert_eq!(config.retry_backoff, Duration::ZERO);
    }

    #[test]
    fn test_invalid_mint_rejected() {
        let mut settings = Settings::default();
        settings.token.mint = Some("not-a-mint".to_string());
        assert!(matches!(
            settings.to_settlement_config(),
            Err(SettingsError::InvalidValue { field: "token.mint", .. })
        ));
    }

    #[test]
    fn test_invalid_commitment_rejected() {
        let mut settings = Settings::default();
        settings.rpc.commitment = Some("eventually".to_string());
        assert!(settings.to_settlement_config().is_err());
    }

    #[test]
    fn test_cluster_from_str() {
        assert_eq!("mainnet-beta".parse::<Cluster>().unwrap(), Cluster::Mainnet);
        assert_eq!("DEVNET".parse::<Cluster>().unwrap(), Cluster::Devnet);
        assert!("testnet".parse::<Cluster>().is_err());
    }
}
