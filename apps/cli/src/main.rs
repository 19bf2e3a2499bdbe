//! SplitPay CLI
//!
//! Command-line interface for splitting expenses and settling shares in USDC.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use solana_sdk::signature::{Keypair, Signer};
use tracing::{debug, info};

use splitpay_core::{compute_allocation, Amount, SplitAllocation, SplitMode};
use splitpay_settings::{default_settings_path, Settings};
use splitpay_settlement::{
    lamports_to_sol, KeypairSigner, PaymentResult, SettlementClient, TransactionSigner, TransferState,
};

/// SplitPay - split expenses, settle in USDC
#[derive(Parser)]
#[command(name = "splitpay")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file (defaults to ~/.splitpay/settings.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Use the in-memory ledger instead of Solana
    #[arg(long)]
    mock: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Divide a total among participants
    Split {
        /// Total amount, e.g. 45.50
        total: String,

        /// Participant who paid
        #[arg(short, long)]
        creator: Option<String>,

        /// Participant id (repeat for each)
        #[arg(short, long = "participant", required = true)]
        participants: Vec<String>,

        /// equal or custom
        #[arg(short, long, default_value = "equal")]
        mode: String,

        /// Custom share (format: <id>=<amount>)
        #[arg(short, long)]
        share: Vec<String>,

        /// Print the allocation as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a wallet's USDC balance
    Balance {
        /// Wallet address (base58)
        address: String,

        /// Also show the SOL balance
        #[arg(long)]
        native: bool,
    },

    /// Build an unsigned USDC transfer and print it base64 encoded
    BuildTransfer {
        /// Sender wallet address
        from: String,

        /// Recipient wallet address
        to: String,

        /// Amount in USDC
        amount: String,
    },

    /// Sign and send a USDC payment with a local keypair
    Pay {
        /// Recipient wallet address
        to: String,

        /// Amount in USDC
        amount: String,

        /// Keypair file or base58 secret key (overrides settings)
        #[arg(long)]
        keypair: Option<String>,

        /// Poll until the payment is confirmed
        #[arg(long)]
        wait: bool,

        /// Seed the sender with this much USDC first (mock mode only)
        #[arg(long)]
        fund: Option<String>,
    },

    /// Check whether a transaction signature is confirmed
    Confirm {
        /// Transaction signature (base58)
        signature: String,
    },

    /// Show or create the settings file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print effective settings
    Show,
    /// Write default settings
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Confirmation polls before `pay --wait` gives up
const MAX_CONFIRM_POLLS: u32 = 30;

const CONFIRM_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    splitpay_logging::init(cli.verbose);

    let settings_path = cli.config.clone().unwrap_or_else(default_settings_path);
    let mut settings = Settings::load_from(&settings_path)
        .with_context(|| format!("failed to load settings from {:?}", settings_path))?
        .with_env_overrides();
    if cli.mock {
        settings.rpc.mock = true;
    }

    match cli.command {
        Commands::Split {
            total,
            creator,
            participants,
            mode,
            share,
            json,
        } => {
            split(&total, creator.as_deref(), &participants, &mode, &share, json)?;
        }
        Commands::Balance { address, native } => {
            balance(&settings, &address, native).await?;
        }
        Commands::BuildTransfer { from, to, amount } => {
            build_transfer(&settings, &from, &to, &amount).await?;
        }
        Commands::Pay {
            to,
            amount,
            keypair,
            wait,
            fund,
        } => {
            pay(&settings, &to, &amount, keypair, wait, fund.as_deref()).await?;
        }
        Commands::Confirm { signature } => {
            confirm(&settings, &signature).await?;
        }
        Commands::Config { action } => {
            config(&settings, &settings_path, action)?;
        }
    }

    Ok(())
}

fn parse_amount(input: &str) -> Result<Amount> {
    input
        .parse::<Amount>()
        .with_context(|| format!("invalid amount {:?}", input))
}

fn client(settings: &Settings) -> Result<SettlementClient> {
    let config = settings.to_settlement_config()?;
    debug!("Settlement endpoints: {:?}", config.endpoints());
    Ok(SettlementClient::new(config))
}

// ============================================================================
// Split
// ============================================================================

fn split(
    total: &str,
    creator: Option<&str>,
    participants: &[String],
    mode: &str,
    shares: &[String],
    json: bool,
) -> Result<()> {
    let total = parse_amount(total)?;
    let mode: SplitMode = mode.parse()?;

    let mut custom = HashMap::new();
    for entry in shares {
        let (id, amount) = entry
            .split_once('=')
            .with_context(|| format!("share {:?} must look like <id>=<amount>", entry))?;
        custom.insert(id.trim().to_string(), parse_amount(amount.trim())?);
    }
    if mode == SplitMode::Equal && !custom.is_empty() {
        bail!("--share only applies to custom splits");
    }

    let allocation = compute_allocation(total, participants, creator.unwrap_or(""), mode, &custom);

    if json {
        println!("{}", serde_json::to_string_pretty(&allocation)?);
    } else {
        print_allocation(&allocation);
    }

    if !allocation.is_valid {
        bail!("split does not balance: {} unallocated", allocation.remainder);
    }
    Ok(())
}

fn print_allocation(allocation: &SplitAllocation) {
    println!("Split of {} USDC ({})", allocation.total_amount, allocation.mode);
    println!("==========================");
    for (participant, share) in &allocation.shares {
        let marker = if allocation.creator.as_deref() == Some(participant.as_str()) {
            " (creator)"
        } else {
            ""
        };
        println!("  {}{}: {}", participant, marker, share);
    }
    if !allocation.remainder.is_zero() {
        println!("Remainder: {}", allocation.remainder);
    }
    if !allocation.rounding_dust().is_zero() {
        println!("Rounding dust: {}", allocation.rounding_dust());
    }

    let settlements = allocation.settlements();
    if !settlements.is_empty() {
        println!();
        println!("Settlements");
        for s in settlements {
            println!("  {} -> {}: {}", s.from, s.to, s.amount);
        }
    }
}

// ============================================================================
// Chain commands
// ============================================================================

async fn balance(settings: &Settings, address: &str, native: bool) -> Result<()> {
    let client = client(settings)?;

    let usdc = client.get_token_balance(address).await?;
    println!("USDC: {}", usdc);

    if native {
        let lamports = client.get_native_balance(address).await?;
        println!("SOL: {}", lamports_to_sol(lamports));
    }

    Ok(())
}

async fn build_transfer(settings: &Settings, from: &str, to: &str, amount: &str) -> Result<()> {
    let amount = parse_amount(amount)?;
    let client = client(settings)?;

    let unsigned = client.build_transfer(from, to, amount).await?;
    if unsigned.creates_recipient_account {
        info!("Transfer creates the recipient's token account");
    }
    println!("{}", unsigned.to_base64()?);
    Ok(())
}

fn load_signer(settings: &Settings, keypair: Option<String>, mock: bool) -> Result<KeypairSigner> {
    let configured = settings
        .keypair_path()
        .map(|path| path.to_string_lossy().into_owned());
    match keypair.or(configured) {
        Some(raw) => KeypairSigner::load(&raw).context("failed to load keypair"),
        None if mock => {
            info!("No keypair configured, using an ephemeral one");
            Ok(KeypairSigner::new(Keypair::new()))
        }
        None => bail!("no keypair configured; pass --keypair or set wallet.keypair_path"),
    }
}

async fn pay(
    settings: &Settings,
    to: &str,
    amount: &str,
    keypair: Option<String>,
    wait: bool,
    fund: Option<&str>,
) -> Result<()> {
    let amount = parse_amount(amount)?;
    let client = client(settings)?;
    let signer = load_signer(settings, keypair, client.is_mock())?;

    if let Some(fund) = fund {
        let Some(ledger) = client.mock_ledger() else {
            bail!("--fund is only available in mock mode");
        };
        let base_units = parse_amount(fund)?
            .to_base_units()
            .context("funding amount must not be negative")?;
        ledger.set_token_balance(&signer.pubkey(), &client.usdc_mint(), base_units);
        info!("Funded {} with {} USDC", signer.pubkey(), fund);
    }

    info!("Paying {} USDC from {} to {}", amount, signer.pubkey(), to);
    let result = client.pay(&signer, to, amount).await;
    report_payment(&result)?;

    if wait {
        if let Some(mut pending) = result.pending() {
            while pending.polls < MAX_CONFIRM_POLLS {
                if client.poll_payment(&mut pending).await?.is_terminal() {
                    break;
                }
                tokio::time::sleep(CONFIRM_POLL_INTERVAL).await;
            }
            println!("State: {:?}", pending.state);
            if pending.state == TransferState::Failed {
                bail!(
                    "Transaction was rejected by the network ({})",
                    pending.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
    }

    if client.is_mock() {
        println!("Recipient balance: {} USDC", client.get_token_balance(to).await?);
    }

    Ok(())
}

fn report_payment(result: &PaymentResult) -> Result<()> {
    if result.success {
        println!("Payment submitted");
        if let Some(signature) = &result.signature {
            println!("Signature: {}", signature);
        }
        return Ok(());
    }

    let message = result
        .failure
        .map(|kind| kind.user_message())
        .unwrap_or("Payment failed");
    bail!("{} ({})", message, result.error.as_deref().unwrap_or("unknown error"))
}

async fn confirm(settings: &Settings, signature: &str) -> Result<()> {
    let client = client(settings)?;
    if client.confirm(signature).await? {
        println!("Confirmed");
    } else {
        println!("Not confirmed yet");
    }
    Ok(())
}

// ============================================================================
// Config
// ============================================================================

fn config(settings: &Settings, path: &PathBuf, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            println!("# {}", path.display());
            println!("{}", serde_json::to_string_pretty(settings)?);
        }
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                bail!("{:?} already exists; pass --force to overwrite", path);
            }
            Settings::default().save_to(path)?;
            println!("Wrote default settings to {}", path.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_split() {
        let cli = Cli::parse_from([
            "splitpay", "split", "30", "-c", "alice", "-p", "alice", "-p", "bob", "-p", "carol",
        ]);
        match cli.command {
            Commands::Split {
                total,
                creator,
                participants,
                mode,
                ..
            } => {
                assert_eq!(total, "30");
                assert_eq!(creator.as_deref(), Some("alice"));
                assert_eq!(participants, vec!["alice", "bob", "carol"]);
                assert_eq!(mode, "equal");
            }
            _ => panic!("expected split"),
        }
    }

    #[test]
    fn test_cli_parses_pay_flags() {
        let cli = Cli::parse_from(["splitpay", "--mock", "pay", "Recipient", "1.5", "--wait", "--fund", "10"]);
        assert!(cli.mock);
        match cli.command {
            Commands::Pay { wait, fund, keypair, .. } => {
                assert!(wait);
                assert_eq!(fund.as_deref(), Some("10"));
                assert!(keypair.is_none());
            }
            _ => panic!("expected pay"),
        }
    }

    #[test]
    fn test_split_custom_balanced() {
        let shares = vec!["a=10".to_string(), "b=20".to_string()];
        let participants = vec!["a".to_string(), "b".to_string()];
        assert!(split("30", Some("a"), &participants, "custom", &shares, true).is_ok());
    }

    #[test]
    fn test_split_custom_unbalanced_fails() {
        let shares = vec!["a=10".to_string(), "b=15".to_string()];
        let participants = vec!["a".to_string(), "b".to_string()];
        assert!(split("30", None, &participants, "custom", &shares, false).is_err());
    }

    #[test]
    fn test_split_rejects_malformed_share() {
        let participants = vec!["a".to_string()];
        let shares = vec!["a:10".to_string()];
        assert!(split("10", None, &participants, "custom", &shares, false).is_err());
    }

    #[test]
    fn test_report_failed_payment() {
        let result = PaymentResult::failed(&splitpay_settlement::SettlementError::InvalidAddress("x".to_string()));
        let err = report_payment(&result).unwrap_err();
        assert!(err.to_string().starts_with("Invalid wallet address"));
    }
}
