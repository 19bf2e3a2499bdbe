//! Settlement client for paying split shares on Solana
//!
//! Supports two modes:
//! - **Mock Mode**: For development/testing without Solana. Calls go to an
//!   in-memory [`MockRpc`] ledger.
//! - **Live Mode**: Solana JSON-RPC against the configured endpoint list, the
//!   primary first and fallbacks after it.
//!
//! The client never signs on its own. Transactions are built unsigned,
//! handed to a [`TransactionSigner`] and then broadcast.

use std::sync::Arc;
use std::time::Duration;

use solana_sdk::{
    commitment_config::CommitmentConfig,
    message::Message,
    pubkey::Pubkey,
    signature::Signature,
    transaction::Transaction,
};
use tracing::{debug, info, warn};

use splitpay_core::{Amount, SplitAllocation};

use crate::token::{self, USDC_MINT_DEVNET, USDC_MINT_MAINNET};
use crate::{
    parse_address, parse_signature, ChainRpc, EndpointPool, MockRpc, PaymentResult, PendingPayment, Result,
    RetryPolicy, SettlementError, SolanaRpc, TransactionSigner, TransferIntent, TransferState, UnsignedTransfer,
};

/// Lamports per SOL
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Settlement mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementMode {
    /// Mock mode for development - state is in-memory
    Mock,
    /// Live Solana mode
    Live,
}

/// Settlement client configuration
#[derive(Debug, Clone)]
pub struct SettlementConfig {
    /// Settlement mode (Mock or Live)
    pub mode: SettlementMode,
    /// Primary Solana RPC endpoint
    pub rpc_url: String,
    /// Endpoints tried in order after the primary when it is rate limited
    pub fallback_urls: Vec<String>,
    /// USDC mint address (6 decimal SPL token)
    pub usdc_mint: Pubkey,
    /// Commitment level for reads and confirmation polls
    pub commitment: String,
    /// Retries after a rate-limited balance lookup
    pub max_retries: u32,
    /// Base backoff between retries; attempt `n` waits `n` times this
    pub retry_backoff: Duration,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            mode: SettlementMode::Mock,
            rpc_url: Self::DEVNET_URL.to_string(),
            fallback_urls: Self::DEVNET_FALLBACK_URLS.iter().map(|u| u.to_string()).collect(),
            usdc_mint: USDC_MINT_DEVNET,
            commitment: "confirmed".to_string(),
            max_retries: 2,
            retry_backoff: Duration::from_secs(1),
        }
    }
}

impl SettlementConfig {
    pub const DEVNET_URL: &'static str = "https://api.devnet.solana.com";
    pub const MAINNET_URL: &'static str = "https://api.mainnet-beta.solana.com";

    pub const DEVNET_FALLBACK_URLS: [&'static str; 3] = [
        "https://rpc.ankr.com/solana_devnet",
        "https://devnet.sonic.game",
        "https://api.devnet.solana.com",
    ];

    pub const MAINNET_FALLBACK_URLS: [&'static str; 3] = [
        "https://rpc.ankr.com/solana",
        "https://solana-rpc.publicnode.com",
        "https://api.mainnet-beta.solana.com",
    ];

    /// Create a mock configuration for development
    pub fn mock() -> Self {
        Self {
            mode: SettlementMode::Mock,
            retry_backoff: Duration::ZERO,
            ..Default::default()
        }
    }

    /// Create a live configuration for Solana devnet
    pub fn devnet() -> Self {
        Self {
            mode: SettlementMode::Live,
            ..Default::default()
        }
    }

    /// Create a live configuration for Solana mainnet
    pub fn mainnet() -> Self {
        Self {
            mode: SettlementMode::Live,
            rpc_url: Self::MAINNET_URL.to_string(),
            fallback_urls: Self::MAINNET_FALLBACK_URLS.iter().map(|u| u.to_string()).collect(),
            usdc_mint: USDC_MINT_MAINNET,
            commitment: "finalized".to_string(),
            ..Default::default()
        }
    }

    /// Primary endpoint followed by fallbacks, duplicates removed
    pub fn endpoints(&self) -> Vec<String> {
        let mut endpoints = vec![self.rpc_url.clone()];
        for url in &self.fallback_urls {
            if !endpoints.contains(url) {
                endpoints.push(url.clone());
            }
        }
        endpoints
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff: self.retry_backoff,
        }
    }

    /// Get commitment config for Solana client
    pub fn commitment_config(&self) -> CommitmentConfig {
        match self.commitment.as_str() {
            "finalized" => CommitmentConfig::finalized(),
            "confirmed" => CommitmentConfig::confirmed(),
            "processed" => CommitmentConfig::processed(),
            _ => CommitmentConfig::confirmed(),
        }
    }
}

/// Settlement client for on-chain payments
pub struct SettlementClient {
    config: SettlementConfig,
    endpoints: EndpointPool,
    retry: RetryPolicy,
    /// Ledger behind mock mode, for seeding balances
    mock: Option<Arc<MockRpc>>,
}

impl SettlementClient {
    /// Create a client from configuration
    pub fn new(config: SettlementConfig) -> Self {
        let (backends, mock): (Vec<Arc<dyn ChainRpc>>, _) = match config.mode {
            SettlementMode::Live => {
                let commitment = config.commitment_config();
                let backends = config
                    .endpoints()
                    .into_iter()
                    .map(|url| Arc::new(SolanaRpc::new(url, commitment)) as Arc<dyn ChainRpc>)
                    .collect();
                (backends, None)
            }
            SettlementMode::Mock => {
                let mock = Arc::new(MockRpc::new("mock"));
                (vec![mock.clone() as Arc<dyn ChainRpc>], Some(mock))
            }
        };

        let retry = config.retry_policy();
        Self {
            // endpoints() always yields at least the primary
            endpoints: EndpointPool::from_non_empty(backends),
            config,
            retry,
            mock,
        }
    }

    /// Create a client over explicit backends, in failover order
    pub fn with_backends(config: SettlementConfig, backends: Vec<Arc<dyn ChainRpc>>) -> Result<Self> {
        let retry = config.retry_policy();
        Ok(Self {
            endpoints: EndpointPool::new(backends)?,
            config,
            retry,
            mock: None,
        })
    }

    /// Check if running in mock mode
    pub fn is_mock(&self) -> bool {
        self.config.mode == SettlementMode::Mock
    }

    /// In-memory ledger, in mock mode
    pub fn mock_ledger(&self) -> Option<&Arc<MockRpc>> {
        self.mock.as_ref()
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    pub fn endpoints(&self) -> &EndpointPool {
        &self.endpoints
    }

    /// USDC mint from config
    pub fn usdc_mint(&self) -> Pubkey {
        self.config.usdc_mint
    }

    // ==================== Transfer building ====================

    /// Build an unsigned USDC transfer from `sender` to `recipient`.
    ///
    /// Address and amount problems are reported before any network call.
    /// The recipient lookup and blockhash fetch are single attempts; their
    /// failures propagate without retry.
    pub async fn build_transfer(&self, sender: &str, recipient: &str, amount: Amount) -> Result<UnsignedTransfer> {
        let intent = TransferIntent::new(sender, recipient, amount)?;
        let base_units = intent.base_units();
        if base_units == 0 {
            return Err(SettlementError::InvalidAmount(format!(
                "{} is below the smallest token unit",
                amount
            )));
        }

        let mint = self.usdc_mint();
        let source = token::associated_token_address(&intent.sender, &mint);
        let destination = token::associated_token_address(&intent.recipient, &mint);

        let rpc = self.endpoints.current();
        let recipient_account = rpc.get_account_data(&destination).await?;

        let mut instructions = Vec::with_capacity(2);
        let creates_recipient_account = recipient_account.is_none();
        if creates_recipient_account {
            debug!("Recipient {} has no token account, adding create instruction", intent.recipient);
            instructions.push(token::create_associated_token_account(&intent.sender, &intent.recipient, &mint));
        }
        instructions.push(token::transfer(&source, &destination, &intent.sender, base_units));

        let blockhash = rpc.get_latest_blockhash().await?;
        let message = Message::new_with_blockhash(&instructions, Some(&intent.sender), &blockhash);
        let transaction = Transaction::new_unsigned(message);

        info!(
            "Built transfer of {} USDC ({} base units) {} -> {}",
            amount, base_units, intent.sender, intent.recipient,
        );

        Ok(UnsignedTransfer {
            intent,
            instructions,
            transaction,
            creates_recipient_account,
        })
    }

    // ==================== Balances ====================

    /// USDC balance of `owner`. A missing token account reads as zero.
    pub async fn get_token_balance(&self, owner: &str) -> Result<Amount> {
        let owner = parse_address(owner)?;
        let ata = token::associated_token_address(&owner, &self.usdc_mint());

        let data = self
            .endpoints
            .with_retry(&self.retry, "get_token_balance", |rpc| async move {
                rpc.get_account_data(&ata).await
            })
            .await?;

        let base_units = match data {
            Some(data) => token::token_account_amount(&data).ok_or_else(|| {
                SettlementError::SerializationError(format!("malformed token account {}", ata))
            })?,
            None => {
                debug!("No token account for {}, balance is 0", owner);
                0
            }
        };

        Amount::from_base_units(base_units)
            .map_err(|e| SettlementError::SerializationError(e.to_string()))
    }

    /// SOL balance of `owner` in lamports
    pub async fn get_native_balance(&self, owner: &str) -> Result<u64> {
        let owner = parse_address(owner)?;
        self.endpoints
            .with_retry(&self.retry, "get_native_balance", |rpc| async move {
                rpc.get_lamports(&owner).await
            })
            .await
    }

    // ==================== Submission ====================

    /// Broadcast a signed transaction on the current endpoint
    pub async fn submit(&self, transaction: &Transaction) -> Result<Signature> {
        if !transaction.is_signed() {
            return Err(SettlementError::NotAuthorized);
        }
        let signature = self.endpoints.current().send_transaction(transaction).await?;
        info!("Transaction submitted: {}", signature);
        Ok(signature)
    }

    /// Single finality poll. Callers decide whether to poll again.
    ///
    /// `true` only once the transaction is finalized without error,
    /// whatever commitment reads use. A transaction that failed on-chain
    /// reads as `false`; [`Self::poll_payment`] tells the two apart.
    pub async fn confirm(&self, signature: &str) -> Result<bool> {
        let signature = parse_signature(signature)?;
        let status = self.endpoints.current().signature_status(&signature).await?;
        debug!("Signature {} status: {:?}", signature, status);
        Ok(status.is_confirmed())
    }

    /// Poll once and advance a pending payment's state. An on-chain failure
    /// moves it to [`TransferState::Failed`].
    pub async fn poll_payment(&self, pending: &mut PendingPayment) -> Result<TransferState> {
        match self.endpoints.current().signature_status(&pending.signature).await {
            Ok(status) => pending.record_poll(&status),
            Err(e) => {
                warn!("Confirmation poll for {} failed: {}", pending.signature, e);
                Err(e)
            }
        }
    }

    /// Pay `amount` USDC from the signer's wallet to `recipient`.
    ///
    /// Re-checks the live balance, builds, signs and broadcasts. Every error
    /// is folded into the returned [`PaymentResult`]. A broadcast payment is
    /// a success even though it may not be final yet.
    pub async fn pay(&self, signer: &dyn TransactionSigner, recipient: &str, amount: Amount) -> PaymentResult {
        match self.try_pay(signer, recipient, amount).await {
            Ok(signature) => PaymentResult::submitted(&signature),
            Err(e) => {
                if e.is_validation() {
                    debug!("Payment of {} USDC to {} rejected: {}", amount, recipient, e);
                } else {
                    warn!("Payment of {} USDC to {} failed: {}", amount, recipient, e);
                }
                PaymentResult::failed(&e)
            }
        }
    }

    async fn try_pay(&self, signer: &dyn TransactionSigner, recipient: &str, amount: Amount) -> Result<Signature> {
        let sender = signer.pubkey().to_string();
        TransferIntent::new(&sender, recipient, amount)?;

        let available = self.get_token_balance(&sender).await?;
        if available < amount {
            return Err(SettlementError::InsufficientBalance {
                required: amount,
                available,
            });
        }

        let unsigned = self.build_transfer(&sender, recipient, amount).await?;
        let signed = signer.sign(unsigned.transaction).await?;
        self.submit(&signed).await
    }

    /// Pay `participant_id`'s share of a split to the creator's wallet
    pub async fn settle_share(
        &self,
        signer: &dyn TransactionSigner,
        allocation: &SplitAllocation,
        participant_id: &str,
        creator_address: &str,
    ) -> PaymentResult {
        if !allocation.is_valid {
            return PaymentResult::failed(&SettlementError::InvalidAmount(format!(
                "split does not balance (remainder {})",
                allocation.remainder
            )));
        }
        if allocation.creator.as_deref() == Some(participant_id) {
            return PaymentResult::failed(&SettlementError::InvalidAmount(
                "the creator owes nothing to themselves".to_string(),
            ));
        }

        match allocation.share_of(participant_id) {
            Some(share) => self.pay(signer, creator_address, share).await,
            None => PaymentResult::failed(&SettlementError::InvalidAmount(format!(
                "{} is not part of this split",
                participant_id
            ))),
        }
    }
}

/// Lamports to SOL, for display
pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}
