//! Chain RPC seam
//!
//! [`ChainRpc`] is the narrow slice of the Solana JSON-RPC surface the
//! settlement client needs. [`SolanaRpc`] implements it over the nonblocking
//! `solana-client`; [`crate::MockRpc`] implements it in memory.

use async_trait::async_trait;
use solana_client::{
    client_error::{ClientError, ClientErrorKind},
    nonblocking::rpc_client::RpcClient,
};
use solana_sdk::{
    commitment_config::CommitmentConfig,
    hash::Hash,
    pubkey::Pubkey,
    signature::Signature,
    transaction::Transaction,
};
use tracing::{debug, warn};

use crate::{Result, SettlementError, SignatureStatus};

/// One RPC endpoint
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Endpoint URL or label, for logs
    fn endpoint(&self) -> &str;

    /// Raw account data, `None` when the account does not exist
    async fn get_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>>;

    /// Native balance in lamports
    async fn get_lamports(&self, address: &Pubkey) -> Result<u64>;

    async fn get_latest_blockhash(&self) -> Result<Hash>;

    /// Single finality poll for a broadcast transaction
    async fn signature_status(&self, signature: &Signature) -> Result<SignatureStatus>;

    /// Broadcast a signed transaction without waiting for confirmation
    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature>;
}

/// Whether an RPC error message reports HTTP 429 / rate limiting
pub fn is_rate_limit_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("too many requests") || lower.contains("rate limit")
}

fn is_rate_limited(err: &ClientError) -> bool {
    match err.kind() {
        ClientErrorKind::Reqwest(e) if e.status().map(|s| s.as_u16()) == Some(429) => true,
        _ => is_rate_limit_message(&err.to_string()),
    }
}

fn classify(context: &str, err: ClientError) -> SettlementError {
    let rate_limited = is_rate_limited(&err);
    let message = format!("{}: {}", context, err);
    if rate_limited {
        SettlementError::RateLimited(message)
    } else {
        SettlementError::RpcError(message)
    }
}

/// [`ChainRpc`] over a live Solana JSON-RPC endpoint.
///
/// Reads use the configured commitment; signature polls always ask for
/// `finalized`.
pub struct SolanaRpc {
    url: String,
    client: RpcClient,
    commitment: CommitmentConfig,
}

impl SolanaRpc {
    pub fn new(url: impl Into<String>, commitment: CommitmentConfig) -> Self {
        let url = url.into();
        Self {
            client: RpcClient::new_with_commitment(url.clone(), commitment),
            url,
            commitment,
        }
    }
}

#[async_trait]
impl ChainRpc for SolanaRpc {
    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn get_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>> {
        let response = self
            .client
            .get_account_with_commitment(address, self.commitment)
            .await
            .map_err(|e| classify("get_account", e))?;
        Ok(response.value.map(|account| account.data))
    }

    async fn get_lamports(&self, address: &Pubkey) -> Result<u64> {
        self.client
            .get_balance(address)
            .await
            .map_err(|e| classify("get_balance", e))
    }

    async fn get_latest_blockhash(&self) -> Result<Hash> {
        self.client
            .get_latest_blockhash()
            .await
            .map_err(|e| classify("get_latest_blockhash", e))
    }

    async fn signature_status(&self, signature: &Signature) -> Result<SignatureStatus> {
        let status = self
            .client
            .get_signature_status_with_commitment(signature, CommitmentConfig::finalized())
            .await
            .map_err(|e| classify("get_signature_status", e))?;

        match status {
            Some(Ok(())) => Ok(SignatureStatus::Confirmed),
            Some(Err(e)) => {
                warn!("Transaction {} failed on-chain: {}", signature, e);
                Ok(SignatureStatus::Failed(e.to_string()))
            }
            None => {
                debug!("Transaction {} not yet final at {}", signature, self.url);
                Ok(SignatureStatus::Pending)
            }
        }
    }

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature> {
        self.client
            .send_transaction(transaction)
            .await
            .map_err(|e| {
                let err = classify("send_transaction", e);
                match err {
                    SettlementError::RpcError(msg) => SettlementError::TransactionFailed(msg),
                    other => other,
                }
            })
    }
}
