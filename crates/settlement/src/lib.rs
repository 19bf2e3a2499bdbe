//! SplitPay Settlement
//!
//! Solana client for settling split shares in USDC.
//!
//! ## Payment Flow
//!
//! 1. **Build**: [`SettlementClient::build_transfer`] validates both addresses
//!    and the amount, derives the associated token accounts, prepends an
//!    account-creation instruction when the recipient has none, and returns an
//!    unsigned transaction carrying a fresh blockhash.
//! 2. **Sign**: an external wallet (or a local [`KeypairSigner`]) signs it.
//! 3. **Submit**: the signed transaction is broadcast. A broadcast payment is
//!    reported as successful while still pending.
//! 4. **Confirm**: callers poll [`SettlementClient::confirm`] until the
//!    signature is final. Nothing is retried on their behalf.
//!
//! Balance lookups go through an [`EndpointPool`]: a rate-limited endpoint is
//! rotated out and the call retried with a linear backoff.

mod client;
mod endpoints;
mod mock;
mod rpc;
mod signer;
pub mod token;
mod types;

pub use client::{lamports_to_sol, SettlementClient, SettlementConfig, SettlementMode, LAMPORTS_PER_SOL};
pub use endpoints::{EndpointPool, RetryPolicy};
pub use mock::MockRpc;
pub use rpc::{is_rate_limit_message, ChainRpc, SolanaRpc};
pub use signer::{KeypairSigner, TransactionSigner};
pub use types::*;

use splitpay_core::Amount;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettlementError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Insufficient balance: need {required}, have {available}")]
    InsufficientBalance { required: Amount, available: Amount },

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("RPC error: {0}")]
    RpcError(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("Not authorized")]
    NotAuthorized,

    #[error("Invalid transfer state transition: {from:?} -> {to:?}")]
    InvalidTransition { from: TransferState, to: TransferState },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl SettlementError {
    /// Bad input rejected before any network call
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidAddress(_) | Self::InvalidAmount(_) | Self::InvalidSignature(_)
        )
    }

    /// Transient failure worth retrying on another endpoint
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

pub type Result<T> = std::result::Result<T, SettlementError>;
