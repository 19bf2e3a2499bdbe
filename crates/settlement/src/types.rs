//! Settlement types for on-chain payments

use std::str::FromStr;

use base64::Engine;
use serde::{Deserialize, Serialize};
use solana_sdk::{instruction::Instruction, pubkey::Pubkey, signature::Signature, transaction::Transaction};

use splitpay_core::Amount;

use crate::{Result, SettlementError};

/// Parse a base58 account address
pub fn parse_address(address: &str) -> Result<Pubkey> {
    Pubkey::from_str(address.trim())
        .map_err(|e| SettlementError::InvalidAddress(format!("{}: {}", address, e)))
}

/// Parse a base58 transaction signature
pub fn parse_signature(signature: &str) -> Result<Signature> {
    Signature::from_str(signature.trim())
        .map_err(|e| SettlementError::InvalidSignature(format!("{}: {}", signature, e)))
}

/// A validated request to move USDC from one wallet to another.
///
/// Built once per payment attempt. A failed attempt needs a fresh intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferIntent {
    pub sender: Pubkey,
    pub recipient: Pubkey,
    pub amount: Amount,
}

impl TransferIntent {
    /// Validate addresses and amount. No network access.
    pub fn new(sender: &str, recipient: &str, amount: Amount) -> Result<Self> {
        let sender = parse_address(sender)?;
        let recipient = parse_address(recipient)?;

        if !amount.is_positive() {
            return Err(SettlementError::InvalidAmount(format!(
                "amount must be positive, got {}",
                amount
            )));
        }

        Ok(Self { sender, recipient, amount })
    }

    /// `floor(amount × 10^6)`
    pub fn base_units(&self) -> u64 {
        self.amount.to_base_units().unwrap_or(0)
    }
}

/// An assembled, unsigned USDC transfer ready for a wallet to sign
#[derive(Debug, Clone)]
pub struct UnsignedTransfer {
    pub intent: TransferIntent,
    /// Instructions in transaction order
    pub instructions: Vec<Instruction>,
    /// Transaction with fee payer and recent blockhash set, no signatures
    pub transaction: Transaction,
    /// Whether the first instruction creates the recipient's token account
    pub creates_recipient_account: bool,
}

impl UnsignedTransfer {
    /// Serialized transaction, base64 encoded, as browser wallets expect it
    pub fn to_base64(&self) -> Result<String> {
        let bytes = bincode::serialize(&self.transaction)
            .map_err(|e| SettlementError::SerializationError(e.to_string()))?;
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }
}

/// Lifecycle of one transfer attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferState {
    Building,
    Submitted,
    Confirming,
    Confirmed,
    Failed,
}

impl TransferState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed)
    }

    pub fn can_transition_to(&self, next: TransferState) -> bool {
        use TransferState::*;
        matches!(
            (self, next),
            (Building, Submitted)
                | (Building, Failed)
                | (Submitted, Confirming)
                | (Submitted, Failed)
                | (Confirming, Confirming)
                | (Confirming, Confirmed)
                | (Confirming, Failed)
        )
    }
}

/// What one status poll learned about a broadcast transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureStatus {
    /// Not yet final, or not yet visible to the endpoint
    Pending,
    /// Final and executed without error
    Confirmed,
    /// Landed but failed on-chain
    Failed(String),
}

impl SignatureStatus {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed)
    }
}

/// A broadcast payment being polled for finality
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPayment {
    pub signature: Signature,
    pub state: TransferState,
    /// Confirmation polls made so far
    pub polls: u32,
    /// On-chain error, once the payment has failed
    pub error: Option<String>,
}

impl PendingPayment {
    pub fn new(signature: Signature) -> Self {
        Self {
            signature,
            state: TransferState::Submitted,
            polls: 0,
            error: None,
        }
    }

    pub fn transition(&mut self, next: TransferState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(SettlementError::InvalidTransition { from: self.state, to: next });
        }
        self.state = next;
        Ok(())
    }

    /// Record the outcome of one confirmation poll
    pub fn record_poll(&mut self, status: &SignatureStatus) -> Result<TransferState> {
        match status {
            SignatureStatus::Failed(reason) => self.fail(reason)?,
            SignatureStatus::Pending | SignatureStatus::Confirmed => {
                if self.state == TransferState::Submitted {
                    self.transition(TransferState::Confirming)?;
                }
                let next = if status.is_confirmed() {
                    TransferState::Confirmed
                } else {
                    TransferState::Confirming
                };
                self.transition(next)?;
            }
        }
        self.polls += 1;
        Ok(self.state)
    }

    pub fn fail(&mut self, reason: &str) -> Result<()> {
        self.transition(TransferState::Failed)?;
        self.error = Some(reason.to_string());
        Ok(())
    }
}

/// Failure category, so callers can show distinct messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidAddress,
    InvalidAmount,
    InsufficientBalance,
    /// Transient network trouble, including exhausted retries
    Network,
    /// The wallet refused or failed to sign
    Wallet,
    /// The network rejected the transaction
    Rejected,
}

impl FailureKind {
    pub fn of(error: &SettlementError) -> Self {
        match error {
            SettlementError::InvalidAddress(_) | SettlementError::InvalidSignature(_) => Self::InvalidAddress,
            SettlementError::InvalidAmount(_) => Self::InvalidAmount,
            SettlementError::InsufficientBalance { .. } => Self::InsufficientBalance,
            SettlementError::RateLimited(_) | SettlementError::RpcError(_) => Self::Network,
            SettlementError::SigningFailed(_) | SettlementError::NotAuthorized => Self::Wallet,
            SettlementError::TransactionFailed(_)
            | SettlementError::InvalidTransition { .. }
            | SettlementError::SerializationError(_) => Self::Rejected,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidAddress => "Invalid wallet address",
            Self::InvalidAmount => "Enter an amount greater than zero",
            Self::InsufficientBalance => "Insufficient USDC balance",
            Self::Network => "Network error, please try again",
            Self::Wallet => "Transaction was not signed",
            Self::Rejected => "Transaction was rejected by the network",
        }
    }
}

/// Outcome of a payment attempt. Errors never escape [`crate::SettlementClient::pay`];
/// they land here instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentResult {
    pub success: bool,
    /// Broadcast signature, present on success. Not necessarily final.
    pub signature: Option<String>,
    pub error: Option<String>,
    pub failure: Option<FailureKind>,
    pub state: TransferState,
}

impl PaymentResult {
    pub fn submitted(signature: &Signature) -> Self {
        Self {
            success: true,
            signature: Some(signature.to_string()),
            error: None,
            failure: None,
            state: TransferState::Submitted,
        }
    }

    pub fn failed(error: &SettlementError) -> Self {
        Self {
            success: false,
            signature: None,
            error: Some(error.to_string()),
            failure: Some(FailureKind::of(error)),
            state: TransferState::Failed,
        }
    }

    /// Pending payment to poll, when the attempt was broadcast
    pub fn pending(&self) -> Option<PendingPayment> {
        let signature = parse_signature(self.signature.as_deref()?).ok()?;
        Some(PendingPayment::new(signature))
    }
}
