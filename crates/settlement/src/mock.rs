//! In-memory ledger for mock mode
//!
//! Several [`MockRpc`] endpoints may share one ledger (see
//! [`MockRpc::sharing_ledger`]) while keeping their own fault injection and
//! call counters, which is how endpoint failover is exercised without a
//! network.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use solana_sdk::{
    hash::{hashv, Hash},
    instruction::CompiledInstruction,
    message::Message,
    pubkey::Pubkey,
    signature::Signature,
    transaction::Transaction,
};
use tracing::info;

use crate::token::{self, ASSOCIATED_TOKEN_PROGRAM_ID, TOKEN_PROGRAM_ID};
use crate::{ChainRpc, Result, SettlementError, SignatureStatus};

#[derive(Debug, Default)]
struct MockLedger {
    accounts: HashMap<Pubkey, Vec<u8>>,
    lamports: HashMap<Pubkey, u64>,
    /// Status of every broadcast signature
    signatures: HashMap<Signature, SignatureStatus>,
    sent: Vec<Transaction>,
    /// Leave new signatures pending instead of confirming them on receipt
    hold_confirmations: bool,
    /// Land the next transaction as failed, without applying it
    fail_on_chain: Option<String>,
    slot: u64,
}

#[derive(Debug, Default)]
struct Faults {
    rate_limited: u32,
    fail_next: Option<String>,
    calls: u64,
}

/// [`ChainRpc`] backed by an in-memory ledger
pub struct MockRpc {
    endpoint: String,
    ledger: Arc<RwLock<MockLedger>>,
    faults: Mutex<Faults>,
}

impl MockRpc {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ledger: Arc::new(RwLock::new(MockLedger::default())),
            faults: Mutex::new(Faults::default()),
        }
    }

    /// Another endpoint onto the same ledger
    pub fn sharing_ledger(&self, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ledger: Arc::clone(&self.ledger),
            faults: Mutex::new(Faults::default()),
        }
    }

    // ==================== Fault injection ====================

    /// Answer the next `count` calls with HTTP 429
    pub fn rate_limit_next(&self, count: u32) {
        self.faults.lock().expect("mock faults lock poisoned").rate_limited = count;
    }

    /// Fail the next call with a non-retryable RPC error
    pub fn fail_next(&self, message: &str) {
        self.faults.lock().expect("mock faults lock poisoned").fail_next = Some(message.to_string());
    }

    /// Calls received by this endpoint, faulted ones included
    pub fn call_count(&self) -> u64 {
        self.faults.lock().expect("mock faults lock poisoned").calls
    }

    fn enter(&self, method: &str) -> Result<()> {
        let mut faults = self.faults.lock().expect("mock faults lock poisoned");
        faults.calls += 1;
        if faults.rate_limited > 0 {
            faults.rate_limited -= 1;
            return Err(SettlementError::RateLimited(format!(
                "{}: HTTP status client error (429 Too Many Requests) for url ({})",
                method, self.endpoint
            )));
        }
        if let Some(message) = faults.fail_next.take() {
            return Err(SettlementError::RpcError(format!("{}: {}", method, message)));
        }
        Ok(())
    }

    // ==================== Ledger setup ====================

    /// Set `owner`'s token balance, creating the associated account if needed
    pub fn set_token_balance(&self, owner: &Pubkey, mint: &Pubkey, base_units: u64) {
        let ata = token::associated_token_address(owner, mint);
        let mut ledger = self.ledger.write().expect("mock ledger lock poisoned");
        ledger.accounts.insert(ata, token::pack_token_account(mint, owner, base_units));
    }

    pub fn token_balance(&self, owner: &Pubkey, mint: &Pubkey) -> Option<u64> {
        let ata = token::associated_token_address(owner, mint);
        let ledger = self.ledger.read().expect("mock ledger lock poisoned");
        ledger.accounts.get(&ata).and_then(|data| token::token_account_amount(data))
    }

    pub fn set_lamports(&self, owner: &Pubkey, lamports: u64) {
        let mut ledger = self.ledger.write().expect("mock ledger lock poisoned");
        ledger.lamports.insert(*owner, lamports);
    }

    pub fn has_account(&self, address: &Pubkey) -> bool {
        let ledger = self.ledger.read().expect("mock ledger lock poisoned");
        ledger.accounts.contains_key(address)
    }

    /// Keep broadcast transactions pending until [`MockRpc::finalize`]
    pub fn hold_confirmations(&self, hold: bool) {
        self.ledger.write().expect("mock ledger lock poisoned").hold_confirmations = hold;
    }

    pub fn finalize(&self, signature: &Signature) {
        let mut ledger = self.ledger.write().expect("mock ledger lock poisoned");
        if let Some(status) = ledger.signatures.get_mut(signature) {
            *status = SignatureStatus::Confirmed;
        }
    }

    /// Accept the next transaction but fail it on-chain with `reason`.
    /// Its instructions are not applied.
    pub fn fail_next_on_chain(&self, reason: &str) {
        self.ledger.write().expect("mock ledger lock poisoned").fail_on_chain = Some(reason.to_string());
    }

    /// Every transaction accepted by `send_transaction`
    pub fn sent_transactions(&self) -> Vec<Transaction> {
        self.ledger.read().expect("mock ledger lock poisoned").sent.clone()
    }
}

impl MockLedger {
    /// Apply the token instructions of a transaction, all or nothing
    fn apply(&mut self, message: &Message) -> Result<()> {
        let mut staged = self.accounts.clone();

        for ix in &message.instructions {
            let program = account_key(message, ix.program_id_index)?;
            if program == ASSOCIATED_TOKEN_PROGRAM_ID {
                let ata = instruction_account(message, ix, 1)?;
                let wallet = instruction_account(message, ix, 2)?;
                let mint = instruction_account(message, ix, 3)?;
                if staged.contains_key(&ata) {
                    return Err(SettlementError::TransactionFailed(
                        "associated token account already exists".to_string(),
                    ));
                }
                staged.insert(ata, token::pack_token_account(&mint, &wallet, 0));
            } else if program == TOKEN_PROGRAM_ID {
                let amount = token::decode_transfer_amount(&ix.data).ok_or_else(|| {
                    SettlementError::TransactionFailed("unsupported token instruction".to_string())
                })?;
                let source = instruction_account(message, ix, 0)?;
                let destination = instruction_account(message, ix, 1)?;
                debit(&mut staged, &source, amount)?;
                credit(&mut staged, &destination, amount)?;
            }
        }

        self.accounts = staged;
        Ok(())
    }
}

fn account_key(message: &Message, index: u8) -> Result<Pubkey> {
    message
        .account_keys
        .get(index as usize)
        .copied()
        .ok_or_else(|| SettlementError::TransactionFailed(format!("account index {} out of range", index)))
}

fn instruction_account(message: &Message, ix: &CompiledInstruction, position: usize) -> Result<Pubkey> {
    let index = ix.accounts.get(position).copied().ok_or_else(|| {
        SettlementError::TransactionFailed(format!("missing instruction account {}", position))
    })?;
    account_key(message, index)
}

fn debit(accounts: &mut HashMap<Pubkey, Vec<u8>>, address: &Pubkey, amount: u64) -> Result<()> {
    let data = accounts
        .get_mut(address)
        .ok_or_else(|| SettlementError::TransactionFailed(format!("source account {} not found", address)))?;
    let balance = token::token_account_amount(data).unwrap_or(0);
    let remaining = balance
        .checked_sub(amount)
        .ok_or_else(|| SettlementError::TransactionFailed("insufficient funds".to_string()))?;
    data[64..72].copy_from_slice(&remaining.to_le_bytes());
    Ok(())
}

fn credit(accounts: &mut HashMap<Pubkey, Vec<u8>>, address: &Pubkey, amount: u64) -> Result<()> {
    let data = accounts.get_mut(address).ok_or_else(|| {
        SettlementError::TransactionFailed(format!("destination account {} not found", address))
    })?;
    let balance = token::token_account_amount(data).unwrap_or(0);
    let updated = balance
        .checked_add(amount)
        .ok_or_else(|| SettlementError::TransactionFailed("balance overflow".to_string()))?;
    data[64..72].copy_from_slice(&updated.to_le_bytes());
    Ok(())
}

#[async_trait]
impl ChainRpc for MockRpc {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn get_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>> {
        self.enter("get_account")?;
        let ledger = self.ledger.read().expect("mock ledger lock poisoned");
        Ok(ledger.accounts.get(address).cloned())
    }

    async fn get_lamports(&self, address: &Pubkey) -> Result<u64> {
        self.enter("get_balance")?;
        let ledger = self.ledger.read().expect("mock ledger lock poisoned");
        Ok(ledger.lamports.get(address).copied().unwrap_or(0))
    }

    async fn get_latest_blockhash(&self) -> Result<Hash> {
        self.enter("get_latest_blockhash")?;
        let mut ledger = self.ledger.write().expect("mock ledger lock poisoned");
        ledger.slot += 1;
        Ok(hashv(&[b"mock-blockhash".as_ref(), ledger.slot.to_le_bytes().as_ref()]))
    }

    async fn signature_status(&self, signature: &Signature) -> Result<SignatureStatus> {
        self.enter("get_signature_status")?;
        let ledger = self.ledger.read().expect("mock ledger lock poisoned");
        Ok(ledger
            .signatures
            .get(signature)
            .cloned()
            .unwrap_or(SignatureStatus::Pending))
    }

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature> {
        self.enter("send_transaction")?;

        if !transaction.is_signed() {
            return Err(SettlementError::TransactionFailed("transaction is not signed".to_string()));
        }
        transaction
            .verify()
            .map_err(|e| SettlementError::TransactionFailed(e.to_string()))?;

        let signature = transaction.signatures[0];
        let mut ledger = self.ledger.write().expect("mock ledger lock poisoned");
        if ledger.signatures.contains_key(&signature) {
            return Err(SettlementError::TransactionFailed("already processed".to_string()));
        }
        let status = match ledger.fail_on_chain.take() {
            Some(reason) => SignatureStatus::Failed(reason),
            None => {
                ledger.apply(&transaction.message)?;
                if ledger.hold_confirmations {
                    SignatureStatus::Pending
                } else {
                    SignatureStatus::Confirmed
                }
            }
        };
        ledger.signatures.insert(signature, status);
        ledger.sent.push(transaction.clone());
        info!("[MOCK] Transaction accepted by {}: {}", self.endpoint, signature);
        Ok(signature)
    }
}
