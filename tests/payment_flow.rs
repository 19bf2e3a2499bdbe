//! Integration tests for the split-and-settle payment flow
//!
//! Runs against in-memory ledgers, two endpoints sharing one ledger where
//! failover matters:
//! 1. Balance lookups fail over from a rate-limited primary
//! 2. First payment to a fresh wallet creates its token account
//! 3. Payments are refused when the live balance is short
//! 4. A split is settled share by share and the creator is made whole
//! 5. Broadcast payments are polled through to confirmation

use std::collections::HashMap;
use std::sync::Arc;

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};

use splitpay_core::{compute_allocation, Amount, SplitMode};
use splitpay_settlement::{
    token, ChainRpc, FailureKind, KeypairSigner, MockRpc, SettlementClient, SettlementConfig, TransferState,
};

// =============================================================================
// HELPERS
// =============================================================================

struct Harness {
    client: SettlementClient,
    primary: Arc<MockRpc>,
    fallback: Arc<MockRpc>,
}

impl Harness {
    fn new() -> Self {
        let primary = Arc::new(MockRpc::new("https://primary.test"));
        let fallback = Arc::new(primary.sharing_ledger("https://fallback.test"));
        let client = SettlementClient::with_backends(
            SettlementConfig::mock(),
            vec![primary.clone() as Arc<dyn ChainRpc>, fallback.clone() as Arc<dyn ChainRpc>],
        )
        .unwrap();
        Self { client, primary, fallback }
    }

    fn mint(&self) -> Pubkey {
        self.client.usdc_mint()
    }

    fn fund(&self, owner: &Pubkey, usdc: &str) {
        let amount: Amount = usdc.parse().unwrap();
        self.primary
            .set_token_balance(owner, &self.mint(), amount.to_base_units().unwrap());
    }

    fn balance(&self, owner: &Pubkey) -> Option<u64> {
        self.primary.token_balance(owner, &self.mint())
    }
}

fn usdc(s: &str) -> Amount {
    s.parse().unwrap()
}

// =============================================================================
// 1. Endpoint failover
// =============================================================================

#[tokio::test]
async fn test_balance_fails_over_on_rate_limit() {
    let h = Harness::new();
    let owner = Pubkey::new_unique();
    h.fund(&owner, "12.5");
    h.primary.rate_limit_next(1);

    let balance = h.client.get_token_balance(&owner.to_string()).await.unwrap();

    assert_eq!(balance, usdc("12.5"));
    assert_eq!(h.primary.call_count(), 1);
    assert_eq!(h.fallback.call_count(), 1);
    assert_eq!(h.client.endpoints().current().endpoint(), "https://fallback.test");
}

#[tokio::test]
async fn test_balance_gives_up_after_retries() {
    let h = Harness::new();
    h.primary.rate_limit_next(5);
    h.fallback.rate_limit_next(5);

    let err = h
        .client
        .get_token_balance(&Pubkey::new_unique().to_string())
        .await
        .unwrap_err();

    assert!(err.is_rate_limited());
    assert_eq!(h.primary.call_count() + h.fallback.call_count(), 3);
}

#[tokio::test]
async fn test_payment_survives_rate_limited_primary() {
    let h = Harness::new();
    let payer = Keypair::new();
    let recipient = Pubkey::new_unique();
    h.fund(&payer.pubkey(), "20");
    h.primary.rate_limit_next(1);

    let signer = KeypairSigner::new(payer.insecure_clone());
    let result = h.client.pay(&signer, &recipient.to_string(), usdc("5")).await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(h.balance(&recipient), Some(5_000_000));
    assert_eq!(h.balance(&payer.pubkey()), Some(15_000_000));
    assert_eq!(h.fallback.sent_transactions().len(), 1);
}

// =============================================================================
// 2. Recipient token accounts
// =============================================================================

#[tokio::test]
async fn test_first_payment_creates_recipient_account() {
    let h = Harness::new();
    let sender = Keypair::new();
    let recipient = Pubkey::new_unique();
    h.fund(&sender.pubkey(), "3");

    let unsigned = h
        .client
        .build_transfer(&sender.pubkey().to_string(), &recipient.to_string(), usdc("1.5"))
        .await
        .unwrap();

    assert!(unsigned.creates_recipient_account);
    assert_eq!(unsigned.instructions.len(), 2);
    assert_eq!(unsigned.instructions[0].program_id, token::ASSOCIATED_TOKEN_PROGRAM_ID);
    assert_eq!(unsigned.instructions[1].program_id, token::TOKEN_PROGRAM_ID);
    assert_eq!(token::decode_transfer_amount(&unsigned.instructions[1].data), Some(1_500_000));
    assert!(!unsigned.to_base64().unwrap().is_empty());

    // Once the account exists, only the transfer is built
    let ata = token::associated_token_address(&recipient, &h.mint());
    h.fund(&recipient, "0");
    assert!(h.primary.has_account(&ata));

    let second = h
        .client
        .build_transfer(&sender.pubkey().to_string(), &recipient.to_string(), usdc("1"))
        .await
        .unwrap();
    assert!(!second.creates_recipient_account);
    assert_eq!(second.instructions.len(), 1);
}

// =============================================================================
// 3. Balance checks and validation
// =============================================================================

#[tokio::test]
async fn test_insufficient_balance_refused_before_broadcast() {
    let h = Harness::new();
    let payer = Keypair::new();
    h.fund(&payer.pubkey(), "2");

    let signer = KeypairSigner::new(payer);
    let result = h
        .client
        .pay(&signer, &Pubkey::new_unique().to_string(), usdc("2.01"))
        .await;

    assert!(!result.success);
    assert_eq!(result.failure, Some(FailureKind::InsufficientBalance));
    assert_eq!(result.state, TransferState::Failed);
    assert!(h.primary.sent_transactions().is_empty());
}

#[tokio::test]
async fn test_invalid_recipient_makes_no_calls() {
    let h = Harness::new();
    let signer = KeypairSigner::new(Keypair::new());

    let result = h.client.pay(&signer, "definitely-not-base58!", usdc("1")).await;

    assert_eq!(result.failure, Some(FailureKind::InvalidAddress));
    assert_eq!(h.primary.call_count(), 0);
    assert_eq!(h.fallback.call_count(), 0);
}

// =============================================================================
// 4. Split then settle
// =============================================================================

#[tokio::test]
async fn test_split_settled_by_each_participant() {
    let h = Harness::new();
    let creator = Keypair::new();
    let bob = Keypair::new();
    let carol = Keypair::new();
    h.fund(&bob.pubkey(), "50");
    h.fund(&carol.pubkey(), "50");

    let mut custom = HashMap::new();
    custom.insert("alice".to_string(), usdc("10"));
    custom.insert("bob".to_string(), usdc("25.5"));
    custom.insert("carol".to_string(), usdc("14.5"));
    let allocation = compute_allocation(usdc("50"), &["alice", "bob", "carol"], "alice", SplitMode::Custom, &custom);
    assert!(allocation.is_valid);
    assert_eq!(allocation.settlements().len(), 2);

    let creator_address = creator.pubkey().to_string();
    for (id, payer) in [("bob", bob.insecure_clone()), ("carol", carol.insecure_clone())] {
        let signer = KeypairSigner::new(payer);
        let result = h.client.settle_share(&signer, &allocation, id, &creator_address).await;
        assert!(result.success, "{}: {:?}", id, result.error);
    }

    assert_eq!(h.balance(&creator.pubkey()), Some(40_000_000));
    assert_eq!(h.balance(&bob.pubkey()), Some(24_500_000));
    assert_eq!(h.balance(&carol.pubkey()), Some(35_500_000));

    // Only the first settlement had to create the creator's account
    let sent = h.primary.sent_transactions();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].message.instructions.len(), 2);
    assert_eq!(sent[1].message.instructions.len(), 1);
}

#[tokio::test]
async fn test_unbalanced_split_cannot_be_settled() {
    let h = Harness::new();
    let bob = Keypair::new();
    h.fund(&bob.pubkey(), "50");

    let mut custom = HashMap::new();
    custom.insert("alice".to_string(), usdc("10"));
    custom.insert("bob".to_string(), usdc("15"));
    let allocation = compute_allocation(usdc("30"), &["alice", "bob"], "alice", SplitMode::Custom, &custom);
    assert!(!allocation.is_valid);

    let signer = KeypairSigner::new(bob);
    let result = h
        .client
        .settle_share(&signer, &allocation, "bob", &Pubkey::new_unique().to_string())
        .await;

    assert!(!result.success);
    assert_eq!(h.primary.call_count(), 0);
}

// =============================================================================
// 5. Confirmation
// =============================================================================

#[tokio::test]
async fn test_payment_polled_to_confirmation() {
    let h = Harness::new();
    let payer = Keypair::new();
    h.fund(&payer.pubkey(), "10");
    h.primary.hold_confirmations(true);

    let signer = KeypairSigner::new(payer);
    let result = h.client.pay(&signer, &Pubkey::new_unique().to_string(), usdc("1")).await;
    assert!(result.success);
    let signature = result.signature.clone().unwrap();

    // Broadcast is reported as success before finality
    assert!(!h.client.confirm(&signature).await.unwrap());

    let mut pending = result.pending().unwrap();
    assert_eq!(h.client.poll_payment(&mut pending).await.unwrap(), TransferState::Confirming);

    h.primary.finalize(&pending.signature);
    assert_eq!(h.client.poll_payment(&mut pending).await.unwrap(), TransferState::Confirmed);
    assert_eq!(pending.polls, 2);
    assert!(h.client.confirm(&signature).await.unwrap());
}

#[tokio::test]
async fn test_payment_failed_on_chain_ends_failed() {
    let h = Harness::new();
    let payer = Keypair::new();
    let recipient = Pubkey::new_unique();
    h.fund(&payer.pubkey(), "10");
    h.primary.fail_next_on_chain("custom program error: 0x1");

    let signer = KeypairSigner::new(payer.insecure_clone());
    let result = h.client.pay(&signer, &recipient.to_string(), usdc("4")).await;
    assert!(result.success);

    let mut pending = result.pending().unwrap();
    assert_eq!(h.client.poll_payment(&mut pending).await.unwrap(), TransferState::Failed);
    assert!(pending.state.is_terminal());
    assert_eq!(h.balance(&payer.pubkey()), Some(10_000_000));
    assert_eq!(h.balance(&recipient), None);
}
