//! Transaction signing seam
//!
//! Browser wallets sign on the client side; [`TransactionSigner`] is the
//! boundary they plug into. [`KeypairSigner`] signs with a local keypair for
//! the CLI and tests.

use std::path::Path;

use async_trait::async_trait;
use solana_sdk::{
    pubkey::Pubkey,
    signature::{read_keypair_file, Keypair, Signer},
    transaction::Transaction,
};

use crate::{Result, SettlementError};

#[async_trait]
pub trait TransactionSigner: Send + Sync {
    /// Wallet address, used as sender and fee payer
    fn pubkey(&self) -> Pubkey;

    /// Sign a transaction built by the settlement client
    async fn sign(&self, transaction: Transaction) -> Result<Transaction>;
}

/// Signs with an in-process ed25519 keypair
pub struct KeypairSigner {
    keypair: Keypair,
}

impl KeypairSigner {
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }

    /// Load a Solana CLI keypair file (JSON array of 64 bytes)
    pub fn from_file(path: &Path) -> Result<Self> {
        let keypair = read_keypair_file(path)
            .map_err(|e| SettlementError::SigningFailed(format!("read keypair {:?}: {}", path, e)))?;
        Ok(Self::new(keypair))
    }

    /// Load from a keypair file path or a base58 secret key, as wallets
    /// export them
    pub fn load(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let path = Path::new(trimmed);
        if path.is_file() {
            return Self::from_file(path);
        }

        let bytes = bs58::decode(trimmed)
            .into_vec()
            .map_err(|_| SettlementError::SigningFailed("keypair is neither a file nor base58".to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Build from a 64-byte secret||public keypair
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let keypair = Keypair::try_from(bytes)
            .map_err(|e| SettlementError::SigningFailed(format!("invalid keypair bytes: {}", e)))?;
        Ok(Self::new(keypair))
    }
}

#[async_trait]
impl TransactionSigner for KeypairSigner {
    fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    async fn sign(&self, mut transaction: Transaction) -> Result<Transaction> {
        let blockhash = transaction.message.recent_blockhash;
        transaction
            .try_sign(&[&self.keypair], blockhash)
            .map_err(|e| SettlementError::SigningFailed(e.to_string()))?;
        Ok(transaction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::{hash::Hash, system_instruction};

    #[tokio::test]
    async fn test_keypair_signer_signs() {
        let keypair = Keypair::new();
        let payer = keypair.pubkey();
        let signer = KeypairSigner::new(keypair);

        let ix = system_instruction::transfer(&payer, &Pubkey::new_unique(), 1);
        let tx = Transaction::new_unsigned(solana_sdk::message::Message::new_with_blockhash(
            &[ix],
            Some(&payer),
            &Hash::new_unique(),
        ));
        assert!(!tx.is_signed());

        let signed = signer.sign(tx).await.unwrap();
        assert!(signed.is_signed());
        assert!(signed.verify().is_ok());
    }

    #[tokio::test]
    async fn test_wrong_signer_rejected() {
        let signer = KeypairSigner::new(Keypair::new());
        let other = Pubkey::new_unique();

        let ix = system_instruction::transfer(&other, &Pubkey::new_unique(), 1);
        let tx = Transaction::new_unsigned(solana_sdk::message::Message::new_with_blockhash(
            &[ix],
            Some(&other),
            &Hash::new_unique(),
        ));

        let result = signer.sign(tx).await;
        assert!(matches!(result, Err(SettlementError::SigningFailed(_))));
    }

    #[test]
    fn test_load_base58_secret() {
        let keypair = Keypair::new();
        let encoded = bs58::encode(keypair.to_bytes()).into_string();
        let signer = KeypairSigner::load(&format!("  {}\n", encoded)).unwrap();
        assert_eq!(signer.pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_load_keypair_file() {
        let keypair = Keypair::new();
        let path = std::env::temp_dir().join(format!("splitpay-signer-{}.json", std::process::id()));
        std::fs::write(&path, format!("{:?}", keypair.to_bytes().to_vec())).unwrap();

        let signer = KeypairSigner::load(path.to_str().unwrap()).unwrap();
        assert_eq!(signer.pubkey(), keypair.pubkey());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_load_rejects_garbage() {
        assert!(KeypairSigner::load("/no/such/file-0OIl").is_err());
    }

    #[test]
    fn test_from_bytes_rejects_short_input() {
        assert!(KeypairSigner::from_bytes(&[0u8; 10]).is_err());
    }
}
