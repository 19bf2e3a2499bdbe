//! SPL token plumbing
//!
//! Program IDs, associated token account derivation and the two
//! instructions a USDC payment needs. Instructions are assembled by hand
//! from their documented layouts rather than pulling in the SPL crates.

use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
};
use solana_sdk_ids::system_program;

/// SPL Token program: TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA
pub const TOKEN_PROGRAM_ID: Pubkey = Pubkey::new_from_array([
    6, 221, 246, 225, 215, 101, 161, 147, 217, 203, 225, 70, 206, 235, 121, 172,
    28, 180, 133, 237, 95, 91, 55, 145, 58, 140, 245, 133, 126, 255, 0, 169,
]);

/// SPL Associated Token Account program: ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL
pub const ASSOCIATED_TOKEN_PROGRAM_ID: Pubkey = Pubkey::new_from_array([
    140, 151, 37, 143, 78, 36, 137, 241, 187, 61, 16, 41, 20, 142, 13, 131,
    11, 90, 19, 153, 218, 255, 16, 132, 4, 142, 123, 216, 219, 233, 248, 89,
]);

/// USDC mint on mainnet-beta
pub const USDC_MINT_MAINNET: Pubkey = solana_sdk::pubkey!("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v");

/// USDC mint on devnet (Circle faucet)
pub const USDC_MINT_DEVNET: Pubkey = solana_sdk::pubkey!("4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU");

/// Size of an SPL token account
pub const TOKEN_ACCOUNT_LEN: usize = 165;

/// SPL Token `Transfer` instruction tag
const TOKEN_TRANSFER: u8 = 3;

/// Associated Token Account `Create` instruction tag
const ATA_CREATE: u8 = 0;

/// Derive the associated token account for a wallet and mint.
///
/// ATA = find_program_address([wallet, TOKEN_PROGRAM_ID, mint], ASSOCIATED_TOKEN_PROGRAM_ID)
pub fn associated_token_address(wallet: &Pubkey, mint: &Pubkey) -> Pubkey {
    let (ata, _) = Pubkey::find_program_address(
        &[wallet.as_ref(), TOKEN_PROGRAM_ID.as_ref(), mint.as_ref()],
        &ASSOCIATED_TOKEN_PROGRAM_ID,
    );
    ata
}

/// Create `wallet`'s associated token account, paid for by `payer`
pub fn create_associated_token_account(payer: &Pubkey, wallet: &Pubkey, mint: &Pubkey) -> Instruction {
    let ata = associated_token_address(wallet, mint);
    Instruction {
        program_id: ASSOCIATED_TOKEN_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(*payer, true),                          // funding account
            AccountMeta::new(ata, false),                            // associated token account
            AccountMeta::new_readonly(*wallet, false),               // wallet
            AccountMeta::new_readonly(*mint, false),                 // mint
            AccountMeta::new_readonly(system_program::id(), false),  // system_program
            AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),      // token_program
        ],
        data: vec![ATA_CREATE],
    }
}

/// SPL Token transfer of `amount` base units between two token accounts
pub fn transfer(source: &Pubkey, destination: &Pubkey, authority: &Pubkey, amount: u64) -> Instruction {
    let mut data = Vec::with_capacity(9);
    data.push(TOKEN_TRANSFER);
    data.extend_from_slice(&amount.to_le_bytes());

    Instruction {
        program_id: TOKEN_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(*source, false),
            AccountMeta::new(*destination, false),
            AccountMeta::new_readonly(*authority, true),
        ],
        data,
    }
}

/// Decode the `amount` argument of a token transfer instruction
pub fn decode_transfer_amount(data: &[u8]) -> Option<u64> {
    match data {
        [TOKEN_TRANSFER, rest @ ..] if rest.len() == 8 => {
            Some(u64::from_le_bytes(rest.try_into().ok()?))
        }
        _ => None,
    }
}

// Token account layout:
//   0..32:   mint
//  32..64:   owner
//  64..72:   amount u64
// 108:       state (1 = initialized)

/// Balance held by a raw token account, in base units
pub fn token_account_amount(data: &[u8]) -> Option<u64> {
    let bytes = data.get(64..72)?;
    Some(u64::from_le_bytes(bytes.try_into().ok()?))
}

/// Encode an initialized token account
pub fn pack_token_account(mint: &Pubkey, owner: &Pubkey, amount: u64) -> Vec<u8> {
    let mut data = vec![0u8; TOKEN_ACCOUNT_LEN];
    data[0..32].copy_from_slice(mint.as_ref());
    data[32..64].copy_from_slice(owner.as_ref());
    data[64..72].copy_from_slice(&amount.to_le_bytes());
    data[108] = 1;
    data
}
