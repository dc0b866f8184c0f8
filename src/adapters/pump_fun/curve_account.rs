//! Bonding curve account layout
//!
//! Each pump.fun mint has one curve account at the PDA
//! `["bonding-curve", mint]` under the pump.fun program. Layout:
//!
//! | offset | field                    | type   |
//! |--------|--------------------------|--------|
//! | 0x00   | anchor discriminator     | [u8;8] |
//! | 0x08   | virtual_token_reserves   | u64 LE |
//! | 0x10   | virtual_sol_reserves     | u64 LE |
//! | 0x18   | real_token_reserves      | u64 LE |
//! | 0x20   | real_sol_reserves        | u64 LE |
//! | 0x28   | token_total_supply       | u64 LE |
//! | 0x30   | complete                 | bool   |
//!
//! Newer accounts carry extra trailing fields (creator); they are ignored.

use solana_sdk::{pubkey, pubkey::Pubkey};
use thiserror::Error;

use crate::domain::curve::CurveState;

pub const PUMP_FUN_PROGRAM_ID: Pubkey = pubkey!("6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P");

pub const BONDING_CURVE_SEED: &[u8] = b"bonding-curve";

pub const BONDING_CURVE_DISCRIMINATOR: [u8; 8] = [0x17, 0xb7, 0xf8, 0x37, 0x60, 0xd8, 0xac, 0x60];

const COMPLETE_OFFSET: usize = 0x30;

/// Smallest account that holds every field we read
pub const MIN_ACCOUNT_LEN: usize = COMPLETE_OFFSET + 1;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Curve account too short: {len} bytes (need at least {min})")]
    TooShort { len: usize, min: usize },
    #[error("Unexpected account discriminator {found:02x?}")]
    Discriminator { found: [u8; 8] },
}

/// Curve PDA for `mint`
pub fn bonding_curve_address(mint: &Pubkey) -> Pubkey {
    bonding_curve_address_with_program(mint, &PUMP_FUN_PROGRAM_ID)
}

pub fn bonding_curve_address_with_program(mint: &Pubkey, program_id: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[BONDING_CURVE_SEED, mint.as_ref()], program_id).0
}

fn read_u64(data: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[offset..offset + 8]);
    u64::from_le_bytes(buf)
}

/// Decode raw account data
pub fn decode_curve_account(data: &[u8]) -> Result<CurveState, DecodeError> {
    if data.len() < MIN_ACCOUNT_LEN {
        return Err(DecodeError::TooShort {
            len: data.len(),
            min: MIN_ACCOUNT_LEN,
        });
    }

    let mut found = [0u8; 8];
    found.copy_from_slice(&data[..8]);
    if found != BONDING_CURVE_DISCRIMINATOR {
        return Err(DecodeError::Discriminator { found });
    }

    Ok(CurveState {
        virtual_token_reserves: read_u64(data, 0x08),
        virtual_sol_reserves: read_u64(data, 0x10),
        real_token_reserves: read_u64(data, 0x18),
        real_sol_reserves: read_u64(data, 0x20),
        token_total_supply: read_u64(data, 0x28),
        complete: data[COMPLETE_OFFSET] != 0,
    })
}

/// Encode a curve state in the on-chain layout
pub fn encode_curve_account(state: &CurveState) -> Vec<u8> {
    let mut data = Vec::with_capacity(MIN_ACCOUNT_LEN);
    data.extend_from_slice(&BONDING_CURVE_DISCRIMINATOR);
    for field in [
        state.virtual_token_reserves,
        state.virtual_sol_reserves,
        state.real_token_reserves,
        state.real_sol_reserves,
        state.token_total_supply,
    ] {
        data.extend_from_slice(&field.to_le_bytes());
    }
    data.push(state.complete as u8);
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> CurveState {
        CurveState {
            virtual_token_reserves: 1_073_000_000_000_000,
            virtual_sol_reserves: 30_000_000_000,
            real_token_reserves: 793_100_000_000_000,
            real_sol_reserves: 1_250_000_000,
            token_total_supply: 1_000_000_000_000_000,
            complete: false,
        }
    }

    #[test]
    fn test_decode_known_layout() {
        let mut data = BONDING_CURVE_DISCRIMINATOR.to_vec();
        data.extend_from_slice(&7u64.to_le_bytes());
        data.extend_from_slice(&11u64.to_le_bytes());
        data.extend_from_slice(&13u64.to_le_bytes());
        data.extend_from_slice(&17u64.to_le_bytes());
        data.extend_from_slice(&19u64.to_le_bytes());
        data.push(1);
        // trailing creator field
        data.extend_from_slice(&[0xAA; 32]);

        let state = decode_curve_account(&data).unwrap();
        assert_eq!(state.virtual_token_reserves, 7);
        assert_eq!(state.virtual_sol_reserves, 11);
        assert_eq!(state.real_token_reserves, 13);
        assert_eq!(state.real_sol_reserves, 17);
        assert_eq!(state.token_total_supply, 19);
        assert!(state.complete);
    }

    #[test]
    fn test_encode_matches_decode() {
        let state = sample_state();
        let data = encode_curve_account(&state);
        assert_eq!(data.len(), MIN_ACCOUNT_LEN);
        assert_eq!(decode_curve_account(&data).unwrap(), state);
    }

    #[test]
    fn test_short_data() {
        let data = encode_curve_account(&sample_state());
        assert_eq!(
            decode_curve_account(&data[..40]),
            Err(DecodeError::TooShort { len: 40, min: MIN_ACCOUNT_LEN })
        );
    }

    #[test]
    fn test_wrong_discriminator() {
        let mut data = encode_curve_account(&sample_state());
        data[0] = 0x00;
        assert!(matches!(
            decode_curve_account(&data),
            Err(DecodeError::Discriminator { .. })
        ));
    }

    #[test]
    fn test_pda_is_deterministic() {
        let mint = Pubkey::new_unique();
        let a = bonding_curve_address(&mint);
        let b = bonding_curve_address(&mint);
        assert_eq!(a, b);
        assert_ne!(a, bonding_curve_address(&Pubkey::new_unique()));
        assert!(!a.is_on_curve());
    }
}
