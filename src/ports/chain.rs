use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use solana_sdk::{
    hash::Hash, pubkey::Pubkey, signature::Signature, transaction::VersionedTransaction,
};
use thiserror::Error;

use crate::domain::retry::Transient;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RpcError {
    #[error("RPC transport error: {0}")]
    Transport(String),
    #[error("RPC rate limited: {0}")]
    RateLimited(String),
    #[error("RPC request timed out")]
    Timeout,
    #[error("Blockhash not found or expired")]
    BlockhashNotFound,
    #[error("Transaction rejected: {0}")]
    Rejected(String),
    #[error("Invalid RPC input: {0}")]
    InvalidInput(String),
    #[error("Unexpected RPC response: {0}")]
    InvalidResponse(String),
}

impl RpcError {
    /// Network-level failures that a later attempt may not hit
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RpcError::Transport(_) | RpcError::RateLimited(_) | RpcError::Timeout
        )
    }

    pub fn is_stale_blockhash(&self) -> bool {
        matches!(self, RpcError::BlockhashNotFound)
    }
}

impl Transient for RpcError {
    fn is_transient(&self) -> bool {
        self.is_retryable()
    }
}

/// Where a submitted signature currently stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureStatus {
    /// The node has not seen the signature (yet)
    NotFound,
    /// Seen but below the confirmed commitment level
    Processing,
    Confirmed,
    /// Landed and failed on chain
    Failed(String),
}

/// One non-empty SPL token account owned by a wallet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenBalance {
    pub mint: String,
    pub token_account: String,
    /// Raw base units
    pub amount: u64,
    pub decimals: u8,
    /// `amount` scaled by `decimals`
    pub ui_amount: Decimal,
}

/// Chain RPC operations used by the fetcher, pipeline and liquidation
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Raw account data, `None` when the account does not exist
    async fn get_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, RpcError>;

    async fn get_latest_blockhash(&self) -> Result<Hash, RpcError>;

    async fn send_transaction(&self, transaction: &VersionedTransaction) -> Result<Signature, RpcError>;

    async fn get_signature_status(&self, signature: &Signature) -> Result<SignatureStatus, RpcError>;

    /// Token accounts of `owner` with a non-zero balance
    async fn get_token_balances(&self, owner: &Pubkey) -> Result<Vec<TokenBalance>, RpcError>;

    /// Recent per-slot prioritization fees in micro-lamports per compute unit
    async fn get_recent_prioritization_fees(&self, accounts: &[Pubkey]) -> Result<Vec<u64>, RpcError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(RpcError::Timeout.is_retryable());
        assert!(RpcError::RateLimited("429".into()).is_retryable());
        assert!(RpcError::Transport("reset".into()).is_retryable());
        assert!(!RpcError::BlockhashNotFound.is_retryable());
        assert!(!RpcError::Rejected("insufficient funds".into()).is_retryable());
        assert!(RpcError::BlockhashNotFound.is_stale_blockhash());
    }
}
