use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use thiserror::Error;

use crate::domain::retry::Transient;
use crate::domain::trade::{TradeAction, TradePool, TradeRequest};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TradeApiError {
    #[error("Trade API request failed: {0}")]
    RequestFailed(String),
    #[error("Trade API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Invalid trade API response: {0}")]
    InvalidResponse(String),
    #[error("Trade API rejected the order: {0}")]
    Rejected(String),
    #[error("An API key is required for lightning trades")]
    MissingApiKey,
}

impl TradeApiError {
    pub fn is_retryable(&self) -> bool {
        match self {
            TradeApiError::RequestFailed(_) => true,
            TradeApiError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl Transient for TradeApiError {
    fn is_transient(&self) -> bool {
        self.is_retryable()
    }
}

/// Fully rendered trade parameters, priority fee included
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeParams {
    pub action: TradeAction,
    pub mint: String,
    pub amount: Decimal,
    pub denominated_in_sol: bool,
    pub slippage_pct: f64,
    pub priority_fee_sol: Decimal,
    pub pool: TradePool,
}

impl TradeParams {
    pub fn from_request(request: &TradeRequest, priority_fee_sol: Decimal) -> Self {
        Self {
            action: request.action,
            mint: request.mint.trim().to_string(),
            amount: request.amount,
            denominated_in_sol: request.denominated_in_sol,
            slippage_pct: request.slippage_pct,
            priority_fee_sol,
            pool: request.pool,
        }
    }
}

/// Remote service that turns trade parameters into pump.fun transactions
#[async_trait]
pub trait TradeApi: Send + Sync {
    /// Serialized unsigned `VersionedTransaction` paying from `public_key`
    async fn build_local_transaction(
        &self,
        params: &TradeParams,
        public_key: &Pubkey,
    ) -> Result<Vec<u8>, TradeApiError>;

    /// Custodial execution; the service signs and submits
    async fn execute_lightning(&self, params: &TradeParams) -> Result<Signature, TradeApiError>;
}
