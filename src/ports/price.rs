use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PriceSourceError {
    #[error("Price source unavailable: {0}")]
    Unavailable(String),
    #[error("No price for {0}")]
    NotFound(String),
    #[error("Invalid price response: {0}")]
    InvalidResponse(String),
}

/// Reference SOL/USD price
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SolUsdSource: Send + Sync {
    async fn sol_usd_price(&self) -> Result<f64, PriceSourceError>;
}

/// Secondary USD price for an arbitrary mint
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenPriceSource: Send + Sync {
    async fn token_usd_price(&self, mint: &str) -> Result<f64, PriceSourceError>;
}
