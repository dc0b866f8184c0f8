use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Direction of a trade on the bonding curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Buy,
    Sell,
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeAction::Buy => write!(f, "buy"),
            TradeAction::Sell => write!(f, "sell"),
        }
    }
}

/// Liquidity venue the trade API should route to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TradePool {
    #[default]
    Pump,
    Raydium,
    PumpAmm,
    Auto,
}

impl fmt::Display for TradePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TradePool::Pump => "pump",
            TradePool::Raydium => "raydium",
            TradePool::PumpAmm => "pump-amm",
            TradePool::Auto => "auto",
        };
        write!(f, "{}", s)
    }
}

/// How a trade is executed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeMode {
    /// Unsigned transaction built remotely, signed and submitted locally
    #[default]
    Local,
    /// Custodial execution by the trade API using its own signer
    Lightning,
}

/// Reasons a trade request is rejected before anything is sent
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TradeValidationError {
    #[error("Invalid mint address: {0}")]
    InvalidMint(String),
    #[error("Amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),
    #[error("Slippage must be within 0-100%, got {0}")]
    SlippageOutOfRange(f64),
    #[error("Priority fee cannot be negative, got {0}")]
    NegativePriorityFee(Decimal),
}

/// A buy or sell order for one token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRequest {
    pub action: TradeAction,
    pub mint: String,
    /// SOL when `denominated_in_sol`, whole tokens otherwise
    pub amount: Decimal,
    pub denominated_in_sol: bool,
    pub slippage_pct: f64,
    /// Explicit priority fee; filled from the fee estimate when absent
    pub priority_fee_sol: Option<Decimal>,
    #[serde(default)]
    pub pool: TradePool,
}

impl TradeRequest {
    /// Spend `sol` SOL on `mint`
    pub fn buy(mint: impl Into<String>, sol: Decimal, slippage_pct: f64) -> Self {
        Self {
            action: TradeAction::Buy,
            mint: mint.into(),
            amount: sol,
            denominated_in_sol: true,
            slippage_pct,
            priority_fee_sol: None,
            pool: TradePool::default(),
        }
    }

    /// Sell `tokens` whole tokens of `mint`
    pub fn sell(mint: impl Into<String>, tokens: Decimal, slippage_pct: f64) -> Self {
        Self {
            action: TradeAction::Sell,
            mint: mint.into(),
            amount: tokens,
            denominated_in_sol: false,
            slippage_pct,
            priority_fee_sol: None,
            pool: TradePool::default(),
        }
    }

    pub fn with_priority_fee(mut self, sol: Decimal) -> Self {
        self.priority_fee_sol = Some(sol);
        self
    }

    pub fn with_pool(mut self, pool: TradePool) -> Self {
        self.pool = pool;
        self
    }

    /// Check the request invariants and return the parsed mint
    pub fn validate(&self) -> Result<Pubkey, TradeValidationError> {
        let mint = Pubkey::from_str(self.mint.trim())
            .map_err(|_| TradeValidationError::InvalidMint(self.mint.clone()))?;

        if self.amount <= Decimal::ZERO {
            return Err(TradeValidationError::NonPositiveAmount(self.amount));
        }

        if !(0.0..=100.0).contains(&self.slippage_pct) || self.slippage_pct.is_nan() {
            return Err(TradeValidationError::SlippageOutOfRange(self.slippage_pct));
        }

        if let Some(fee) = self.priority_fee_sol {
            if fee < Decimal::ZERO {
                return Err(TradeValidationError::NegativePriorityFee(fee));
            }
        }

        Ok(mint)
    }
}

impl fmt::Display for TradeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = if self.denominated_in_sol { "SOL" } else { "tokens" };
        write!(
            f,
            "{} {} {} of {} (slippage {}%)",
            self.action, self.amount, unit, self.mint, self.slippage_pct
        )
    }
}

/// Confirmation status of a submitted transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConfirmationState {
    Pending,
    Confirmed,
    /// Not observed within the polling window; it may still land
    TimedOut,
    Failed,
}

impl ConfirmationState {
    pub fn is_final(&self) -> bool {
        !matches!(self, ConfirmationState::Pending)
    }
}

/// A transaction handed to the network
///
/// Resolves at most once. A resubmission is a new `SubmittedTransaction`
/// with its own signature and a higher `attempt`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmittedTransaction {
    signature: String,
    request: TradeRequest,
    submitted_at: DateTime<Utc>,
    confirmation_state: ConfirmationState,
    attempt: u32,
}

impl SubmittedTransaction {
    pub fn new(signature: impl Into<String>, request: TradeRequest, attempt: u32) -> Self {
        Self {
            signature: signature.into(),
            request,
            submitted_at: Utc::now(),
            confirmation_state: ConfirmationState::Pending,
            attempt,
        }
    }

    /// Move out of `Pending`. Returns false if already resolved or `state` is `Pending`.
    pub fn resolve(&mut self, state: ConfirmationState) -> bool {
        if self.confirmation_state.is_final() || !state.is_final() {
            return false;
        }
        self.confirmation_state = state;
        true
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn request(&self) -> &TradeRequest {
        &self.request
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn confirmation_state(&self) -> ConfirmationState {
        self.confirmation_state
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}
