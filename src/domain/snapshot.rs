//! Price Snapshot
//!
//! Immutable valuation of a token at one point in time, derived from its
//! curve state and the SOL/USD reference price.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::curve::{self, CurveError, CurveParams, CurveState};

/// Point-in-time valuation of a bonding curve token
///
/// Fields are private: a snapshot is never mutated, a fresh fetch builds a new one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSnapshot {
    token_address: String,
    price_sol: f64,
    price_usd: f64,
    market_cap_usd: f64,
    bonding_progress_pct: f64,
    curve_state: CurveState,
    timestamp: DateTime<Utc>,
}

impl PriceSnapshot {
    /// Value a curve against a SOL/USD reference price
    pub fn from_curve(
        token_address: impl Into<String>,
        curve_state: CurveState,
        sol_usd: f64,
        params: &CurveParams,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, CurveError> {
        let price_sol = curve::price(&curve_state, params)?;
        let total_supply = params.whole_tokens(curve_state.token_total_supply);

        Ok(Self {
            token_address: token_address.into(),
            price_sol,
            price_usd: price_sol * sol_usd,
            market_cap_usd: curve::market_cap(price_sol, total_supply, sol_usd),
            bonding_progress_pct: curve::bonding_progress(&curve_state, params),
            curve_state,
            timestamp,
        })
    }

    pub fn token_address(&self) -> &str {
        &self.token_address
    }

    pub fn price_sol(&self) -> f64 {
        self.price_sol
    }

    pub fn price_usd(&self) -> f64 {
        self.price_usd
    }

    pub fn market_cap_usd(&self) -> f64 {
        self.market_cap_usd
    }

    pub fn bonding_progress_pct(&self) -> f64 {
        self.bonding_progress_pct
    }

    pub fn curve_state(&self) -> &CurveState {
        &self.curve_state
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Whether the token already left the bonding curve
    pub fn is_migrated(&self) -> bool {
        self.curve_state.complete
    }
}
