//! Bonding Curve Math
//!
//! Pure pricing functions over pump.fun bonding curve reserves.
//! Nothing in here touches the network; every function is deterministic
//! over a [`CurveState`] and the platform [`CurveParams`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lamports in one SOL
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;
/// Decimals of native SOL
pub const SOL_DECIMALS: u8 = 9;
/// Decimals used by every pump.fun mint
pub const PUMP_TOKEN_DECIMALS: u8 = 6;
/// Real SOL in the curve at which pump.fun migrates the token (~85 SOL)
pub const DEFAULT_MIGRATION_THRESHOLD_LAMPORTS: u64 = 85_000_000_000;

/// Errors raised by curve math
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CurveError {
    /// Virtual token reserves are zero, the curve has no liquidity yet
    #[error("Division by zero: curve has no virtual token reserves")]
    DivisionByZero,
}

/// Reserve state of a pump.fun bonding curve account
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurveState {
    pub virtual_token_reserves: u64,
    pub virtual_sol_reserves: u64,
    pub real_token_reserves: u64,
    pub real_sol_reserves: u64,
    pub token_total_supply: u64,
    /// Set once the curve migrated to an AMM pool
    pub complete: bool,
}

impl CurveState {
    /// Whether the curve can be priced at all
    pub fn has_liquidity(&self) -> bool {
        self.virtual_token_reserves > 0
    }

    /// Merge a newer observation of the same curve.
    ///
    /// `complete` is sticky: a later read that reports `false` (stale RPC node,
    /// reorg) never un-migrates a token we already saw migrated.
    pub fn observe_next(&self, next: CurveState) -> CurveState {
        CurveState {
            complete: self.complete || next.complete,
            ..next
        }
    }
}

/// Platform constants that parameterise the curve math
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurveParams {
    /// Decimals of the traded token
    pub token_decimals: u8,
    /// Decimals of the quote asset (SOL)
    pub sol_decimals: u8,
    /// Real SOL reserves at which the curve completes
    pub migration_threshold_lamports: u64,
}

impl Default for CurveParams {
    fn default() -> Self {
        Self {
            token_decimals: PUMP_TOKEN_DECIMALS,
            sol_decimals: SOL_DECIMALS,
            migration_threshold_lamports: DEFAULT_MIGRATION_THRESHOLD_LAMPORTS,
        }
    }
}

impl CurveParams {
    /// Convert raw token base units into whole tokens
    pub fn whole_tokens(&self, base_units: u64) -> f64 {
        base_units as f64 / 10f64.powi(self.token_decimals as i32)
    }

    /// Convert raw quote base units (lamports) into SOL
    pub fn whole_sol(&self, base_units: u64) -> f64 {
        base_units as f64 / 10f64.powi(self.sol_decimals as i32)
    }
}

/// Raw reserve ratio `virtual_sol / virtual_token` in base units
pub fn reserve_ratio(state: &CurveState) -> Result<f64, CurveError> {
    if state.virtual_token_reserves == 0 {
        return Err(CurveError::DivisionByZero);
    }
    Ok(state.virtual_sol_reserves as f64 / state.virtual_token_reserves as f64)
}

/// Spot price of one whole token in SOL
///
/// `(virtual_sol / 10^sol_decimals) / (virtual_token / 10^token_decimals)`
pub fn price(state: &CurveState, params: &CurveParams) -> Result<f64, CurveError> {
    let ratio = reserve_ratio(state)?;
    let exponent = params.token_decimals as i32 - params.sol_decimals as i32;
    Ok(ratio * 10f64.powi(exponent))
}

/// Market cap in USD: `total_supply × price_sol × sol_usd`
///
/// `total_supply` is in whole tokens.
pub fn market_cap(price_sol: f64, total_supply: f64, sol_usd: f64) -> f64 {
    total_supply * price_sol * sol_usd
}

/// Percentage of the way to migration, clamped to `[0, 100]`
pub fn bonding_progress(state: &CurveState, params: &CurveParams) -> f64 {
    if state.complete || params.migration_threshold_lamports == 0 {
        return 100.0;
    }
    let progress =
        state.real_sol_reserves as f64 / params.migration_threshold_lamports as f64 * 100.0;
    progress.clamp(0.0, 100.0)
}

/// Tokens received for `sol_in` lamports (constant product, fee excluded)
pub fn tokens_out_for_sol(state: &CurveState, sol_in: u64) -> Result<u64, CurveError> {
    if state.virtual_token_reserves == 0 || state.virtual_sol_reserves == 0 {
        return Err(CurveError::DivisionByZero);
    }
    let k = state.virtual_sol_reserves as u128 * state.virtual_token_reserves as u128;
    let new_sol = state.virtual_sol_reserves as u128 + sol_in as u128;
    let new_tokens = k / new_sol + 1;
    let out = (state.virtual_token_reserves as u128).saturating_sub(new_tokens);
    Ok(out.min(state.real_token_reserves as u128) as u64)
}

/// Lamports received for selling `tokens_in` base units (constant product, fee excluded)
pub fn sol_out_for_tokens(state: &CurveState, tokens_in: u64) -> Result<u64, CurveError> {
    if state.virtual_token_reserves == 0 || state.virtual_sol_reserves == 0 {
        return Err(CurveError::DivisionByZero);
    }
    let k = state.virtual_sol_reserves as u128 * state.virtual_token_reserves as u128;
    let new_tokens = state.virtual_token_reserves as u128 + tokens_in as u128;
    let new_sol = k / new_tokens;
    let out = (state.virtual_sol_reserves as u128).saturating_sub(new_sol);
    Ok(out.min(state.real_sol_reserves as u128) as u64)
}

/// Lower bound on an output amount after applying a slippage tolerance
pub fn min_out_with_slippage(amount: u64, slippage_pct: f64) -> u64 {
    let keep = (100.0 - slippage_pct.clamp(0.0, 100.0)) / 100.0;
    (amount as f64 * keep).floor() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn state(v_sol: u64, v_tok: u64) -> CurveState {
        CurveState {
            virtual_token_reserves: v_tok,
            virtual_sol_reserves: v_sol,
            real_token_reserves: 793_100_000_000_000,
            real_sol_reserves: 0,
            token_total_supply: 1_000_000_000_000_000,
            complete: false,
        }
    }

    fn unscaled() -> CurveParams {
        CurveParams {
            token_decimals: 9,
            sol_decimals: 9,
            ..CurveParams::default()
        }
    }

    #[test]
    fn test_reserve_ratio_matches_division() {
        let samples = [
            (30_000_000_000u64, 1_073_000_000_000_000u64),
            (1, 1),
            (42_123_456_789, 987_654_321),
            (u64::MAX, 3),
        ];
        for (v_sol, v_tok) in samples {
            let s = state(v_sol, v_tok);
            let expected = v_sol as f64 / v_tok as f64;
            assert_relative_eq!(reserve_ratio(&s).unwrap(), expected, epsilon = 1e-12);
            assert_relative_eq!(price(&s, &unscaled()).unwrap(), expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_price_zero_token_reserves() {
        let s = state(30_000_000_000, 0);
        assert_eq!(price(&s, &CurveParams::default()), Err(CurveError::DivisionByZero));
        assert_eq!(reserve_ratio(&s), Err(CurveError::DivisionByZero));
    }

    #[test]
    fn test_worked_example() {
        let s = state(30_000_000_000, 1_000_000_000_000);
        let price_sol = price(&s, &unscaled()).unwrap();
        assert_relative_eq!(price_sol, 0.03, epsilon = 1e-12);
        assert_relative_eq!(price_sol * 150.0, 4.5, epsilon = 1e-9);
    }

    #[test]
    fn test_price_scaled_by_decimals() {
        // 30 SOL against 1B whole tokens with 6 decimals
        let s = state(30_000_000_000, 1_000_000_000_000_000);
        let price_sol = price(&s, &CurveParams::default()).unwrap();
        assert_relative_eq!(price_sol, 30.0 / 1_000_000_000.0, epsilon = 1e-18);
    }

    #[test]
    fn test_market_cap() {
        let params = CurveParams::default();
        let supply = params.whole_tokens(1_000_000_000_000_000);
        assert_relative_eq!(supply, 1_000_000_000.0);
        let mcap = market_cap(0.000_000_03, supply, 150.0);
        assert_relative_eq!(mcap, 4_500.0, epsilon = 1e-6);
    }

    #[test]
    fn test_bonding_progress_monotonic_and_clamped() {
        let params = CurveParams::default();
        let mut last = -1.0;
        for step in 0..=120u64 {
            let mut s = state(30_000_000_000, 1_000_000_000_000_000);
            s.real_sol_reserves = step * 1_000_000_000;
            let progress = bonding_progress(&s, &params);
            assert!(progress >= last, "progress decreased at step {}", step);
            assert!((0.0..=100.0).contains(&progress));
            last = progress;
        }
        assert_eq!(last, 100.0);
    }

    #[test]
    fn test_bonding_progress_half_way() {
        let mut s = state(30_000_000_000, 1_000_000_000_000_000);
        s.real_sol_reserves = 42_500_000_000;
        assert_relative_eq!(bonding_progress(&s, &CurveParams::default()), 50.0);
    }

    #[test]
    fn test_bonding_progress_complete_is_full() {
        let mut s = state(30_000_000_000, 1_000_000_000_000_000);
        s.complete = true;
        assert_eq!(bonding_progress(&s, &CurveParams::default()), 100.0);
    }

    #[test]
    fn test_complete_never_reverts() {
        let mut migrated = state(30_000_000_000, 1_000_000_000_000_000);
        migrated.complete = true;

        let stale = state(31_000_000_000, 990_000_000_000_000);
        let merged = migrated.observe_next(stale);

        assert!(merged.complete);
        assert_eq!(merged.virtual_sol_reserves, 31_000_000_000);
    }

    #[test]
    fn test_constant_product_quotes() {
        let mut s = state(30_000_000_000, 1_073_000_000_000_000);
        s.real_sol_reserves = 10_000_000_000;

        let tokens = tokens_out_for_sol(&s, 1_000_000_000).unwrap();
        assert!(tokens > 0);
        assert!(tokens < s.virtual_token_reserves);

        let after_buy = CurveState {
            virtual_sol_reserves: s.virtual_sol_reserves + 1_000_000_000,
            virtual_token_reserves: s.virtual_token_reserves - tokens,
            real_sol_reserves: s.real_sol_reserves + 1_000_000_000,
            real_token_reserves: s.real_token_reserves - tokens,
            ..s
        };
        let sol = sol_out_for_tokens(&after_buy, tokens).unwrap();
        // Round trip through the curve never returns more than was paid in
        assert!(sol <= 1_000_000_000);
        assert!(sol > 990_000_000);
    }

    #[test]
    fn test_quotes_capped_by_real_reserves() {
        let mut s = state(30_000_000_000, 1_073_000_000_000_000);
        s.real_sol_reserves = 1_000;
        assert_eq!(sol_out_for_tokens(&s, 500_000_000_000_000).unwrap(), 1_000);
    }

    #[test]
    fn test_quotes_on_empty_curve() {
        let s = state(0, 0);
        assert_eq!(tokens_out_for_sol(&s, 1), Err(CurveError::DivisionByZero));
        assert_eq!(sol_out_for_tokens(&s, 1), Err(CurveError::DivisionByZero));
    }

    #[test]
    fn test_min_out_with_slippage() {
        assert_eq!(min_out_with_slippage(1_000, 10.0), 900);
        assert_eq!(min_out_with_slippage(1_000, 0.0), 1_000);
        assert_eq!(min_out_with_slippage(1_000, 150.0), 0);
    }
}
