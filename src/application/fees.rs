//! Fee Estimation
//!
//! Total fee = base fee (lamports per signature) + priority fee
//! (`cu_price × cu_limit / 1e6`). The compute-unit price comes from recent
//! prioritization fees when the network reports any, otherwise from the
//! configured static price.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use statrs::statistics::{Data, OrderStatistics};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::ports::chain::ChainRpc;

/// Base fee charged per transaction signature
pub const LAMPORTS_PER_SIGNATURE: u64 = 5_000;

/// Micro-lamports in one lamport
const MICRO_LAMPORTS_PER_LAMPORT: u128 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FeeSource {
    /// Derived from recent prioritization fees
    Network,
    /// Configured fallback price
    Static,
}

impl fmt::Display for FeeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeeSource::Network => write!(f, "network"),
            FeeSource::Static => write!(f, "static"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeeEstimate {
    pub base_fee_lamports: u64,
    pub cu_price_micro_lamports: u64,
    pub cu_limit: u32,
    pub priority_fee_lamports: u64,
    pub source: FeeSource,
}

impl FeeEstimate {
    pub fn new(signatures: u64, cu_price_micro_lamports: u64, cu_limit: u32, source: FeeSource) -> Self {
        Self {
            base_fee_lamports: signatures.saturating_mul(LAMPORTS_PER_SIGNATURE),
            cu_price_micro_lamports,
            cu_limit,
            priority_fee_lamports: priority_fee_lamports(cu_price_micro_lamports, cu_limit),
            source,
        }
    }

    pub fn total_lamports(&self) -> u64 {
        self.base_fee_lamports.saturating_add(self.priority_fee_lamports)
    }

    /// Priority fee in SOL, the unit the trade API expects
    pub fn priority_fee_sol(&self) -> Decimal {
        lamports_to_sol(self.priority_fee_lamports)
    }

    pub fn total_sol(&self) -> Decimal {
        lamports_to_sol(self.total_lamports())
    }
}

pub fn lamports_to_sol(lamports: u64) -> Decimal {
    Decimal::from_i128_with_scale(lamports as i128, 9).normalize()
}

/// `cu_price × cu_limit / 1e6`, rounded up so a non-zero price never rounds to zero
pub fn priority_fee_lamports(cu_price_micro_lamports: u64, cu_limit: u32) -> u64 {
    let micro = cu_price_micro_lamports as u128 * cu_limit as u128;
    micro.div_ceil(MICRO_LAMPORTS_PER_LAMPORT).min(u64::MAX as u128) as u64
}

/// `percentile` (0-100) of the non-zero samples, `None` when all are zero
pub fn percentile_fee(samples: &[u64], percentile: u8) -> Option<u64> {
    let non_zero: Vec<f64> = samples.iter().filter(|s| **s > 0).map(|s| *s as f64).collect();
    if non_zero.is_empty() {
        return None;
    }
    let mut data = Data::new(non_zero);
    let value = data.percentile(percentile.min(100) as usize);
    value.is_finite().then(|| value.round() as u64)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeSettings {
    /// Compute unit limit requested by pump.fun trades
    pub cu_limit: u32,
    /// Fallback compute unit price when the network gives no signal
    pub static_cu_price_micro_lamports: u64,
    /// Percentile of recent non-zero fees to pay
    pub percentile: u8,
    /// Upper bound on the network-derived price
    pub max_cu_price_micro_lamports: u64,
    /// Query recent prioritization fees at all
    pub use_network: bool,
}

impl Default for FeeSettings {
    fn default() -> Self {
        Self {
            cu_limit: 200_000,
            static_cu_price_micro_lamports: 100_000,
            percentile: 75,
            max_cu_price_micro_lamports: 5_000_000,
            use_network: true,
        }
    }
}

#[derive(Clone)]
pub struct FeeEstimator {
    chain: Arc<dyn ChainRpc>,
    settings: FeeSettings,
}

impl FeeEstimator {
    pub fn new(chain: Arc<dyn ChainRpc>, settings: FeeSettings) -> Self {
        Self { chain, settings }
    }

    pub fn settings(&self) -> &FeeSettings {
        &self.settings
    }

    fn static_estimate(&self, signatures: u64) -> FeeEstimate {
        FeeEstimate::new(
            signatures,
            self.settings.static_cu_price_micro_lamports,
            self.settings.cu_limit,
            FeeSource::Static,
        )
    }

    /// Estimate fees for a transaction writing `accounts`.
    ///
    /// Never fails: RPC errors and an all-zero fee market fall back to the
    /// static price.
    pub async fn estimate(&self, accounts: &[Pubkey], signatures: u64) -> FeeEstimate {
        if !self.settings.use_network {
            return self.static_estimate(signatures);
        }

        let samples = match self.chain.get_recent_prioritization_fees(accounts).await {
            Ok(samples) => samples,
            Err(e) => {
                warn!(error = %e, "Prioritization fee lookup failed, using static fee");
                return self.static_estimate(signatures);
            }
        };

        match percentile_fee(&samples, self.settings.percentile) {
            Some(price) => {
                let price = price.min(self.settings.max_cu_price_micro_lamports);
                debug!(samples = samples.len(), cu_price = price, "Network priority fee");
                FeeEstimate::new(signatures, price, self.settings.cu_limit, FeeSource::Network)
            }
            None => {
                debug!(samples = samples.len(), "No non-zero priority fees, using static fee");
                self.static_estimate(signatures)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::chain::RpcError;
    use crate::ports::mocks::MockChainRpc;
    use rust_decimal_macros::dec;

    #[test]
    fn test_priority_fee_formula() {
        // 100_000 µL × 200_000 CU / 1e6 = 20_000 lamports
        assert_eq!(priority_fee_lamports(100_000, 200_000), 20_000);
        assert_eq!(priority_fee_lamports(0, 200_000), 0);
        assert_eq!(priority_fee_lamports(1, 1), 1);
    }

    #[test]
    fn test_estimate_totals() {
        let est = FeeEstimate::new(1, 100_000, 200_000, FeeSource::Static);
        assert_eq!(est.base_fee_lamports, 5_000);
        assert_eq!(est.total_lamports(), 25_000);
        assert_eq!(est.priority_fee_sol(), dec!(0.00002));
        assert_eq!(est.total_sol(), dec!(0.000025));
    }

    #[test]
    fn test_percentile_ignores_zero_samples() {
        let samples = [0, 0, 100, 200, 300, 400, 500];
        assert_eq!(percentile_fee(&samples, 50), Some(300));
        assert_eq!(percentile_fee(&samples, 100), Some(500));
        assert_eq!(percentile_fee(&[0, 0], 50), None);
        assert_eq!(percentile_fee(&[], 50), None);
    }

    #[tokio::test]
    async fn test_network_estimate_preferred() {
        let chain = MockChainRpc::new().with_priority_fees(Ok(vec![100, 200, 300, 400, 500]));
        let settings = FeeSettings {
            percentile: 50,
            ..FeeSettings::default()
        };
        let est = FeeEstimator::new(Arc::new(chain), settings).estimate(&[], 1).await;

        assert_eq!(est.source, FeeSource::Network);
        assert_eq!(est.cu_price_micro_lamports, 300);
    }

    #[tokio::test]
    async fn test_network_estimate_capped() {
        let chain = MockChainRpc::new().with_priority_fees(Ok(vec![50_000_000]));
        let est = FeeEstimator::new(Arc::new(chain), FeeSettings::default())
            .estimate(&[], 1)
            .await;
        assert_eq!(est.cu_price_micro_lamports, 5_000_000);
    }

    #[tokio::test]
    async fn test_static_fallback_on_rpc_error() {
        let chain = MockChainRpc::new().with_priority_fees(Err(RpcError::Timeout));
        let est = FeeEstimator::new(Arc::new(chain), FeeSettings::default())
            .estimate(&[], 1)
            .await;

        assert_eq!(est.source, FeeSource::Static);
        assert_eq!(est.cu_price_micro_lamports, 100_000);
    }

    #[tokio::test]
    async fn test_static_fallback_when_market_quiet() {
        let chain = MockChainRpc::new().with_priority_fees(Ok(vec![0, 0, 0]));
        let est = FeeEstimator::new(Arc::new(chain), FeeSettings::default())
            .estimate(&[], 1)
            .await;
        assert_eq!(est.source, FeeSource::Static);
    }
}
