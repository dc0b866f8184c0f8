//! Price Fetcher
//!
//! Values a pump.fun token straight from its on-chain bonding curve.
//! [`PriceFetcher`] never substitutes another source; [`PriceService`] is the
//! caller-side wrapper that may fall back to a secondary price API when a
//! token simply has no curve to read.

use chrono::Utc;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::adapters::pump_fun::curve_account::{self, DecodeError, PUMP_FUN_PROGRAM_ID};
use crate::domain::curve::{CurveError, CurveParams, CurveState};
use crate::domain::snapshot::PriceSnapshot;
use crate::ports::chain::{ChainRpc, RpcError};
use crate::ports::price::{PriceSourceError, SolUsdSource, TokenPriceSource};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PriceError {
    #[error("Invalid mint address: {0}")]
    InvalidMint(String),
    #[error("No bonding curve account for {0}")]
    TokenNotFound(String),
    #[error("Failed to decode curve account: {0}")]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Curve(#[from] CurveError),
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error("SOL/USD reference price unavailable: {0}")]
    PriceReference(PriceSourceError),
}

impl PriceError {
    /// Errors that mean "no curve could be read", as opposed to a curve that
    /// was read and turned out invalid
    pub fn allows_fallback(&self) -> bool {
        matches!(self, PriceError::TokenNotFound(_) | PriceError::Rpc(_))
    }
}

/// Reads bonding curves and values them in SOL and USD
#[derive(Clone)]
pub struct PriceFetcher {
    chain: Arc<dyn ChainRpc>,
    sol_usd: Arc<dyn SolUsdSource>,
    params: CurveParams,
    program_id: Pubkey,
}

impl PriceFetcher {
    pub fn new(chain: Arc<dyn ChainRpc>, sol_usd: Arc<dyn SolUsdSource>, params: CurveParams) -> Self {
        Self {
            chain,
            sol_usd,
            params,
            program_id: PUMP_FUN_PROGRAM_ID,
        }
    }

    /// Read curves owned by another deployment of the program
    pub fn with_program_id(mut self, program_id: Pubkey) -> Self {
        self.program_id = program_id;
        self
    }

    pub fn params(&self) -> &CurveParams {
        &self.params
    }

    /// Raw curve state for `mint`
    pub async fn curve_state(&self, mint: &str) -> Result<CurveState, PriceError> {
        let mint_key =
            Pubkey::from_str(mint.trim()).map_err(|_| PriceError::InvalidMint(mint.to_string()))?;
        let address = curve_account::bonding_curve_address_with_program(&mint_key, &self.program_id);

        debug!(mint = %mint_key, curve = %address, "Reading bonding curve");
        let data = self
            .chain
            .get_account_data(&address)
            .await?
            .ok_or_else(|| PriceError::TokenNotFound(mint.to_string()))?;

        Ok(curve_account::decode_curve_account(&data)?)
    }

    async fn reference_price(&self) -> Result<f64, PriceError> {
        self.sol_usd
            .sol_usd_price()
            .await
            .map_err(PriceError::PriceReference)
    }

    /// Current valuation of `mint`
    pub async fn fetch(&self, mint: &str) -> Result<PriceSnapshot, PriceError> {
        let state = self.curve_state(mint).await?;
        let sol_usd = self.reference_price().await?;
        Ok(PriceSnapshot::from_curve(
            mint.trim(),
            state,
            sol_usd,
            &self.params,
            Utc::now(),
        )?)
    }

    async fn fetch_cached(&self, mint: &str, sol_usd: &mut Option<f64>) -> Result<PriceSnapshot, PriceError> {
        let state = self.curve_state(mint).await?;
        let reference = match *sol_usd {
            Some(p) => p,
            None => {
                let p = self.reference_price().await?;
                *sol_usd = Some(p);
                p
            }
        };
        Ok(PriceSnapshot::from_curve(
            mint.trim(),
            state,
            reference,
            &self.params,
            Utc::now(),
        )?)
    }

    /// Value several mints in order, reading SOL/USD once for the batch
    pub async fn fetch_many(&self, mints: &[String]) -> Vec<(String, Result<PriceSnapshot, PriceError>)> {
        let mut sol_usd: Option<f64> = None;
        let mut results = Vec::with_capacity(mints.len());

        for mint in mints {
            let result = self.fetch_cached(mint, &mut sol_usd).await;
            results.push((mint.clone(), result));
        }

        results
    }
}

/// Price from the curve, or from the secondary source after a permitted fallback
#[derive(Debug, Clone, PartialEq)]
pub enum PriceQuote {
    Curve(PriceSnapshot),
    Fallback {
        mint: String,
        price_usd: f64,
        /// Why the curve could not be used
        reason: PriceError,
    },
}

impl PriceQuote {
    pub fn price_usd(&self) -> f64 {
        match self {
            PriceQuote::Curve(snapshot) => snapshot.price_usd(),
            PriceQuote::Fallback { price_usd, .. } => *price_usd,
        }
    }
}

/// Curve pricing with an optional secondary source
#[derive(Clone)]
pub struct PriceService {
    fetcher: PriceFetcher,
    fallback: Option<Arc<dyn TokenPriceSource>>,
}

impl PriceService {
    pub fn new(fetcher: PriceFetcher) -> Self {
        Self {
            fetcher,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, source: Arc<dyn TokenPriceSource>) -> Self {
        self.fallback = Some(source);
        self
    }

    pub fn fetcher(&self) -> &PriceFetcher {
        &self.fetcher
    }

    /// Curve price when available. Decode and curve-math errors are returned
    /// as-is; only a missing curve or an RPC failure consults the fallback.
    pub async fn quote(&self, mint: &str) -> Result<PriceQuote, PriceError> {
        let err = match self.fetcher.fetch(mint).await {
            Ok(snapshot) => return Ok(PriceQuote::Curve(snapshot)),
            Err(e) => e,
        };

        let fallback = match &self.fallback {
            Some(source) if err.allows_fallback() => source,
            _ => return Err(err),
        };

        match fallback.token_usd_price(mint.trim()).await {
            Ok(price_usd) => {
                debug!(mint, price_usd, reason = %err, "Using fallback price");
                Ok(PriceQuote::Fallback {
                    mint: mint.trim().to_string(),
                    price_usd,
                    reason: err,
                })
            }
            Err(fallback_err) => {
                warn!(mint, error = %fallback_err, "Fallback price source failed");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::pump_fun::curve_account::{bonding_curve_address, encode_curve_account};
    use crate::ports::mocks::{MockChainRpc, MockPriceSource};
    use crate::ports::price::{MockSolUsdSource, MockTokenPriceSource};
    use approx::assert_relative_eq;

    const MINT: &str = "4k3Dyjzvzp8eMZWUXbBCjEvwSkkk59S5iCNLY3QrkX6R";

    fn equal_decimals() -> CurveParams {
        CurveParams {
            token_decimals: 9,
            sol_decimals: 9,
            ..CurveParams::default()
        }
    }

    fn worked_example() -> CurveState {
        CurveState {
            virtual_token_reserves: 1_000_000_000_000,
            virtual_sol_reserves: 30_000_000_000,
            real_token_reserves: 500_000_000_000,
            real_sol_reserves: 42_500_000_000,
            token_total_supply: 1_000_000_000_000,
            complete: false,
        }
    }

    fn chain_with_curve(state: &CurveState) -> MockChainRpc {
        let mint = Pubkey::from_str(MINT).unwrap();
        MockChainRpc::new().with_account(bonding_curve_address(&mint), encode_curve_account(state))
    }

    #[tokio::test]
    async fn test_fetch_worked_example() {
        let fetcher = PriceFetcher::new(
            Arc::new(chain_with_curve(&worked_example())),
            Arc::new(MockPriceSource::new().with_sol_usd(150.0)),
            equal_decimals(),
        );

        let snap = fetcher.fetch(MINT).await.unwrap();
        assert_relative_eq!(snap.price_sol(), 0.03, epsilon = 1e-12);
        assert_relative_eq!(snap.price_usd(), 4.5, epsilon = 1e-9);
        assert_relative_eq!(snap.bonding_progress_pct(), 50.0);
        assert_eq!(snap.token_address(), MINT);
    }

    #[tokio::test]
    async fn test_missing_account_is_token_not_found() {
        let fetcher = PriceFetcher::new(
            Arc::new(MockChainRpc::new()),
            Arc::new(MockPriceSource::new().with_sol_usd(150.0)),
            CurveParams::default(),
        );
        assert_eq!(
            fetcher.fetch(MINT).await,
            Err(PriceError::TokenNotFound(MINT.to_string()))
        );
    }

    #[tokio::test]
    async fn test_invalid_mint() {
        let fetcher = PriceFetcher::new(
            Arc::new(MockChainRpc::new()),
            Arc::new(MockPriceSource::new()),
            CurveParams::default(),
        );
        assert!(matches!(fetcher.fetch("nope").await, Err(PriceError::InvalidMint(_))));
    }

    #[tokio::test]
    async fn test_zero_reserves_division_by_zero() {
        let empty = CurveState {
            virtual_sol_reserves: 30_000_000_000,
            ..CurveState::default()
        };
        let fetcher = PriceFetcher::new(
            Arc::new(chain_with_curve(&empty)),
            Arc::new(MockPriceSource::new().with_sol_usd(150.0)),
            CurveParams::default(),
        );
        assert_eq!(
            fetcher.fetch(MINT).await,
            Err(PriceError::Curve(CurveError::DivisionByZero))
        );
    }

    #[tokio::test]
    async fn test_reference_price_failure() {
        let mut sol_usd = MockSolUsdSource::new();
        sol_usd
            .expect_sol_usd_price()
            .times(1)
            .returning(|| Err(PriceSourceError::Unavailable("down".into())));

        let fetcher = PriceFetcher::new(
            Arc::new(chain_with_curve(&worked_example())),
            Arc::new(sol_usd),
            equal_decimals(),
        );
        assert!(matches!(
            fetcher.fetch(MINT).await,
            Err(PriceError::PriceReference(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_many_reads_reference_once() {
        let mut sol_usd = MockSolUsdSource::new();
        sol_usd.expect_sol_usd_price().times(1).returning(|| Ok(150.0));

        let fetcher = PriceFetcher::new(
            Arc::new(chain_with_curve(&worked_example())),
            Arc::new(sol_usd),
            equal_decimals(),
        );
        let mints = vec![MINT.to_string(), "bad".to_string(), MINT.to_string()];
        let results = fetcher.fetch_many(&mints).await;

        assert_eq!(results.len(), 3);
        assert!(results[0].1.is_ok());
        assert!(matches!(results[1].1, Err(PriceError::InvalidMint(_))));
        assert!(results[2].1.is_ok());
    }

    #[tokio::test]
    async fn test_service_falls_back_when_curve_missing() {
        let fetcher = PriceFetcher::new(
            Arc::new(MockChainRpc::new()),
            Arc::new(MockPriceSource::new().with_sol_usd(150.0)),
            CurveParams::default(),
        );
        let service = PriceService::new(fetcher)
            .with_fallback(Arc::new(MockPriceSource::new().with_token_price(MINT, 0.42)));

        let quote = service.quote(MINT).await.unwrap();
        assert!(matches!(
            &quote,
            PriceQuote::Fallback { reason: PriceError::TokenNotFound(_), .. }
        ));
        assert_relative_eq!(quote.price_usd(), 0.42);
    }

    #[tokio::test]
    async fn test_service_never_masks_decode_errors() {
        let mint = Pubkey::from_str(MINT).unwrap();
        let chain = MockChainRpc::new().with_account(bonding_curve_address(&mint), vec![0u8; 64]);
        let fetcher = PriceFetcher::new(
            Arc::new(chain),
            Arc::new(MockPriceSource::new().with_sol_usd(150.0)),
            CurveParams::default(),
        );

        let mut fallback = MockTokenPriceSource::new();
        fallback.expect_token_usd_price().times(0);
        let service = PriceService::new(fetcher).with_fallback(Arc::new(fallback));

        assert!(matches!(
            service.quote(MINT).await,
            Err(PriceError::Decode(DecodeError::Discriminator { .. }))
        ));
    }

    #[tokio::test]
    async fn test_service_returns_original_error_when_fallback_fails() {
        let mint = Pubkey::from_str(MINT).unwrap();
        let chain = MockChainRpc::new()
            .with_account_error(bonding_curve_address(&mint), RpcError::Timeout);
        let fetcher = PriceFetcher::new(
            Arc::new(chain),
            Arc::new(MockPriceSource::new().with_sol_usd(150.0)),
            CurveParams::default(),
        );
        let service = PriceService::new(fetcher).with_fallback(Arc::new(MockPriceSource::new()));

        assert_eq!(service.quote(MINT).await, Err(PriceError::Rpc(RpcError::Timeout)));
    }
}
