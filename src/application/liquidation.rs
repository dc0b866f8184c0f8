//! Liquidation Engine
//!
//! Sells every non-zero token balance of a wallet back to SOL, one token at a
//! time, through the transaction pipeline. One token failing never stops the
//! batch; each token ends with exactly one outcome in the report.

use rust_decimal::Decimal;
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::application::pipeline::{PipelineStage, TradePreview, TransactionPipeline};
use crate::application::price_fetcher::PriceFetcher;
use crate::domain::cancel::CancelToken;
use crate::domain::trade::{ConfirmationState, SubmittedTransaction, TradePool, TradeRequest};
use crate::ports::chain::{ChainRpc, RpcError, TokenBalance};

/// USDC mint, excluded by default
pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiquidationConfig {
    /// Mints never sold
    pub exclusions: Vec<String>,
    pub slippage_pct: f64,
    pub pool: TradePool,
    /// Preview only; nothing is signed or sent
    pub dry_run: bool,
}

impl Default for LiquidationConfig {
    fn default() -> Self {
        Self {
            exclusions: vec![USDC_MINT.to_string()],
            slippage_pct: 25.0,
            pool: TradePool::Auto,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LiquidationOutcome {
    Sold(SubmittedTransaction),
    Previewed(TradePreview),
    Failed {
        stage: PipelineStage,
        error: String,
        may_have_landed: bool,
    },
    /// Not attempted because the run was cancelled
    Skipped,
}

impl LiquidationOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, LiquidationOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenLiquidation {
    pub mint: String,
    pub ui_amount: Decimal,
    pub outcome: LiquidationOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiquidationReport {
    pub wallet: String,
    pub dry_run: bool,
    pub tokens: Vec<TokenLiquidation>,
    /// Balances left alone because their mint is excluded
    pub excluded: Vec<String>,
}

impl LiquidationReport {
    pub fn sold(&self) -> usize {
        self.count(|o| matches!(o, LiquidationOutcome::Sold(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(LiquidationOutcome::is_failure)
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, LiquidationOutcome::Skipped))
    }

    fn count(&self, pred: impl Fn(&LiquidationOutcome) -> bool) -> usize {
        self.tokens.iter().filter(|t| pred(&t.outcome)).count()
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LiquidationError {
    #[error("Failed to list token balances: {0}")]
    Balances(#[from] RpcError),
}

pub struct LiquidationEngine {
    chain: Arc<dyn ChainRpc>,
    pipeline: TransactionPipeline,
    curves: Option<PriceFetcher>,
    config: LiquidationConfig,
}

impl LiquidationEngine {
    pub fn new(chain: Arc<dyn ChainRpc>, pipeline: TransactionPipeline, config: LiquidationConfig) -> Self {
        Self {
            chain,
            pipeline,
            curves: None,
            config,
        }
    }

    /// Read bonding curves so dry runs can quote expected proceeds
    pub fn with_curve_reader(mut self, fetcher: PriceFetcher) -> Self {
        self.curves = Some(fetcher);
        self
    }

    pub fn config(&self) -> &LiquidationConfig {
        &self.config
    }

    fn is_excluded(&self, mint: &str) -> bool {
        self.config.exclusions.iter().any(|m| m.trim() == mint)
    }

    /// Sell (or preview selling) every non-excluded balance of `owner`
    pub async fn liquidate(
        &self,
        owner: &Pubkey,
        cancel: &CancelToken,
    ) -> Result<LiquidationReport, LiquidationError> {
        let balances = self.chain.get_token_balances(owner).await?;
        info!(wallet = %owner, balances = balances.len(), dry_run = self.config.dry_run, "Starting liquidation");

        let (excluded, targets): (Vec<TokenBalance>, Vec<TokenBalance>) = balances
            .into_iter()
            .filter(|b| b.amount > 0)
            .partition(|b| self.is_excluded(&b.mint));

        let mut report = LiquidationReport {
            wallet: owner.to_string(),
            dry_run: self.config.dry_run,
            tokens: Vec::with_capacity(targets.len()),
            excluded: excluded.into_iter().map(|b| b.mint).collect(),
        };

        for (index, balance) in targets.into_iter().enumerate() {
            let outcome = if cancel.is_cancelled() {
                LiquidationOutcome::Skipped
            } else {
                info!(
                    token = index + 1,
                    mint = %balance.mint,
                    amount = %balance.ui_amount,
                    "Liquidating token"
                );
                self.liquidate_one(&balance, cancel).await
            };

            report.tokens.push(TokenLiquidation {
                mint: balance.mint,
                ui_amount: balance.ui_amount,
                outcome,
            });
        }

        info!(
            sold = report.sold(),
            failed = report.failed(),
            skipped = report.skipped(),
            excluded = report.excluded.len(),
            "Liquidation finished"
        );
        Ok(report)
    }

    async fn liquidate_one(&self, balance: &TokenBalance, cancel: &CancelToken) -> LiquidationOutcome {
        let request = TradeRequest::sell(balance.mint.clone(), balance.ui_amount, self.config.slippage_pct)
            .with_pool(self.config.pool);

        if self.config.dry_run {
            let curve = match &self.curves {
                Some(fetcher) => fetcher.curve_state(&balance.mint).await.ok(),
                None => None,
            };
            return match self.pipeline.preview(&request, curve.as_ref()).await {
                Ok(preview) => LiquidationOutcome::Previewed(preview),
                Err(e) => failed(&balance.mint, e.stage(), e.to_string(), e.may_have_landed()),
            };
        }

        match self.pipeline.execute(request, cancel).await {
            Ok(tx) if tx.confirmation_state() == ConfirmationState::Failed => failed(
                &balance.mint,
                PipelineStage::Confirm,
                format!("transaction {} failed on chain", tx.signature()),
                false,
            ),
            Ok(tx) => {
                if tx.confirmation_state() != ConfirmationState::Confirmed {
                    warn!(
                        mint = %balance.mint,
                        signature = tx.signature(),
                        state = ?tx.confirmation_state(),
                        "Sale not confirmed yet"
                    );
                }
                LiquidationOutcome::Sold(tx)
            }
            Err(e) => failed(&balance.mint, e.stage(), e.to_string(), e.may_have_landed()),
        }
    }
}

fn failed(mint: &str, stage: PipelineStage, error: String, may_have_landed: bool) -> LiquidationOutcome {
    error!(%mint, %stage, %error, may_have_landed, "Liquidation of token failed");
    LiquidationOutcome::Failed {
        stage,
        error,
        may_have_landed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::solana::WalletManager;
    use crate::application::fees::{FeeEstimator, FeeSettings};
    use crate::application::pipeline::PipelineSettings;
    use crate::domain::retry::RetryPolicy;
    use crate::domain::trade::TradeMode;
    use crate::ports::chain::SignatureStatus;
    use crate::ports::mocks::{MockChainRpc, MockTradeApi};
    use crate::ports::trade_api::TradeApiError;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn balance(mint: &str, ui: Decimal) -> TokenBalance {
        TokenBalance {
            mint: mint.to_string(),
            token_account: Pubkey::new_unique().to_string(),
            amount: 1_000_000,
            decimals: 6,
            ui_amount: ui,
        }
    }

    fn engine(chain: &MockChainRpc, api: &MockTradeApi, config: LiquidationConfig) -> LiquidationEngine {
        let chain_port: Arc<dyn ChainRpc> = Arc::new(chain.clone());
        let settings = PipelineSettings {
            mode: TradeMode::Local,
            retry: RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::ZERO,
                max_delay: Duration::ZERO,
                jitter: false,
            },
            confirm_timeout: Duration::from_millis(50),
            poll_interval: Duration::from_millis(5),
            token_decimals: 6,
        };
        let pipeline = TransactionPipeline::new(
            Arc::clone(&chain_port),
            Arc::new(api.clone()),
            Arc::new(WalletManager::new_random()),
            FeeEstimator::new(Arc::clone(&chain_port), FeeSettings::default()),
            settings,
        );
        LiquidationEngine::new(chain_port, pipeline, config)
    }

    fn mints() -> [String; 3] {
        [
            Pubkey::new_unique().to_string(),
            Pubkey::new_unique().to_string(),
            Pubkey::new_unique().to_string(),
        ]
    }

    #[tokio::test]
    async fn test_failure_of_one_token_does_not_stop_batch() {
        let [a, b, c] = mints();
        let chain = MockChainRpc::new().with_token_balances(vec![
            balance(&a, dec!(100)),
            balance(&b, dec!(200)),
            balance(&c, dec!(300)),
        ]);
        let api = MockTradeApi::new().with_failure(
            &b,
            TradeApiError::Status { status: 400, body: "no route".into() },
        );
        let engine = engine(&chain, &api, LiquidationConfig::default());

        let report = engine
            .liquidate(&Pubkey::new_unique(), &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(report.tokens.len(), 3);
        assert!(matches!(report.tokens[0].outcome, LiquidationOutcome::Sold(_)));
        assert!(matches!(
            report.tokens[1].outcome,
            LiquidationOutcome::Failed { stage: PipelineStage::Sign, .. }
        ));
        assert!(matches!(report.tokens[2].outcome, LiquidationOutcome::Sold(_)));
        assert_eq!(report.sold(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(chain.sent_transactions().len(), 2);

        let sold_amounts: Vec<Decimal> = api.get_calls().iter().map(|p| p.amount).collect();
        assert_eq!(sold_amounts, vec![dec!(100), dec!(200), dec!(300)]);
    }

    #[tokio::test]
    async fn test_exclusions_are_left_alone() {
        let [a, _, _] = mints();
        let chain = MockChainRpc::new()
            .with_token_balances(vec![balance(USDC_MINT, dec!(50)), balance(&a, dec!(1))]);
        let api = MockTradeApi::new();
        let engine = engine(&chain, &api, LiquidationConfig::default());

        let report = engine
            .liquidate(&Pubkey::new_unique(), &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(report.excluded, vec![USDC_MINT.to_string()]);
        assert_eq!(report.tokens.len(), 1);
        assert_eq!(report.tokens[0].mint, a);
    }

    #[tokio::test]
    async fn test_dry_run_sends_nothing() {
        let [a, b, _] = mints();
        let chain = MockChainRpc::new()
            .with_token_balances(vec![balance(&a, dec!(1)), balance(&b, dec!(2))]);
        let api = MockTradeApi::new();
        let config = LiquidationConfig {
            dry_run: true,
            ..LiquidationConfig::default()
        };
        let engine = engine(&chain, &api, config);

        let report = engine
            .liquidate(&Pubkey::new_unique(), &CancelToken::new())
            .await
            .unwrap();

        assert!(report.dry_run);
        assert!(report
            .tokens
            .iter()
            .all(|t| matches!(t.outcome, LiquidationOutcome::Previewed(_))));
        assert!(chain.sent_transactions().is_empty());
        assert!(api.get_calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_run_skips_remaining() {
        let [a, b, _] = mints();
        let chain = MockChainRpc::new()
            .with_token_balances(vec![balance(&a, dec!(1)), balance(&b, dec!(2))]);
        let api = MockTradeApi::new();
        let engine = engine(&chain, &api, LiquidationConfig::default());
        let cancel = CancelToken::new();
        cancel.cancel();

        let report = engine.liquidate(&Pubkey::new_unique(), &cancel).await.unwrap();
        assert_eq!(report.skipped(), 2);
        assert!(chain.sent_transactions().is_empty());
    }

    #[tokio::test]
    async fn test_on_chain_failure_recorded() {
        let [a, _, _] = mints();
        let chain = MockChainRpc::new()
            .with_token_balances(vec![balance(&a, dec!(1))])
            .with_statuses([SignatureStatus::Failed("slippage".into())]);
        let api = MockTradeApi::new();
        let engine = engine(&chain, &api, LiquidationConfig::default());

        let report = engine
            .liquidate(&Pubkey::new_unique(), &CancelToken::new())
            .await
            .unwrap();
        assert!(matches!(
            report.tokens[0].outcome,
            LiquidationOutcome::Failed { stage: PipelineStage::Confirm, .. }
        ));
    }
}
