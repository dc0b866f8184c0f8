//! Transaction Pipeline
//!
//! `build → estimate_fee → sign → submit → confirm` for one trade.
//!
//! In local mode the trade API returns an unsigned transaction; the pipeline
//! stamps it with a fresh blockhash, signs it with the wallet and submits it
//! over RPC. Transient RPC failures are retried with the configured policy.
//! A stale blockhash is answered with exactly one rebuild (new transaction,
//! new blockhash, new signature); a second stale blockhash is final.
//!
//! In lightning mode the trade API signs and submits itself and only the
//! confirmation stage runs locally.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use solana_sdk::{pubkey::Pubkey, signature::Signature, transaction::VersionedTransaction};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::adapters::pump_fun::curve_account::bonding_curve_address;
use crate::application::fees::{FeeEstimate, FeeEstimator};
use crate::domain::cancel::CancelToken;
use crate::domain::curve::{self, CurveState, LAMPORTS_PER_SOL, PUMP_TOKEN_DECIMALS};
use crate::domain::retry::{RetryError, RetryPolicy};
use crate::domain::trade::{
    ConfirmationState, SubmittedTransaction, TradeAction, TradeMode, TradeRequest, TradeValidationError,
};
use crate::ports::chain::{ChainRpc, RpcError, SignatureStatus};
use crate::ports::trade_api::{TradeApi, TradeApiError, TradeParams};
use crate::ports::wallet::{SigningError, TransactionSigner};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineStage {
    Build,
    EstimateFee,
    Sign,
    Submit,
    Confirm,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineStage::Build => "build",
            PipelineStage::EstimateFee => "estimate_fee",
            PipelineStage::Sign => "sign",
            PipelineStage::Submit => "submit",
            PipelineStage::Confirm => "confirm",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Invalid trade request: {0}")]
    InvalidRequest(#[from] TradeValidationError),

    #[error("Trade API error during {stage}: {source}")]
    TradeApi {
        stage: PipelineStage,
        source: TradeApiError,
    },

    #[error("Trade API returned an unusable transaction: {0}")]
    InvalidTransaction(String),

    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error("RPC error during {stage}: {source}")]
    Rpc {
        stage: PipelineStage,
        source: RpcError,
    },

    #[error("Submit failed after {attempts} attempt(s): {last_error}")]
    SubmitError {
        attempts: u32,
        last_error: String,
        may_have_landed: bool,
    },

    #[error("Cancelled during {stage}")]
    Cancelled {
        stage: PipelineStage,
        may_have_landed: bool,
    },
}

impl PipelineError {
    pub fn stage(&self) -> PipelineStage {
        match self {
            PipelineError::InvalidRequest(_) => PipelineStage::Build,
            PipelineError::TradeApi { stage, .. }
            | PipelineError::Rpc { stage, .. }
            | PipelineError::Cancelled { stage, .. } => *stage,
            PipelineError::InvalidTransaction(_) | PipelineError::Signing(_) => PipelineStage::Sign,
            PipelineError::SubmitError { .. } => PipelineStage::Submit,
        }
    }

    /// Whether the transaction could be on chain despite the error.
    ///
    /// True when a submission attempt ended ambiguously (timeout or dropped
    /// connection after the request left). Callers should `recheck` before
    /// trading the same mint again.
    pub fn may_have_landed(&self) -> bool {
        match self {
            PipelineError::SubmitError { may_have_landed, .. }
            | PipelineError::Cancelled { may_have_landed, .. } => *may_have_landed,
            _ => false,
        }
    }
}

/// Errors after which the request may have reached a leader
fn is_ambiguous(err: &RpcError) -> bool {
    matches!(err, RpcError::Timeout | RpcError::Transport(_))
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub mode: TradeMode,
    pub retry: RetryPolicy,
    pub confirm_timeout: Duration,
    pub poll_interval: Duration,
    /// Decimals of traded tokens, used for preview quotes
    pub token_decimals: u8,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            mode: TradeMode::Local,
            retry: RetryPolicy::default(),
            confirm_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(2),
            token_decimals: PUMP_TOKEN_DECIMALS,
        }
    }
}

/// A validated request ready for fee estimation
#[derive(Debug, Clone, PartialEq)]
pub struct TradePlan {
    request: TradeRequest,
    mint: Pubkey,
    mode: TradeMode,
    /// Accounts whose recent fee market prices the trade
    fee_accounts: Vec<Pubkey>,
}

impl TradePlan {
    pub fn request(&self) -> &TradeRequest {
        &self.request
    }

    pub fn mint(&self) -> &Pubkey {
        &self.mint
    }

    pub fn mode(&self) -> TradeMode {
        self.mode
    }

    /// Render trade API parameters; an explicit priority fee wins over the estimate
    pub fn params(&self, fee: &FeeEstimate) -> TradeParams {
        let priority_fee = self
            .request
            .priority_fee_sol
            .unwrap_or_else(|| fee.priority_fee_sol());
        TradeParams::from_request(&self.request, priority_fee)
    }
}

/// Result of a dry run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradePreview {
    pub params: TradeParams,
    pub fee: FeeEstimate,
    /// Constant-product output in base units (tokens for buys, lamports for sells)
    pub expected_out: Option<u64>,
    /// `expected_out` after slippage
    pub min_out: Option<u64>,
}

/// Executes trades for a single wallet.
///
/// Not meant to be shared between concurrent trades of the same wallet;
/// callers serialize access.
pub struct TransactionPipeline {
    chain: Arc<dyn ChainRpc>,
    trade_api: Arc<dyn TradeApi>,
    signer: Arc<dyn TransactionSigner>,
    fees: FeeEstimator,
    settings: PipelineSettings,
}

impl TransactionPipeline {
    pub fn new(
        chain: Arc<dyn ChainRpc>,
        trade_api: Arc<dyn TradeApi>,
        signer: Arc<dyn TransactionSigner>,
        fees: FeeEstimator,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            chain,
            trade_api,
            signer,
            fees,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn wallet(&self) -> Pubkey {
        self.signer.pubkey()
    }

    /// Validate the request and plan the trade
    pub fn build(&self, request: &TradeRequest) -> Result<TradePlan, PipelineError> {
        let mint = request.validate()?;
        Ok(TradePlan {
            request: request.clone(),
            mint,
            mode: self.settings.mode,
            fee_accounts: vec![mint, bonding_curve_address(&mint)],
        })
    }

    pub async fn estimate_fee(&self, plan: &TradePlan) -> FeeEstimate {
        let fee = self.fees.estimate(&plan.fee_accounts, 1).await;
        info!(
            source = %fee.source,
            cu_price = fee.cu_price_micro_lamports,
            priority_lamports = fee.priority_fee_lamports,
            total_lamports = fee.total_lamports(),
            "Fee estimate"
        );
        fee
    }

    /// Fetch the unsigned transaction, stamp a fresh blockhash and sign it
    pub async fn sign(
        &self,
        params: &TradeParams,
        cancel: &CancelToken,
    ) -> Result<VersionedTransaction, PipelineError> {
        let payer = self.signer.pubkey();
        let retry = &self.settings.retry;

        let bytes = retry
            .run(cancel, |_| self.trade_api.build_local_transaction(params, &payer))
            .await
            .map_err(|e| match e {
                RetryError::Cancelled { .. } => PipelineError::Cancelled {
                    stage: PipelineStage::Sign,
                    may_have_landed: false,
                },
                other => match other.into_last_error() {
                    Some(source) => PipelineError::TradeApi {
                        stage: PipelineStage::Sign,
                        source,
                    },
                    None => PipelineError::InvalidTransaction("no response".into()),
                },
            })?
            .value;

        let unsigned: VersionedTransaction = bincode::deserialize(&bytes)
            .map_err(|e| PipelineError::InvalidTransaction(e.to_string()))?;

        if unsigned.message.static_account_keys().first() != Some(&payer) {
            return Err(PipelineError::InvalidTransaction(
                "fee payer is not the trading wallet".into(),
            ));
        }

        let blockhash = retry
            .run(cancel, |_| self.chain.get_latest_blockhash())
            .await
            .map_err(|e| match e {
                RetryError::Cancelled { .. } => PipelineError::Cancelled {
                    stage: PipelineStage::Sign,
                    may_have_landed: false,
                },
                other => PipelineError::Rpc {
                    stage: PipelineStage::Sign,
                    source: other.into_last_error().unwrap_or(RpcError::Timeout),
                },
            })?
            .value;

        let mut message = unsigned.message;
        message.set_recent_blockhash(blockhash);
        let signed = self.signer.sign_transaction(message)?;

        debug!(blockhash = %blockhash, signature = %signed.signatures[0], "Signed transaction");
        Ok(signed)
    }

    /// Send with bounded retry of transient failures. The second element of
    /// the error reports whether any attempt ended ambiguously.
    async fn submit(
        &self,
        transaction: &VersionedTransaction,
        cancel: &CancelToken,
    ) -> Result<Signature, (RetryError<RpcError>, bool)> {
        let ambiguous = AtomicBool::new(false);
        let ambiguous_ref = &ambiguous;

        let result = self
            .settings
            .retry
            .run(cancel, |attempt| async move {
                debug!(attempt, "Submitting transaction");
                let result = self.chain.send_transaction(transaction).await;
                if let Err(e) = &result {
                    warn!(attempt, error = %e, "Submission failed");
                    if is_ambiguous(e) {
                        ambiguous_ref.store(true, Ordering::SeqCst);
                    }
                }
                result
            })
            .await;

        result
            .map(|attempted| attempted.value)
            .map_err(|e| (e, ambiguous.load(Ordering::SeqCst)))
    }

    /// Poll the signature until confirmed, failed, timed out or cancelled.
    /// Cancellation leaves the state `Pending`.
    pub async fn confirm(&self, signature: &Signature, cancel: &CancelToken) -> ConfirmationState {
        let deadline = Instant::now() + self.settings.confirm_timeout;

        loop {
            match self.chain.get_signature_status(signature).await {
                Ok(SignatureStatus::Confirmed) => {
                    info!(%signature, "Transaction confirmed");
                    return ConfirmationState::Confirmed;
                }
                Ok(SignatureStatus::Failed(reason)) => {
                    warn!(%signature, %reason, "Transaction failed on chain");
                    return ConfirmationState::Failed;
                }
                Ok(status) => debug!(%signature, ?status, "Awaiting confirmation"),
                Err(e) => debug!(%signature, error = %e, "Status poll failed"),
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(%signature, "Confirmation timed out; the transaction may still land");
                return ConfirmationState::TimedOut;
            }

            let wait = self.settings.poll_interval.min(deadline - now);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = cancel.cancelled() => return ConfirmationState::Pending,
            }
        }
    }

    /// Run a trade end to end
    pub async fn execute(
        &self,
        request: TradeRequest,
        cancel: &CancelToken,
    ) -> Result<SubmittedTransaction, PipelineError> {
        let plan = self.build(&request)?;
        info!(trade = %request, mode = ?plan.mode, "Executing trade");

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled {
                stage: PipelineStage::EstimateFee,
                may_have_landed: false,
            });
        }
        let fee = self.estimate_fee(&plan).await;
        let params = plan.params(&fee);

        let (signature, attempt) = match plan.mode {
            TradeMode::Local => self.sign_and_submit(&params, cancel).await?,
            TradeMode::Lightning => (self.submit_lightning(&params, cancel).await?, 1),
        };

        info!(%signature, attempt, "Transaction submitted");
        let mut submitted = SubmittedTransaction::new(signature.to_string(), request, attempt);
        let state = self.confirm(&signature, cancel).await;
        submitted.resolve(state);
        Ok(submitted)
    }

    async fn sign_and_submit(
        &self,
        params: &TradeParams,
        cancel: &CancelToken,
    ) -> Result<(Signature, u32), PipelineError> {
        let mut build = 1u32;
        let mut total_attempts = 0u32;
        let mut ambiguous = false;

        loop {
            let transaction = self.sign(params, cancel).await?;
            match self.submit(&transaction, cancel).await {
                Ok(signature) => return Ok((signature, build)),
                Err((err, was_ambiguous)) => {
                    total_attempts += err.attempts();
                    ambiguous |= was_ambiguous;

                    let stale = err.last_error().is_some_and(RpcError::is_stale_blockhash);
                    if stale && build == 1 && !cancel.is_cancelled() {
                        warn!("Blockhash expired, rebuilding transaction once");
                        build += 1;
                        continue;
                    }

                    return Err(match err {
                        RetryError::Cancelled { .. } => PipelineError::Cancelled {
                            stage: PipelineStage::Submit,
                            may_have_landed: ambiguous,
                        },
                        other => PipelineError::SubmitError {
                            attempts: total_attempts,
                            last_error: other
                                .last_error()
                                .map(ToString::to_string)
                                .unwrap_or_default(),
                            may_have_landed: ambiguous,
                        },
                    });
                }
            }
        }
    }

    async fn submit_lightning(
        &self,
        params: &TradeParams,
        cancel: &CancelToken,
    ) -> Result<Signature, PipelineError> {
        self.settings
            .retry
            .run(cancel, |_| self.trade_api.execute_lightning(params))
            .await
            .map(|attempted| attempted.value)
            .map_err(|e| {
                let ambiguous = matches!(e.last_error(), Some(TradeApiError::RequestFailed(_)));
                match e {
                    RetryError::Cancelled { .. } => PipelineError::Cancelled {
                        stage: PipelineStage::Submit,
                        may_have_landed: ambiguous,
                    },
                    other => PipelineError::SubmitError {
                        attempts: other.attempts(),
                        last_error: other
                            .last_error()
                            .map(ToString::to_string)
                            .unwrap_or_default(),
                        may_have_landed: ambiguous,
                    },
                }
            })
    }

    /// Query a previously submitted signature once.
    /// Not found or still processing map to `Pending`.
    pub async fn recheck(&self, signature: &str) -> Result<ConfirmationState, PipelineError> {
        let signature = Signature::from_str(signature.trim()).map_err(|e| PipelineError::Rpc {
            stage: PipelineStage::Confirm,
            source: RpcError::InvalidInput(e.to_string()),
        })?;

        let status = self
            .chain
            .get_signature_status(&signature)
            .await
            .map_err(|source| PipelineError::Rpc {
                stage: PipelineStage::Confirm,
                source,
            })?;

        Ok(match status {
            SignatureStatus::Confirmed => ConfirmationState::Confirmed,
            SignatureStatus::Failed(_) => ConfirmationState::Failed,
            SignatureStatus::NotFound | SignatureStatus::Processing => ConfirmationState::Pending,
        })
    }

    /// Build and estimate fees without touching the trade API or the network
    /// submission path
    pub async fn preview(
        &self,
        request: &TradeRequest,
        curve_state: Option<&CurveState>,
    ) -> Result<TradePreview, PipelineError> {
        let plan = self.build(request)?;
        let fee = self.estimate_fee(&plan).await;
        let params = plan.params(&fee);

        let expected_out = curve_state.and_then(|state| self.quote(request, state));
        let min_out = expected_out.map(|out| curve::min_out_with_slippage(out, request.slippage_pct));

        Ok(TradePreview {
            params,
            fee,
            expected_out,
            min_out,
        })
    }

    fn quote(&self, request: &TradeRequest, state: &CurveState) -> Option<u64> {
        match (request.action, request.denominated_in_sol) {
            (TradeAction::Buy, true) => {
                let lamports = to_base_units(request.amount, LAMPORTS_PER_SOL)?;
                curve::tokens_out_for_sol(state, lamports).ok()
            }
            (TradeAction::Sell, false) => {
                let scale = 10u64.checked_pow(self.settings.token_decimals as u32)?;
                let tokens = to_base_units(request.amount, scale)?;
                curve::sol_out_for_tokens(state, tokens).ok()
            }
            _ => None,
        }
    }
}

fn to_base_units(amount: Decimal, scale: u64) -> Option<u64> {
    amount.checked_mul(Decimal::from(scale))?.trunc().to_u64()
}
