//! Application Layer - Use cases built on the ports
//!
//! - Price fetching from bonding curves, with an optional fallback source
//! - Streaming subscription sessions with alerting
//! - Fee estimation and the trade transaction pipeline
//! - Wallet liquidation on top of the pipeline

pub mod fees;
pub mod liquidation;
pub mod pipeline;
pub mod price_fetcher;
pub mod subscription;

pub use fees::{FeeEstimate, FeeEstimator, FeeSettings, FeeSource};
pub use liquidation::{
    LiquidationConfig, LiquidationEngine, LiquidationError, LiquidationOutcome, LiquidationReport,
    TokenLiquidation, USDC_MINT,
};
pub use pipeline::{
    PipelineError, PipelineSettings, PipelineStage, TradePlan, TradePreview, TransactionPipeline,
};
pub use price_fetcher::{PriceError, PriceFetcher, PriceQuote, PriceService};
pub use subscription::{
    MonitorSession, SessionConfig, SessionError, SessionEvent, SessionHandle, SessionReport,
    SessionState, Subscription, SubscriptionKind,
};
