//! Domain Layer - Core pump.fun trading logic
//!
//! Pure types and logic with no I/O. All external interactions happen through
//! the ports layer.
//!
//! - `curve`: bonding curve pricing, progress and constant-product quotes
//! - `snapshot`: immutable valuation of a token at one point in time
//! - `trade`: trade requests and submitted transactions
//! - `alert`: trade aggregates and latched price alerts
//! - `retry`: bounded retry policy and combinator
//! - `cancel`: cooperative cancellation token

pub mod alert;
pub mod cancel;
pub mod curve;
pub mod retry;
pub mod snapshot;
pub mod trade;

pub use alert::{AlertKind, AlertLatch, AlertThresholds, PriceAlert, TradeAggregate};
pub use cancel::CancelToken;
pub use curve::{CurveError, CurveParams, CurveState};
pub use retry::{Attempted, RetryDecision, RetryError, RetryPolicy, Transient};
pub use snapshot::PriceSnapshot;
pub use trade::{
    ConfirmationState, SubmittedTransaction, TradeAction, TradeMode, TradePool, TradeRequest,
    TradeValidationError,
};
