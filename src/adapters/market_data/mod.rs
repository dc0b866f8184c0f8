//! Market Data Adapters
//!
//! Reference prices from the Jupiter price API: SOL/USD for curve valuation
//! and per-mint USD prices used as the fallback when a token has no curve.

mod jupiter_price;

pub use jupiter_price::{JupiterPriceClient, JUPITER_PRICE_API, SOL_MINT};
