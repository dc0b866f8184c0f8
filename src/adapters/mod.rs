//! Adapters Layer - External System Implementations
//!
//! This module contains implementations of the port traits:
//! - Solana: RPC client and wallet management
//! - Pump.fun: curve account decoding, PumpPortal trade API and data socket
//! - Market Data: SOL/USD and fallback token prices
//! - CLI: Command-line interface handlers

pub mod cli;
pub mod market_data;
pub mod pump_fun;
pub mod solana;

pub use cli::CliApp;
pub use market_data::JupiterPriceClient;
pub use pump_fun::{PumpPortalClient, WsConnector};
pub use solana::{SolanaClient, WalletManager};
