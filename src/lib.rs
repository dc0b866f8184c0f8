//! pump-desk - pump.fun bonding curve desk for Solana
//!
//! Values tokens straight from their on-chain bonding curves, streams live
//! trades from PumpPortal with latched price alerts, and trades through the
//! PumpPortal API with local signing, fee estimation and bounded retry.
//!
//! # Modules
//!
//! - `domain`: Curve math, snapshots, trade requests, alerts, retry and cancellation
//! - `ports`: Trait abstractions (ChainRpc, StreamConnector, TradeApi, TransactionSigner)
//! - `adapters`: External implementations (Solana RPC, PumpPortal, Jupiter prices, CLI)
//! - `config`: Configuration loading and validation
//! - `application`: Price fetcher, subscription sessions, transaction pipeline, liquidation

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
