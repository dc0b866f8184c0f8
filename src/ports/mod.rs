//! Ports Layer - Trait definitions for external dependencies
//!
//! This module defines the interfaces (ports) that adapters must implement.
//! Following hexagonal architecture, these traits abstract:
//! - Chain RPC (accounts, blockhashes, submission, signature status)
//! - The streaming trade socket
//! - Reference price APIs (SOL/USD and fallback token prices)
//! - Transaction signing
//! - The remote trade API that builds pump.fun transactions

pub mod chain;
pub mod mocks;
pub mod price;
pub mod stream;
pub mod trade_api;
pub mod wallet;

pub use chain::{ChainRpc, RpcError, SignatureStatus, TokenBalance};
pub use price::{PriceSourceError, SolUsdSource, TokenPriceSource};
pub use stream::{StreamConnection, StreamConnector, StreamError};
pub use trade_api::{TradeApi, TradeApiError, TradeParams};
pub use wallet::{SigningError, TransactionSigner};
