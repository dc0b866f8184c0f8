//! Pump.fun Adapter
//!
//! Everything that speaks a pump.fun or PumpPortal wire format:
//!
//! - `curve_account`: bonding curve PDA derivation and account decoding
//! - `types`: data socket messages and the decoded [`StreamEvent`] model
//! - `stream`: WebSocket transport for `wss://pumpportal.fun/api/data`
//! - `portal`: PumpPortal trade API (`trade-local` and lightning `trade`)
//!
//! # WebSocket Protocol
//!
//! The data socket supports:
//!
//! - `subscribeNewToken` - Receive all new token creation events
//! - `subscribeTokenTrade` - Receive trade events for specific token mints
//! - `subscribeAccountTrade` - Receive trade events for specific wallet addresses
//!
//! plus the matching `unsubscribe*` methods. Messages are JSON objects with
//! the method and an optional keys array; the server acknowledges each one
//! with a `{"message": ...}` frame.

pub mod curve_account;
pub mod portal;
pub mod stream;
pub mod types;

pub use curve_account::{bonding_curve_address, decode_curve_account, DecodeError, PUMP_FUN_PROGRAM_ID};
pub use portal::PumpPortalClient;
pub use stream::{stream_url, WsConnector, DEFAULT_WS_URL};
pub use types::{
    decode_message, InboundMessage, MessageDecodeError, MigrationEvent, NewTokenEvent, StreamEvent,
    SubscribeMessage, TradeEvent,
};
