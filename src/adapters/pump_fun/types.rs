//! Pump.fun Types
//!
//! Wire types for the PumpPortal data socket and the decoded event model.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Trade on a bonding curve token
///
/// PumpPortal reports amounts in whole units: SOL for `sol_amount` and the
/// curve reserves, whole tokens for `token_amount`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    #[serde(default)]
    pub signature: Option<String>,
    pub mint: String,
    #[serde(rename = "traderPublicKey")]
    pub trader: String,
    #[serde(skip)]
    pub is_buy: bool,
    #[serde(rename = "solAmount", default)]
    pub sol_amount: f64,
    #[serde(rename = "tokenAmount", default)]
    pub token_amount: f64,
    #[serde(rename = "marketCapSol", default)]
    pub market_cap_sol: f64,
    #[serde(rename = "vSolInBondingCurve", default)]
    pub v_sol_in_bonding_curve: f64,
    #[serde(rename = "vTokensInBondingCurve", default)]
    pub v_tokens_in_bonding_curve: f64,
    #[serde(default)]
    pub pool: Option<String>,
}

impl TradeEvent {
    /// Post-trade price in SOL per token.
    ///
    /// Taken from the reported curve reserves, falling back to the fill
    /// price when reserves are missing.
    pub fn price_sol(&self) -> Option<f64> {
        let price = if self.v_tokens_in_bonding_curve > 0.0 {
            self.v_sol_in_bonding_curve / self.v_tokens_in_bonding_curve
        } else if self.token_amount > 0.0 {
            self.sol_amount / self.token_amount
        } else {
            return None;
        };
        (price.is_finite() && price > 0.0).then_some(price)
    }
}

/// Token creation on pump.fun
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTokenEvent {
    #[serde(default)]
    pub signature: Option<String>,
    pub mint: String,
    #[serde(rename = "traderPublicKey")]
    pub creator: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(rename = "initialBuy", default)]
    pub initial_buy: f64,
    #[serde(rename = "solAmount", default)]
    pub sol_amount: f64,
    #[serde(rename = "marketCapSol", default)]
    pub market_cap_sol: f64,
    #[serde(rename = "vSolInBondingCurve", default)]
    pub v_sol_in_bonding_curve: f64,
    #[serde(rename = "vTokensInBondingCurve", default)]
    pub v_tokens_in_bonding_curve: f64,
}

/// Curve completed and liquidity moved to an AMM pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationEvent {
    #[serde(default)]
    pub signature: Option<String>,
    pub mint: String,
    #[serde(default)]
    pub pool: Option<String>,
}

/// Decoded market event
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Trade(TradeEvent),
    NewToken(NewTokenEvent),
    Migration(MigrationEvent),
    /// Well-formed but of a type we do not handle
    Unknown,
}

impl StreamEvent {
    pub fn mint(&self) -> Option<&str> {
        match self {
            StreamEvent::Trade(t) => Some(&t.mint),
            StreamEvent::NewToken(t) => Some(&t.mint),
            StreamEvent::Migration(m) => Some(&m.mint),
            StreamEvent::Unknown => None,
        }
    }
}

/// Everything the data socket can send
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Subscription acknowledgement
    Ack(String),
    /// Server-side error report
    ServerError(String),
    Event(StreamEvent),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MessageDecodeError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
    #[error("Expected a JSON object")]
    NotAnObject,
    #[error("Malformed {tx_type} event: {reason}")]
    MalformedEvent { tx_type: String, reason: String },
}

/// Decode one text frame
pub fn decode_message(text: &str) -> Result<InboundMessage, MessageDecodeError> {
    let value: Value =
        serde_json::from_str(text.trim()).map_err(|e| MessageDecodeError::InvalidJson(e.to_string()))?;
    let object = value.as_object().ok_or(MessageDecodeError::NotAnObject)?;

    let tx_type = match object.get("txType").and_then(Value::as_str) {
        Some(t) => t.to_lowercase(),
        None => {
            if let Some(message) = object.get("message").and_then(Value::as_str) {
                return Ok(InboundMessage::Ack(message.to_string()));
            }
            if let Some(errors) = object.get("errors").or_else(|| object.get("error")) {
                let text = errors
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| errors.to_string());
                return Ok(InboundMessage::ServerError(text));
            }
            return Ok(InboundMessage::Event(StreamEvent::Unknown));
        }
    };

    let malformed = |e: serde_json::Error| MessageDecodeError::MalformedEvent {
        tx_type: tx_type.clone(),
        reason: e.to_string(),
    };

    let event = match tx_type.as_str() {
        "buy" | "sell" => {
            let mut trade: TradeEvent = serde_json::from_value(value.clone()).map_err(malformed)?;
            trade.is_buy = tx_type == "buy";
            StreamEvent::Trade(trade)
        }
        "create" => StreamEvent::NewToken(serde_json::from_value(value.clone()).map_err(malformed)?),
        "migrate" => StreamEvent::Migration(serde_json::from_value(value.clone()).map_err(malformed)?),
        _ => StreamEvent::Unknown,
    };

    Ok(InboundMessage::Event(event))
}

/// WebSocket subscription message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscribeMessage {
    /// Method to call
    pub method: String,
    /// Mint or account addresses, absent for new-token subscriptions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<String>>,
}

impl SubscribeMessage {
    /// Subscribe to new token launches
    pub fn new_token() -> Self {
        Self {
            method: "subscribeNewToken".to_string(),
            keys: None,
        }
    }

    /// Subscribe to trades on specific tokens
    pub fn token_trades(mints: Vec<String>) -> Self {
        Self {
            method: "subscribeTokenTrade".to_string(),
            keys: Some(mints),
        }
    }

    /// Subscribe to trades by specific accounts
    pub fn account_trades(accounts: Vec<String>) -> Self {
        Self {
            method: "subscribeAccountTrade".to_string(),
            keys: Some(accounts),
        }
    }

    /// Unsubscribe from new token launches
    pub fn unsubscribe_new_token() -> Self {
        Self {
            method: "unsubscribeNewToken".to_string(),
            keys: None,
        }
    }

    /// Unsubscribe from token trades
    pub fn unsubscribe_token_trades(mints: Vec<String>) -> Self {
        Self {
            method: "unsubscribeTokenTrade".to_string(),
            keys: Some(mints),
        }
    }

    pub fn unsubscribe_account_trades(accounts: Vec<String>) -> Self {
        Self {
            method: "unsubscribeAccountTrade".to_string(),
            keys: Some(accounts),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_decode_buy_trade() {
        let json = r#"{
            "signature": "5sig",
            "mint": "TokenMint123",
            "traderPublicKey": "Trader789",
            "txType": "buy",
            "tokenAmount": 35000000.5,
            "solAmount": 1.0,
            "marketCapSol": 32.1,
            "vSolInBondingCurve": 31.5,
            "vTokensInBondingCurve": 1020000000.0,
            "pool": "pump"
        }"#;

        let InboundMessage::Event(StreamEvent::Trade(trade)) = decode_message(json).unwrap() else {
            panic!("expected trade");
        };
        assert!(trade.is_buy);
        assert_eq!(trade.trader, "Trader789");
        assert_relative_eq!(trade.price_sol().unwrap(), 31.5 / 1_020_000_000.0);
    }

    #[test]
    fn test_decode_sell_and_fill_price_fallback() {
        let json = r#"{"mint":"M","traderPublicKey":"T","txType":"sell","tokenAmount":1000,"solAmount":0.5}"#;
        let InboundMessage::Event(StreamEvent::Trade(trade)) = decode_message(json).unwrap() else {
            panic!("expected trade");
        };
        assert!(!trade.is_buy);
        assert_relative_eq!(trade.price_sol().unwrap(), 0.0005);
    }

    #[test]
    fn test_decode_create() {
        let json = r#"{
            "signature": "sig",
            "mint": "NewMint",
            "traderPublicKey": "Creator",
            "txType": "create",
            "initialBuy": 60000000.0,
            "marketCapSol": 30.0,
            "name": "Test Meme",
            "symbol": "MEME",
            "uri": "https://ipfs.io/ipfs/abc"
        }"#;
        let msg = decode_message(json).unwrap();
        let InboundMessage::Event(StreamEvent::NewToken(token)) = msg else {
            panic!("expected new token");
        };
        assert_eq!(token.symbol, "MEME");
        assert_eq!(token.creator, "Creator");
    }

    #[test]
    fn test_decode_migration_and_unknown() {
        let msg = decode_message(r#"{"txType":"migrate","mint":"M","pool":"pump-amm"}"#).unwrap();
        assert!(matches!(msg, InboundMessage::Event(StreamEvent::Migration(_))));

        let msg = decode_message(r#"{"txType":"airdrop","mint":"M"}"#).unwrap();
        assert_eq!(msg, InboundMessage::Event(StreamEvent::Unknown));

        let msg = decode_message(r#"{"hello":"world"}"#).unwrap();
        assert_eq!(msg, InboundMessage::Event(StreamEvent::Unknown));
    }

    #[test]
    fn test_decode_ack_and_error() {
        let msg = decode_message(r#"{"message":"Successfully subscribed to token creation events."}"#).unwrap();
        assert!(matches!(msg, InboundMessage::Ack(m) if m.starts_with("Successfully")));

        let msg = decode_message(r#"{"errors":"Invalid key"}"#).unwrap();
        assert_eq!(msg, InboundMessage::ServerError("Invalid key".into()));
    }

    #[test]
    fn test_decode_failures() {
        assert!(matches!(decode_message("not json"), Err(MessageDecodeError::InvalidJson(_))));
        assert_eq!(decode_message("[1,2]"), Err(MessageDecodeError::NotAnObject));
        assert!(matches!(
            decode_message(r#"{"txType":"buy","solAmount":1.0}"#),
            Err(MessageDecodeError::MalformedEvent { .. })
        ));
    }

    #[test]
    fn test_subscribe_message_json() {
        let json = SubscribeMessage::new_token().to_json();
        assert_eq!(json, r#"{"method":"subscribeNewToken"}"#);

        let json = SubscribeMessage::token_trades(vec!["mint1".into(), "mint2".into()]).to_json();
        assert_eq!(json, r#"{"method":"subscribeTokenTrade","keys":["mint1","mint2"]}"#);

        let msg = SubscribeMessage::unsubscribe_account_trades(vec!["acc".into()]);
        assert_eq!(msg.method, "unsubscribeAccountTrade");
    }
}
