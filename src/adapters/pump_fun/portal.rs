//! PumpPortal trade API client
//!
//! `trade-local` returns an unsigned serialized transaction for the caller to
//! sign; `trade` executes custodially with the account behind the API key.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::ports::trade_api::{TradeApi, TradeApiError, TradeParams};

pub const DEFAULT_API_URL: &str = "https://pumpportal.fun/api";

fn flag(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TradePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    public_key: Option<String>,
    action: String,
    mint: String,
    amount: String,
    denominated_in_sol: &'static str,
    slippage: f64,
    priority_fee: f64,
    pool: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    skip_preflight: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    jito_only: Option<&'static str>,
}

impl TradePayload {
    fn from_params(params: &TradeParams) -> Self {
        Self {
            public_key: None,
            action: params.action.to_string(),
            mint: params.mint.clone(),
            amount: params.amount.normalize().to_string(),
            denominated_in_sol: flag(params.denominated_in_sol),
            slippage: params.slippage_pct,
            priority_fee: params.priority_fee_sol.to_f64().unwrap_or(0.0),
            pool: params.pool.to_string(),
            skip_preflight: None,
            jito_only: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LightningResponse {
    #[serde(default)]
    signature: Option<String>,
    #[serde(default)]
    errors: Vec<String>,
}

fn parse_lightning_response(body: &str) -> Result<Signature, TradeApiError> {
    let response: LightningResponse =
        serde_json::from_str(body).map_err(|e| TradeApiError::InvalidResponse(e.to_string()))?;

    if !response.errors.is_empty() {
        return Err(TradeApiError::Rejected(response.errors.join("; ")));
    }

    let signature = response
        .signature
        .ok_or_else(|| TradeApiError::InvalidResponse("missing signature".into()))?;
    Signature::from_str(&signature).map_err(|e| TradeApiError::InvalidResponse(e.to_string()))
}

#[derive(Debug, Clone)]
pub struct PumpPortalClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    skip_preflight: bool,
    jito_only: bool,
}

impl PumpPortalClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, TradeApiError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| TradeApiError::RequestFailed(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            skip_preflight: true,
            jito_only: false,
        })
    }

    /// Lightning-only submission options
    pub fn with_lightning_options(mut self, skip_preflight: bool, jito_only: bool) -> Self {
        self.skip_preflight = skip_preflight;
        self.jito_only = jito_only;
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    async fn post(&self, url: &str, payload: &TradePayload) -> Result<reqwest::Response, TradeApiError> {
        let response = self
            .http
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| TradeApiError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TradeApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl TradeApi for PumpPortalClient {
    async fn build_local_transaction(
        &self,
        params: &TradeParams,
        public_key: &Pubkey,
    ) -> Result<Vec<u8>, TradeApiError> {
        let mut payload = TradePayload::from_params(params);
        payload.public_key = Some(public_key.to_string());

        debug!(action = %params.action, mint = %params.mint, "Requesting local trade transaction");
        let url = format!("{}/trade-local", self.base_url);
        let bytes = self
            .post(&url, &payload)
            .await?
            .bytes()
            .await
            .map_err(|e| TradeApiError::RequestFailed(e.to_string()))?;

        if bytes.is_empty() {
            return Err(TradeApiError::InvalidResponse("empty transaction body".into()));
        }
        Ok(bytes.to_vec())
    }

    async fn execute_lightning(&self, params: &TradeParams) -> Result<Signature, TradeApiError> {
        let api_key = self.api_key.as_ref().ok_or(TradeApiError::MissingApiKey)?;

        let mut payload = TradePayload::from_params(params);
        payload.skip_preflight = Some(flag(self.skip_preflight));
        payload.jito_only = Some(flag(self.jito_only));

        info!(action = %params.action, mint = %params.mint, "Submitting lightning trade");
        let url = format!("{}/trade?api-key={}", self.base_url, api_key);
        let body = self
            .post(&url, &payload)
            .await?
            .text()
            .await
            .map_err(|e| TradeApiError::RequestFailed(e.to_string()))?;

        parse_lightning_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trade::{TradeAction, TradePool};
    use rust_decimal_macros::dec;

    fn params() -> TradeParams {
        TradeParams {
            action: TradeAction::Sell,
            mint: "4k3Dyjzvzp8eMZWUXbBCjEvwSkkk59S5iCNLY3QrkX6R".into(),
            amount: dec!(1500.000),
            denominated_in_sol: false,
            slippage_pct: 10.0,
            priority_fee_sol: dec!(0.00005),
            pool: TradePool::Auto,
        }
    }

    #[test]
    fn test_payload_rendering() {
        let mut payload = TradePayload::from_params(&params());
        payload.public_key = Some("Wallet111".into());
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["publicKey"], "Wallet111");
        assert_eq!(json["action"], "sell");
        assert_eq!(json["amount"], "1500");
        assert_eq!(json["denominatedInSol"], "false");
        assert_eq!(json["slippage"], 10.0);
        assert!((json["priorityFee"].as_f64().unwrap() - 0.00005).abs() < 1e-12);
        assert_eq!(json["pool"], "auto");
        assert!(json.get("skipPreflight").is_none());
    }

    #[test]
    fn test_parse_lightning_response() {
        let sig = Signature::new_unique();
        let body = format!(r#"{{"signature":"{}","errors":[]}}"#, sig);
        assert_eq!(parse_lightning_response(&body).unwrap(), sig);

        let body = r#"{"errors":["insufficient balance"]}"#;
        assert_eq!(
            parse_lightning_response(body),
            Err(TradeApiError::Rejected("insufficient balance".into()))
        );

        assert!(matches!(
            parse_lightning_response("<html>"),
            Err(TradeApiError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_lightning_requires_api_key() {
        let client = PumpPortalClient::new(DEFAULT_API_URL, Some("  ".into())).unwrap();
        assert!(!client.has_api_key());
        assert_eq!(
            client.execute_lightning(&params()).await,
            Err(TradeApiError::MissingApiKey)
        );
    }
}
