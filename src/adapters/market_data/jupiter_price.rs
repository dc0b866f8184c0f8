use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::ports::price::{PriceSourceError, SolUsdSource, TokenPriceSource};

pub const JUPITER_PRICE_API: &str = "https://lite-api.jup.ag/price/v3";

/// Wrapped SOL mint, priced as native SOL
pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";

#[derive(Debug, Clone)]
pub struct JupiterPriceClient {
    http: Client,
    base_url: String,
}

impl JupiterPriceClient {
    pub fn new() -> Result<Self, PriceSourceError> {
        Self::with_url(JUPITER_PRICE_API, Duration::from_secs(10))
    }

    pub fn with_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self, PriceSourceError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PriceSourceError::Unavailable(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    /// USD prices for several mints in one request; mints without a price are omitted
    pub async fn get_prices(&self, mints: &[&str]) -> Result<HashMap<String, f64>, PriceSourceError> {
        let url = format!("{}?ids={}", self.base_url, mints.join(","));

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| PriceSourceError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PriceSourceError::Unavailable(format!(
                "price API returned {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| PriceSourceError::Unavailable(e.to_string()))?;
        parse_price_response(&body)
    }

    /// Get USD price for a single token
    pub async fn get_price(&self, mint: &str) -> Result<f64, PriceSourceError> {
        self.get_prices(&[mint])
            .await?
            .get(mint)
            .copied()
            .ok_or_else(|| PriceSourceError::NotFound(mint.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct PriceData {
    #[serde(rename = "usdPrice")]
    usd_price: f64,
}

fn parse_price_response(body: &str) -> Result<HashMap<String, f64>, PriceSourceError> {
    let response: HashMap<String, Option<PriceData>> =
        serde_json::from_str(body).map_err(|e| PriceSourceError::InvalidResponse(e.to_string()))?;

    Ok(response
        .into_iter()
        .filter_map(|(mint, data)| {
            data.map(|d| d.usd_price)
                .filter(|p| p.is_finite() && *p > 0.0)
                .map(|p| (mint, p))
        })
        .collect())
}

#[async_trait]
impl SolUsdSource for JupiterPriceClient {
    async fn sol_usd_price(&self) -> Result<f64, PriceSourceError> {
        self.get_price(SOL_MINT).await
    }
}

#[async_trait]
impl TokenPriceSource for JupiterPriceClient {
    async fn token_usd_price(&self, mint: &str) -> Result<f64, PriceSourceError> {
        self.get_price(mint).await
    }
}
