//! Price Alerts
//!
//! Running trade aggregates and latched threshold alerts for monitored tokens.
//!
//! A threshold fires once when crossed and stays quiet while the price remains
//! on the far side of it. It re-arms only after the price returns to the
//! opposite side, so a token oscillating around `above` alerts once per
//! crossing rather than once per trade.

use serde::{Deserialize, Serialize};

/// Optional price levels (SOL per token) to alert on
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertThresholds {
    pub above: Option<f64>,
    pub below: Option<f64>,
}

impl AlertThresholds {
    pub fn above(level: f64) -> Self {
        Self { above: Some(level), below: None }
    }

    pub fn below(level: f64) -> Self {
        Self { above: None, below: Some(level) }
    }

    pub fn is_empty(&self) -> bool {
        self.above.is_none() && self.below.is_none()
    }
}

/// Which threshold was crossed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertKind {
    Above,
    Below,
}

/// A crossed threshold
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceAlert {
    pub mint: String,
    pub kind: AlertKind,
    pub threshold: f64,
    pub price_sol: f64,
    pub trade_count: u64,
}

/// Running statistics over the trades seen for one token
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TradeAggregate {
    pub trade_count: u64,
    pub buy_count: u64,
    pub sell_count: u64,
    /// Cumulative traded volume in SOL
    pub volume_sol: f64,
    pub first_price: Option<f64>,
    pub last_price: Option<f64>,
    pub high_price: Option<f64>,
    pub low_price: Option<f64>,
}

impl TradeAggregate {
    /// Fold one trade into the aggregate; a non-positive price only counts volume
    pub fn record(&mut self, is_buy: bool, sol_amount: f64, price_sol: f64) {
        self.trade_count += 1;
        if is_buy {
            self.buy_count += 1;
        } else {
            self.sell_count += 1;
        }
        self.volume_sol += sol_amount.max(0.0);

        if price_sol > 0.0 && price_sol.is_finite() {
            self.first_price.get_or_insert(price_sol);
            self.last_price = Some(price_sol);
            self.high_price = Some(self.high_price.map_or(price_sol, |h| h.max(price_sol)));
            self.low_price = Some(self.low_price.map_or(price_sol, |l| l.min(price_sol)));
        }
    }

    /// Percent move from the first to the last observed price
    pub fn change_pct(&self) -> Option<f64> {
        match (self.first_price, self.last_price) {
            (Some(first), Some(last)) if first > 0.0 => Some((last - first) / first * 100.0),
            _ => None,
        }
    }
}

/// Per-threshold latch state
#[derive(Debug, Clone)]
pub struct AlertLatch {
    thresholds: AlertThresholds,
    above_armed: bool,
    below_armed: bool,
}

impl AlertLatch {
    pub fn new(thresholds: AlertThresholds) -> Self {
        Self {
            thresholds,
            above_armed: true,
            below_armed: true,
        }
    }

    pub fn thresholds(&self) -> &AlertThresholds {
        &self.thresholds
    }

    /// Evaluate a new price, returning the thresholds that fired on this tick
    pub fn evaluate(&mut self, price_sol: f64) -> Vec<(AlertKind, f64)> {
        let mut fired = Vec::new();
        if !(price_sol > 0.0 && price_sol.is_finite()) {
            return fired;
        }

        if let Some(above) = self.thresholds.above {
            if price_sol >= above {
                if self.above_armed {
                    self.above_armed = false;
                    fired.push((AlertKind::Above, above));
                }
            } else {
                self.above_armed = true;
            }
        }

        if let Some(below) = self.thresholds.below {
            if price_sol <= below {
                if self.below_armed {
                    self.below_armed = false;
                    fired.push((AlertKind::Below, below));
                }
            } else {
                self.below_armed = true;
            }
        }

        fired
    }
}
