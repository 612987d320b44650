use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Headline {
    pub title: String,
    pub published_at: DateTime<Utc>,
}

/// One bar of an instrument's price history. Series are ordered oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub timestamp: DateTime<Utc>,
    pub close: f64,
}

/// Latest indicator values for one instrument, rounded to 2 decimals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub price: f64,
    /// `None` only when the trailing window produced a non-finite value.
    pub rsi: Option<f64>,
    pub macd: f64,
    pub trend_delta: f64,
}
