use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Buy => "BUY",
            Direction::Sell => "SELL",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub instrument: String,
    pub headline: String,
    /// Rounded to 2 decimals for display; scoring uses the unrounded value.
    pub sentiment: f64,
    pub rsi: Option<f64>,
    pub macd: f64,
    pub trend_delta: f64,
    /// `|round(score * 100)|`, always within 0..=100.
    pub confidence: u8,
    pub direction: Direction,
}
