use crate::domain::market::{IndicatorSnapshot, PriceSample};
use serde::Serialize;
use std::fmt;

pub const RSI_PERIOD: usize = 14;
pub const MACD_FAST_SPAN: usize = 12;
pub const MACD_SLOW_SPAN: usize = 26;
pub const TREND_SPAN: usize = 10;
/// Trend compares the latest EMA value with the one this many samples back (inclusive).
pub const TREND_WINDOW: usize = 5;

/// The slow MACD leg needs a full span before it means anything.
pub const MIN_SAMPLES: usize = MACD_SLOW_SPAN;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnavailableReason {
    EmptySeries,
    TooShort { len: usize, required: usize },
    NonFinite,
    Fetch { detail: String },
    Timeout,
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnavailableReason::EmptySeries => f.write_str("empty price series"),
            UnavailableReason::TooShort { len, required } => {
                write!(f, "price series too short ({len} < {required})")
            }
            UnavailableReason::NonFinite => f.write_str("non-finite indicator value"),
            UnavailableReason::Fetch { detail } => write!(f, "market data fetch failed: {detail}"),
            UnavailableReason::Timeout => f.write_str("market data fetch timed out"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndicatorOutcome {
    Available(IndicatorSnapshot),
    Unavailable(UnavailableReason),
}

impl IndicatorOutcome {
    pub fn snapshot(&self) -> Option<&IndicatorSnapshot> {
        match self {
            IndicatorOutcome::Available(s) => Some(s),
            IndicatorOutcome::Unavailable(_) => None,
        }
    }
}

/// Computes the latest RSI(14), MACD(12, 26) and EMA(10) trend for a series ordered oldest
/// first. Values are rounded to 2 decimals here and nowhere else.
pub fn compute_snapshot(series: &[PriceSample]) -> IndicatorOutcome {
    if series.is_empty() {
        return IndicatorOutcome::Unavailable(UnavailableReason::EmptySeries);
    }
    if series.len() < MIN_SAMPLES {
        return IndicatorOutcome::Unavailable(UnavailableReason::TooShort {
            len: series.len(),
            required: MIN_SAMPLES,
        });
    }

    let closes: Vec<f64> = series.iter().map(|s| s.close).collect();
    if closes.iter().any(|c| !c.is_finite()) {
        return IndicatorOutcome::Unavailable(UnavailableReason::NonFinite);
    }

    let Some(macd) = latest_macd(&closes) else {
        return IndicatorOutcome::Unavailable(UnavailableReason::NonFinite);
    };
    let Some(trend) = ema_trend(&closes, TREND_SPAN, TREND_WINDOW) else {
        return IndicatorOutcome::Unavailable(UnavailableReason::NonFinite);
    };
    let rsi = latest_rsi(&closes, RSI_PERIOD).filter(|v| v.is_finite());
    let price = closes[closes.len() - 1];

    IndicatorOutcome::Available(IndicatorSnapshot {
        price: round2(price),
        rsi: rsi.map(round2),
        macd: round2(macd),
        trend_delta: round2(trend),
    })
}

/// Bias-adjusted exponential moving average with `alpha = 2 / (span + 1)`: each point is the
/// weighted mean of every value so far, with weights `(1 - alpha)^age`.
pub fn ewm_mean(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let decay = 1.0 - alpha;
    let mut out = Vec::with_capacity(values.len());
    let mut num = 0.0;
    let mut den = 0.0;
    for &v in values {
        num = v + decay * num;
        den = 1.0 + decay * den;
        out.push(num / den);
    }
    out
}

/// Simple-average RSI over the trailing `period` deltas. A window with no losses is 100.
pub fn latest_rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }
    let window = &closes[closes.len() - (period + 1)..];
    let mut gains = 0.0;
    let mut losses = 0.0;
    for pair in window.windows(2) {
        let delta = pair[1] - pair[0];
        if delta > 0.0 {
            gains += delta;
        } else if delta < 0.0 {
            losses -= delta;
        }
    }
    let avg_gain = gains / period as f64;
    let avg_loss = losses / period as f64;
    if avg_loss == 0.0 {
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

pub fn latest_macd(closes: &[f64]) -> Option<f64> {
    let fast = ewm_mean(closes, MACD_FAST_SPAN);
    let slow = ewm_mean(closes, MACD_SLOW_SPAN);
    let value = fast.last()? - slow.last()?;
    value.is_finite().then_some(value)
}

/// `ema[last] - ema[last - (window - 1)]`.
pub fn ema_trend(closes: &[f64], span: usize, window: usize) -> Option<f64> {
    if window == 0 {
        return None;
    }
    let ema = ewm_mean(closes, span);
    if ema.len() < window {
        return None;
    }
    let value = ema[ema.len() - 1] - ema[ema.len() - window];
    value.is_finite().then_some(value)
}

/// Two decimal places, ties to even.
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round_ties_even() / 100.0
}
