use crate::domain::market::IndicatorSnapshot;
use crate::domain::opportunity::{Direction, Opportunity};
use crate::indicators::round2;

pub const SENTIMENT_WEIGHT: f64 = 0.5;
pub const RSI_OVERSOLD: f64 = 30.0;
pub const RSI_OVERBOUGHT: f64 = 70.0;
pub const RSI_ADJUSTMENT: f64 = 0.2;
pub const MACD_ADJUSTMENT: f64 = 0.2;
pub const TREND_ADJUSTMENT: f64 = 0.1;

impl Direction {
    /// BUY only for a strictly positive score; an exact zero is SELL.
    pub fn from_score(score: f64) -> Self {
        if score > 0.0 {
            Direction::Buy
        } else {
            Direction::Sell
        }
    }
}

/// Fixed-weight fusion of headline sentiment and the instrument's indicators.
pub fn composite_score(sentiment: f64, snapshot: &IndicatorSnapshot) -> f64 {
    let mut score = sentiment * SENTIMENT_WEIGHT;

    // Unknown RSI contributes nothing.
    match snapshot.rsi {
        Some(rsi) if rsi < RSI_OVERSOLD => score += RSI_ADJUSTMENT,
        Some(rsi) if rsi > RSI_OVERBOUGHT => score -= RSI_ADJUSTMENT,
        _ => {}
    }

    if snapshot.macd > 0.0 {
        score += MACD_ADJUSTMENT;
    } else {
        score -= MACD_ADJUSTMENT;
    }

    if snapshot.trend_delta > 0.0 {
        score += TREND_ADJUSTMENT;
    } else {
        score -= TREND_ADJUSTMENT;
    }

    score
}

/// `|round(score * 100)|` with ties to even.
pub fn confidence(score: f64) -> u8 {
    let scaled = (score * 100.0).round_ties_even().abs();
    scaled.min(100.0) as u8
}

pub fn score_instrument(
    instrument: &str,
    headline: &str,
    sentiment: f64,
    snapshot: &IndicatorSnapshot,
) -> Opportunity {
    let score = composite_score(sentiment, snapshot);
    Opportunity {
        instrument: instrument.to_string(),
        headline: headline.to_string(),
        sentiment: round2(sentiment),
        rsi: snapshot.rsi,
        macd: snapshot.macd,
        trend_delta: snapshot.trend_delta,
        confidence: confidence(score),
        direction: Direction::from_score(score),
    }
}

/// One opportunity per instrument that has a snapshot, in the given order.
pub fn rank_headline<'a, I>(headline: &str, sentiment: f64, instruments: I) -> Vec<Opportunity>
where
    I: IntoIterator<Item = (&'a str, Option<&'a IndicatorSnapshot>)>,
{
    instruments
        .into_iter()
        .filter_map(|(symbol, snapshot)| {
            snapshot.map(|s| score_instrument(symbol, headline, sentiment, s))
        })
        .collect()
}

/// Descending by confidence. The sort is stable, so equal confidences keep accumulation
/// order (headline order, then instrument match order).
pub fn sort_by_confidence(opportunities: &mut [Opportunity]) {
    opportunities.sort_by(|a, b| b.confidence.cmp(&a.confidence));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(rsi: Option<f64>, macd: f64, trend_delta: f64) -> IndicatorSnapshot {
        IndicatorSnapshot {
            price: 100.0,
            rsi,
            macd,
            trend_delta,
        }
    }

    #[test]
    fn gold_on_fed_headline_is_weak_sell() {
        let s = snap(Some(25.0), -0.5, 0.1);
        let score = composite_score(-0.3, &s);
        assert!((score + 0.05).abs() < 1e-9);

        let headline = "Fed raises interest rates amid inflation fears";
        let opp = score_instrument("GC=F", headline, -0.3, &s);
        assert_eq!(opp.confidence, 5);
        assert_eq!(opp.direction, Direction::Sell);
        assert_eq!(opp.sentiment, -0.3);
        assert_eq!(opp.rsi, Some(25.0));
    }

    #[test]
    fn rsi_band_edges_are_neutral() {
        let base = composite_score(0.0, &snap(Some(50.0), 1.0, 1.0));
        assert_eq!(composite_score(0.0, &snap(Some(30.0), 1.0, 1.0)), base);
        assert_eq!(composite_score(0.0, &snap(Some(70.0), 1.0, 1.0)), base);
        assert_eq!(composite_score(0.0, &snap(None, 1.0, 1.0)), base);
        assert!(composite_score(0.0, &snap(Some(29.99), 1.0, 1.0)) > base);
        assert!(composite_score(0.0, &snap(Some(70.01), 1.0, 1.0)) < base);
    }

    #[test]
    fn zero_macd_and_trend_count_as_bearish() {
        let score = composite_score(0.0, &snap(Some(50.0), 0.0, 0.0));
        assert!((score + 0.3).abs() < 1e-9);
        assert_eq!(confidence(score), 30);
        assert_eq!(Direction::from_score(score), Direction::Sell);
    }

    #[test]
    fn exact_zero_score_is_sell() {
        assert_eq!(Direction::from_score(0.0), Direction::Sell);
        assert_eq!(Direction::from_score(-0.0), Direction::Sell);
        assert_eq!(Direction::from_score(1e-12), Direction::Buy);
        assert_eq!(confidence(0.0), 0);
    }

    #[test]
    fn maximum_magnitude_is_one() {
        let bull = composite_score(1.0, &snap(Some(10.0), 2.0, 2.0));
        let bear = composite_score(-1.0, &snap(Some(90.0), -2.0, -2.0));
        assert!((bull - 1.0).abs() < 1e-9);
        assert!((bear + 1.0).abs() < 1e-9);
        assert_eq!(confidence(bull), 100);
        assert_eq!(confidence(bear), 100);
    }

    #[test]
    fn confidence_bounded_and_direction_tracks_sign_over_grid() {
        let rsis = [None, Some(10.0), Some(30.0), Some(50.0), Some(70.0), Some(95.0)];
        let signs = [-1.0, 0.0, 1.0];
        for step in -20..=20 {
            let sentiment = step as f64 / 20.0;
            for rsi in rsis {
                for macd in signs {
                    for trend in signs {
                        let s = snap(rsi, macd, trend);
                        let score = composite_score(sentiment, &s);
                        let opp = score_instrument("X", "h", sentiment, &s);
                        assert!(opp.confidence <= 100);
                        assert_eq!(opp.direction == Direction::Buy, score > 0.0);
                        assert_eq!(opp, score_instrument("X", "h", sentiment, &s));
                    }
                }
            }
        }
    }

    #[test]
    fn confidence_rounds_half_to_even() {
        assert_eq!(confidence(0.625), 62);
        assert_eq!(confidence(-0.125), 12);
        assert_eq!(confidence(0.456), 46);
    }

    #[test]
    fn rank_headline_skips_unavailable_instruments() {
        let a = snap(Some(50.0), 1.0, 1.0);
        let c = snap(Some(50.0), -1.0, -1.0);
        let got = rank_headline("h", 0.2, [("A", Some(&a)), ("B", None), ("C", Some(&c))]);
        let symbols: Vec<_> = got.iter().map(|o| o.instrument.as_str()).collect();
        assert_eq!(symbols, vec!["A", "C"]);
    }

    #[test]
    fn sort_is_descending_and_stable() {
        let s = snap(Some(50.0), 1.0, 1.0);
        let mut opps = vec![
            score_instrument("A", "h1", 0.0, &s),
            score_instrument("B", "h1", 0.6, &s),
            score_instrument("C", "h2", 0.0, &s),
            score_instrument("D", "h2", 0.6, &s),
        ];
        sort_by_confidence(&mut opps);
        let order: Vec<_> = opps.iter().map(|o| o.instrument.as_str()).collect();
        assert_eq!(order, vec!["B", "D", "A", "C"]);
        assert!(opps.windows(2).all(|w| w[0].confidence >= w[1].confidence));
    }
}
