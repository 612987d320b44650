use crate::domain::opportunity::{Direction, Opportunity};
use serde::Serialize;
use std::fmt::Write;

pub const EXTREME_RSI_LOW: f64 = 20.0;
pub const EXTREME_RSI_HIGH: f64 = 80.0;

pub fn is_extreme_rsi(rsi: Option<f64>) -> bool {
    matches!(rsi, Some(v) if v < EXTREME_RSI_LOW || v > EXTREME_RSI_HIGH)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewState {
    Ready,
    /// There were opportunities, but none met the minimum confidence.
    FilteredOut,
    NoOpportunities,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpportunityCard {
    #[serde(flatten)]
    pub opportunity: Opportunity,
    pub extreme_rsi: bool,
}

impl OpportunityCard {
    pub fn title(&self) -> String {
        format!(
            "[{}] {} \u{2014} {}% Confidence",
            self.opportunity.direction, self.opportunity.instrument, self.opportunity.confidence
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub min_confidence: u8,
    pub state: ViewState,
    pub total: usize,
    pub buys: Vec<OpportunityCard>,
    pub sells: Vec<OpportunityCard>,
}

impl DashboardView {
    /// Expects `opportunities` already ranked; order is preserved within each group.
    pub fn build(opportunities: &[Opportunity], min_confidence: u8) -> Self {
        let min_confidence = min_confidence.min(100);
        let mut buys = Vec::new();
        let mut sells = Vec::new();

        for opp in opportunities.iter().filter(|o| o.confidence >= min_confidence) {
            let card = OpportunityCard {
                opportunity: opp.clone(),
                extreme_rsi: is_extreme_rsi(opp.rsi),
            };
            match opp.direction {
                Direction::Buy => buys.push(card),
                Direction::Sell => sells.push(card),
            }
        }

        let state = if opportunities.is_empty() {
            ViewState::NoOpportunities
        } else if buys.is_empty() && sells.is_empty() {
            ViewState::FilteredOut
        } else {
            ViewState::Ready
        };

        Self {
            min_confidence,
            state,
            total: opportunities.len(),
            buys,
            sells,
        }
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        match self.state {
            ViewState::NoOpportunities => {
                out.push_str("No trade opportunities currently ranked. Please try again soon.\n");
                return out;
            }
            ViewState::FilteredOut => {
                let _ = writeln!(
                    out,
                    "No opportunities meet the minimum confidence of {}%. Try lowering it.",
                    self.min_confidence
                );
                return out;
            }
            ViewState::Ready => {}
        }

        for (heading, cards) in [
            ("Buy Opportunities", &self.buys),
            ("Sell Opportunities", &self.sells),
        ] {
            if cards.is_empty() {
                continue;
            }
            let _ = writeln!(out, "== {heading} ==");
            for card in cards {
                let o = &card.opportunity;
                let _ = writeln!(out, "{}", card.title());
                let _ = writeln!(out, "  News: {}", o.headline);
                let _ = writeln!(
                    out,
                    "  Sentiment: {}  RSI: {}  MACD: {}  Trend: {}",
                    o.sentiment,
                    format_rsi(o.rsi),
                    o.macd,
                    o.trend_delta
                );
                if card.extreme_rsi {
                    let _ = writeln!(out, "  Extreme RSI: {}", format_rsi(o.rsi));
                }
            }
        }
        out
    }
}

pub fn format_rsi(rsi: Option<f64>) -> String {
    rsi.map(|v| v.to_string()).unwrap_or_else(|| "n/a".to_string())
}
