use crate::sentiment::SentimentScorer;
use std::collections::HashMap;

const POLARITY: &[(&str, f64)] = &[
    // bullish / positive
    ("gain", 0.4),
    ("gains", 0.4),
    ("rise", 0.3),
    ("rises", 0.3),
    ("rising", 0.3),
    ("rally", 0.5),
    ("rallies", 0.5),
    ("surge", 0.6),
    ("surges", 0.6),
    ("soar", 0.7),
    ("soars", 0.7),
    ("jump", 0.4),
    ("jumps", 0.4),
    ("climb", 0.3),
    ("climbs", 0.3),
    ("rebound", 0.4),
    ("rebounds", 0.4),
    ("recovery", 0.4),
    ("growth", 0.4),
    ("strong", 0.43),
    ("stronger", 0.45),
    ("record", 0.3),
    ("high", 0.16),
    ("higher", 0.25),
    ("bullish", 0.6),
    ("optimism", 0.5),
    ("optimistic", 0.5),
    ("boost", 0.4),
    ("boosts", 0.4),
    ("beat", 0.3),
    ("beats", 0.3),
    ("profit", 0.4),
    ("profits", 0.4),
    ("good", 0.7),
    ("great", 0.8),
    ("best", 1.0),
    ("positive", 0.23),
    ("upbeat", 0.5),
    ("success", 0.3),
    ("win", 0.8),
    ("wins", 0.8),
    ("easing", 0.2),
    ("stable", 0.2),
    ("confidence", 0.3),
    ("upgrade", 0.4),
    ("upgrades", 0.4),
    ("approval", 0.3),
    ("approves", 0.3),
    // bearish / negative
    ("fall", -0.3),
    ("falls", -0.3),
    ("falling", -0.3),
    ("drop", -0.3),
    ("drops", -0.3),
    ("decline", -0.3),
    ("declines", -0.3),
    ("slide", -0.3),
    ("slides", -0.3),
    ("slump", -0.5),
    ("slumps", -0.5),
    ("plunge", -0.6),
    ("plunges", -0.6),
    ("tumble", -0.5),
    ("tumbles", -0.5),
    ("crash", -0.7),
    ("crashes", -0.7),
    ("collapse", -0.7),
    ("sell-off", -0.5),
    ("selloff", -0.5),
    ("weak", -0.38),
    ("weaker", -0.4),
    ("low", -0.1),
    ("lower", -0.2),
    ("loss", -0.4),
    ("losses", -0.4),
    ("bearish", -0.6),
    ("fear", -0.5),
    ("fears", -0.5),
    ("worry", -0.4),
    ("worries", -0.4),
    ("concern", -0.3),
    ("concerns", -0.3),
    ("risk", -0.2),
    ("risks", -0.2),
    ("recession", -0.6),
    ("crisis", -0.7),
    ("war", -0.6),
    ("sanctions", -0.4),
    ("tariff", -0.3),
    ("tariffs", -0.3),
    ("uncertainty", -0.4),
    ("volatile", -0.2),
    ("bad", -0.7),
    ("worse", -0.4),
    ("worst", -1.0),
    ("negative", -0.3),
    ("miss", -0.3),
    ("misses", -0.3),
    ("cut", -0.2),
    ("cuts", -0.2),
    ("downgrade", -0.4),
    ("downgrades", -0.4),
    ("default", -0.5),
    ("bankruptcy", -0.8),
    ("fraud", -0.8),
    ("hack", -0.6),
    ("ban", -0.5),
    ("lawsuit", -0.4),
    ("panic", -0.6),
    ("turmoil", -0.6),
];

const INTENSIFIERS: &[(&str, f64)] = &[
    ("very", 1.3),
    ("extremely", 1.5),
    ("highly", 1.3),
    ("sharply", 1.4),
    ("deeply", 1.3),
    ("massive", 1.4),
    ("huge", 1.3),
    ("slightly", 0.5),
    ("modestly", 0.6),
];

const NEGATORS: &[&str] = &[
    "not", "no", "never", "without", "isn't", "aren't", "won't", "don't", "doesn't",
];

const NEGATION_FACTOR: f64 = -0.5;

/// Word-level lexicon polarity: mean of the matched word scores, with intensifiers and
/// negators modifying the next scored word.
#[derive(Debug, Clone)]
pub struct LexiconScorer {
    polarity: HashMap<&'static str, f64>,
    intensifiers: HashMap<&'static str, f64>,
}

impl Default for LexiconScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl LexiconScorer {
    pub fn new() -> Self {
        Self {
            polarity: POLARITY.iter().copied().collect(),
            intensifiers: INTENSIFIERS.iter().copied().collect(),
        }
    }

    pub fn polarity(&self, text: &str) -> f64 {
        let mut total = 0.0;
        let mut matched: usize = 0;
        let mut modifier = 1.0;

        for token in tokenize(text) {
            if NEGATORS.contains(&token.as_str()) {
                modifier *= NEGATION_FACTOR;
                continue;
            }
            if let Some(&factor) = self.intensifiers.get(token.as_str()) {
                modifier *= factor;
                continue;
            }
            if let Some(&p) = self.polarity.get(token.as_str()) {
                total += (p * modifier).clamp(-1.0, 1.0);
                matched += 1;
                modifier = 1.0;
            }
        }

        if matched == 0 {
            return 0.0;
        }
        (total / matched as f64).clamp(-1.0, 1.0)
    }
}

#[async_trait::async_trait]
impl SentimentScorer for LexiconScorer {
    fn backend_name(&self) -> &'static str {
        "lexicon"
    }

    async fn score(&self, text: &str) -> anyhow::Result<f64> {
        Ok(self.polarity(text))
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '\''))
        .map(|t| t.trim_matches(|c| c == '-' || c == '\'').to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}
