use serde::{Deserialize, Serialize};

/// Maps a lowercase keyword to the instruments a headline mentioning it may move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordRule {
    pub keyword: String,
    pub instruments: Vec<String>,
}

impl KeywordRule {
    pub fn new(keyword: &str, instruments: &[&str]) -> Self {
        let mut deduped: Vec<String> = Vec::with_capacity(instruments.len());
        for symbol in instruments {
            if !deduped.iter().any(|s| s == symbol) {
                deduped.push((*symbol).to_string());
            }
        }
        Self {
            keyword: keyword.trim().to_lowercase(),
            instruments: deduped,
        }
    }
}

/// Immutable keyword table. Rule order determines the order of matched instruments.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    rules: Vec<KeywordRule>,
}

impl KeywordMatcher {
    pub fn new(rules: Vec<KeywordRule>) -> anyhow::Result<Self> {
        for rule in &rules {
            anyhow::ensure!(!rule.keyword.is_empty(), "keyword must be non-empty");
            anyhow::ensure!(
                !rule.instruments.is_empty(),
                "keyword {:?} must map to at least one instrument",
                rule.keyword
            );
        }
        Ok(Self { rules })
    }

    /// Deduplicated union of the instruments of every rule whose keyword occurs in the
    /// lowercased title, in first-seen order.
    pub fn match_title(&self, title: &str) -> Vec<String> {
        let lower = title.to_lowercase();
        let mut out: Vec<String> = Vec::new();
        for rule in &self.rules {
            if !lower.contains(rule.keyword.as_str()) {
                continue;
            }
            for symbol in &rule.instruments {
                if !out.contains(symbol) {
                    out.push(symbol.clone());
                }
            }
        }
        out
    }
}

impl Default for KeywordMatcher {
    fn default() -> Self {
        Self {
            rules: default_rules(),
        }
    }
}

pub fn default_rules() -> Vec<KeywordRule> {
    vec![
        KeywordRule::new("oil", &["CL=F", "XLE", "USD/CAD"]),
        KeywordRule::new("gold", &["GC=F", "XAUUSD=X"]),
        KeywordRule::new("fed", &["USDJPY=X", "^GSPC", "GC=F"]),
        KeywordRule::new("inflation", &["USD=X", "GC=F", "BTC-USD"]),
        KeywordRule::new("china", &["AUDUSD=X", "HG=F", "^GSPC"]),
        KeywordRule::new("russia", &["CL=F", "NG=F", "GC=F"]),
        KeywordRule::new("btc", &["BTC-USD"]),
        KeywordRule::new("ethereum", &["ETH-USD"]),
        KeywordRule::new("nasdaq", &["^IXIC"]),
        KeywordRule::new("interest rates", &["USDJPY=X", "EURUSD=X", "GC=F"]),
    ]
}
