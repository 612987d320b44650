pub mod lexicon;

pub use lexicon::LexiconScorer;

/// Polarity backend for headline text.
#[async_trait::async_trait]
pub trait SentimentScorer: Send + Sync {
    fn backend_name(&self) -> &'static str;

    /// Returns a polarity in [-1, 1]; negative is bearish.
    async fn score(&self, text: &str) -> anyhow::Result<f64>;
}

pub fn clamp_polarity(score: f64) -> Option<f64> {
    score.is_finite().then(|| score.clamp(-1.0, 1.0))
}
