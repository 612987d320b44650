use crate::config::Settings;
use crate::domain::market::Headline;
use crate::domain::opportunity::Opportunity;
use crate::indicators::{self, IndicatorOutcome, UnavailableReason};
use crate::ingest::env_or;
use crate::ingest::market::{MarketDataSource, YahooChartClient};
use crate::ingest::news::{NewsApiClient, NewsSource};
use crate::keywords::KeywordMatcher;
use crate::ranking;
use crate::sentiment::{clamp_polarity, LexiconScorer, SentimentScorer};
use anyhow::Context;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

const DEFAULT_CONCURRENCY: usize = 4;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 20;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Maximum number of instrument fetches in flight.
    pub concurrency: usize,

    /// Deadline for one instrument's fetch, retries included.
    pub fetch_timeout: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
        }
    }
}

impl PipelineOptions {
    pub fn from_env() -> Self {
        Self {
            concurrency: env_or("PIPELINE_CONCURRENCY", DEFAULT_CONCURRENCY).max(1),
            fetch_timeout: Duration::from_secs(env_or(
                "PIPELINE_FETCH_TIMEOUT_SECS",
                DEFAULT_FETCH_TIMEOUT_SECS,
            )),
        }
    }
}

/// A headline with its sentiment and the instruments its keywords point to.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedHeadline {
    pub title: String,
    pub sentiment: f64,
    pub instruments: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnavailableInstrument {
    pub symbol: String,
    pub reason: UnavailableReason,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedHeadline {
    pub title: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PassReport {
    pub opportunities: Vec<Opportunity>,
    pub headlines_scanned: usize,
    pub headlines_matched: usize,
    pub instruments_evaluated: usize,
    pub unavailable: Vec<UnavailableInstrument>,
    pub skipped_headlines: Vec<SkippedHeadline>,
}

pub struct Pipeline {
    matcher: KeywordMatcher,
    market: Arc<dyn MarketDataSource>,
    sentiment: Arc<dyn SentimentScorer>,
    opts: PipelineOptions,
}

impl Pipeline {
    pub fn new(
        matcher: KeywordMatcher,
        market: Arc<dyn MarketDataSource>,
        sentiment: Arc<dyn SentimentScorer>,
        opts: PipelineOptions,
    ) -> Self {
        Self {
            matcher,
            market,
            sentiment,
            opts,
        }
    }

    /// Default keyword table, Yahoo chart data and the lexicon scorer.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let market = YahooChartClient::from_settings(settings)?;
        Ok(Self::new(
            KeywordMatcher::default(),
            Arc::new(market),
            Arc::new(LexiconScorer::new()),
            PipelineOptions::from_env(),
        ))
    }

    /// One full pass. Dropping the returned future aborts every in-flight fetch.
    pub async fn run(&self, headlines: &[Headline]) -> PassReport {
        let mut report = PassReport {
            headlines_scanned: headlines.len(),
            ..Default::default()
        };

        let matched: Vec<(&Headline, Vec<String>)> = headlines
            .iter()
            .map(|h| (h, self.matcher.match_title(&h.title)))
            .filter(|(_, instruments)| !instruments.is_empty())
            .collect();
        report.headlines_matched = matched.len();

        let mut distinct: Vec<String> = Vec::new();
        for (_, instruments) in &matched {
            for symbol in instruments {
                if !distinct.contains(symbol) {
                    distinct.push(symbol.clone());
                }
            }
        }
        report.instruments_evaluated = distinct.len();

        tracing::info!(
            headlines = headlines.len(),
            matched = matched.len(),
            instruments = distinct.len(),
            sentiment_backend = self.sentiment.backend_name(),
            market_source = self.market.source_name(),
            "starting signal pass"
        );

        let (outcomes, scored) = tokio::join!(
            self.evaluate_instruments(&distinct),
            self.score_headlines(&matched)
        );

        for symbol in &distinct {
            if let Some(IndicatorOutcome::Unavailable(reason)) = outcomes.get(symbol) {
                tracing::warn!(%symbol, %reason, "indicators unavailable; skipping instrument");
                report.unavailable.push(UnavailableInstrument {
                    symbol: symbol.clone(),
                    reason: reason.clone(),
                });
            }
        }

        let mut ready = Vec::with_capacity(scored.len());
        for item in scored {
            match item {
                Ok(m) => ready.push(m),
                Err(skipped) => {
                    tracing::warn!(
                        title = %skipped.title,
                        error = %skipped.error,
                        "sentiment unavailable; skipping headline"
                    );
                    report.skipped_headlines.push(skipped);
                }
            }
        }

        report.opportunities = rank_pass(&ready, &outcomes);
        tracing::info!(
            opportunities = report.opportunities.len(),
            unavailable = report.unavailable.len(),
            skipped_headlines = report.skipped_headlines.len(),
            "signal pass complete"
        );
        report
    }

    async fn score_headlines(
        &self,
        matched: &[(&Headline, Vec<String>)],
    ) -> Vec<Result<MatchedHeadline, SkippedHeadline>> {
        let mut out = Vec::with_capacity(matched.len());
        for (headline, instruments) in matched {
            let scored = match self.sentiment.score(&headline.title).await {
                Ok(raw) => clamp_polarity(raw).ok_or_else(|| format!("non-finite polarity {raw}")),
                Err(err) => Err(format!("{err:#}")),
            };
            out.push(match scored {
                Ok(sentiment) => Ok(MatchedHeadline {
                    title: headline.title.clone(),
                    sentiment,
                    instruments: instruments.clone(),
                }),
                Err(error) => Err(SkippedHeadline {
                    title: headline.title.clone(),
                    error,
                }),
            });
        }
        out
    }

    /// Fetches and computes indicators once per symbol, at most `concurrency` at a time.
    async fn evaluate_instruments(&self, symbols: &[String]) -> HashMap<String, IndicatorOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.opts.concurrency.max(1)));
        let mut set = JoinSet::new();

        for symbol in symbols {
            let market = Arc::clone(&self.market);
            let semaphore = Arc::clone(&semaphore);
            let symbol = symbol.clone();
            let deadline = self.opts.fetch_timeout;
            set.spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => fetch_outcome(market.as_ref(), &symbol, deadline).await,
                    Err(_) => IndicatorOutcome::Unavailable(UnavailableReason::Fetch {
                        detail: "fetch pool closed".to_string(),
                    }),
                };
                (symbol, outcome)
            });
        }

        let mut out = HashMap::with_capacity(symbols.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((symbol, outcome)) => {
                    out.insert(symbol, outcome);
                }
                Err(err) => tracing::error!(error = %err, "indicator task failed"),
            }
        }

        for symbol in symbols {
            out.entry(symbol.clone()).or_insert_with(|| {
                IndicatorOutcome::Unavailable(UnavailableReason::Fetch {
                    detail: "indicator task failed".to_string(),
                })
            });
        }
        out
    }
}

/// News fetch followed by a pipeline pass.
pub struct SignalFeed {
    news: Arc<dyn NewsSource>,
    pipeline: Pipeline,
}

impl SignalFeed {
    pub fn new(news: Arc<dyn NewsSource>, pipeline: Pipeline) -> Self {
        Self { news, pipeline }
    }

    /// Fails fast when the news credential is missing.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let news = NewsApiClient::from_settings(settings)?;
        let pipeline = Pipeline::from_settings(settings)?;
        Ok(Self::new(Arc::new(news), pipeline))
    }

    pub async fn refresh(&self) -> anyhow::Result<PassReport> {
        let headlines = self
            .news
            .fetch_headlines()
            .await
            .with_context(|| format!("{} headline fetch failed", self.news.source_name()))?;
        Ok(self.pipeline.run(&headlines).await)
    }
}

async fn fetch_outcome(
    market: &dyn MarketDataSource,
    symbol: &str,
    deadline: Duration,
) -> IndicatorOutcome {
    match tokio::time::timeout(deadline, market.fetch_series(symbol)).await {
        Err(_) => IndicatorOutcome::Unavailable(UnavailableReason::Timeout),
        Ok(Err(err)) => IndicatorOutcome::Unavailable(UnavailableReason::Fetch {
            detail: format!("{err:#}"),
        }),
        Ok(Ok(series)) => indicators::compute_snapshot(&series),
    }
}

/// Pure ranking stage: scores every (headline, available instrument) pair in accumulation
/// order, then sorts by confidence.
pub fn rank_pass(
    headlines: &[MatchedHeadline],
    outcomes: &HashMap<String, IndicatorOutcome>,
) -> Vec<Opportunity> {
    let mut out = Vec::new();
    for h in headlines {
        let instruments = h.instruments.iter().map(|symbol| {
            let snapshot = outcomes.get(symbol).and_then(IndicatorOutcome::snapshot);
            (symbol.as_str(), snapshot)
        });
        out.extend(ranking::rank_headline(&h.title, h.sentiment, instruments));
    }
    ranking::sort_by_confidence(&mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::{IndicatorSnapshot, PriceSample};
    use crate::domain::opportunity::Direction;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use std::sync::Mutex;

    const FED_HEADLINE: &str = "Fed raises interest rates amid inflation fears";

    enum Canned {
        Series(Vec<PriceSample>),
        Fail(&'static str),
        Slow(Duration),
    }

    #[derive(Default)]
    struct FakeMarket {
        canned: HashMap<String, Canned>,
        calls: Mutex<Vec<String>>,
        finished: Mutex<usize>,
    }

    impl FakeMarket {
        fn with(mut self, symbol: &str, canned: Canned) -> Self {
            self.canned.insert(symbol.to_string(), canned);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl MarketDataSource for FakeMarket {
        fn source_name(&self) -> &'static str {
            "fake"
        }

        async fn fetch_series(&self, symbol: &str) -> anyhow::Result<Vec<PriceSample>> {
            self.calls.lock().unwrap().push(symbol.to_string());
            let out = match self.canned.get(symbol) {
                Some(Canned::Series(s)) => Ok(s.clone()),
                Some(Canned::Fail(msg)) => Err(anyhow::anyhow!(*msg)),
                Some(Canned::Slow(d)) => {
                    tokio::time::sleep(*d).await;
                    Ok(rising(40))
                }
                None => Ok(rising(40)),
            };
            *self.finished.lock().unwrap() += 1;
            out
        }
    }

    struct FakeSentiment(HashMap<&'static str, f64>);

    #[async_trait::async_trait]
    impl SentimentScorer for FakeSentiment {
        fn backend_name(&self) -> &'static str {
            "fake"
        }

        async fn score(&self, text: &str) -> anyhow::Result<f64> {
            self.0
                .get(text)
                .copied()
                .ok_or_else(|| anyhow::anyhow!("sentiment backend unavailable"))
        }
    }

    fn samples(closes: impl IntoIterator<Item = f64>) -> Vec<PriceSample> {
        let start = Utc.with_ymd_and_hms(2026, 1, 5, 14, 30, 0).unwrap();
        closes
            .into_iter()
            .enumerate()
            .map(|(i, close)| PriceSample {
                timestamp: start + ChronoDuration::hours(i as i64),
                close,
            })
            .collect()
    }

    fn rising(n: usize) -> Vec<PriceSample> {
        samples((0..n).map(|i| 100.0 + i as f64))
    }

    fn falling(n: usize) -> Vec<PriceSample> {
        samples((0..n).map(|i| 200.0 - i as f64))
    }

    fn headline(title: &str) -> Headline {
        Headline {
            title: title.to_string(),
            published_at: Utc.with_ymd_and_hms(2026, 1, 5, 15, 0, 0).unwrap(),
        }
    }

    fn pipeline(market: Arc<FakeMarket>, sentiments: &[(&'static str, f64)]) -> Pipeline {
        Pipeline::new(
            KeywordMatcher::default(),
            market,
            Arc::new(FakeSentiment(sentiments.iter().copied().collect())),
            PipelineOptions {
                concurrency: 2,
                fetch_timeout: Duration::from_millis(200),
            },
        )
    }

    #[test]
    fn fed_scenario_scores_gold_as_weak_sell() {
        let matched = vec![MatchedHeadline {
            title: FED_HEADLINE.to_string(),
            sentiment: -0.3,
            instruments: KeywordMatcher::default().match_title(FED_HEADLINE),
        }];
        assert_eq!(matched[0].instruments.len(), 6);

        let mut outcomes = HashMap::new();
        outcomes.insert(
            "GC=F".to_string(),
            IndicatorOutcome::Available(IndicatorSnapshot {
                price: 2050.0,
                rsi: Some(25.0),
                macd: -0.5,
                trend_delta: 0.1,
            }),
        );

        let got = rank_pass(&matched, &outcomes);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].instrument, "GC=F");
        assert_eq!(got[0].confidence, 5);
        assert_eq!(got[0].direction, Direction::Sell);
    }

    #[test]
    fn rank_pass_ties_keep_headline_then_match_order() {
        let snap = IndicatorSnapshot {
            price: 1.0,
            rsi: Some(50.0),
            macd: 1.0,
            trend_delta: 1.0,
        };
        let outcomes: HashMap<_, _> = ["A", "B", "C"]
            .iter()
            .map(|s| (s.to_string(), IndicatorOutcome::Available(snap)))
            .collect();
        let matched = vec![
            MatchedHeadline {
                title: "first".to_string(),
                sentiment: 0.0,
                instruments: vec!["B".to_string(), "A".to_string()],
            },
            MatchedHeadline {
                title: "second".to_string(),
                sentiment: 0.4,
                instruments: vec!["C".to_string(), "A".to_string()],
            },
        ];
        let got = rank_pass(&matched, &outcomes);
        let order: Vec<_> = got
            .iter()
            .map(|o| (o.headline.as_str(), o.instrument.as_str(), o.confidence))
            .collect();
        assert_eq!(
            order,
            vec![
                ("second", "C", 50),
                ("second", "A", 50),
                ("first", "B", 30),
                ("first", "A", 30),
            ]
        );
    }

    struct FakeNews(Result<Vec<Headline>, &'static str>);

    #[async_trait::async_trait]
    impl NewsSource for FakeNews {
        fn source_name(&self) -> &'static str {
            "fake_news"
        }

        async fn fetch_headlines(&self) -> anyhow::Result<Vec<Headline>> {
            self.0.clone().map_err(|e| anyhow::anyhow!(e))
        }
    }

    #[tokio::test]
    async fn feed_with_no_articles_reports_nothing() {
        let market = Arc::new(FakeMarket::default());
        let feed = SignalFeed::new(Arc::new(FakeNews(Ok(Vec::new()))), pipeline(market, &[]));
        let report = feed.refresh().await.unwrap();
        assert!(report.opportunities.is_empty());
    }

    #[tokio::test]
    async fn feed_surfaces_news_failure() {
        let market = Arc::new(FakeMarket::default());
        let feed = SignalFeed::new(Arc::new(FakeNews(Err("HTTP 500"))), pipeline(market, &[]));
        let err = feed.refresh().await.unwrap_err();
        assert!(format!("{err:#}").contains("fake_news headline fetch failed"));
    }

    #[tokio::test]
    async fn feed_runs_pipeline_over_fetched_headlines() {
        let market = Arc::new(FakeMarket::default());
        let feed = SignalFeed::new(
            Arc::new(FakeNews(Ok(vec![headline("Nasdaq rallies")]))),
            pipeline(market, &[("Nasdaq rallies", 0.4)]),
        );
        let report = feed.refresh().await.unwrap();
        assert_eq!(report.headlines_scanned, 1);
        assert_eq!(report.opportunities.len(), 1);
    }

    #[tokio::test]
    async fn empty_batch_yields_empty_report() {
        let market = Arc::new(FakeMarket::default());
        let report = pipeline(market.clone(), &[]).run(&[]).await;
        assert!(report.opportunities.is_empty());
        assert_eq!(report.headlines_scanned, 0);
        assert!(market.calls().is_empty());
    }

    #[tokio::test]
    async fn unmatched_headlines_fetch_nothing() {
        let market = Arc::new(FakeMarket::default());
        let report = pipeline(market.clone(), &[("Quiet day for equities", 0.5)])
            .run(&[headline("Quiet day for equities")])
            .await;
        assert!(report.opportunities.is_empty());
        assert_eq!(report.headlines_scanned, 1);
        assert_eq!(report.headlines_matched, 0);
        assert!(market.calls().is_empty());
    }

    #[tokio::test]
    async fn fed_headline_scores_six_instruments_once_each() {
        let market = Arc::new(FakeMarket::default().with("GC=F", Canned::Series(falling(40))));
        let report = pipeline(market.clone(), &[(FED_HEADLINE, -0.3)])
            .run(&[headline(FED_HEADLINE)])
            .await;

        assert_eq!(report.instruments_evaluated, 6);
        assert_eq!(report.opportunities.len(), 6);
        let mut calls = market.calls();
        calls.sort();
        assert_eq!(
            calls,
            vec!["BTC-USD", "EURUSD=X", "GC=F", "USD=X", "USDJPY=X", "^GSPC"]
        );

        // Falling series: rsi 0 (+0.2), macd < 0 (-0.2), trend < 0 (-0.1).
        let gold = &report.opportunities[0];
        assert_eq!(gold.instrument, "GC=F");
        assert_eq!(gold.confidence, 25);
        assert_eq!(gold.direction, Direction::Sell);

        // Rising series: rsi 100 (-0.2), macd > 0 (+0.2), trend > 0 (+0.1).
        assert!(report.opportunities[1..].iter().all(|o| o.confidence == 5));
        let rest: Vec<_> = report.opportunities[1..]
            .iter()
            .map(|o| o.instrument.as_str())
            .collect();
        assert_eq!(rest, vec!["USDJPY=X", "^GSPC", "USD=X", "BTC-USD", "EURUSD=X"]);
    }

    #[tokio::test]
    async fn shared_instruments_are_fetched_once_per_pass() {
        let market = Arc::new(FakeMarket::default());
        let titles = ["Gold rallies", "Russia sanctions hit gold", "Oil and gold diverge"];
        let sentiments: Vec<_> = titles.iter().map(|t| (*t, 0.1)).collect();
        let headlines: Vec<_> = titles.iter().map(|t| headline(t)).collect();
        let report = pipeline(market.clone(), &sentiments).run(&headlines).await;

        let calls = market.calls();
        let gold_calls = calls.iter().filter(|c| *c == "GC=F").count();
        assert_eq!(gold_calls, 1);
        assert_eq!(calls.len(), report.instruments_evaluated);
        assert_eq!(
            report
                .opportunities
                .iter()
                .filter(|o| o.instrument == "GC=F")
                .count(),
            3
        );
    }

    #[tokio::test]
    async fn failures_are_isolated_per_instrument() {
        let market = Arc::new(
            FakeMarket::default()
                .with("CL=F", Canned::Fail("upstream 503"))
                .with("XLE", Canned::Series(rising(10)))
                .with("USD/CAD", Canned::Series(Vec::new()))
                .with("GC=F", Canned::Slow(Duration::from_secs(5))),
        );
        let title = "Oil and gold diverge";
        let report = pipeline(market, &[(title, 0.0)]).run(&[headline(title)]).await;

        let symbols: Vec<_> = report
            .opportunities
            .iter()
            .map(|o| o.instrument.as_str())
            .collect();
        assert_eq!(symbols, vec!["XAUUSD=X"]);

        let reasons: HashMap<_, _> = report
            .unavailable
            .iter()
            .map(|u| (u.symbol.as_str(), u.reason.clone()))
            .collect();
        assert_eq!(reasons.len(), 4);
        assert!(matches!(reasons["CL=F"], UnavailableReason::Fetch { .. }));
        assert_eq!(
            reasons["XLE"],
            UnavailableReason::TooShort {
                len: 10,
                required: indicators::MIN_SAMPLES
            }
        );
        assert_eq!(reasons["USD/CAD"], UnavailableReason::EmptySeries);
        assert_eq!(reasons["GC=F"], UnavailableReason::Timeout);
    }

    #[tokio::test]
    async fn sentiment_failure_skips_only_that_headline() {
        let market = Arc::new(FakeMarket::default());
        let report = pipeline(market, &[("Nasdaq rallies", 0.4)])
            .run(&[headline("Ethereum slides"), headline("Nasdaq rallies")])
            .await;

        assert_eq!(report.skipped_headlines.len(), 1);
        assert_eq!(report.skipped_headlines[0].title, "Ethereum slides");
        assert_eq!(report.opportunities.len(), 1);
        assert_eq!(report.opportunities[0].instrument, "^IXIC");
        assert_eq!(report.opportunities[0].headline, "Nasdaq rallies");
    }

    #[tokio::test]
    async fn out_of_range_sentiment_is_clamped() {
        let market = Arc::new(FakeMarket::default());
        let report = pipeline(market, &[("Nasdaq rallies", 7.0)])
            .run(&[headline("Nasdaq rallies")])
            .await;
        // 0.5 - 0.2 + 0.2 + 0.1
        assert_eq!(report.opportunities[0].sentiment, 1.0);
        assert_eq!(report.opportunities[0].confidence, 60);
        assert_eq!(report.opportunities[0].direction, Direction::Buy);
    }

    #[tokio::test]
    async fn dropping_a_pass_cancels_in_flight_fetches() {
        let market = Arc::new(
            FakeMarket::default().with("^IXIC", Canned::Slow(Duration::from_millis(150))),
        );
        let p = Pipeline::new(
            KeywordMatcher::default(),
            market.clone(),
            Arc::new(FakeSentiment([("Nasdaq rallies", 0.4)].into_iter().collect())),
            PipelineOptions {
                concurrency: 1,
                fetch_timeout: Duration::from_secs(5),
            },
        );
        let headlines = [headline("Nasdaq rallies")];
        let abandoned = tokio::time::timeout(Duration::from_millis(20), p.run(&headlines)).await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(market.calls(), vec!["^IXIC"]);
        assert_eq!(*market.finished.lock().unwrap(), 0);
    }
}
