use crate::config::Settings;
use crate::domain::market::PriceSample;
use crate::ingest::types::ChartResponse;
use crate::ingest::{backoff_for, env_or, env_string_or, is_retryable_status, BACKOFF_UNIT};
use anyhow::{Context, Result};
use chrono::DateTime;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
const DEFAULT_RANGE: &str = "5d";
const DEFAULT_INTERVAL: &str = "1h";
const DEFAULT_TIMEOUT_SECS: u64 = 15;
const DEFAULT_RETRIES: u32 = 3;
const USER_AGENT: &str = concat!("signalfeed/", env!("CARGO_PKG_VERSION"));

#[async_trait::async_trait]
pub trait MarketDataSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    /// Price history for `symbol`, oldest first.
    async fn fetch_series(&self, symbol: &str) -> Result<Vec<PriceSample>>;
}

#[derive(Debug, Clone)]
pub struct YahooChartClient {
    http: reqwest::Client,
    base_url: String,
    range: String,
    interval: String,
    retries: u32,
    backoff_unit: Duration,
}

impl YahooChartClient {
    pub fn from_settings(_settings: &Settings) -> Result<Self> {
        let base_url = env_string_or("MARKET_DATA_BASE_URL", DEFAULT_BASE_URL);
        let range = env_string_or("MARKET_DATA_RANGE", DEFAULT_RANGE);
        let interval = env_string_or("MARKET_DATA_INTERVAL", DEFAULT_INTERVAL);
        let timeout_secs = env_or("MARKET_DATA_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS);
        let retries = env_or("MARKET_DATA_RETRIES", DEFAULT_RETRIES).max(1);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build market data http client")?;

        Ok(Self {
            http,
            base_url,
            range,
            interval,
            retries,
            backoff_unit: BACKOFF_UNIT,
        })
    }

    // Symbols like "^GSPC" or "USD/CAD" must survive as a single path segment.
    fn url(&self, symbol: &str) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .with_context(|| format!("invalid MARKET_DATA_BASE_URL: {}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|_| {
                anyhow::anyhow!("MARKET_DATA_BASE_URL cannot be a base: {}", self.base_url)
            })?
            .pop_if_empty()
            .extend(["v8", "finance", "chart", symbol]);
        Ok(url)
    }
}

#[async_trait::async_trait]
impl MarketDataSource for YahooChartClient {
    fn source_name(&self) -> &'static str {
        "yahoo_chart"
    }

    async fn fetch_series(&self, symbol: &str) -> Result<Vec<PriceSample>> {
        let url = self.url(symbol)?;
        let params = [
            ("range", self.range.as_str()),
            ("interval", self.interval.as_str()),
        ];

        let mut attempt: u32 = 0;
        let text = loop {
            attempt += 1;

            let res = self.http.get(url.clone()).query(&params).send().await;

            let res = match res {
                Ok(r) => r,
                Err(err) => {
                    if attempt >= self.retries {
                        return Err(err).context("market data request failed");
                    }
                    let backoff = backoff_for(attempt, self.backoff_unit);
                    tracing::warn!(
                        attempt,
                        ?backoff,
                        %symbol,
                        error = %err,
                        "market data request failed; retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    continue;
                }
            };

            let status = res.status();
            let text = res
                .text()
                .await
                .context("failed to read market data response")?;

            if !status.is_success() {
                if is_retryable_status(status) && attempt < self.retries {
                    let backoff = backoff_for(attempt, self.backoff_unit);
                    tracing::warn!(
                        attempt,
                        ?backoff,
                        %symbol,
                        http_status = %status,
                        "market data HTTP error; retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    continue;
                }
                // 404s still carry a chart.error body worth surfacing.
                if let Ok(parsed) = serde_json::from_str::<ChartResponse>(&text) {
                    if let Some(err) = parsed.chart.error {
                        anyhow::bail!(
                            "market data HTTP {status} for {symbol}: {} ({})",
                            err.description,
                            err.code
                        );
                    }
                }
                anyhow::bail!("market data HTTP {status} for {symbol}: {text}");
            }

            break text;
        };

        let parsed = serde_json::from_str::<ChartResponse>(&text)
            .with_context(|| format!("market data response for {symbol} is not valid chart JSON"))?;
        series_from_chart(parsed)
    }
}

/// Zips timestamps with closes, dropping bars whose close is missing or non-finite.
pub fn series_from_chart(resp: ChartResponse) -> Result<Vec<PriceSample>> {
    if let Some(err) = resp.chart.error {
        anyhow::bail!("chart error {}: {}", err.code, err.description);
    }
    let result = resp
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .context("chart response has no result")?;
    let closes = result
        .indicators
        .quote
        .into_iter()
        .next()
        .map(|q| q.close)
        .unwrap_or_default();

    anyhow::ensure!(
        closes.len() == result.timestamp.len(),
        "chart timestamp/close length mismatch ({} vs {})",
        result.timestamp.len(),
        closes.len()
    );

    let mut out = Vec::with_capacity(closes.len());
    for (ts, close) in result.timestamp.into_iter().zip(closes) {
        let Some(close) = close.filter(|c| c.is_finite()) else {
            continue;
        };
        let timestamp = DateTime::from_timestamp(ts, 0)
            .with_context(|| format!("chart timestamp out of range: {ts}"))?;
        out.push(PriceSample { timestamp, close });
    }
    out.sort_by_key(|s| s.timestamp);
    Ok(out)
}
