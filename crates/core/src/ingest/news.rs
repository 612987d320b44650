use crate::config::Settings;
use crate::domain::market::Headline;
use crate::ingest::types::NewsApiResponse;
use crate::ingest::{backoff_for, env_or, env_string_or, is_retryable_status, BACKOFF_UNIT};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://newsapi.org";
const DEFAULT_QUERY: &str = "finance OR economy OR crypto OR stocks";
const DEFAULT_BATCH_SIZE: usize = 10;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RETRIES: u32 = 3;

// Placeholder title the API returns for withdrawn articles.
const REMOVED_TITLE: &str = "[Removed]";

#[async_trait::async_trait]
pub trait NewsSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    /// Most recent headlines first, at most one batch.
    async fn fetch_headlines(&self) -> Result<Vec<Headline>>;
}

#[derive(Debug, Clone)]
pub struct NewsApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    query: String,
    batch_size: usize,
    retries: u32,
    backoff_unit: Duration,
}

impl NewsApiClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let api_key = settings.require_news_api_key()?.to_string();
        let base_url = env_string_or("NEWS_API_BASE_URL", DEFAULT_BASE_URL);
        let query = env_string_or("NEWS_QUERY", DEFAULT_QUERY);
        let batch_size = env_or("NEWS_BATCH_SIZE", DEFAULT_BATCH_SIZE).max(1);
        let timeout_secs = env_or("NEWS_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS);
        let retries = env_or("NEWS_RETRIES", DEFAULT_RETRIES).max(1);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build news http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
            query,
            batch_size,
            retries,
            backoff_unit: BACKOFF_UNIT,
        })
    }

    fn url(&self) -> String {
        format!("{}/v2/everything", self.base_url.trim_end_matches('/'))
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_str(&self.api_key)?);
        Ok(headers)
    }

    async fn fetch_once(&self) -> Result<Attempt<NewsApiResponse>> {
        let from = Utc::now().date_naive().to_string();
        let page_size = self.batch_size.to_string();
        let params = [
            ("q", self.query.as_str()),
            ("from", from.as_str()),
            ("sortBy", "publishedAt"),
            ("language", "en"),
            ("pageSize", page_size.as_str()),
        ];

        let res = match self
            .http
            .get(self.url())
            .headers(self.headers()?)
            .query(&params)
            .send()
            .await
        {
            Ok(r) => r,
            Err(err) => {
                return Ok(Attempt::Retry(
                    anyhow::Error::new(err).context("news request failed"),
                ))
            }
        };

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read news response")?;

        if !status.is_success() {
            let err = anyhow::anyhow!("news API HTTP {status}: {text}");
            if is_retryable_status(status) {
                return Ok(Attempt::Retry(err));
            }
            return Err(err);
        }

        let parsed = serde_json::from_str::<NewsApiResponse>(&text)
            .with_context(|| format!("news response is not valid JSON: {text}"))?;
        Ok(Attempt::Done(parsed))
    }
}

enum Attempt<T> {
    Done(T),
    Retry(anyhow::Error),
}

#[async_trait::async_trait]
impl NewsSource for NewsApiClient {
    fn source_name(&self) -> &'static str {
        "newsapi"
    }

    async fn fetch_headlines(&self) -> Result<Vec<Headline>> {
        let mut attempt: u32 = 0;
        let resp = loop {
            attempt += 1;
            match self.fetch_once().await? {
                Attempt::Done(resp) => break resp,
                Attempt::Retry(err) => {
                    if attempt >= self.retries {
                        return Err(err);
                    }
                    let backoff = backoff_for(attempt, self.backoff_unit);
                    tracing::warn!(attempt, ?backoff, error = %err, "news fetch failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        };

        headlines_from_response(resp, self.batch_size)
    }
}

pub fn headlines_from_response(resp: NewsApiResponse, batch_size: usize) -> Result<Vec<Headline>> {
    anyhow::ensure!(
        resp.status == "ok",
        "news API returned status={} code={} message={}",
        resp.status,
        resp.code.as_deref().unwrap_or("-"),
        resp.message.as_deref().unwrap_or("-")
    );

    let mut out = Vec::with_capacity(batch_size.min(resp.articles.len()));
    for article in resp.articles {
        if out.len() >= batch_size {
            break;
        }
        let Some(title) = article
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty() && t != REMOVED_TITLE)
        else {
            continue;
        };
        let Some(published_at) = article.published_at.as_deref().and_then(parse_published_at)
        else {
            tracing::debug!(%title, "skipping article without a usable publishedAt");
            continue;
        };
        out.push(Headline {
            title,
            published_at,
        });
    }
    Ok(out)
}

fn parse_published_at(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|d| d.with_timezone(&Utc))
}
