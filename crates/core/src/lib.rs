pub mod dashboard;
pub mod domain;
pub mod indicators;
pub mod ingest;
pub mod keywords;
pub mod pipeline;
pub mod ranking;
pub mod sentiment;

pub mod config {
    use anyhow::Context;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub news_api_key: Option<String>,
        pub sentry_dsn: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                news_api_key: non_empty_var("NEWSAPI_KEY"),
                sentry_dsn: non_empty_var("SENTRY_DSN"),
            })
        }

        pub fn require_news_api_key(&self) -> anyhow::Result<&str> {
            self.news_api_key
                .as_deref()
                .context("NEWSAPI_KEY is required")
        }
    }

    fn non_empty_var(key: &str) -> Option<String> {
        std::env::var(key)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn missing_news_key_names_the_variable() {
            let settings = Settings {
                news_api_key: None,
                sentry_dsn: None,
            };
            let err = settings.require_news_api_key().unwrap_err();
            assert_eq!(err.to_string(), "NEWSAPI_KEY is required");
        }

        #[test]
        fn present_news_key_is_returned() {
            let settings = Settings {
                news_api_key: Some("k".to_string()),
                sentry_dsn: None,
            };
            assert_eq!(settings.require_news_api_key().unwrap(), "k");
        }
    }
}
