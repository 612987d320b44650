use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Html,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use signalfeed_core::dashboard::DashboardView;
use signalfeed_core::pipeline::{PassReport, SignalFeed, UnavailableInstrument};

mod page;

const DEFAULT_REFRESH_SECS: u64 = 60;
const MIN_REFRESH_SECS: u64 = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = signalfeed_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    // No degraded mode: without a news credential every pass would be empty.
    let feed = match SignalFeed::from_settings(&settings) {
        Ok(feed) => feed,
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "startup failed");
            return Err(e);
        }
    };

    let refresh_secs =
        parse_refresh_secs(std::env::var("DASHBOARD_REFRESH_SECS").ok().as_deref());

    let state = AppState {
        feed: Arc::new(feed),
        refresh_secs,
    };

    let app = router(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, refresh_secs, "dashboard listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

// Each reload runs a full pass; never refresh faster than MIN_REFRESH_SECS.
fn parse_refresh_secs(raw: Option<&str>) -> u64 {
    raw.and_then(|v| v.trim().parse().ok())
        .unwrap_or(DEFAULT_REFRESH_SECS)
        .max(MIN_REFRESH_SECS)
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(get_dashboard_page))
        .route("/healthz", get(healthz))
        .route("/api/opportunities", get(get_opportunities))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    feed: Arc<SignalFeed>,
    refresh_secs: u64,
}

// Raw string: blank or out-of-range values are clamped, not rejected.
#[derive(Debug, Default, Deserialize)]
struct ViewQuery {
    min_confidence: Option<String>,
}

impl ViewQuery {
    fn min_confidence(&self) -> u8 {
        let value = self
            .min_confidence
            .as_deref()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(0);
        value.min(100) as u8
    }
}

#[derive(Debug, Serialize)]
struct ApiView {
    headlines_scanned: usize,
    instruments_evaluated: usize,
    unavailable: Vec<UnavailableInstrument>,
    view: DashboardView,
}

impl ApiView {
    fn from_report(report: PassReport, min_confidence: u8) -> Self {
        let view = DashboardView::build(&report.opportunities, min_confidence);
        Self {
            headlines_scanned: report.headlines_scanned,
            instruments_evaluated: report.instruments_evaluated,
            unavailable: report.unavailable,
            view,
        }
    }
}

async fn get_opportunities(
    State(state): State<AppState>,
    Query(query): Query<ViewQuery>,
) -> Result<Json<ApiView>, StatusCode> {
    let report = state.feed.refresh().await.map_err(|e| {
        sentry_anyhow::capture_anyhow(&e);
        tracing::error!(error = %format!("{e:#}"), "signal pass failed");
        StatusCode::BAD_GATEWAY
    })?;

    Ok(Json(ApiView::from_report(report, query.min_confidence())))
}

async fn get_dashboard_page(
    State(state): State<AppState>,
    Query(query): Query<ViewQuery>,
) -> Html<String> {
    let min_confidence = query.min_confidence();
    let body = match state.feed.refresh().await {
        Ok(report) => {
            let view = DashboardView::build(&report.opportunities, min_confidence);
            page::render(
                &page::PageContent::View(&view),
                min_confidence,
                state.refresh_secs,
            )
        }
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %format!("{e:#}"), "signal pass failed");
            page::render(
                &page::PageContent::Error(
                    "Could not fetch the latest headlines. Please try again soon.",
                ),
                min_confidence,
                state.refresh_secs,
            )
        }
    };
    Html(body)
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &signalfeed_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(uri: &str) -> ViewQuery {
        let uri: axum::http::Uri = uri.parse().unwrap();
        Query::<ViewQuery>::try_from_uri(&uri).unwrap().0
    }

    #[test]
    fn query_confidence_defaults_and_clamps() {
        assert_eq!(ViewQuery::default().min_confidence(), 0);
        assert_eq!(query("/").min_confidence(), 0);
        assert_eq!(query("/?min_confidence=50").min_confidence(), 50);
        assert_eq!(query("/?min_confidence=300").min_confidence(), 100);
        assert_eq!(query("/?min_confidence=100").min_confidence(), 100);
    }

    #[test]
    fn blank_or_garbled_confidence_means_no_filter() {
        assert_eq!(query("/?min_confidence=").min_confidence(), 0);
        assert_eq!(query("/?min_confidence=abc").min_confidence(), 0);
        assert_eq!(query("/?min_confidence=-5").min_confidence(), 0);
        assert_eq!(query("/api/opportunities?min_confidence=%2040").min_confidence(), 40);
    }

    #[test]
    fn refresh_interval_has_a_floor() {
        assert_eq!(parse_refresh_secs(None), DEFAULT_REFRESH_SECS);
        assert_eq!(parse_refresh_secs(Some("0")), MIN_REFRESH_SECS);
        assert_eq!(parse_refresh_secs(Some("2")), MIN_REFRESH_SECS);
        assert_eq!(parse_refresh_secs(Some("120")), 120);
        assert_eq!(parse_refresh_secs(Some("soon")), DEFAULT_REFRESH_SECS);
    }

    #[test]
    fn api_view_keeps_pass_counts() {
        let report = PassReport {
            headlines_scanned: 10,
            instruments_evaluated: 4,
            ..Default::default()
        };
        let api = ApiView::from_report(report, 30);
        let v = serde_json::to_value(&api).unwrap();
        assert_eq!(v["headlines_scanned"], 10);
        assert_eq!(v["instruments_evaluated"], 4);
        assert_eq!(v["view"]["state"], "no_opportunities");
        assert_eq!(v["view"]["min_confidence"], 30);
    }
}
