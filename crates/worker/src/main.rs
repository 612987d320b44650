use clap::Parser;
use signalfeed_core::dashboard::DashboardView;
use signalfeed_core::pipeline::SignalFeed;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "signalfeed_worker")]
struct Args {
    /// Hide opportunities below this confidence (0-100).
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=100))]
    min_confidence: u8,

    /// Print the dashboard view as JSON instead of text.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = signalfeed_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let feed = match SignalFeed::from_settings(&settings) {
        Ok(feed) => feed,
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %err, "startup failed");
            return Err(err);
        }
    };

    let report = match feed.refresh().await {
        Ok(report) => report,
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %format!("{err:#}"), "signal pass failed");
            return Err(err);
        }
    };

    tracing::info!(
        headlines = report.headlines_scanned,
        opportunities = report.opportunities.len(),
        unavailable = report.unavailable.len(),
        "signal pass finished"
    );

    let view = DashboardView::build(&report.opportunities, args.min_confidence);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print!("{}", view.render_text());
    }

    Ok(())
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
