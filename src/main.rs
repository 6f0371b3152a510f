use anyhow::{Context, Result};
use clap::Parser;
use feedwatch::config::Config;
use feedwatch::engine::{run, Feed, Scheduler};
use feedwatch::feed::{ExtractionMode, HttpFetchClient};
use feedwatch::notify::ConsoleNotifier;
use feedwatch::shutdown::cancel_on_signal;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "feedwatch", about = "Polls feeds and announces new items")]
struct Args {
    /// Configuration file
    #[arg(short, long, value_name = "FILE", default_value = "feedwatch.toml")]
    config: PathBuf,

    /// Validate the configuration and exit without polling
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries announcements
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("feedwatch=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config '{}'", args.config.display()))?;
    let feed_configs = config
        .feed_configs()
        .context("Invalid feed configuration")?;

    for feed in &feed_configs {
        tracing::info!(
            feed = %feed.name,
            url = %feed.url,
            interval = feed.interval.as_secs(),
            max_items = feed.max_items,
            scraped = matches!(feed.mode, ExtractionMode::Scraped(_)),
            state = %feed.state_path().display(),
            "Configured feed"
        );
    }

    if args.check_config {
        println!("Configuration OK: {} feed(s)", feed_configs.len());
        return Ok(());
    }

    let feeds: Vec<Feed> = feed_configs.into_iter().map(Feed::new).collect();
    for feed in &feeds {
        tracing::info!(
            feed = %feed.name(),
            known = feed.known_items().map(|k| k.len()),
            last_seen = feed.last_seen(),
            "Loaded feed state"
        );
    }
    let scheduler = Scheduler::new(feeds);

    let client = HttpFetchClient::new().context("Failed to build HTTP client")?;
    let notifier = ConsoleNotifier::new(config.destinations.clone());

    let shutdown = CancellationToken::new();
    cancel_on_signal(shutdown.clone()).context("Failed to install signal handlers")?;

    tracing::info!(tick_seconds = config.tick_seconds, "Starting scheduler");
    run(&scheduler, &client, &notifier, config.tick(), shutdown).await;
    tracing::info!("Stopped");

    Ok(())
}
