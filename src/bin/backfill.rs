//! One-shot historical backfill CLI (spec §4.8). Run once to seed the
//! Market Data Store before the scheduler starts relying on it for warmup.

use aifx_signal_core::application::data_collector::DataCollector;
use aifx_signal_core::application::rate_limiter::TokenBucket;
use aifx_signal_core::config::Config;
use aifx_signal_core::domain::types::{Instrument, Pair, Timeframe};
use aifx_signal_core::infrastructure::observability::HeartbeatRegistry;
use aifx_signal_core::infrastructure::persistence::repositories::SqliteCandleStore;
use aifx_signal_core::infrastructure::persistence::Database;
use aifx_signal_core::infrastructure::upstream::quote_provider::HttpQuoteProvider;
use anyhow::Context;
use clap::Parser;
use std::str::FromStr;
use std::sync::Arc;
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(about = "Backfill historical candles for one instrument")]
struct Args {
    /// Currency pair, e.g. EUR/USD
    #[arg(long)]
    pair: String,

    /// Candle timeframe, e.g. 1h, 4h, 1d
    #[arg(long)]
    timeframe: String,

    /// How many days of history to pull
    #[arg(long, default_value_t = 365)]
    days: i64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let args = Args::parse();
    let pair = Pair::from_str(&args.pair).context("invalid --pair")?;
    let timeframe = Timeframe::from_str(&args.timeframe).context("invalid --timeframe")?;
    let instrument = Instrument::new(pair, timeframe);

    let config = Config::from_env()?;
    let database = Database::new(&config.database_url).await?;
    let store = Arc::new(SqliteCandleStore::new(database.pool.clone()));
    let upstream = Arc::new(HttpQuoteProvider::new(
        config.upstream.base_url.clone(),
        config.upstream.api_key.clone(),
    ));
    let token_bucket = Arc::new(TokenBucket::new(
        config.upstream.token_bucket_capacity,
        config.upstream.wait_budget,
    ));
    let collector = DataCollector::new(store, upstream, token_bucket, Arc::new(HeartbeatRegistry::new()));

    tracing::info!(%instrument, days = args.days, "starting backfill");
    let report = collector.backfill(instrument, args.days).await?;
    tracing::info!(
        upserted = report.upserted,
        skipped_invalid = report.skipped_invalid,
        "backfill finished"
    );

    Ok(())
}
