//! Signal core server. Runs the HTTP API, the signal/position scheduler and
//! the metrics reporter in one process.
//!
//! # Environment Variables
//! See `Config::from_env` for the full list; `WATCHED_INSTRUMENTS` additionally
//! controls which `pair:timeframe` pairs the scheduler watches, e.g.
//! `EUR/USD:1h,USD/JPY:1h,GBP/USD:4h`.

use aifx_signal_core::application::change_detector::ChangeDetector;
use aifx_signal_core::application::data_collector::DataCollector;
use aifx_signal_core::application::hybrid_provider::HybridHistoricalProvider;
use aifx_signal_core::application::notification::{DeliveryFilter, NotificationBroker};
use aifx_signal_core::application::position_monitor::PositionMonitor;
use aifx_signal_core::application::rate_limiter::TokenBucket;
use aifx_signal_core::application::scheduler::Scheduler;
use aifx_signal_core::application::signal_generator::SignalGenerator;
use aifx_signal_core::application::subscription_registry::SubscriptionRegistry;
use aifx_signal_core::config::Config;
use aifx_signal_core::domain::ports::DeliveryClient;
use aifx_signal_core::domain::subscription::SubscriberKind;
use aifx_signal_core::domain::types::{Instrument, Pair, Timeframe};
use aifx_signal_core::infrastructure::cache::ttl_cache::TtlCache;
use aifx_signal_core::infrastructure::core::circuit_breaker::CircuitBreaker;
use aifx_signal_core::infrastructure::delivery::chat_dm::ChatDeliveryClient;
use aifx_signal_core::infrastructure::delivery::webhook::WebhookDeliveryClient;
use aifx_signal_core::infrastructure::observability::{HeartbeatRegistry, Metrics, MetricsReporter};
use aifx_signal_core::infrastructure::persistence::repositories::{
    SqliteCandleStore, SqliteDeliveryStateRepository, SqliteInstrumentStateRepository,
    SqlitePositionRepository, SqliteSignalRepository, SqliteSubscriberRepository,
    SqliteSubscriptionRepository,
};
use aifx_signal_core::infrastructure::persistence::Database;
use aifx_signal_core::infrastructure::predictor::http_predictor::HttpPredictorClient;
use aifx_signal_core::infrastructure::upstream::quote_provider::HttpQuoteProvider;
use aifx_signal_core::interfaces::commands::Commands;
use aifx_signal_core::interfaces::http::auth::AuthState;
use aifx_signal_core::interfaces::http::{router, AppState};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    info!("signal core starting, version {}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    let database = Database::new(&config.database_url).await?;
    let instruments = watched_instruments();
    info!(count = instruments.len(), "watched instruments loaded");

    let candle_store = Arc::new(SqliteCandleStore::new(database.pool.clone()));
    let signal_repo = Arc::new(SqliteSignalRepository::new(database.pool.clone()));
    let instrument_state_repo = Arc::new(SqliteInstrumentStateRepository::new(database.pool.clone()));
    let subscription_repo = Arc::new(SqliteSubscriptionRepository::new(database.pool.clone()));
    let subscriber_repo = Arc::new(SqliteSubscriberRepository::new(database.pool.clone()));
    let position_repo = Arc::new(SqlitePositionRepository::new(database.pool.clone()));

    let cache = Arc::new(TtlCache::new());
    let upstream = Arc::new(HttpQuoteProvider::new(
        config.upstream.base_url.clone(),
        config.upstream.api_key.clone(),
    ));
    let upstream_circuit_breaker = Arc::new(CircuitBreaker::new("upstream-fetcher", 5, 2, Duration::from_secs(60)));
    let hhp = Arc::new(HybridHistoricalProvider::new(
        candle_store.clone(),
        upstream.clone(),
        cache.clone(),
        upstream_circuit_breaker,
        config.upstream.call_timeout,
    ));

    let predictor = Arc::new(HttpPredictorClient::new(
        config.predictor.base_url.clone(),
        config.predictor.timeout,
    ));
    let predictor_circuit_breaker = Arc::new(CircuitBreaker::new("predictor-client", 5, 2, Duration::from_secs(60)));
    let signal_generator = Arc::new(SignalGenerator::new(
        hhp.clone(),
        predictor,
        signal_repo.clone(),
        config.predictor,
        predictor_circuit_breaker,
    ));

    let change_detector = Arc::new(ChangeDetector::new(instrument_state_repo, config.notification.clone()));

    let delivery_state_repo = Arc::new(SqliteDeliveryStateRepository::new(database.pool.clone()));
    let delivery_filter = Arc::new(DeliveryFilter::new(
        subscription_repo.clone(),
        subscriber_repo.clone(),
        delivery_state_repo,
        config.notification,
    ));
    let delivery_clients = build_delivery_clients(config.delivery.per_attempt_timeout);
    let broker = Arc::new(NotificationBroker::spawn(
        delivery_filter,
        subscriber_repo.clone(),
        delivery_clients,
        config.delivery,
        1024,
    ));

    let position_monitor = Arc::new(PositionMonitor::new(position_repo.clone(), hhp.clone(), broker.clone()));

    let token_bucket = Arc::new(TokenBucket::new(
        config.upstream.token_bucket_capacity,
        config.upstream.wait_budget,
    ));
    let heartbeats = Arc::new(HeartbeatRegistry::new());
    let data_collector = Arc::new(DataCollector::new(candle_store, upstream, token_bucket, heartbeats.clone()));

    let registry = Arc::new(SubscriptionRegistry::new(subscription_repo, subscriber_repo));

    let metrics = Metrics::new()?;
    let scheduler = Arc::new(Scheduler::new(
        instruments,
        signal_generator.clone(),
        change_detector,
        broker,
        position_monitor.clone(),
        config.scheduler,
        metrics.clone(),
        heartbeats.clone(),
    ));

    let commands = Arc::new(Commands::new(
        signal_repo.clone(),
        registry.clone(),
        position_repo.clone(),
        position_monitor.clone(),
        hhp.clone(),
    ));
    let auth = Arc::new(AuthState {
        jwt_secret: config.jwt_secret.clone(),
        api_key: config.api_key.clone(),
    });
    let app_state = AppState {
        auth,
        commands,
        hhp,
        signal_generator,
        data_collector,
        position_monitor,
        registry,
        signals: signal_repo,
        positions: position_repo,
        heartbeats,
    };

    let http_listener = tokio::net::TcpListener::bind(&config.http_bind_addr)
        .await
        .with_context(|| format!("binding HTTP listener on {}", config.http_bind_addr))?;
    info!(addr = %config.http_bind_addr, "HTTP API listening");
    let http_server = tokio::spawn(async move {
        if let Err(e) = axum::serve(http_listener, router(app_state)).await {
            tracing::error!("HTTP server exited: {e}");
        }
    });

    let scheduler_task = tokio::spawn(async move { scheduler.run().await });

    if config.observability_enabled {
        let reporter = MetricsReporter::new(metrics.clone(), Duration::from_secs(60));
        tokio::spawn(async move { reporter.run().await });

        let metrics_listener = tokio::net::TcpListener::bind(&config.metrics_bind_addr).await?;
        info!(addr = %config.metrics_bind_addr, "metrics endpoint listening");
        tokio::spawn(async move {
            let router = metrics_router(metrics);
            if let Err(e) = axum::serve(metrics_listener, router).await {
                tracing::error!("metrics server exited: {e}");
            }
        });
    }

    info!("signal core running, press Ctrl+C to shut down");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    http_server.abort();
    scheduler_task.abort();
    Ok(())
}

fn metrics_router(metrics: Metrics) -> axum::Router {
    axum::Router::new().route(
        "/metrics",
        axum::routing::get(move || {
            let metrics = metrics.clone();
            async move { metrics.encode_text().unwrap_or_default() }
        }),
    )
}

/// Parses `WATCHED_INSTRUMENTS` as `pair:timeframe` pairs, falling back to a
/// handful of liquid majors on the hourly timeframe.
fn watched_instruments() -> Vec<Instrument> {
    match std::env::var("WATCHED_INSTRUMENTS") {
        Ok(raw) => raw
            .split(',')
            .filter_map(|entry| {
                let (pair, timeframe) = entry.split_once(':')?;
                let pair = Pair::from_str(pair.trim()).ok()?;
                let timeframe = Timeframe::from_str(timeframe.trim()).ok()?;
                Some(Instrument::new(pair, timeframe))
            })
            .collect(),
        Err(_) => default_instruments(),
    }
}

fn default_instruments() -> Vec<Instrument> {
    ["EUR/USD", "USD/JPY", "GBP/USD", "AUD/USD"]
        .iter()
        .map(|p| Instrument::new(Pair::from_str(p).expect("built-in pair literal is valid"), Timeframe::OneHour))
        .collect()
}

fn build_delivery_clients(per_attempt_timeout: Duration) -> HashMap<SubscriberKind, Arc<dyn DeliveryClient>> {
    let mut clients: HashMap<SubscriberKind, Arc<dyn DeliveryClient>> = HashMap::new();

    let chat_base_url = std::env::var("CHAT_BASE_URL").unwrap_or_else(|_| "https://api.telegram.org".to_string());
    let chat_bot_token = std::env::var("CHAT_BOT_TOKEN").unwrap_or_default();
    let chat_client: Arc<dyn DeliveryClient> = Arc::new(ChatDeliveryClient::new(chat_base_url, chat_bot_token, per_attempt_timeout));
    clients.insert(SubscriberKind::ChatDm, chat_client.clone());
    clients.insert(SubscriberKind::ChatChannel, chat_client);

    clients.insert(SubscriberKind::Webhook, Arc::new(WebhookDeliveryClient::new(per_attempt_timeout)));
    clients
}
