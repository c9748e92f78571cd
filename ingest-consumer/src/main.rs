use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use common_cache::FeedCache;
use common_kafka::PostConsumer;
use common_redis::RedisClient;
use futures::future::ready;
use health::HealthRegistry;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use ingest_consumer::config::Config;
use ingest_consumer::consumer_loop;
use ingest_consumer::handler::PostHandler;
use ingest_consumer::metrics_consts::PROCESSED_TOTAL_GAUGE;
use ingest_consumer::sink::PostStore;

fn setup_tracing() {
    let log_layer = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(log_layer).init();
}

async fn shutdown_signal(token: CancellationToken) {
    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("failed to register SIGTERM handler");
    let mut interrupt = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .expect("failed to register SIGINT handler");

    tokio::select! {
        _ = term.recv() => {},
        _ = interrupt.recv() => {},
    };

    info!("shutting down gracefully...");
    token.cancel();
}

pub async fn index() -> &'static str {
    "post ingest consumer"
}

fn start_server(config: &Config, liveness: HealthRegistry, shutdown: CancellationToken) {
    let router = Router::new()
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route("/_liveness", get(move || ready(liveness.get_status())));
    let router = common_metrics::setup_metrics_routes(router);

    let bind = format!("{}:{}", config.host, config.port);

    tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(&bind)
            .await
            .expect("could not bind status port");
        info!("status server listening on {bind}");
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
            .expect("status server failed");
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_tracing();
    info!("Starting ingest consumer...");

    let config = Config::init_with_defaults()?;
    config.validate()?;

    let liveness = HealthRegistry::new("liveness");

    let redis = Arc::new(RedisClient::new(config.redis_url.clone()).await?);
    let cache = FeedCache::new(redis);

    let pool = common_database::get_pool(&config.database_url, config.max_pg_connections).await?;
    let store = PostStore::new(pool);
    store.ensure_schema().await?;

    let consumer = PostConsumer::new(config.kafka.clone(), config.consumer.clone())?;
    info!("subscribed to topic: {}", consumer.topic());

    let handler = Arc::new(PostHandler::new(cache, store, config.batch_size));
    let shutdown = CancellationToken::new();

    let consumer_liveness = liveness
        .register("consumer".to_string(), chrono::Duration::seconds(30))
        .await;
    let consume = tokio::spawn(consumer_loop(
        consumer,
        handler.clone(),
        consumer_liveness,
        shutdown.clone(),
    ));

    // Time-triggered flushes, independent of buffer fill
    let flush_handler = handler.clone();
    let flush_shutdown = shutdown.clone();
    let flush_interval = Duration::from_secs(config.flush_interval_secs);
    let flusher = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(flush_interval);
        loop {
            tokio::select! {
                _ = flush_shutdown.cancelled() => return,
                _ = ticker.tick() => flush_handler.flush().await,
            }
        }
    });

    let stats_handler = handler.clone();
    let stats_shutdown = shutdown.clone();
    let stats_interval = Duration::from_secs(config.stats_interval_secs);
    let stats = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(stats_interval);
        loop {
            tokio::select! {
                _ = stats_shutdown.cancelled() => return,
                _ = ticker.tick() => {
                    let processed = stats_handler.processed();
                    metrics::gauge!(PROCESSED_TOTAL_GAUGE).set(processed as f64);
                    info!("total processed: {processed} posts");
                }
            }
        }
    });

    start_server(&config, liveness.clone(), shutdown.clone());

    tokio::spawn(shutdown_signal(shutdown.clone()));
    shutdown.cancelled().await;

    for handle in [consume, flusher, stats] {
        if let Err(e) = handle.await {
            warn!("task failed to join: {e}");
        }
    }

    // One final synchronous flush so nothing buffered is lost on SIGTERM
    handler.flush().await;
    info!(
        "ingest consumer shut down cleanly, {} posts processed",
        handler.processed()
    );

    Ok(())
}
