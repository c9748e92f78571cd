use std::sync::Arc;

use axum::{routing::get, Router};
use chrono::Duration;
use common_cache::FeedCache;
use common_redis::RedisClient;
use envconfig::Envconfig;
use futures::future::ready;
use health::HealthRegistry;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use insights_api::config::Config;
use insights_api::queries::PostQueries;
use insights_api::routes::{router, AppState};

fn setup_tracing() {
    let log_layer = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(log_layer).init();
}

async fn shutdown() {
    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("failed to register SIGTERM handler");
    let mut interrupt = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .expect("failed to register SIGINT handler");

    tokio::select! {
        _ = term.recv() => {},
        _ = interrupt.recv() => {},
    };

    info!("shutting down gracefully...");
}

pub async fn index() -> &'static str {
    "insights api"
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_tracing();
    info!("Starting insights api...");

    let config = Config::init_from_env()?;
    config.validate()?;

    let liveness = HealthRegistry::new("liveness");
    // The API is request-driven; its one component goes healthy at startup
    // and stays that way as long as the process lives.
    let handle = liveness
        .register("api".to_string(), Duration::days(365))
        .await;
    handle.report_healthy().await;

    let redis = Arc::new(RedisClient::new(config.redis_url.clone()).await?);
    let cache = FeedCache::new(redis);

    let pool = common_database::get_pool(&config.database_url, config.max_pg_connections).await?;
    let queries = Arc::new(PostQueries::new(pool));

    let state = AppState {
        cache,
        queries,
        insights_window: Duration::hours(config.insights_window_hours),
        trending_window: Duration::days(config.trending_window_days),
    };

    let app = Router::new()
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route("/_liveness", get(move || ready(liveness.get_status())))
        .merge(router(state));
    let app = common_metrics::setup_metrics_routes(app);

    let bind = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("insights api listening on {bind}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown())
        .await?;

    info!("insights api shut down cleanly");
    Ok(())
}
