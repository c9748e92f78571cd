use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Json, Router};
use common_cache::FeedCache;
use common_kafka::PostProducer;
use common_redis::RedisClient;
use envconfig::Envconfig;
use futures::future::ready;
use health::HealthRegistry;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crawler::breaker::{BreakerConfig, CircuitBreaker};
use crawler::config::Config;
use crawler::fetch::HttpClient;
use crawler::orchestrator::{Orchestrator, SourceRunner};
use crawler::publish::PostPipeline;
use crawler::sources::{DevtoAdapter, HackerNewsAdapter, MediumAdapter};

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
    "crawler service"
}

fn start_server(
    config: &Config,
    liveness: HealthRegistry,
    orchestrator: Arc<Orchestrator>,
    shutdown: CancellationToken,
) {
    let router = Router::new()
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route("/_liveness", get(move || ready(liveness.get_status())))
        .route("/status", get(move || ready(Json(orchestrator.metrics()))));
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
    // A .env file is optional; real deployments set the environment directly
    dotenvy::dotenv().ok();
    setup_tracing();
    info!("Starting crawler service...");

    let config = Config::init_from_env()?;
    config.validate()?;

    let liveness = HealthRegistry::new("liveness");

    let redis = Arc::new(RedisClient::new(config.redis_url.clone()).await?);
    let cache = FeedCache::new(redis);

    let producer_liveness = liveness
        .register("rdkafka".to_string(), chrono::Duration::seconds(60))
        .await;
    let producer = Arc::new(
        PostProducer::new(&config.kafka, config.kafka_topic.clone(), producer_liveness).await?,
    );

    let http_client = || {
        HttpClient::new(
            Duration::from_secs(config.http_timeout_secs),
            config.http_max_retries,
        )
    };

    let orchestrator = Arc::new(Orchestrator::new());

    orchestrator.register(
        "hn",
        SourceRunner {
            adapter: Arc::new(HackerNewsAdapter::new(
                http_client()?,
                config.hn_stories_limit,
            )),
            pipeline: PostPipeline::new(producer.clone(), cache.clone(), "hn"),
            breaker: Arc::new(CircuitBreaker::new("hn", BreakerConfig::default())),
            interval: Duration::from_secs(config.hn_crawl_interval_secs),
        },
    );
    orchestrator.register(
        "devto",
        SourceRunner {
            adapter: Arc::new(DevtoAdapter::new(
                http_client()?,
                config.devto_tags.names.clone(),
                config.devto_posts_per_tag,
            )),
            pipeline: PostPipeline::new(producer.clone(), cache.clone(), "devto"),
            breaker: Arc::new(CircuitBreaker::new("devto", BreakerConfig::default())),
            interval: Duration::from_secs(config.devto_crawl_interval_secs),
        },
    );
    orchestrator.register(
        "medium",
        SourceRunner {
            adapter: Arc::new(MediumAdapter::new(
                http_client()?,
                config.medium_topics.names.clone(),
                config.medium_posts_per_topic,
            )),
            pipeline: PostPipeline::new(producer.clone(), cache.clone(), "medium"),
            breaker: Arc::new(CircuitBreaker::new("medium", BreakerConfig::default())),
            interval: Duration::from_secs(config.medium_crawl_interval_secs),
        },
    );

    let shutdown = CancellationToken::new();

    let schedules = [
        ("hn", config.hn_crawl_interval_secs),
        ("devto", config.devto_crawl_interval_secs),
        ("medium", config.medium_crawl_interval_secs),
    ];
    let mut loops = Vec::with_capacity(schedules.len());
    for (source, interval_secs) in schedules {
        // A loop that misses three intervals in a row is stuck
        let deadline = chrono::Duration::seconds((interval_secs * 3) as i64);
        let loop_liveness = liveness
            .register(format!("crawler-{source}"), deadline)
            .await;
        loops.push(tokio::spawn(orchestrator.clone().run_scheduler_loop(
            source.to_string(),
            loop_liveness,
            shutdown.clone(),
        )));
    }

    start_server(
        &config,
        liveness.clone(),
        orchestrator.clone(),
        shutdown.clone(),
    );

    tokio::spawn(shutdown_signal(shutdown.clone()));
    shutdown.cancelled().await;

    for handle in loops {
        if let Err(e) = handle.await {
            warn!("scheduler task failed to join: {e}");
        }
    }

    // Wait for in-flight publishes before exiting
    if let Err(e) = producer.flush(Duration::from_secs(10)) {
        warn!("producer flush failed during shutdown: {e}");
    }
    let (delivered, failed) = producer.delivery_stats();
    info!("crawler shut down cleanly ({delivered} delivered, {failed} failed)");

    Ok(())
}
