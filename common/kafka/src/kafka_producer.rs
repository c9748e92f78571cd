use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use health::HealthHandle;
use rdkafka::error::KafkaError;
use rdkafka::producer::{DeliveryFuture, FutureProducer, FutureRecord, Producer};
use rdkafka::ClientConfig;
use serde_json::error::Error as SerdeError;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use common_types::Post;

use crate::config::KafkaConfig;

pub struct KafkaContext {
    liveness: HealthHandle,
}

impl rdkafka::ClientContext for KafkaContext {
    fn stats(&self, _: rdkafka::Statistics) {
        // Signal liveness, as the main rdkafka loop is running and calling us
        self.liveness.report_healthy_blocking();
    }
}

#[derive(Error, Debug)]
pub enum ProduceError {
    #[error("failed to serialize post: {0}")]
    Serialization(#[from] SerdeError),
    #[error("failed to enqueue to kafka: {0}")]
    Kafka(#[from] KafkaError),
}

/// Enqueue-only producer for the post topic. `send_post` returns as soon as
/// the message is queued; delivery outcomes land on a background drain task
/// that feeds the delivered/failed counters, so callers observe produce
/// health only in aggregate.
pub struct PostProducer {
    producer: FutureProducer<KafkaContext>,
    topic: String,
    deliveries: mpsc::UnboundedSender<DeliveryFuture>,
    delivered: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
}

impl PostProducer {
    pub async fn new(
        config: &KafkaConfig,
        topic: String,
        liveness: HealthHandle,
    ) -> Result<PostProducer, KafkaError> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.kafka_hosts)
            .set("statistics.interval.ms", "10000")
            .set("linger.ms", config.kafka_producer_linger_ms.to_string())
            .set(
                "batch.num.messages",
                config.kafka_producer_batch_messages.to_string(),
            )
            .set(
                "message.send.max.retries",
                config.kafka_producer_max_retries.to_string(),
            )
            .set(
                "message.timeout.ms",
                config.kafka_message_timeout_ms.to_string(),
            )
            .set(
                "compression.codec",
                config.kafka_compression_codec.to_owned(),
            );

        if config.kafka_tls {
            client_config
                .set("security.protocol", "ssl")
                .set("enable.ssl.certificate.verification", "false");
        };

        debug!("rdkafka configuration: {:?}", client_config);
        let producer: FutureProducer<KafkaContext> =
            client_config.create_with_context(KafkaContext { liveness })?;

        // "Ping" the Kafka brokers by requesting metadata
        match producer
            .client()
            .fetch_metadata(None, Duration::from_secs(2))
        {
            Ok(metadata) => {
                info!(
                    "Successfully connected to Kafka brokers. Found {} topics.",
                    metadata.topics().len()
                );
            }
            Err(error) => {
                error!("Failed to fetch metadata from Kafka brokers: {:?}", error);
                return Err(error);
            }
        }

        let delivered = Arc::new(AtomicU64::new(0));
        let failed = Arc::new(AtomicU64::new(0));

        let (tx, mut rx) = mpsc::unbounded_channel::<DeliveryFuture>();
        let drain_delivered = delivered.clone();
        let drain_failed = failed.clone();
        tokio::spawn(async move {
            while let Some(delivery) = rx.recv().await {
                match delivery.await {
                    Ok(Ok(_)) => {
                        drain_delivered.fetch_add(1, Ordering::Relaxed);
                        metrics::counter!("kafka_posts_delivered").increment(1);
                    }
                    Ok(Err((err, _))) => {
                        drain_failed.fetch_add(1, Ordering::Relaxed);
                        metrics::counter!("kafka_posts_failed").increment(1);
                        error!("kafka delivery failed: {err}");
                    }
                    Err(_) => {
                        // Cancelled while retrying, counts as a failure
                        drain_failed.fetch_add(1, Ordering::Relaxed);
                        metrics::counter!("kafka_posts_failed").increment(1);
                        error!("kafka delivery cancelled (timeout)");
                    }
                }
            }
        });

        Ok(PostProducer {
            producer,
            topic,
            deliveries: tx,
            delivered,
            failed,
        })
    }

    /// Enqueue a post, keyed by its id for stable partitioning. Returns as
    /// soon as the message sits in the producer queue; a full queue is the
    /// only immediate error.
    pub fn send_post(&self, post: &Post) -> Result<(), ProduceError> {
        let payload = serde_json::to_string(post)?;

        let record = FutureRecord::to(&self.topic)
            .key(&post.id)
            .payload(&payload);

        match self.producer.send_result(record) {
            Ok(delivery) => {
                if self.deliveries.send(delivery).is_err() {
                    warn!("delivery drain task is gone, outcomes untracked");
                }
                Ok(())
            }
            Err((err, _)) => Err(ProduceError::Kafka(err)),
        }
    }

    /// (delivered, failed) totals since startup.
    pub fn delivery_stats(&self) -> (u64, u64) {
        (
            self.delivered.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
        )
    }

    /// Wait for in-flight messages, bounded by `timeout`.
    pub fn flush(&self, timeout: Duration) -> Result<(), KafkaError> {
        self.producer.flush(timeout)
    }
}
