use std::sync::Arc;
use std::time::Duration;

use common_kafka::{ConsumeError, PostConsumer};
use health::HealthHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

pub mod config;
pub mod handler;
pub mod metrics_consts;
pub mod sink;

use handler::{BatchSink, PostHandler};
use metrics_consts::{EMPTY_MESSAGES, MESSAGE_PARSE_ERROR, OFFSET_STORE_ERROR, POSTS_RECEIVED};

/// The pull loop: receive a post, fan it out, then ack its offset.
///
/// Offsets are stored after the handler returns whether or not the cache or
/// store writes succeeded — intentional at-least-once. Undecodable messages
/// come back as errors with their offset already stored, so they are
/// counted and skipped without wedging the partition.
pub async fn consumer_loop<S: BatchSink>(
    consumer: PostConsumer,
    handler: Arc<PostHandler<S>>,
    liveness: HealthHandle,
    shutdown: CancellationToken,
) {
    loop {
        liveness.report_healthy().await;

        let received = tokio::select! {
            _ = shutdown.cancelled() => return,
            received = consumer.recv_post() => received,
        };

        let message = match received {
            Ok(message) => message,
            Err(ConsumeError::EmptyPayload) => {
                warn!("received empty message");
                metrics::counter!(EMPTY_MESSAGES).increment(1);
                continue;
            }
            Err(ConsumeError::BadPost(e)) => {
                warn!("skipping undecodable message: {e}");
                metrics::counter!(MESSAGE_PARSE_ERROR).increment(1);
                continue;
            }
            Err(ConsumeError::Kafka(e)) => {
                error!("kafka receive error: {e}");
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };

        metrics::counter!(POSTS_RECEIVED).increment(1);
        let (post, ack) = message.into_parts();
        handler.handle_post(post).await;

        if let Err(e) = ack.store() {
            metrics::counter!(OFFSET_STORE_ERROR).increment(1);
            error!("failed to store offset: {e}");
        }
    }
}
