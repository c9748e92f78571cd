use std::sync::Arc;

use rdkafka::{
    consumer::{Consumer, StreamConsumer},
    error::KafkaError,
    ClientConfig, Message,
};

use common_types::Post;

use crate::config::{ConsumerConfig, KafkaConfig};

#[derive(Debug, thiserror::Error)]
pub enum ConsumeError {
    #[error("kafka error: {0}")]
    Kafka(#[from] KafkaError),
    #[error("message with empty payload")]
    EmptyPayload,
    #[error("undecodable post: {0}")]
    BadPost(#[from] serde_json::Error),
}

/// Consumer-group member on the post topic.
///
/// This is deliberately not a generic bus consumer: the wire format is the
/// JSON `Post` and the skip-on-parse-failure policy lives here. A message
/// that cannot become a post has its offset stored before the error is
/// returned, so a poison pill can never wedge its partition — the caller
/// only ever holds well-formed posts plus the ack for each.
pub struct PostConsumer {
    consumer: Arc<StreamConsumer>,
    topic: Arc<str>,
}

impl PostConsumer {
    pub fn new(
        common_config: KafkaConfig,
        consumer_config: ConsumerConfig,
    ) -> Result<Self, KafkaError> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &common_config.kafka_hosts)
            .set("statistics.interval.ms", "10000")
            .set("group.id", consumer_config.kafka_consumer_group)
            .set(
                "auto.offset.reset",
                consumer_config.kafka_consumer_offset_reset,
            )
            .set("enable.auto.commit", "true")
            .set(
                "auto.commit.interval.ms",
                consumer_config.kafka_consumer_commit_interval_ms.to_string(),
            )
            // Offsets are stored one by one as posts are acked, and the
            // commit timer picks them up from there
            .set("enable.auto.offset.store", "false");

        if common_config.kafka_tls {
            client_config
                .set("security.protocol", "ssl")
                .set("enable.ssl.certificate.verification", "false");
        };

        let consumer: StreamConsumer = client_config.create()?;
        consumer.subscribe(&[consumer_config.kafka_consumer_topic.as_str()])?;

        Ok(Self {
            consumer: Arc::new(consumer),
            topic: consumer_config.kafka_consumer_topic.into(),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Receive and decode the next post. Empty or undecodable payloads are
    /// skipped-and-committed: their offset is stored on the spot and the
    /// decode failure comes back as the error, for the caller to count.
    pub async fn recv_post(&self) -> Result<PostMessage, ConsumeError> {
        let message = self.consumer.recv().await?;
        let partition = message.partition();
        let offset = message.offset();

        let decoded: Result<Post, ConsumeError> = match message.payload() {
            None => Err(ConsumeError::EmptyPayload),
            Some(payload) => serde_json::from_slice(payload).map_err(ConsumeError::from),
        };

        match decoded {
            Ok(post) => Ok(PostMessage {
                post,
                ack: OffsetAck {
                    consumer: self.consumer.clone(),
                    topic: self.topic.clone(),
                    partition,
                    offset,
                },
            }),
            Err(decode_err) => {
                self.consumer.store_offset(&self.topic, partition, offset)?;
                Err(decode_err)
            }
        }
    }
}

/// A decoded post together with the handle that advances its offset.
pub struct PostMessage {
    pub post: Post,
    ack: OffsetAck,
}

impl PostMessage {
    pub fn into_parts(self) -> (Post, OffsetAck) {
        (self.post, self.ack)
    }
}

/// Stores the message's offset when consumed. Until then, a rebalance or
/// restart redelivers the post — that redelivery is the at-least-once half
/// of the pipeline's contract; the store's id conflict handling is the
/// other.
pub struct OffsetAck {
    consumer: Arc<StreamConsumer>,
    topic: Arc<str>,
    partition: i32,
    offset: i64,
}

impl OffsetAck {
    pub fn store(self) -> Result<(), KafkaError> {
        self.consumer
            .store_offset(&self.topic, self.partition, self.offset)
    }
}
