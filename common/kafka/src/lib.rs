pub mod config;
pub mod kafka_consumer;
pub mod kafka_producer;

pub use config::{ConsumerConfig, KafkaConfig};
pub use kafka_consumer::{ConsumeError, OffsetAck, PostConsumer, PostMessage};
pub use kafka_producer::{PostProducer, ProduceError};
