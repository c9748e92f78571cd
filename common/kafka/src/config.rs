use envconfig::Envconfig;

#[derive(Envconfig, Clone)]
pub struct KafkaConfig {
    #[envconfig(default = "localhost:9092")]
    pub kafka_hosts: String,

    // The producer accumulates for up to this long before flushing a batch
    #[envconfig(default = "100")]
    pub kafka_producer_linger_ms: u32,

    // ...or until this many messages are queued, whichever comes first
    #[envconfig(default = "1000")]
    pub kafka_producer_batch_messages: u32,

    #[envconfig(default = "3")]
    pub kafka_producer_max_retries: u32,

    // Time before we stop retrying producing a message: 20 seconds
    #[envconfig(default = "20000")]
    pub kafka_message_timeout_ms: u32,

    #[envconfig(default = "none")]
    pub kafka_compression_codec: String, // none, gzip, snappy, lz4, zstd

    #[envconfig(default = "false")]
    pub kafka_tls: bool,
}

#[derive(Envconfig, Clone)]
pub struct ConsumerConfig {
    pub kafka_consumer_group: String,
    pub kafka_consumer_topic: String,

    // "earliest" so a fresh consumer group replays the topic from the start
    #[envconfig(default = "earliest")]
    pub kafka_consumer_offset_reset: String, // earliest, latest

    // Interval between commits of the explicitly stored offsets
    #[envconfig(default = "5000")]
    pub kafka_consumer_commit_interval_ms: i32,
}

impl ConsumerConfig {
    /// The group and topic are application specific, so no good defaults can
    /// live in the derive macro; services set theirs before init'ing their
    /// main config struct.
    pub fn set_defaults(consumer_group: &str, consumer_topic: &str) {
        if std::env::var("KAFKA_CONSUMER_GROUP").is_err() {
            std::env::set_var("KAFKA_CONSUMER_GROUP", consumer_group);
        };
        if std::env::var("KAFKA_CONSUMER_TOPIC").is_err() {
            std::env::set_var("KAFKA_CONSUMER_TOPIC", consumer_topic);
        };
    }
}
