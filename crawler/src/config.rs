use std::str::FromStr;

use common_kafka::KafkaConfig;
use envconfig::Envconfig;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("kafka brokers not configured")]
    MissingKafkaBrokers,
    #[error("kafka topic not configured")]
    MissingKafkaTopic,
    #[error("redis url not configured")]
    MissingRedisUrl,
}

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(nested = true)]
    pub kafka: KafkaConfig,

    #[envconfig(default = "raw_posts")]
    pub kafka_topic: String,

    #[envconfig(default = "redis://localhost:6379")]
    pub redis_url: String,

    #[envconfig(default = "300")]
    pub hn_crawl_interval_secs: u64,

    #[envconfig(default = "30")]
    pub hn_stories_limit: usize,

    #[envconfig(default = "600")]
    pub devto_crawl_interval_secs: u64,

    #[envconfig(default = "6")]
    pub devto_posts_per_tag: usize,

    #[envconfig(default = "ai,machine-learning,cloud,devops,startups")]
    pub devto_tags: NameList,

    #[envconfig(default = "600")]
    pub medium_crawl_interval_secs: u64,

    #[envconfig(default = "10")]
    pub medium_posts_per_topic: usize,

    #[envconfig(
        default = "machine-learning,artificial-intelligence,cloud-computing,devops,startups"
    )]
    pub medium_topics: NameList,

    #[envconfig(default = "10")]
    pub http_timeout_secs: u64,

    #[envconfig(default = "3")]
    pub http_max_retries: u32,

    #[envconfig(from = "BIND_HOST", default = "::")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3300")]
    pub port: u16,
}

impl Config {
    /// A config with an empty broker list, topic or cache URL is fatal at
    /// startup; everything else has workable defaults.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.kafka.kafka_hosts.trim().is_empty() {
            return Err(ConfigError::MissingKafkaBrokers);
        }
        if self.kafka_topic.trim().is_empty() {
            return Err(ConfigError::MissingKafkaTopic);
        }
        if self.redis_url.trim().is_empty() {
            return Err(ConfigError::MissingRedisUrl);
        }
        Ok(())
    }
}

/// Comma-separated list env value; blanks are dropped.
#[derive(Clone, Debug, Default)]
pub struct NameList {
    pub names: Vec<String>,
}

impl FromStr for NameList {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let names = s
            .split(',')
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect();
        Ok(NameList { names })
    }
}
