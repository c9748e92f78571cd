pub mod breaker;
pub mod config;
pub mod fetch;
pub mod metrics_consts;
pub mod orchestrator;
pub mod publish;
pub mod sources;
pub mod validation;
