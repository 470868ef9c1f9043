//! # dbapi-server
//!
//! HTTP server for dbapi.
//!
//! This crate provides:
//! - Bounded in-memory message channels (the messaging endpoints)
//! - The instance info endpoint
//! - Token-based authentication with an optional localhost exemption
//! - YAML and environment configuration
//! - Prometheus metrics
//!
//! The relational-store endpoints are routed but not hosted here.

pub mod auth;
pub mod broker;
pub mod config;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod server;

pub use auth::{Authenticator, TokenValidator, TOKEN_HEADER};
pub use broker::ChannelBroker;
pub use config::{
    AuthConfig, BrokerConfig, Config, ConfigError, HttpsInfoConfig, MetricsConfig, NetworkConfig,
};
pub use error::{BrokerError, ServerError};
pub use handler::{ApiRequest, CommandHandler};
pub use metrics::{run_metrics_server, Metrics};
pub use server::{Server, ServerConfig, ServerStats};
