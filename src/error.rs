//! Error types for Astro Assist.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Channel health check failed: {name}")]
    HealthCheckFailed { name: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },
}

/// Durable queue errors.
///
/// `Transport` is what callers of `enqueue` must handle: the broker did not
/// acknowledge persistence, so the item must not be assumed queued.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Queue transport error: {0}")]
    Transport(#[from] DatabaseError),

    #[error("Failed to encode queue payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Upstream gateway errors. Never escape a gateway's public methods; they are
/// converted to the gateway's degraded result at the boundary.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{service} unreachable: {reason}")]
    Transport { service: &'static str, reason: String },

    #[error("{service} returned HTTP {status}")]
    Status { service: &'static str, status: u16 },

    #[error("{service} returned a malformed body: {reason}")]
    Malformed { service: &'static str, reason: String },
}

impl GatewayError {
    pub(crate) fn from_reqwest(service: &'static str, e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            Self::Status {
                service,
                status: status.as_u16(),
            }
        } else if e.is_decode() {
            Self::Malformed {
                service,
                reason: e.to_string(),
            }
        } else {
            Self::Transport {
                service,
                reason: e.to_string(),
            }
        }
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
