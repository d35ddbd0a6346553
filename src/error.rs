//! Error types for the relay bot.

use std::path::PathBuf;
use std::time::Duration;

use crate::relay::types::UserId;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors talking to the chat platform. This is the delivery error of the
/// relay: every outbound call returns it on failure.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Channel {name} call timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    #[error("Invalid response from channel {name}: {reason}")]
    InvalidResponse { name: String, reason: String },
}

/// Snapshot file read/write failures.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error on {path}: {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Identity store errors.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Alias space exhausted after {attempts} attempts")]
    AliasSpaceExhausted { attempts: u32 },
}

/// Access control errors.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("The owner ({0}) cannot be blocked")]
    SelfBlock(UserId),
}

/// Per-event relay failures. Each one is translated into a user-visible
/// notice by the router and never escapes the event boundary.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Sender {0} is blocked")]
    AccessDenied(UserId),

    #[error("Sender {0} exceeded the message rate")]
    RateLimited(UserId),

    #[error("User {user} is not allowed to run /{command}")]
    UnauthorizedCommand { user: UserId, command: String },

    #[error("Delivery failed: {0}")]
    Delivery(#[from] ChannelError),

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("Unknown target: {0}")]
    UnknownTarget(String),

    #[error("Malformed callback data: {0}")]
    MalformedCallback(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
