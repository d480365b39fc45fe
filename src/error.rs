//! Error types for the queue-relay crate.
//!
//! Failures are split by layer: the queue service client reports
//! [`QueueError`], the relay unit wraps those into [`RelayError`] with enough
//! context to tell which step of a batch failed, and configuration loading
//! reports [`ConfigError`].

use std::{io, path::PathBuf};

use thiserror::Error;

use crate::queue::ReceiptHandle;

/// The queue service operation a [`QueueError`] was raised from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Receive,
    Send,
    Delete,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Receive => "receive",
            Self::Send => "send",
            Self::Delete => "delete",
        })
    }
}

/// Errors returned by a [`crate::queue::QueueClient`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    /// The queue does not exist (or is not visible to this client).
    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    /// The receipt handle is unknown, or the visibility lease it belonged to
    /// has already expired.
    #[error("Receipt handle {receipt} is not valid for queue {queue}")]
    ReceiptInvalid { queue: String, receipt: ReceiptHandle },

    /// The service returned a message that cannot be relayed.
    #[error("Malformed message from queue {queue}: {reason}")]
    Malformed { queue: String, reason: String },

    /// Transport or service level failure.
    #[error("Queue service {operation} on {queue} failed: {message}")]
    Service {
        queue: String,
        operation: Operation,
        message: String,
    },

    /// Failure injected by the test backend.
    #[error("Injected {operation} failure on {queue}")]
    Injected { queue: String, operation: Operation },
}

/// Failure of a single relay pass over one received batch.
///
/// `processed` is the number of messages from the batch that had already been
/// forwarded to every destination and deleted from the source when the
/// failure happened. Those stay delivered.
#[derive(Debug, Clone, Error)]
pub enum RelayError {
    #[error("Failed to receive from {queue}: {source}")]
    Receive {
        queue: String,
        #[source]
        source: QueueError,
    },

    #[error("Failed to forward message from {queue} to {destination} ({processed} already relayed): {source}")]
    Send {
        queue: String,
        destination: String,
        processed: usize,
        #[source]
        source: QueueError,
    },

    #[error("Failed to delete message from {queue} ({processed} already relayed): {source}")]
    Delete {
        queue: String,
        processed: usize,
        #[source]
        source: QueueError,
    },
}

impl RelayError {
    /// The underlying queue service failure.
    #[must_use]
    pub const fn cause(&self) -> &QueueError {
        match self {
            Self::Receive { source, .. }
            | Self::Send { source, .. }
            | Self::Delete { source, .. } => source,
        }
    }

    /// Messages from the failing batch that were fully relayed before the error.
    #[must_use]
    pub const fn processed(&self) -> usize {
        match self {
            Self::Receive { .. } => 0,
            Self::Send { processed, .. } | Self::Delete { processed, .. } => *processed,
        }
    }
}

/// Errors raised while loading the relay configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to read configuration from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid TOML configuration in {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid JSON configuration in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
