//! Queue service client capability
//!
//! The relay only ever needs three operations from the queue service:
//! receive a bounded batch, send a body, and delete a delivery by its receipt
//! handle. Backends:
//! - `memory`: in-process queues with visibility leases
//! - `test`: the memory backend plus a call log and failure injection
//! - `sqs`: Amazon SQS (behind the `sqs` feature)

pub mod memory;
#[cfg(feature = "sqs")]
pub mod sqs;

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use memory::MemoryQueueClient;
#[cfg(feature = "sqs")]
pub use sqs::SqsQueueClient;
pub use test::{Call, TestQueueClient};

use crate::error::QueueError;

/// Opaque token identifying one delivery of a message.
///
/// It is only valid while the delivery's visibility lease is held.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReceiptHandle(Arc<str>);

impl ReceiptHandle {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ReceiptHandle {
    fn from(value: &str) -> Self {
        Self(Arc::from(value))
    }
}

impl From<String> for ReceiptHandle {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

/// A message received from a source queue.
///
/// The body is relayed exactly as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub body: String,
    pub receipt: ReceiptHandle,
}

/// Parameters for a single receive call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveRequest {
    /// The queue to receive from
    pub queue: String,
    /// Upper bound on the number of messages returned
    pub max_messages: u8,
    /// How long the service may hold the call open while the queue is empty
    pub wait_time: Duration,
}

/// Operations the relay needs from the queue service.
///
/// Implementations must be safe to call concurrently from independent tasks.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Receive up to `request.max_messages` messages, waiting at most
    /// `request.wait_time` for one to become available.
    ///
    /// An empty batch is not an error.
    async fn receive(&self, request: &ReceiveRequest) -> Result<Vec<Message>, QueueError>;

    /// Send `body` to `queue`.
    async fn send(&self, queue: &str, body: &str) -> Result<(), QueueError>;

    /// Delete the delivery identified by `receipt` from `queue`.
    async fn delete(&self, queue: &str, receipt: &ReceiptHandle) -> Result<(), QueueError>;
}
