//! Relays messages between queues.
//!
//! Every configured route drains a source queue and copies each message to
//! all of the route's destination queues before deleting it from the source.
//! Each route is polled by its own task; a route whose relay pass fails stops
//! for good while the other routes carry on.

pub mod config;
pub mod controller;
pub mod error;
pub mod logging;
pub mod poller;
pub mod queue;
pub mod relay;
pub mod traits;

pub use config::{Backend, ReceiveSettings, RelayConfig, Route, RouteSet};
pub use controller::{Orchestrator, Relay, RouteReport, SHUTDOWN_BROADCAST};
pub use error::{ConfigError, Operation, QueueError, RelayError};
pub use poller::{Poller, RouteStats, Termination};
pub use queue::{Message, QueueClient, ReceiptHandle, ReceiveRequest};
pub use relay::relay_batch;
pub use tracing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
}
