//! Route poller
//!
//! Drives one route through the relay unit until it fails:
//!
//! ```text
//!            Relayed(n)                Waited
//! Polling ───────────────▶ Waiting ───────────────▶ Polling
//!    │                        │
//!    │ Failed(e)              │ Shutdown
//!    ▼                        ▼
//! Terminated(Failed(e))   Terminated(Shutdown)
//! ```
//!
//! A failed pass is never retried. The route stays down until the process is
//! restarted.

use std::{sync::Arc, time::Duration};

use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::{
    config::{ReceiveSettings, Route},
    error::RelayError,
    internal,
    queue::{QueueClient, ReceiveRequest},
    relay::relay_batch,
    traits::FiniteStateMachine,
    Signal,
};

/// Why a poller stopped
#[derive(Debug, Clone)]
pub enum Termination {
    /// A relay pass failed
    Failed(RelayError),
    /// A shutdown signal was received
    Shutdown,
    /// The poller task panicked or was cancelled
    Aborted(String),
}

impl Termination {
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        !matches!(self, Self::Shutdown)
    }
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed(error) => write!(f, "failed: {error}"),
            Self::Shutdown => f.write_str("shut down"),
            Self::Aborted(reason) => write!(f, "aborted: {reason}"),
        }
    }
}

#[derive(Debug)]
pub enum PollerState {
    Polling,
    Waiting,
    Terminated(Termination),
}

#[derive(Debug)]
pub enum PollEvent {
    Relayed(usize),
    Failed(RelayError),
    Waited,
    Shutdown,
}

/// Counters kept over a poller's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteStats {
    /// Successful relay passes, including empty ones
    pub batches: u64,
    /// Messages relayed
    pub messages: u64,
}

impl FiniteStateMachine for PollerState {
    type Input = PollEvent;
    type Context = RouteStats;

    fn transition(self, input: Self::Input, stats: &mut Self::Context) -> Self {
        match (self, input) {
            (Self::Terminated(termination), _) => Self::Terminated(termination),
            (_, PollEvent::Shutdown) => Self::Terminated(Termination::Shutdown),
            (Self::Polling, PollEvent::Relayed(count)) => {
                stats.batches += 1;
                stats.messages += count as u64;
                Self::Waiting
            }
            (Self::Polling, PollEvent::Failed(error)) => {
                Self::Terminated(Termination::Failed(error))
            }
            (Self::Waiting, PollEvent::Waited) => Self::Polling,
            (state, event) => {
                internal!(level = WARN, "Ignoring {event:?} while {state:?}");
                state
            }
        }
    }
}

/// Relays one route until it fails or a shutdown signal arrives
pub struct Poller {
    route: Route,
    request: ReceiveRequest,
    client: Arc<dyn QueueClient>,
    shutdown: broadcast::Receiver<Signal>,
}

impl Poller {
    #[must_use]
    pub fn new(
        route: Route,
        settings: ReceiveSettings,
        client: Arc<dyn QueueClient>,
        shutdown: broadcast::Receiver<Signal>,
    ) -> Self {
        let request = ReceiveRequest {
            queue: route.source.clone(),
            max_messages: settings.batch_size(),
            wait_time: settings.wait_time(),
        };

        Self {
            route,
            request,
            client,
            shutdown,
        }
    }

    /// Run the poll loop to termination.
    ///
    /// Polling starts immediately. With an interval of zero the next poll
    /// follows the previous one directly, throttled only by the receive
    /// call's own wait time.
    #[tracing::instrument(level = "trace", skip_all, fields(source = %self.route.source))]
    pub async fn run(mut self) -> (Termination, RouteStats) {
        internal!(level = INFO, "Relaying {}", self.route);

        let mut stats = RouteStats::default();
        let mut state = PollerState::Polling;

        loop {
            let event = match state {
                PollerState::Polling => self.poll().await,
                PollerState::Waiting => self.wait().await,
                PollerState::Terminated(termination) => {
                    if let Termination::Failed(error) = &termination {
                        internal!(
                            level = ERROR,
                            queue = %self.route.source,
                            "Proxying from Queue {} has failed with error: {error}",
                            self.route.source
                        );
                    } else {
                        internal!(level = INFO, "Stopped relaying from {}", self.route.source);
                    }
                    return (termination, stats);
                }
            };

            state = state.transition(event, &mut stats);
        }
    }

    async fn poll(&mut self) -> PollEvent {
        if self.shutdown_requested() {
            return PollEvent::Shutdown;
        }

        match relay_batch(&*self.client, &self.request, &self.route.destinations).await {
            Ok(count) => PollEvent::Relayed(count),
            Err(error) => PollEvent::Failed(error),
        }
    }

    async fn wait(&mut self) -> PollEvent {
        let interval = self.route.interval();
        if interval == Duration::ZERO {
            return PollEvent::Waited;
        }

        tokio::select! {
            () = tokio::time::sleep(interval) => PollEvent::Waited,
            // A lagged or closed channel can only mean a shutdown was sent
            _ = self.shutdown.recv() => PollEvent::Shutdown,
        }
    }

    fn shutdown_requested(&mut self) -> bool {
        !matches!(self.shutdown.try_recv(), Err(TryRecvError::Empty))
    }
}
