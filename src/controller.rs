use std::{sync::Arc, sync::LazyLock, time::Duration};

use tokio::{sync::broadcast, task::JoinSet};

use crate::{
    config::{Backend, ReceiveSettings, RelayConfig, Route, RouteSet},
    internal,
    poller::{Poller, RouteStats, Termination},
    queue::{MemoryQueueClient, QueueClient},
    Signal,
};

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

/// How a route's poller ended
#[derive(Debug, Clone)]
pub struct RouteReport {
    pub source: String,
    pub stats: RouteStats,
    pub termination: Termination,
}

/// Runs one poller per route and waits for all of them to finish
pub struct Orchestrator {
    client: Arc<dyn QueueClient>,
    settings: ReceiveSettings,
}

impl Orchestrator {
    #[must_use]
    pub fn new(client: Arc<dyn QueueClient>, settings: ReceiveSettings) -> Self {
        Self { client, settings }
    }

    /// Start a poller for every route and block until each has terminated.
    ///
    /// Routes are independent: one route failing leaves the others running.
    /// The reports come back in route order.
    #[tracing::instrument(level = "trace", skip_all, fields(routes = routes.len()))]
    pub async fn run(
        &self,
        routes: &RouteSet,
        shutdown: &broadcast::Sender<Signal>,
    ) -> Vec<RouteReport> {
        let mut pollers = JoinSet::new();
        let mut reports: Vec<Option<RouteReport>> = vec![None; routes.len()];

        for (index, route) in routes.iter().enumerate() {
            let poller = Poller::new(
                route.clone(),
                self.settings,
                Arc::clone(&self.client),
                shutdown.subscribe(),
            );
            let source = route.source.clone();

            pollers.spawn(async move {
                let (termination, stats) = poller.run().await;
                (
                    index,
                    RouteReport {
                        source,
                        stats,
                        termination,
                    },
                )
            });
        }

        internal!(level = INFO, "Started {} route(s)", routes.len());

        while let Some(joined) = pollers.join_next().await {
            match joined {
                Ok((index, report)) => {
                    internal!(
                        "Route {} finished after {} batches ({} messages), {} still running",
                        report.source,
                        report.stats.batches,
                        report.stats.messages,
                        pollers.len()
                    );
                    reports[index] = Some(report);
                }
                Err(error) => {
                    internal!(level = ERROR, "Route poller task ended abnormally: {error}");
                }
            }
        }

        reports
            .into_iter()
            .zip(routes.iter())
            .map(|(report, route)| report.unwrap_or_else(|| aborted(route)))
            .collect()
    }
}

fn aborted(route: &Route) -> RouteReport {
    RouteReport {
        source: route.source.clone(),
        stats: RouteStats::default(),
        termination: Termination::Aborted("poller task panicked".to_string()),
    }
}

async fn shutdown() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                internal!(level = INFO, "CTRL+C entered -- Enter it again to force shutdown");
            }
            _ = terminate.recv() => {
                internal!(level = INFO, "Terminate Signal received, shutting down");
            }
        };
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        internal!(level = INFO, "CTRL+C entered -- Enter it again to force shutdown");
    }

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    tokio::signal::ctrl_c().await?;
    anyhow::bail!("Forced shutdown, in-flight messages will be redelivered after their lease expires")
}

/// The relay process: configuration plus the client it relays through
pub struct Relay {
    config: RelayConfig,
    client: Arc<dyn QueueClient>,
}

impl Relay {
    /// Build the queue client described by `config.backend`.
    pub async fn from_config(config: RelayConfig) -> Self {
        let client: Arc<dyn QueueClient> = match &config.backend {
            #[cfg(feature = "sqs")]
            Backend::Sqs {
                region,
                endpoint_url,
            } => Arc::new(
                crate::queue::SqsQueueClient::from_env(region.clone(), endpoint_url.clone()).await,
            ),
            #[cfg(not(feature = "sqs"))]
            Backend::Sqs { .. } => {
                internal!(
                    level = WARN,
                    "Built without SQS support, relaying through in-memory queues instead"
                );
                Arc::new(memory_client(&config.routes, Duration::from_secs(30)))
            }
            Backend::Memory {
                visibility_timeout_secs,
            } => Arc::new(memory_client(
                &config.routes,
                Duration::from_secs(*visibility_timeout_secs),
            )),
        };

        Self::with_client(config, client)
    }

    /// Relay through an already constructed client
    #[must_use]
    pub fn with_client(config: RelayConfig, client: Arc<dyn QueueClient>) -> Self {
        Self { config, client }
    }

    /// Run every route until all of them have terminated, or until the process
    /// is asked to stop.
    ///
    /// # Errors
    ///
    /// If the signal handlers cannot be installed, or a second interrupt
    /// forces the relay down before the routes have stopped.
    pub async fn run(self) -> anyhow::Result<Vec<RouteReport>> {
        internal!(level = INFO, "Relay running\n{}", self.config);

        let orchestrator = Orchestrator::new(self.client, self.config.receive);

        let reports = tokio::select! {
            reports = orchestrator.run(&self.config.routes, &SHUTDOWN_BROADCAST) => reports,
            r = shutdown() => {
                r?;
                Vec::new()
            }
        };

        for report in &reports {
            if report.termination.is_failure() {
                internal!(
                    level = ERROR,
                    "Route {} is down ({}) after relaying {} messages",
                    report.source,
                    report.termination,
                    report.stats.messages
                );
            } else {
                internal!(
                    level = INFO,
                    "Route {} stopped after relaying {} messages",
                    report.source,
                    report.stats.messages
                );
            }
        }

        internal!(level = INFO, "Shutting down...");

        Ok(reports)
    }
}

/// In-memory client with a queue declared for every source and destination
fn memory_client(routes: &RouteSet, visibility_timeout: Duration) -> MemoryQueueClient {
    let client = MemoryQueueClient::new(visibility_timeout);
    for route in routes {
        client.create_queue(route.source.as_str());
        for destination in &route.destinations {
            client.create_queue(destination.as_str());
        }
    }
    client
}
