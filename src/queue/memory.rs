use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::{sync::Notify, time::Instant};

use crate::{
    error::QueueError,
    queue::{Message, QueueClient, ReceiptHandle, ReceiveRequest},
};

const fn default_visibility_timeout() -> Duration {
    Duration::from_secs(30)
}

#[derive(Debug)]
struct Lease {
    receipt: ReceiptHandle,
    expires_at: Instant,
}

#[derive(Debug)]
struct Stored {
    body: String,
    lease: Option<Lease>,
}

impl Stored {
    fn is_visible(&self, now: Instant) -> bool {
        self.lease.as_ref().map_or(true, |lease| lease.expires_at <= now)
    }
}

#[derive(Debug)]
struct Inner {
    queues: Mutex<HashMap<String, VecDeque<Stored>>>,
    arrivals: Notify,
    visibility_timeout: Duration,
}

/// In-memory queue service
///
/// Queues must be declared before use; sending to or receiving from an
/// undeclared queue fails with [`QueueError::QueueNotFound`]. Received
/// messages are hidden for the visibility timeout and reappear if they are
/// not deleted before it runs out, at which point their receipt handle stops
/// being accepted.
///
/// Cloning shares the underlying queues.
#[derive(Debug, Clone)]
pub struct MemoryQueueClient {
    inner: Arc<Inner>,
}

impl Default for MemoryQueueClient {
    fn default() -> Self {
        Self::new(default_visibility_timeout())
    }
}

impl MemoryQueueClient {
    /// Create a client with no queues
    #[must_use]
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                queues: Mutex::new(HashMap::new()),
                arrivals: Notify::new(),
                visibility_timeout,
            }),
        }
    }

    /// Create a client with the default visibility timeout and the given queues
    #[must_use]
    pub fn with_queues<I, S>(queues: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let client = Self::default();
        for queue in queues {
            client.create_queue(queue);
        }
        client
    }

    /// Declare a queue. Declaring an existing queue leaves it untouched.
    pub fn create_queue(&self, queue: impl Into<String>) {
        self.inner.queues.lock().entry(queue.into()).or_default();
    }

    /// Number of messages stored in `queue`, leased or not
    #[must_use]
    pub fn len(&self, queue: &str) -> usize {
        self.inner.queues.lock().get(queue).map_or(0, VecDeque::len)
    }

    /// Whether `queue` holds no messages at all
    #[must_use]
    pub fn is_empty(&self, queue: &str) -> bool {
        self.len(queue) == 0
    }

    /// Bodies stored in `queue`, oldest first
    #[must_use]
    pub fn bodies(&self, queue: &str) -> Vec<String> {
        self.inner
            .queues
            .lock()
            .get(queue)
            .map(|messages| messages.iter().map(|m| m.body.clone()).collect())
            .unwrap_or_default()
    }

    fn lease_visible(&self, queue: &str, max: usize) -> Result<Vec<Message>, QueueError> {
        let mut queues = self.inner.queues.lock();
        let messages = queues
            .get_mut(queue)
            .ok_or_else(|| QueueError::QueueNotFound(queue.to_string()))?;

        let now = Instant::now();
        let expires_at = now + self.inner.visibility_timeout;

        Ok(messages
            .iter_mut()
            .filter(|stored| stored.is_visible(now))
            .take(max)
            .map(|stored| {
                let receipt = ReceiptHandle::from(ulid::Ulid::new().to_string());
                stored.lease = Some(Lease {
                    receipt: receipt.clone(),
                    expires_at,
                });
                Message {
                    body: stored.body.clone(),
                    receipt,
                }
            })
            .collect())
    }
}

#[async_trait]
impl QueueClient for MemoryQueueClient {
    async fn receive(&self, request: &ReceiveRequest) -> Result<Vec<Message>, QueueError> {
        let deadline = Instant::now() + request.wait_time;
        let max = usize::from(request.max_messages);

        loop {
            // Register interest before looking, so a send racing with the
            // check below still wakes us.
            let arrival = self.inner.arrivals.notified();
            tokio::pin!(arrival);
            arrival.as_mut().enable();

            let batch = self.lease_visible(&request.queue, max)?;
            if !batch.is_empty() || Instant::now() >= deadline {
                return Ok(batch);
            }

            if tokio::time::timeout_at(deadline, arrival).await.is_err() {
                return self.lease_visible(&request.queue, max);
            }
        }
    }

    async fn send(&self, queue: &str, body: &str) -> Result<(), QueueError> {
        self.inner
            .queues
            .lock()
            .get_mut(queue)
            .ok_or_else(|| QueueError::QueueNotFound(queue.to_string()))?
            .push_back(Stored {
                body: body.to_string(),
                lease: None,
            });

        self.inner.arrivals.notify_waiters();
        Ok(())
    }

    async fn delete(&self, queue: &str, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        let mut queues = self.inner.queues.lock();
        let messages = queues
            .get_mut(queue)
            .ok_or_else(|| QueueError::QueueNotFound(queue.to_string()))?;

        let now = Instant::now();
        let position = messages.iter().position(|stored| {
            stored
                .lease
                .as_ref()
                .is_some_and(|lease| &lease.receipt == receipt && lease.expires_at > now)
        });

        match position {
            Some(index) => {
                messages.remove(index);
                Ok(())
            }
            None => Err(QueueError::ReceiptInvalid {
                queue: queue.to_string(),
                receipt: receipt.clone(),
            }),
        }
    }
}
