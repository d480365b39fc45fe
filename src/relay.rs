//! The relay unit: one receive, forward, delete pass over a source queue

use crate::{
    error::RelayError,
    incoming, outgoing,
    queue::{QueueClient, ReceiveRequest},
};

/// Receive one batch from `source` and move it to `destinations`.
///
/// Each message is sent, unmodified, to every destination in list order and
/// is deleted from the source only once all of those sends have succeeded.
/// Messages are handled one at a time in the order they were received.
///
/// The first failure ends the pass: remaining destinations and remaining
/// messages are not attempted, and the failing message is left on the
/// source, where it becomes visible again once its lease runs out. Messages
/// relayed earlier in the batch stay relayed. A destination that already
/// accepted the failing message will receive it again on the next pass.
///
/// Returns the number of messages relayed; an empty batch relays zero and
/// touches nothing.
///
/// # Errors
/// The first receive, send, or delete failure, with the number of messages
/// from this batch already relayed.
pub async fn relay_batch(
    client: &dyn QueueClient,
    source: &ReceiveRequest,
    destinations: &[String],
) -> Result<usize, RelayError> {
    let batch = client
        .receive(source)
        .await
        .map_err(|source_error| RelayError::Receive {
            queue: source.queue.clone(),
            source: source_error,
        })?;

    if batch.is_empty() {
        return Ok(0);
    }

    incoming!(
        level = INFO,
        queue = %source.queue,
        count = batch.len(),
        "{} messages to proxy from Queue {}",
        batch.len(),
        source.queue
    );

    for (processed, message) in batch.iter().enumerate() {
        for destination in destinations {
            client
                .send(destination, &message.body)
                .await
                .map_err(|cause| RelayError::Send {
                    queue: source.queue.clone(),
                    destination: destination.clone(),
                    processed,
                    source: cause,
                })?;

            outgoing!(queue = %source.queue, destination = %destination, "Forwarded message");
        }

        client
            .delete(&source.queue, &message.receipt)
            .await
            .map_err(|cause| RelayError::Delete {
                queue: source.queue.clone(),
                processed,
                source: cause,
            })?;
    }

    Ok(batch.len())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        error::{Operation, QueueError},
        queue::{Call, TestQueueClient},
    };

    fn request(queue: &str) -> ReceiveRequest {
        ReceiveRequest {
            queue: queue.to_string(),
            max_messages: 10,
            wait_time: Duration::ZERO,
        }
    }

    fn destinations(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    fn send(queue: &str, body: &str) -> Call {
        Call::Send {
            queue: queue.to_string(),
            body: body.to_string(),
        }
    }

    fn delete(queue: &str, body: &str) -> Call {
        Call::Delete {
            queue: queue.to_string(),
            body: body.to_string(),
        }
    }

    #[tokio::test]
    async fn test_empty_batch_has_no_side_effects() {
        let client = TestQueueClient::with_queues(["src", "d1"]);

        let moved = relay_batch(&client, &request("src"), &destinations(&["d1"]))
            .await
            .unwrap();

        assert_eq!(moved, 0);
        assert_eq!(client.count(Operation::Receive), 1);
        assert_eq!(client.count(Operation::Send), 0);
        assert_eq!(client.count(Operation::Delete), 0);
    }

    #[tokio::test]
    async fn test_relay_order() {
        let client = TestQueueClient::with_queues(["src", "d1", "d2"]);
        client.seed("src", ["m1", "m2"]).await.unwrap();

        let moved = relay_batch(&client, &request("src"), &destinations(&["d1", "d2"]))
            .await
            .unwrap();

        assert_eq!(moved, 2);
        assert_eq!(
            client.calls_without_receives(),
            vec![
                send("d1", "m1"),
                send("d2", "m1"),
                delete("src", "m1"),
                send("d1", "m2"),
                send("d2", "m2"),
                delete("src", "m2"),
            ]
        );
        assert!(client.memory().is_empty("src"));
        assert_eq!(client.memory().bodies("d1"), ["m1", "m2"]);
        assert_eq!(client.memory().bodies("d2"), ["m1", "m2"]);
    }

    #[tokio::test]
    async fn test_call_counts() {
        let client = TestQueueClient::with_queues(["src", "a", "b", "c"]);
        client
            .seed("src", (0..7).map(|i| format!("message {i}")))
            .await
            .unwrap();

        let moved = relay_batch(&client, &request("src"), &destinations(&["a", "b", "c"]))
            .await
            .unwrap();

        assert_eq!(moved, 7);
        assert_eq!(client.count(Operation::Send), 21);
        assert_eq!(client.count(Operation::Delete), 7);
    }

    #[tokio::test]
    async fn test_first_send_failure_stops_everything() {
        let client = TestQueueClient::with_queues(["src", "d1", "d2"]);
        client.seed("src", ["m1", "m2"]).await.unwrap();
        client.fail(Operation::Send, "d1");

        let error = relay_batch(&client, &request("src"), &destinations(&["d1", "d2"]))
            .await
            .unwrap_err();

        assert!(matches!(
            &error,
            RelayError::Send { destination, processed: 0, .. } if destination == "d1"
        ));
        assert_eq!(client.calls_without_receives(), vec![send("d1", "m1")]);
        assert_eq!(client.memory().len("src"), 2);
    }

    #[tokio::test]
    async fn test_later_send_failure_keeps_earlier_messages() {
        let client = TestQueueClient::with_queues(["src", "d1", "d2"]);
        client.seed("src", ["m1", "m2", "m3"]).await.unwrap();
        // m1 goes through, m2 reaches d1 but not d2
        client.fail_after(Operation::Send, "d2", 1);

        let error = relay_batch(&client, &request("src"), &destinations(&["d1", "d2"]))
            .await
            .unwrap_err();

        assert_eq!(error.processed(), 1);
        assert_eq!(
            client.calls_without_receives(),
            vec![
                send("d1", "m1"),
                send("d2", "m1"),
                delete("src", "m1"),
                send("d1", "m2"),
                send("d2", "m2"),
            ]
        );
        // m2 is duplicated on d1 once it is relayed again
        assert_eq!(client.memory().bodies("d1"), ["m1", "m2"]);
        assert_eq!(client.memory().bodies("d2"), ["m1"]);
        assert_eq!(client.memory().bodies("src"), ["m2", "m3"]);
    }

    #[tokio::test]
    async fn test_delete_failure() {
        let client = TestQueueClient::with_queues(["src", "d1"]);
        client.seed("src", ["m1", "m2"]).await.unwrap();
        client.fail_after(Operation::Delete, "src", 1);

        let error = relay_batch(&client, &request("src"), &destinations(&["d1"]))
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            RelayError::Delete {
                processed: 1,
                source: QueueError::Injected { .. },
                ..
            }
        ));
        assert_eq!(client.memory().bodies("d1"), ["m1", "m2"]);
        assert_eq!(client.memory().bodies("src"), ["m2"]);
    }

    #[tokio::test]
    async fn test_receive_failure() {
        let client = TestQueueClient::with_queues(["d1"]);

        let error = relay_batch(&client, &request("src"), &destinations(&["d1"]))
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            RelayError::Receive {
                source: QueueError::QueueNotFound(_),
                ..
            }
        ));
        assert_eq!(client.count(Operation::Send), 0);
    }

    #[tokio::test]
    async fn test_no_destinations_drains_source() {
        let client = TestQueueClient::with_queues(["src"]);
        client.seed("src", ["m1", "m2"]).await.unwrap();

        let moved = relay_batch(&client, &request("src"), &[]).await.unwrap();

        assert_eq!(moved, 2);
        assert_eq!(client.count(Operation::Send), 0);
        assert_eq!(client.count(Operation::Delete), 2);
        assert!(client.memory().is_empty("src"));
    }

    #[tokio::test]
    async fn test_body_is_relayed_unchanged() {
        let body = "{\"id\": 1}\n\t  trailing whitespace  \u{1F600}";
        let client = TestQueueClient::with_queues(["src", "d1"]);
        client.seed("src", [body]).await.unwrap();

        relay_batch(&client, &request("src"), &destinations(&["d1"]))
            .await
            .unwrap();

        assert_eq!(client.memory().bodies("d1"), [body]);
    }

    #[tokio::test]
    async fn test_duplicate_destinations_are_not_collapsed() {
        let client = TestQueueClient::with_queues(["src", "d1"]);
        client.seed("src", ["m1"]).await.unwrap();

        relay_batch(&client, &request("src"), &destinations(&["d1", "d1"]))
            .await
            .unwrap();

        assert_eq!(client.memory().bodies("d1"), ["m1", "m1"]);
    }
}
