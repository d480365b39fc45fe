use async_trait::async_trait;
use aws_sdk_sqs::{config::Region, error::DisplayErrorContext, Client};

use crate::{
    error::{Operation, QueueError},
    internal,
    queue::{Message, QueueClient, ReceiptHandle, ReceiveRequest},
};

/// Amazon SQS backed queue client
///
/// Queue identifiers are queue URLs.
#[derive(Debug, Clone)]
pub struct SqsQueueClient {
    client: Client,
}

impl SqsQueueClient {
    /// Build a client from the ambient AWS configuration (environment,
    /// profile, instance metadata), optionally overriding the region and the
    /// endpoint (for SQS compatible services such as `LocalStack`).
    pub async fn from_env(region: Option<String>, endpoint_url: Option<String>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());

        if let Some(region) = region {
            loader = loader.region(Region::new(region));
        }

        if let Some(endpoint_url) = endpoint_url {
            internal!("Using SQS endpoint override {endpoint_url}");
            loader = loader.endpoint_url(endpoint_url);
        }

        Self::new(Client::new(&loader.load().await))
    }

    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }
}

fn service_error<E: std::error::Error>(queue: &str, operation: Operation, error: E) -> QueueError {
    QueueError::Service {
        queue: queue.to_string(),
        operation,
        message: DisplayErrorContext(error).to_string(),
    }
}

#[async_trait]
impl QueueClient for SqsQueueClient {
    async fn receive(&self, request: &ReceiveRequest) -> Result<Vec<Message>, QueueError> {
        let wait_time_seconds = i32::try_from(request.wait_time.as_secs()).unwrap_or(i32::MAX);

        let output = self
            .client
            .receive_message()
            .queue_url(&request.queue)
            .max_number_of_messages(i32::from(request.max_messages))
            .wait_time_seconds(wait_time_seconds)
            .send()
            .await
            .map_err(|e| service_error(&request.queue, Operation::Receive, e))?;

        output
            .messages()
            .iter()
            .map(|message| {
                let receipt = message.receipt_handle().ok_or_else(|| QueueError::Malformed {
                    queue: request.queue.clone(),
                    reason: format!(
                        "message {} has no receipt handle",
                        message.message_id().unwrap_or("<unknown>")
                    ),
                })?;

                Ok(Message {
                    body: message.body().unwrap_or_default().to_string(),
                    receipt: ReceiptHandle::from(receipt),
                })
            })
            .collect()
    }

    async fn send(&self, queue: &str, body: &str) -> Result<(), QueueError> {
        self.client
            .send_message()
            .queue_url(queue)
            .message_body(body)
            .send()
            .await
            .map_err(|e| service_error(queue, Operation::Send, e))?;

        Ok(())
    }

    async fn delete(&self, queue: &str, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        self.client
            .delete_message()
            .queue_url(queue)
            .receipt_handle(receipt.as_str())
            .send()
            .await
            .map_err(|e| service_error(queue, Operation::Delete, e))?;

        Ok(())
    }
}
