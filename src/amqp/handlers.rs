//! AMQP command consumer
//!
//! Deliveries from the command queue are decoded into [`CommandMessage`]s and
//! forwarded to a [`CommandHandler`]. Each delivery is handled in its own task
//! so a slow provisioning call never blocks the next command.

use crate::amqp::messages::MessageUtils;
use crate::error::{PickupError, Result};
use crate::types::CommandMessage;
use amqprs::{
    channel::{BasicCancelArguments, BasicConsumeArguments, Channel},
    consumer::AsyncConsumer,
    BasicProperties, Deliver,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Trait defining the interface for handling inbound commands
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Handle one decoded command
    async fn handle_command(&self, command: CommandMessage) -> Result<()>;

    /// Handle a delivery that could not be decoded or processed
    async fn handle_error(&self, error: anyhow::Error, message_data: &[u8]);
}

/// Consumer for the command queue
pub struct CommandConsumer {
    handler: Arc<dyn CommandHandler>,
    channel: Channel,
    consumer_tag: String,
}

impl CommandConsumer {
    pub fn new(handler: Arc<dyn CommandHandler>, channel: Channel) -> Self {
        let consumer_tag = format!("pickup-consumer-{}", uuid::Uuid::new_v4());

        Self {
            handler,
            channel,
            consumer_tag,
        }
    }

    pub fn consumer_tag(&self) -> &str {
        &self.consumer_tag
    }

    /// Start consuming messages from the queue
    pub async fn start_consuming(&self, queue_name: &str) -> Result<()> {
        let mut args = BasicConsumeArguments::new(queue_name, &self.consumer_tag);
        args.no_ack = true;

        self.channel
            .basic_consume(DeliveryConsumer::new(self.handler.clone()), args)
            .await
            .map_err(|e| PickupError::AmqpConnectionFailed {
                message: format!("Failed to start consuming: {}", e),
            })?;

        info!("Started consuming commands from queue: {}", queue_name);
        Ok(())
    }

    /// Stop consuming messages
    pub async fn stop_consuming(&self) -> Result<()> {
        let args = BasicCancelArguments::new(&self.consumer_tag);

        self.channel
            .basic_cancel(args)
            .await
            .map_err(|e| PickupError::AmqpConnectionFailed {
                message: format!("Failed to stop consuming: {}", e),
            })?;

        info!("Stopped consuming commands");
        Ok(())
    }
}

/// Decode one delivery and hand it to the handler
pub async fn dispatch_delivery(handler: &dyn CommandHandler, content: &[u8]) {
    let command = match MessageUtils::deserialize_command(content) {
        Ok(command) => command,
        Err(e) => {
            handler.handle_error(e, content).await;
            return;
        }
    };

    debug!(
        "Command parsed - type: {}, player_id: '{}'",
        command.name(),
        command.player_id()
    );

    if let Err(e) = handler.handle_command(command).await {
        handler.handle_error(e, content).await;
    }
}

struct DeliveryConsumer {
    handler: Arc<dyn CommandHandler>,
}

impl DeliveryConsumer {
    fn new(handler: Arc<dyn CommandHandler>) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl AsyncConsumer for DeliveryConsumer {
    async fn consume(
        &mut self,
        _channel: &Channel,
        deliver: Deliver,
        _basic_properties: BasicProperties,
        content: Vec<u8>,
    ) {
        let delivery_tag = deliver.delivery_tag();
        debug!(
            "AMQP message received - delivery_tag: {}, routing_key: '{}', size: {} bytes",
            delivery_tag,
            deliver.routing_key(),
            content.len()
        );

        let handler = self.handler.clone();
        tokio::spawn(async move {
            let start_time = std::time::Instant::now();
            dispatch_delivery(handler.as_ref(), &content).await;
            debug!(
                "Delivery {} handled in {:.2}ms",
                delivery_tag,
                start_time.elapsed().as_secs_f64() * 1000.0
            );
        });
    }
}

/// Handler that records commands, for tests
pub struct MockCommandHandler {
    pub received_commands: Arc<tokio::sync::Mutex<Vec<CommandMessage>>>,
    pub errors: Arc<tokio::sync::Mutex<Vec<String>>>,
}

impl Default for MockCommandHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCommandHandler {
    pub fn new() -> Self {
        Self {
            received_commands: Arc::new(tokio::sync::Mutex::new(Vec::new())),
            errors: Arc::new(tokio::sync::Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl CommandHandler for MockCommandHandler {
    async fn handle_command(&self, command: CommandMessage) -> Result<()> {
        self.received_commands.lock().await.push(command);
        Ok(())
    }

    async fn handle_error(&self, error: anyhow::Error, message_data: &[u8]) {
        warn!(
            "Mock handler received error for {} byte message: {}",
            message_data.len(),
            error
        );
        self.errors.lock().await.push(error.to_string());
    }
}

/// Log a delivery failure with a short preview of the payload
pub fn log_delivery_error(error: &anyhow::Error, message_data: &[u8]) {
    error!(
        "Command handling failed - message_size: {} bytes, error: {:#}",
        message_data.len(),
        error
    );
    if !message_data.is_empty() {
        let preview_len = std::cmp::min(100, message_data.len());
        error!(
            "Message preview: {:?}",
            String::from_utf8_lossy(&message_data[..preview_len])
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GroupKind, LeaveCommand};

    #[tokio::test]
    async fn test_dispatch_forwards_valid_commands() {
        let handler = MockCommandHandler::new();
        let payload = br#"{"type":"Enqueue","player_id":"42","group_kind":"pair","channel_id":"search","timestamp":"2024-01-01T00:00:00Z"}"#;

        dispatch_delivery(&handler, payload).await;

        let received = handler.received_commands.lock().await;
        assert_eq!(received.len(), 1);
        match &received[0] {
            CommandMessage::Enqueue(cmd) => {
                assert_eq!(cmd.player_id, "42");
                assert_eq!(cmd.group_kind, GroupKind::Pair);
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert!(handler.errors.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_reports_malformed_commands() {
        let handler = MockCommandHandler::new();

        dispatch_delivery(&handler, b"not json").await;

        assert!(handler.received_commands.lock().await.is_empty());
        let errors = handler.errors.lock().await;
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Malformed command"));
    }

    #[tokio::test]
    async fn test_mock_handler() {
        let handler = MockCommandHandler::new();
        let command = CommandMessage::Leave(LeaveCommand {
            player_id: "7".to_string(),
            channel_id: None,
            timestamp: crate::utils::current_timestamp(),
        });

        handler.handle_command(command).await.unwrap();
        assert_eq!(handler.received_commands.lock().await.len(), 1);
    }
}
