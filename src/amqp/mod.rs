//! AMQP integration for the pickup service
//!
//! This module handles the broker connection and the consumer that turns
//! queued chat commands into manager calls.

pub mod connection;
pub mod handlers;
pub mod messages;

// Re-export commonly used types
pub use connection::{AmqpConfig, AmqpConnection};
pub use handlers::{CommandConsumer, CommandHandler, MockCommandHandler};
pub use messages::*;
