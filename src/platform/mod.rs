//! Chat-platform integration: the client trait and an in-memory implementation

pub mod client;
pub mod memory;

pub use client::{ChannelHandle, ChannelKind, PlatformClient, Principal, VIEW_CHANNEL};
pub use memory::{InMemoryPlatform, PlatformOp};
