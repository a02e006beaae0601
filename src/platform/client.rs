//! Chat-platform client interface

use crate::error::Result;
use crate::types::PlayerId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Permission bit that lets a principal see a channel
pub const VIEW_CHANNEL: u64 = 1 << 10;

/// Kind of channel the platform can create
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelKind {
    /// A category that holds the other channels of a room
    Grouping,
    Text,
    Voice,
}

/// Opaque reference to a channel created on the platform
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelHandle {
    pub id: String,
    pub kind: ChannelKind,
    pub name: String,
}

/// Subject of a channel permission overwrite
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Principal {
    Everyone,
    Member(PlayerId),
    Role(String),
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Principal::Everyone => write!(f, "@everyone"),
            Principal::Member(id) => write!(f, "member:{}", id),
            Principal::Role(name) => write!(f, "role:{}", name),
        }
    }
}

/// Operations the service needs from the chat platform
///
/// Only creation results matter to callers; every other failure is logged and
/// ignored by the engine.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    async fn create_grouping(&self, name: &str) -> Result<ChannelHandle>;

    async fn create_channel(
        &self,
        kind: ChannelKind,
        parent: &ChannelHandle,
        name: &str,
    ) -> Result<ChannelHandle>;

    async fn set_access(
        &self,
        channel: &ChannelHandle,
        principal: &Principal,
        allow: u64,
        deny: u64,
    ) -> Result<()>;

    async fn delete_channel(&self, channel: &ChannelHandle) -> Result<()>;

    async fn send_message(&self, channel_id: &str, content: &str) -> Result<()>;

    async fn grant_role(&self, player_id: &str, role_id: &str) -> Result<()>;

    async fn revoke_role(&self, player_id: &str, role_id: &str) -> Result<()>;
}
