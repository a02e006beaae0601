//! Common types used throughout the pickup service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for players (the chat-platform user id)
pub type PlayerId = String;

/// Unique identifier for rooms
pub type RoomId = Uuid;

/// Matchmaking class a player searches in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKind {
    /// Rooms of two players
    Pair,
    /// Rooms of four players
    Quad,
    /// Private battles, split into two sub-teams
    Private,
}

impl GroupKind {
    /// Every group kind, in the order the queues are created
    pub const ALL: [GroupKind; 3] = [GroupKind::Pair, GroupKind::Quad, GroupKind::Private];

    /// Label used for metrics and log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupKind::Pair => "pair",
            GroupKind::Quad => "quad",
            GroupKind::Private => "private",
        }
    }
}

impl std::fmt::Display for GroupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pair" => Ok(GroupKind::Pair),
            "quad" => Ok(GroupKind::Quad),
            "private" => Ok(GroupKind::Private),
            other => Err(anyhow::anyhow!(
                "Invalid group kind '{}'. Use 'pair', 'quad' or 'private'",
                other
            )),
        }
    }
}

/// Request to register or update a friend code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterCommand {
    pub player_id: PlayerId,
    pub friend_code: String,
    /// Channel the command was sent from; replies go there
    #[serde(default)]
    pub channel_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Request to search alone
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueCommand {
    pub player_id: PlayerId,
    pub group_kind: GroupKind,
    #[serde(default)]
    pub channel_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Request to search with a pre-formed team, led by `player_id`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueTeamCommand {
    pub player_id: PlayerId,
    pub group_kind: GroupKind,
    /// Team mates, not including the leader
    pub member_ids: Vec<PlayerId>,
    #[serde(default)]
    pub channel_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Request to leave the current queue or room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveCommand {
    pub player_id: PlayerId,
    #[serde(default)]
    pub channel_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Presence notification that a player went offline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceOfflineCommand {
    pub player_id: PlayerId,
    pub timestamp: DateTime<Utc>,
}

/// Union type for all inbound commands
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CommandMessage {
    Register(RegisterCommand),
    Enqueue(EnqueueCommand),
    EnqueueTeam(EnqueueTeamCommand),
    Leave(LeaveCommand),
    PresenceOffline(PresenceOfflineCommand),
}

impl CommandMessage {
    /// Player who issued the command
    pub fn player_id(&self) -> &str {
        match self {
            CommandMessage::Register(cmd) => &cmd.player_id,
            CommandMessage::Enqueue(cmd) => &cmd.player_id,
            CommandMessage::EnqueueTeam(cmd) => &cmd.player_id,
            CommandMessage::Leave(cmd) => &cmd.player_id,
            CommandMessage::PresenceOffline(cmd) => &cmd.player_id,
        }
    }

    /// Channel to reply to, when the command came from one
    pub fn channel_id(&self) -> Option<&str> {
        match self {
            CommandMessage::Register(cmd) => cmd.channel_id.as_deref(),
            CommandMessage::Enqueue(cmd) => cmd.channel_id.as_deref(),
            CommandMessage::EnqueueTeam(cmd) => cmd.channel_id.as_deref(),
            CommandMessage::Leave(cmd) => cmd.channel_id.as_deref(),
            CommandMessage::PresenceOffline(_) => None,
        }
    }

    /// Short name for logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            CommandMessage::Register(_) => "register",
            CommandMessage::Enqueue(_) => "enqueue",
            CommandMessage::EnqueueTeam(_) => "enqueue_team",
            CommandMessage::Leave(_) => "leave",
            CommandMessage::PresenceOffline(_) => "presence_offline",
        }
    }
}

/// Result of a successful register command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered,
    Updated,
}

/// Result of a successful enqueue or team enqueue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Waiting; `waiting` is the queue length after the insert
    Queued { waiting: usize },
    /// The queue filled up and a room was formed and activated
    RoomFormed { room_id: RoomId },
}

/// Result of a leave command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaveOutcome {
    LeftQueue { kind: GroupKind },
    LeftRoom {
        room_id: RoomId,
        /// True only for the departure that started the room's teardown
        teardown_started: bool,
    },
    /// Neither searching nor in a room; nothing happened
    NotParticipating,
}

/// Result of a presence-offline notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceOutcome {
    RemovedFromQueue { kind: GroupKind },
    Ignored,
}
