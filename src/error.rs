//! Error types for the pickup service
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application.

use crate::types::GroupKind;

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Broad classification of a [`PickupError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad input or a participant in the wrong state; reported back to the user
    Validation,
    /// Registration store or platform failure
    Collaborator,
    /// Broken internal assumption (poisoned lock, illegal transition, bad config)
    Internal,
}

/// Custom error types for specific pickup scenarios
#[derive(Debug, thiserror::Error)]
pub enum PickupError {
    #[error("{player_id} is not a valid player identity")]
    InvalidPlayerId { player_id: String },

    #[error(
        "{friend_code} is not a valid friend code. Register by typing \"!register ####-####-####\""
    )]
    InvalidFriendCode { friend_code: String },

    #[error("You must \"!register\" before you can search for matches.")]
    NotRegistered { player_id: String },

    #[error("You must \"!leave\" your current queue before searching again")]
    AlreadySearching { player_id: String },

    #[error("You must \"!leave\" your current match before searching again")]
    AlreadyInMatch { player_id: String },

    #[error("<@{player_id}> needs to be registered before queuing.")]
    TeamMemberNotRegistered { player_id: String },

    #[error("<@{player_id}> must \"!leave\" their current queue or match before searching with a team")]
    TeamMemberBusy { player_id: String },

    #[error("<@{player_id}> appears more than once in the team")]
    DuplicateTeamMember { player_id: String },

    #[error("A team needs at least one player")]
    EmptyTeam,

    #[error("A team of {team_size} does not fit a {kind} room of {required_size}")]
    TeamTooLarge {
        kind: GroupKind,
        team_size: usize,
        required_size: usize,
    },

    #[error("You must provide your friend code when registering. Register by typing \"!register ####-####-####\"")]
    MissingFriendCode { player_id: String },

    #[error("{member} is not a valid player name.")]
    InvalidTeamMember { member: String },

    #[error("Malformed command: {reason}")]
    InvalidCommand { reason: String },

    #[error("This command cannot be used in this channel")]
    WrongChannel { channel_id: String },

    #[error("Registration store failure: {message}")]
    StoreFailed { message: String },

    #[error("Resource provisioning failed: {message}")]
    ProvisioningFailed { message: String },

    #[error("AMQP connection failed: {message}")]
    AmqpConnectionFailed { message: String },

    #[error("Room {room_id} cannot go from {from} to {to}")]
    InvalidRoomTransition {
        room_id: String,
        from: String,
        to: String,
    },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}

impl PickupError {
    /// Category used by the dispatcher to decide between replying and logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            PickupError::InvalidPlayerId { .. }
            | PickupError::InvalidFriendCode { .. }
            | PickupError::NotRegistered { .. }
            | PickupError::AlreadySearching { .. }
            | PickupError::AlreadyInMatch { .. }
            | PickupError::TeamMemberNotRegistered { .. }
            | PickupError::TeamMemberBusy { .. }
            | PickupError::DuplicateTeamMember { .. }
            | PickupError::EmptyTeam
            | PickupError::TeamTooLarge { .. }
            | PickupError::MissingFriendCode { .. }
            | PickupError::InvalidTeamMember { .. }
            | PickupError::InvalidCommand { .. }
            | PickupError::WrongChannel { .. } => ErrorCategory::Validation,
            PickupError::StoreFailed { .. }
            | PickupError::ProvisioningFailed { .. }
            | PickupError::AmqpConnectionFailed { .. } => ErrorCategory::Collaborator,
            PickupError::InvalidRoomTransition { .. }
            | PickupError::ConfigurationError { .. }
            | PickupError::InternalError { .. } => ErrorCategory::Internal,
        }
    }

    /// Whether the error should be shown to the player who sent the command
    pub fn is_user_facing(&self) -> bool {
        self.category() == ErrorCategory::Validation
    }

    /// Shorthand for mapping a poisoned lock
    pub fn lock_poisoned(what: &str) -> Self {
        PickupError::InternalError {
            message: format!("Failed to acquire {} lock", what),
        }
    }
}

/// Find the [`PickupError`] inside an anyhow error, if there is one
pub fn as_pickup_error(error: &anyhow::Error) -> Option<&PickupError> {
    error.downcast_ref::<PickupError>()
}
