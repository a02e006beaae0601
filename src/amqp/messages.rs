//! AMQP command message decoding and validation

use crate::error::{PickupError, Result};
use crate::types::*;
use crate::utils::{is_valid_player_id, parse_mention};
use serde_json;

/// Default queue carrying player commands
pub const COMMAND_QUEUE: &str = "pickup.commands";

/// Command decoding and validation utilities
pub struct MessageUtils;

impl MessageUtils {
    /// Serialize a command to bytes
    pub fn serialize_command(command: &CommandMessage) -> Result<Vec<u8>> {
        serde_json::to_vec(command).map_err(|e| {
            PickupError::InternalError {
                message: format!("Failed to serialize command: {}", e),
            }
            .into()
        })
    }

    /// Deserialize a command from bytes, normalising team mentions
    ///
    /// Only undecodable payloads fail here; field checks are left to
    /// [`MessageUtils::validate_command`] so the sender can be told.
    pub fn deserialize_command(bytes: &[u8]) -> Result<CommandMessage> {
        let mut command: CommandMessage =
            serde_json::from_slice(bytes).map_err(|e| PickupError::InvalidCommand {
                reason: format!("Failed to deserialize command: {}", e),
            })?;

        if let CommandMessage::EnqueueTeam(cmd) = &mut command {
            for member in cmd.member_ids.iter_mut() {
                if let Some(id) = parse_mention(member) {
                    *member = id.to_string();
                }
            }
        }

        Ok(command)
    }

    /// Validate the envelope-level fields of a command
    ///
    /// Registration and status checks belong to the manager; this only
    /// rejects messages no player could have sent.
    pub fn validate_command(command: &CommandMessage) -> Result<()> {
        if command.player_id().is_empty() {
            return Err(PickupError::InvalidCommand {
                reason: "Player ID cannot be empty".to_string(),
            }
            .into());
        }

        if let Some(channel_id) = command.channel_id() {
            if channel_id.is_empty() {
                return Err(PickupError::InvalidCommand {
                    reason: "Channel ID cannot be empty when present".to_string(),
                }
                .into());
            }
        }

        match command {
            CommandMessage::Register(cmd) if cmd.friend_code.trim().is_empty() => {
                Err(PickupError::MissingFriendCode {
                    player_id: cmd.player_id.clone(),
                }
                .into())
            }
            CommandMessage::EnqueueTeam(cmd) => {
                match cmd.member_ids.iter().find(|id| !is_valid_player_id(id)) {
                    Some(bad) => Err(PickupError::InvalidTeamMember {
                        member: bad.clone(),
                    }
                    .into()),
                    None => Ok(()),
                }
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::as_pickup_error;

    fn team_command(members: &[&str]) -> CommandMessage {
        CommandMessage::EnqueueTeam(EnqueueTeamCommand {
            player_id: "100".to_string(),
            group_kind: GroupKind::Quad,
            member_ids: members.iter().map(|m| m.to_string()).collect(),
            channel_id: Some("search".to_string()),
            timestamp: chrono::Utc::now(),
        })
    }

    #[test]
    fn test_team_mentions_normalised() {
        let bytes = MessageUtils::serialize_command(&team_command(&["<@200>", "<@!300>", "400"]))
            .unwrap();
        match MessageUtils::deserialize_command(&bytes).unwrap() {
            CommandMessage::EnqueueTeam(cmd) => {
                assert_eq!(cmd.member_ids, vec!["200", "300", "400"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_command_validation() {
        assert!(MessageUtils::validate_command(&team_command(&["200"])).is_ok());

        let err = MessageUtils::validate_command(&team_command(&["bob"])).unwrap_err();
        assert_eq!(err.to_string(), "bob is not a valid player name.");
        assert!(as_pickup_error(&err).is_some_and(|p| p.is_user_facing()));

        let register = CommandMessage::Register(RegisterCommand {
            player_id: "100".to_string(),
            friend_code: " ".to_string(),
            channel_id: None,
            timestamp: chrono::Utc::now(),
        });
        let err = MessageUtils::validate_command(&register).unwrap_err();
        assert!(matches!(
            as_pickup_error(&err),
            Some(PickupError::MissingFriendCode { .. })
        ));

        let leave = CommandMessage::Leave(LeaveCommand {
            player_id: String::new(),
            channel_id: None,
            timestamp: chrono::Utc::now(),
        });
        assert!(MessageUtils::validate_command(&leave).is_err());
    }

    #[test]
    fn test_decoding_leaves_field_checks_to_validation() {
        let bytes = MessageUtils::serialize_command(&team_command(&["bob"])).unwrap();
        let command = MessageUtils::deserialize_command(&bytes).unwrap();
        assert!(MessageUtils::validate_command(&command).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        let err = MessageUtils::deserialize_command(b"{\"type\":\"Dance\"}").unwrap_err();
        assert!(matches!(
            as_pickup_error(&err),
            Some(PickupError::InvalidCommand { .. })
        ));
    }
}
