//! Utility functions for the pickup service

use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

/// Generate a new unique room ID
pub fn generate_room_id() -> Uuid {
    Uuid::new_v4()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Check the `####-####-####` friend code shape
pub fn is_valid_friend_code(code: &str) -> bool {
    let groups: Vec<&str> = code.split('-').collect();
    groups.len() == 3
        && groups
            .iter()
            .all(|group| group.len() == 4 && group.chars().all(|c| c.is_ascii_digit()))
}

/// Player ids are the platform's numeric snowflakes
pub fn is_valid_player_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_digit())
}

/// Format a platform mention for a player
pub fn mention(player_id: &str) -> String {
    format!("<@{}>", player_id)
}

/// Extract the player id from a `<@id>` (or `<@!id>`) mention
pub fn parse_mention(text: &str) -> Option<&str> {
    let inner = text.strip_prefix("<@")?.strip_suffix('>')?;
    let inner = inner.strip_prefix('!').unwrap_or(inner);
    is_valid_player_id(inner).then_some(inner)
}

/// Human wording for a countdown, e.g. "10 minutes" or "1 minute"
pub fn describe_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 60 && secs % 60 == 0 {
        let minutes = secs / 60;
        if minutes == 1 {
            "1 minute".to_string()
        } else {
            format!("{} minutes", minutes)
        }
    } else if secs == 1 {
        "1 second".to_string()
    } else if secs > 0 {
        format!("{} seconds", secs)
    } else {
        format!("{} milliseconds", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_unique_ids() {
        let id1 = generate_room_id();
        let id2 = generate_room_id();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_friend_code_validation() {
        assert!(is_valid_friend_code("1234-5678-9012"));
        assert!(!is_valid_friend_code("1234-5678"));
        assert!(!is_valid_friend_code("1234-5678-901a"));
        assert!(!is_valid_friend_code("12345-678-9012"));
        assert!(!is_valid_friend_code(""));
    }

    #[test]
    fn test_mentions() {
        assert_eq!(mention("42"), "<@42>");
        assert_eq!(parse_mention("<@42>"), Some("42"));
        assert_eq!(parse_mention("<@!42>"), Some("42"));
        assert_eq!(parse_mention("<@abc>"), None);
        assert_eq!(parse_mention("42"), None);
    }

    #[test]
    fn test_describe_duration() {
        assert_eq!(describe_duration(Duration::from_secs(600)), "10 minutes");
        assert_eq!(describe_duration(Duration::from_secs(60)), "1 minute");
        assert_eq!(describe_duration(Duration::from_secs(90)), "90 seconds");
        assert_eq!(describe_duration(Duration::from_millis(30)), "30 milliseconds");
    }
}
