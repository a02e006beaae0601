//! Group provider traits and implementations
//!
//! This module defines how each group kind is configured: its room size, the
//! channel topology provisioned for its rooms, and its search role.

use crate::config::{MatchmakingSettings, PlatformSettings};
use crate::error::{PickupError, Result};
use crate::types::GroupKind;
use serde::{Deserialize, Serialize};

/// Configuration for a specific group kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupConfiguration {
    pub kind: GroupKind,
    /// Number of players in a formed room
    pub size: usize,
    /// Name of the room's text channel
    pub primary_channel: String,
    /// Names of the room's voice channels
    pub auxiliary_channels: Vec<String>,
    /// Role held by players while they search in this kind
    pub search_role_id: String,
}

impl GroupConfiguration {
    /// Create configuration for pair rooms
    pub fn pair() -> Self {
        Self {
            kind: GroupKind::Pair,
            size: 2,
            primary_channel: "pair".to_string(),
            auxiliary_channels: vec!["Pair".to_string()],
            search_role_id: "search-pair".to_string(),
        }
    }

    /// Create configuration for quad rooms
    pub fn quad() -> Self {
        Self {
            kind: GroupKind::Quad,
            size: 4,
            primary_channel: "quad".to_string(),
            auxiliary_channels: vec!["Quad".to_string()],
            search_role_id: "search-quad".to_string(),
        }
    }

    /// Create configuration for private battles, one voice channel per team
    pub fn private() -> Self {
        Self {
            kind: GroupKind::Private,
            size: 8,
            primary_channel: "private".to_string(),
            auxiliary_channels: vec!["Team Alpha".to_string(), "Team Beta".to_string()],
            search_role_id: "search-private".to_string(),
        }
    }

    pub fn for_kind(kind: GroupKind) -> Self {
        match kind {
            GroupKind::Pair => Self::pair(),
            GroupKind::Quad => Self::quad(),
            GroupKind::Private => Self::private(),
        }
    }
}

/// Trait for providing group configurations
pub trait GroupProvider: Send + Sync {
    /// Get configuration for a specific group kind
    fn get_group_config(&self, kind: GroupKind) -> Result<GroupConfiguration>;

    /// Get all available group kinds
    fn available_kinds(&self) -> Vec<GroupKind>;

    /// Validate if a group configuration is valid
    fn validate_config(&self, config: &GroupConfiguration) -> Result<()>;
}

/// Static provider with one fixed configuration per group kind
#[derive(Debug, Clone)]
pub struct StaticGroupProvider {
    pair: GroupConfiguration,
    quad: GroupConfiguration,
    private: GroupConfiguration,
}

impl StaticGroupProvider {
    /// Create a provider with the default configurations
    pub fn new() -> Self {
        Self {
            pair: GroupConfiguration::pair(),
            quad: GroupConfiguration::quad(),
            private: GroupConfiguration::private(),
        }
    }

    /// Build from application settings
    pub fn from_settings(
        matchmaking: &MatchmakingSettings,
        platform: &PlatformSettings,
    ) -> Result<Self> {
        let mut pair = GroupConfiguration::pair();
        pair.size = matchmaking.pair_size;
        pair.search_role_id = platform.search_pair_role_id.clone();

        let mut quad = GroupConfiguration::quad();
        quad.size = matchmaking.quad_size;
        quad.search_role_id = platform.search_quad_role_id.clone();

        let mut private = GroupConfiguration::private();
        private.size = matchmaking.private_size;
        private.search_role_id = platform.search_private_role_id.clone();

        Self::with_configs(pair, quad, private)
    }

    /// Create with custom configurations
    pub fn with_configs(
        pair: GroupConfiguration,
        quad: GroupConfiguration,
        private: GroupConfiguration,
    ) -> Result<Self> {
        let provider = Self {
            pair,
            quad,
            private,
        };

        for (kind, config) in [
            (GroupKind::Pair, &provider.pair),
            (GroupKind::Quad, &provider.quad),
            (GroupKind::Private, &provider.private),
        ] {
            if config.kind != kind {
                return Err(PickupError::ConfigurationError {
                    message: format!("Configuration for {} rooms is labelled {}", kind, config.kind),
                }
                .into());
            }
            provider.validate_config(config)?;
        }

        Ok(provider)
    }
}

impl Default for StaticGroupProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl GroupProvider for StaticGroupProvider {
    fn get_group_config(&self, kind: GroupKind) -> Result<GroupConfiguration> {
        match kind {
            GroupKind::Pair => Ok(self.pair.clone()),
            GroupKind::Quad => Ok(self.quad.clone()),
            GroupKind::Private => Ok(self.private.clone()),
        }
    }

    fn available_kinds(&self) -> Vec<GroupKind> {
        GroupKind::ALL.to_vec()
    }

    fn validate_config(&self, config: &GroupConfiguration) -> Result<()> {
        if config.size < 2 {
            return Err(PickupError::ConfigurationError {
                message: format!("{} rooms need at least 2 players", config.kind),
            }
            .into());
        }

        if config.primary_channel.is_empty() {
            return Err(PickupError::ConfigurationError {
                message: format!("{} rooms need a text channel name", config.kind),
            }
            .into());
        }

        if config.auxiliary_channels.iter().any(|name| name.is_empty()) {
            return Err(PickupError::ConfigurationError {
                message: format!("{} rooms have an unnamed voice channel", config.kind),
            }
            .into());
        }

        if config.search_role_id.is_empty() {
            return Err(PickupError::ConfigurationError {
                message: format!("{} rooms need a search role", config.kind),
            }
            .into());
        }

        // Private battles split the room into two teams
        if config.kind == GroupKind::Private && config.size % 2 != 0 {
            return Err(PickupError::ConfigurationError {
                message: "Private rooms need an even number of players".to_string(),
            }
            .into());
        }

        Ok(())
    }
}
