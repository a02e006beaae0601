//! In-memory platform used by the service binary and by tests
//!
//! Allocates channel handles locally, keeps role and permission state, and
//! records every call so tests can assert on the exact sequence.

use crate::error::{PickupError, Result};
use crate::platform::client::{ChannelHandle, ChannelKind, PlatformClient, Principal};
use crate::types::PlayerId;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// One recorded platform call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformOp {
    CreateGrouping {
        channel_id: String,
        name: String,
    },
    CreateChannel {
        channel_id: String,
        kind: ChannelKind,
        parent_id: String,
        name: String,
    },
    SetAccess {
        channel_id: String,
        principal: Principal,
        allow: u64,
        deny: u64,
    },
    DeleteChannel {
        channel_id: String,
    },
    SendMessage {
        channel_id: String,
        content: String,
    },
    GrantRole {
        player_id: PlayerId,
        role_id: String,
    },
    RevokeRole {
        player_id: PlayerId,
        role_id: String,
    },
}

#[derive(Debug, Default)]
struct PlatformState {
    ops: Vec<PlatformOp>,
    channels: HashMap<String, ChannelHandle>,
    access: HashMap<(String, Principal), (u64, u64)>,
    roles: HashMap<PlayerId, HashSet<String>>,
    /// Creations still allowed before creation starts failing
    creation_budget: Option<usize>,
}

#[derive(Debug, Default)]
pub struct InMemoryPlatform {
    next_id: AtomicU64,
    state: Mutex<PlatformState>,
}

impl InMemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, PlatformState>> {
        self.state
            .lock()
            .map_err(|_| PickupError::lock_poisoned("platform").into())
    }

    /// Make every channel creation fail (or succeed again)
    pub fn fail_creation(&self, fail: bool) {
        if let Ok(mut state) = self.state() {
            state.creation_budget = fail.then_some(0);
        }
    }

    /// Allow `count` more creations, then fail
    pub fn fail_creation_after(&self, count: usize) {
        if let Ok(mut state) = self.state() {
            state.creation_budget = Some(count);
        }
    }

    pub fn operations(&self) -> Vec<PlatformOp> {
        self.state().map(|s| s.ops.clone()).unwrap_or_default()
    }

    /// Messages posted to one channel, oldest first
    pub fn messages_in(&self, channel_id: &str) -> Vec<String> {
        self.operations()
            .into_iter()
            .filter_map(|op| match op {
                PlatformOp::SendMessage {
                    channel_id: id,
                    content,
                } if id == channel_id => Some(content),
                _ => None,
            })
            .collect()
    }

    /// Channels created and not yet deleted
    pub fn live_channels(&self) -> Vec<ChannelHandle> {
        self.state()
            .map(|s| s.channels.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn roles_of(&self, player_id: &str) -> HashSet<String> {
        self.state()
            .ok()
            .and_then(|s| s.roles.get(player_id).cloned())
            .unwrap_or_default()
    }

    /// Current (allow, deny) overwrite for a principal on a channel
    pub fn access_of(&self, channel_id: &str, principal: &Principal) -> Option<(u64, u64)> {
        self.state()
            .ok()
            .and_then(|s| s.access.get(&(channel_id.to_string(), principal.clone())).copied())
    }

    fn allocate(
        &self,
        kind: ChannelKind,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<ChannelHandle> {
        let mut state = self.state()?;
        if let Some(budget) = state.creation_budget.as_mut() {
            if *budget == 0 {
                return Err(PickupError::ProvisioningFailed {
                    message: format!("platform refused to create {:?} channel '{}'", kind, name),
                }
                .into());
            }
            *budget -= 1;
        }

        let id = format!("chan-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let handle = ChannelHandle {
            id: id.clone(),
            kind,
            name: name.to_string(),
        };
        state.channels.insert(id.clone(), handle.clone());
        state.ops.push(match parent_id {
            None => PlatformOp::CreateGrouping {
                channel_id: id,
                name: name.to_string(),
            },
            Some(parent) => PlatformOp::CreateChannel {
                channel_id: id,
                kind,
                parent_id: parent.to_string(),
                name: name.to_string(),
            },
        });

        debug!("Created {:?} channel '{}' ({})", kind, name, handle.id);
        Ok(handle)
    }
}

#[async_trait]
impl PlatformClient for InMemoryPlatform {
    async fn create_grouping(&self, name: &str) -> Result<ChannelHandle> {
        self.allocate(ChannelKind::Grouping, name, None)
    }

    async fn create_channel(
        &self,
        kind: ChannelKind,
        parent: &ChannelHandle,
        name: &str,
    ) -> Result<ChannelHandle> {
        self.allocate(kind, name, Some(&parent.id))
    }

    async fn set_access(
        &self,
        channel: &ChannelHandle,
        principal: &Principal,
        allow: u64,
        deny: u64,
    ) -> Result<()> {
        let mut state = self.state()?;
        state
            .access
            .insert((channel.id.clone(), principal.clone()), (allow, deny));
        state.ops.push(PlatformOp::SetAccess {
            channel_id: channel.id.clone(),
            principal: principal.clone(),
            allow,
            deny,
        });
        Ok(())
    }

    async fn delete_channel(&self, channel: &ChannelHandle) -> Result<()> {
        let mut state = self.state()?;
        if state.channels.remove(&channel.id).is_none() {
            return Err(anyhow::anyhow!("unknown channel {}", channel.id));
        }
        state.access.retain(|(id, _), _| id != &channel.id);
        state.ops.push(PlatformOp::DeleteChannel {
            channel_id: channel.id.clone(),
        });
        debug!("Deleted channel '{}' ({})", channel.name, channel.id);
        Ok(())
    }

    async fn send_message(&self, channel_id: &str, content: &str) -> Result<()> {
        info!("[{}] {}", channel_id, content);
        self.state()?.ops.push(PlatformOp::SendMessage {
            channel_id: channel_id.to_string(),
            content: content.to_string(),
        });
        Ok(())
    }

    async fn grant_role(&self, player_id: &str, role_id: &str) -> Result<()> {
        let mut state = self.state()?;
        state
            .roles
            .entry(player_id.to_string())
            .or_default()
            .insert(role_id.to_string());
        state.ops.push(PlatformOp::GrantRole {
            player_id: player_id.to_string(),
            role_id: role_id.to_string(),
        });
        Ok(())
    }

    async fn revoke_role(&self, player_id: &str, role_id: &str) -> Result<()> {
        let mut state = self.state()?;
        if let Some(roles) = state.roles.get_mut(player_id) {
            roles.remove(role_id);
        }
        state.ops.push(PlatformOp::RevokeRole {
            player_id: player_id.to_string(),
            role_id: role_id.to_string(),
        });
        Ok(())
    }
}
