//! Room provisioning and release on the chat platform
//!
//! All channel creation and deletion goes through one process-wide lock, taken
//! before any room lock.

use crate::config::PlatformSettings;
use crate::error::{PickupError, Result};
use crate::platform::{ChannelHandle, ChannelKind, PlatformClient, Principal, VIEW_CHANNEL};
use crate::player::Player;
use crate::queue::GroupProvider;
use crate::room::instance::{Room, RoomState};
use crate::room::registry::SharedRoom;
use crate::utils::mention;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Name of the category that groups a room's channels
pub const GROUPING_NAME: &str = "Match";

/// Serializes provisioning and release across all rooms
#[derive(Debug, Default)]
pub struct ProvisioningLock {
    inner: Mutex<()>,
}

impl ProvisioningLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self) -> MutexGuard<'_, ()> {
        self.inner.lock().await
    }
}

/// Roster posted to a room's text channel when it opens
pub fn roster_message(members: &[Arc<Player>]) -> String {
    let mut message = String::from("Players:");
    for member in members {
        message.push_str(&format!(
            "\n{} - {}",
            mention(member.id()),
            member.friend_code()
        ));
    }
    message.push_str("\nType \"!leave\" to leave the room when you are finished.\nGL HF!");
    message
}

fn provisioning_failed(error: anyhow::Error) -> anyhow::Error {
    match error.downcast::<PickupError>() {
        Ok(pickup @ PickupError::ProvisioningFailed { .. }) => pickup.into(),
        Ok(other) => PickupError::ProvisioningFailed {
            message: other.to_string(),
        }
        .into(),
        Err(error) => PickupError::ProvisioningFailed {
            message: error.to_string(),
        }
        .into(),
    }
}

pub struct Provisioner {
    platform: Arc<dyn PlatformClient>,
    groups: Arc<dyn GroupProvider>,
    lock: ProvisioningLock,
    in_progress_role_id: String,
    moderator_role: String,
    bot_user_id: String,
}

impl Provisioner {
    pub fn new(
        platform: Arc<dyn PlatformClient>,
        groups: Arc<dyn GroupProvider>,
        settings: &PlatformSettings,
    ) -> Self {
        Self {
            platform,
            groups,
            lock: ProvisioningLock::new(),
            in_progress_role_id: settings.in_progress_role_id.clone(),
            moderator_role: settings.moderator_role.clone(),
            bot_user_id: settings.bot_user_id.clone(),
        }
    }

    pub fn platform(&self) -> &Arc<dyn PlatformClient> {
        &self.platform
    }

    pub fn groups(&self) -> &Arc<dyn GroupProvider> {
        &self.groups
    }

    pub fn in_progress_role_id(&self) -> &str {
        &self.in_progress_role_id
    }

    /// Hide a channel from everyone except the room's members, the bot and moderators
    async fn restrict(&self, channel: &ChannelHandle, member_ids: &[String]) {
        let mut overwrites = vec![(Principal::Everyone, 0, VIEW_CHANNEL)];
        overwrites.extend(
            member_ids
                .iter()
                .map(|id| (Principal::Member(id.clone()), VIEW_CHANNEL, 0)),
        );
        overwrites.push((Principal::Member(self.bot_user_id.clone()), VIEW_CHANNEL, 0));
        overwrites.push((Principal::Role(self.moderator_role.clone()), VIEW_CHANNEL, 0));

        for (principal, allow, deny) in overwrites {
            if let Err(e) = self
                .platform
                .set_access(channel, &principal, allow, deny)
                .await
            {
                warn!(
                    "Failed to set access for {} on channel {}: {}",
                    principal, channel.id, e
                );
            }
        }
    }

    /// Post to a channel, logging failures
    pub async fn post(&self, channel_id: &str, content: &str) {
        if let Err(e) = self.platform.send_message(channel_id, content).await {
            warn!("Failed to send message to channel {}: {}", channel_id, e);
        }
    }

    pub async fn grant_role(&self, player_id: &str, role_id: &str) {
        if let Err(e) = self.platform.grant_role(player_id, role_id).await {
            warn!("Failed to grant role {} to {}: {}", role_id, player_id, e);
        }
    }

    pub async fn revoke_role(&self, player_id: &str, role_id: &str) {
        if let Err(e) = self.platform.revoke_role(player_id, role_id).await {
            warn!("Failed to revoke role {} from {}: {}", role_id, player_id, e);
        }
    }

    /// Forming -> Active: create the room's channels and move its members in
    ///
    /// Handles created before a failure stay on the room and are deleted by
    /// its teardown. A room a member already left is skipped.
    pub async fn activate(&self, shared: &SharedRoom) -> Result<()> {
        let _provisioning = self.lock.acquire().await;
        let mut room = shared.lock().await;

        if room.is_cleaning() {
            info!(
                "Room {} lost a member before activation; skipping provisioning",
                room.id()
            );
            return Ok(());
        }
        if room.state() != RoomState::Forming {
            return Err(PickupError::InvalidRoomTransition {
                room_id: room.id().to_string(),
                from: room.state().to_string(),
                to: RoomState::Active.to_string(),
            }
            .into());
        }

        let config = self.groups.get_group_config(room.kind())?;
        let member_ids = room.member_ids();
        info!(
            "Provisioning {} room {} for {:?}",
            room.kind(),
            room.id(),
            member_ids
        );

        let grouping = self
            .platform
            .create_grouping(GROUPING_NAME)
            .await
            .map_err(provisioning_failed)?;
        room.resources_mut().grouping = Some(grouping.clone());
        self.restrict(&grouping, &member_ids).await;

        let primary = self
            .platform
            .create_channel(ChannelKind::Text, &grouping, &config.primary_channel)
            .await
            .map_err(provisioning_failed)?;
        room.resources_mut().primary = Some(primary.clone());
        self.restrict(&primary, &member_ids).await;

        for name in &config.auxiliary_channels {
            let voice = self
                .platform
                .create_channel(ChannelKind::Voice, &grouping, name)
                .await
                .map_err(provisioning_failed)?;
            room.resources_mut().auxiliary.push(voice.clone());
            self.restrict(&voice, &member_ids).await;
        }

        self.post(&primary.id, &roster_message(room.members())).await;

        let room_id = room.id();
        for member in room.members() {
            member.enter_match(room_id);
            self.revoke_role(member.id(), &config.search_role_id).await;
            self.grant_role(member.id(), &self.in_progress_role_id).await;
        }

        room.mark_active()?;
        info!("Room {} is active", room_id);
        Ok(())
    }

    /// Remove a departed player's view of the room's channels
    pub async fn deny_access(&self, handles: &[ChannelHandle], player_id: &str) {
        let principal = Principal::Member(player_id.to_string());
        for handle in handles {
            if let Err(e) = self
                .platform
                .set_access(handle, &principal, 0, VIEW_CHANNEL)
                .await
            {
                warn!(
                    "Failed to revoke access for {} on channel {}: {}",
                    player_id, handle.id, e
                );
            }
        }
    }

    /// Cleaning -> Closed: delete every provisioned handle
    pub async fn release(&self, shared: &SharedRoom) -> Result<()> {
        let _provisioning = self.lock.acquire().await;
        let mut room = shared.lock().await;

        let resources = std::mem::take(room.resources_mut());
        for handle in resources.all() {
            match self.platform.delete_channel(handle).await {
                Ok(()) => debug!("Deleted channel {} of room {}", handle.id, room.id()),
                Err(e) => warn!(
                    "Failed to delete channel {} of room {}: {}",
                    handle.id,
                    room.id(),
                    e
                ),
            }
        }

        room.mark_closed()?;
        info!("Room {} is closed", room.id());
        Ok(())
    }
}

/// Handles of a room, children first
pub fn room_handles(room: &Room) -> Vec<ChannelHandle> {
    room.resources().all().into_iter().cloned().collect()
}
