//! Room instance implementation and lifecycle management
//!
//! A room is one formed group. It owns its membership, its lifecycle state and
//! the platform handles provisioned for it.

use crate::error::{PickupError, Result};
use crate::platform::ChannelHandle;
use crate::player::Player;
use crate::types::{GroupKind, PlayerId, RoomId};
use crate::utils::{current_timestamp, generate_room_id};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Possible states of a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomState {
    /// Formed by a queue, nothing provisioned yet
    Forming,
    /// Channels exist and the match is running
    Active,
    /// Someone left; the teardown countdown is running
    Cleaning,
    /// Channels deleted (terminal state)
    Closed,
}

impl fmt::Display for RoomState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoomState::Forming => "forming",
            RoomState::Active => "active",
            RoomState::Cleaning => "cleaning",
            RoomState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Platform handles provisioned for a room
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomResources {
    /// Category holding the room's channels
    pub grouping: Option<ChannelHandle>,
    /// Text channel for the roster and warnings
    pub primary: Option<ChannelHandle>,
    /// Voice channels
    pub auxiliary: Vec<ChannelHandle>,
}

impl RoomResources {
    /// Every handle, in deletion order (children before the grouping)
    pub fn all(&self) -> Vec<&ChannelHandle> {
        self.auxiliary
            .iter()
            .chain(self.primary.iter())
            .chain(self.grouping.iter())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.grouping.is_none() && self.primary.is_none() && self.auxiliary.is_empty()
    }
}

/// What a departure changed
#[derive(Debug, Default)]
pub struct LeaveEffects {
    /// The departing player, when they were a member
    pub departed: Option<Arc<Player>>,
    /// Players whose match ended because of this departure
    pub released: Vec<Arc<Player>>,
    /// True only for the departure that moved the room into Cleaning
    pub start_teardown: bool,
}

#[derive(Debug)]
pub struct Room {
    id: RoomId,
    kind: GroupKind,
    size: usize,
    members: Vec<Arc<Player>>,
    state: RoomState,
    resources: RoomResources,
    formed_at: DateTime<Utc>,
}

impl Room {
    /// Build a room from players taken off a queue
    ///
    /// Every member is moved into this room's match.
    pub fn form(kind: GroupKind, size: usize, members: Vec<Arc<Player>>) -> Self {
        let id = generate_room_id();
        for member in &members {
            member.enter_match(id);
        }
        Self {
            id,
            kind,
            size,
            members,
            state: RoomState::Forming,
            resources: RoomResources::default(),
            formed_at: current_timestamp(),
        }
    }

    pub fn id(&self) -> RoomId {
        self.id
    }

    pub fn kind(&self) -> GroupKind {
        self.kind
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn state(&self) -> RoomState {
        self.state
    }

    pub fn formed_at(&self) -> DateTime<Utc> {
        self.formed_at
    }

    pub fn members(&self) -> &[Arc<Player>] {
        &self.members
    }

    pub fn member_ids(&self) -> Vec<PlayerId> {
        self.members.iter().map(|p| p.id().to_string()).collect()
    }

    pub fn player_count(&self) -> usize {
        self.members.len()
    }

    pub fn player_in_room(&self, player_id: &str) -> bool {
        self.members.iter().any(|p| p.id() == player_id)
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= self.size
    }

    /// True once teardown has begun
    pub fn is_cleaning(&self) -> bool {
        matches!(self.state, RoomState::Cleaning | RoomState::Closed)
    }

    pub fn resources(&self) -> &RoomResources {
        &self.resources
    }

    pub(crate) fn resources_mut(&mut self) -> &mut RoomResources {
        &mut self.resources
    }

    /// Add a player; false when the room is full or already has them
    pub fn add_player(&mut self, player: Arc<Player>) -> bool {
        if self.is_full() || self.player_in_room(player.id()) {
            return false;
        }
        self.members.push(player);
        true
    }

    pub fn remove_player(&mut self, player_id: &str) -> Option<Arc<Player>> {
        let index = self.members.iter().position(|p| p.id() == player_id)?;
        Some(self.members.remove(index))
    }

    fn transition(&mut self, from: RoomState, to: RoomState) -> Result<()> {
        if self.state != from {
            return Err(PickupError::InvalidRoomTransition {
                room_id: self.id.to_string(),
                from: self.state.to_string(),
                to: to.to_string(),
            }
            .into());
        }
        self.state = to;
        Ok(())
    }

    /// Forming -> Active
    pub fn mark_active(&mut self) -> Result<()> {
        self.transition(RoomState::Forming, RoomState::Active)
    }

    /// Cleaning -> Closed
    pub fn mark_closed(&mut self) -> Result<()> {
        self.transition(RoomState::Cleaning, RoomState::Closed)
    }

    /// Handle a departure
    ///
    /// Ends the match of every player still bound to this room, the departing
    /// one included, and starts the teardown exactly once.
    pub fn on_player_left(&mut self, player_id: &str) -> LeaveEffects {
        let departed = self.remove_player(player_id);

        let released: Vec<Arc<Player>> = departed
            .iter()
            .chain(self.members.iter())
            .filter(|p| p.end_match(self.id))
            .cloned()
            .collect();

        let start_teardown = !self.is_cleaning();
        if start_teardown {
            self.state = RoomState::Cleaning;
        }

        LeaveEffects {
            departed,
            released,
            start_teardown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::PlayerStatus;

    fn players(ids: &[&str]) -> Vec<Arc<Player>> {
        ids.iter()
            .map(|id| Arc::new(Player::new(*id, "1234-5678-9012")))
            .collect()
    }

    #[test]
    fn test_form_moves_members_into_match() {
        let members = players(&["1", "2"]);
        let room = Room::form(GroupKind::Pair, 2, members.clone());

        assert_eq!(room.state(), RoomState::Forming);
        assert_eq!(room.player_count(), 2);
        assert!(room.is_full());
        for member in &members {
            assert_eq!(member.status(), PlayerStatus::InMatch(room.id()));
        }
    }

    #[test]
    fn test_state_transitions() {
        let mut room = Room::form(GroupKind::Pair, 2, players(&["1", "2"]));
        assert!(room.mark_closed().is_err());

        room.mark_active().unwrap();
        assert_eq!(room.state(), RoomState::Active);
        assert!(room.mark_active().is_err());

        room.on_player_left("1");
        assert_eq!(room.state(), RoomState::Cleaning);
        room.mark_closed().unwrap();
        assert_eq!(room.state(), RoomState::Closed);
        assert!(room.is_cleaning());
    }

    #[test]
    fn test_two_departures_start_one_teardown() {
        let members = players(&["1", "2"]);
        let mut room = Room::form(GroupKind::Pair, 2, members.clone());
        room.mark_active().unwrap();

        let first = room.on_player_left("1");
        assert!(first.start_teardown);
        assert_eq!(first.departed.as_ref().map(|p| p.id()), Some("1"));
        assert_eq!(first.released.len(), 2);
        assert!(members.iter().all(|p| p.is_idle()));
        assert!(room.is_cleaning());

        let second = room.on_player_left("2");
        assert!(!second.start_teardown);
        assert!(second.released.is_empty());
        assert_eq!(room.player_count(), 0);
    }

    #[test]
    fn test_leave_from_non_member() {
        let mut room = Room::form(GroupKind::Pair, 2, players(&["1", "2"]));
        room.mark_active().unwrap();

        let effects = room.on_player_left("9");
        assert!(effects.departed.is_none());
        assert_eq!(room.player_count(), 2);
    }

    #[test]
    fn test_add_and_remove_player() {
        let mut room = Room::form(GroupKind::Quad, 4, players(&["1", "2"]));
        let extra = players(&["3", "4", "5"]);

        assert!(room.add_player(extra[0].clone()));
        assert!(!room.add_player(extra[0].clone()));
        assert!(room.add_player(extra[1].clone()));
        assert!(!room.add_player(extra[2].clone()));

        assert!(room.remove_player("3").is_some());
        assert!(room.remove_player("3").is_none());
        assert!(!room.player_in_room("3"));
        assert_eq!(room.member_ids(), vec!["1", "2", "4"]);
    }

    #[test]
    fn test_resources_deletion_order() {
        let handle = |id: &str, kind| ChannelHandle {
            id: id.to_string(),
            kind,
            name: id.to_string(),
        };
        let resources = RoomResources {
            grouping: Some(handle("g", crate::platform::ChannelKind::Grouping)),
            primary: Some(handle("t", crate::platform::ChannelKind::Text)),
            auxiliary: vec![handle("v", crate::platform::ChannelKind::Voice)],
        };
        let ids: Vec<&str> = resources.all().iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["v", "t", "g"]);
        assert!(RoomResources::default().is_empty());
    }
}
