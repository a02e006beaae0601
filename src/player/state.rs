//! Live player state shared between queues and rooms

use crate::error::PickupError;
use crate::types::{GroupKind, PlayerId, RoomId};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

/// Where a player currently is in the matchmaking flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlayerStatus {
    Idle,
    Searching(GroupKind),
    InMatch(RoomId),
}

/// A registered player
///
/// One instance exists per identity; queues and rooms share it through `Arc`.
#[derive(Debug)]
pub struct Player {
    id: PlayerId,
    friend_code: RwLock<String>,
    status: Mutex<PlayerStatus>,
}

impl Player {
    pub fn new(id: impl Into<PlayerId>, friend_code: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            friend_code: RwLock::new(friend_code.into()),
            status: Mutex::new(PlayerStatus::Idle),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn friend_code(&self) -> String {
        self.friend_code
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_friend_code(&self, friend_code: &str) {
        *self
            .friend_code
            .write()
            .unwrap_or_else(PoisonError::into_inner) = friend_code.to_string();
    }

    // Status is a plain value, so a poisoned guard still holds a consistent one.
    fn status_guard(&self) -> MutexGuard<'_, PlayerStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> PlayerStatus {
        *self.status_guard()
    }

    pub fn is_searching(&self) -> bool {
        matches!(self.status(), PlayerStatus::Searching(_))
    }

    pub fn is_in_match(&self) -> bool {
        matches!(self.status(), PlayerStatus::InMatch(_))
    }

    pub fn is_idle(&self) -> bool {
        self.status() == PlayerStatus::Idle
    }

    /// Room the player is matched into, if any
    pub fn current_room(&self) -> Option<RoomId> {
        match self.status() {
            PlayerStatus::InMatch(room_id) => Some(room_id),
            _ => None,
        }
    }

    /// Idle -> Searching(kind), atomically
    pub(crate) fn begin_search(&self, kind: GroupKind) -> Result<(), PickupError> {
        let mut status = self.status_guard();
        match *status {
            PlayerStatus::Idle => {
                *status = PlayerStatus::Searching(kind);
                Ok(())
            }
            PlayerStatus::Searching(_) => Err(PickupError::AlreadySearching {
                player_id: self.id.clone(),
            }),
            PlayerStatus::InMatch(_) => Err(PickupError::AlreadyInMatch {
                player_id: self.id.clone(),
            }),
        }
    }

    /// Searching -> Idle; returns the kind that was searched
    pub(crate) fn stop_searching(&self) -> Option<GroupKind> {
        let mut status = self.status_guard();
        match *status {
            PlayerStatus::Searching(kind) => {
                *status = PlayerStatus::Idle;
                Some(kind)
            }
            _ => None,
        }
    }

    pub(crate) fn enter_match(&self, room_id: RoomId) {
        *self.status_guard() = PlayerStatus::InMatch(room_id);
    }

    /// InMatch(room_id) -> Idle; false when the player was not in that room's match
    pub(crate) fn end_match(&self, room_id: RoomId) -> bool {
        let mut status = self.status_guard();
        if *status == PlayerStatus::InMatch(room_id) {
            *status = PlayerStatus::Idle;
            true
        } else {
            false
        }
    }
}
