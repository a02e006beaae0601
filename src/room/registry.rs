//! Set of live rooms, keyed by room id

use crate::error::{PickupError, Result};
use crate::room::instance::Room;
use crate::types::RoomId;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;

/// A room shared between the manager, its leave handlers and its teardown task
pub type SharedRoom = Arc<Mutex<Room>>;

#[derive(Default)]
pub struct ActiveRooms {
    rooms: RwLock<HashMap<RoomId, SharedRoom>>,
}

impl ActiveRooms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, room: Room) -> Result<SharedRoom> {
        let room_id = room.id();
        let shared = Arc::new(Mutex::new(room));
        let mut rooms = self
            .rooms
            .write()
            .map_err(|_| PickupError::lock_poisoned("rooms"))?;
        rooms.insert(room_id, shared.clone());
        Ok(shared)
    }

    pub fn get(&self, room_id: RoomId) -> Result<Option<SharedRoom>> {
        let rooms = self
            .rooms
            .read()
            .map_err(|_| PickupError::lock_poisoned("rooms"))?;
        Ok(rooms.get(&room_id).cloned())
    }

    pub fn remove(&self, room_id: RoomId) -> Result<Option<SharedRoom>> {
        let mut rooms = self
            .rooms
            .write()
            .map_err(|_| PickupError::lock_poisoned("rooms"))?;
        Ok(rooms.remove(&room_id))
    }

    pub fn len(&self) -> Result<usize> {
        let rooms = self
            .rooms
            .read()
            .map_err(|_| PickupError::lock_poisoned("rooms"))?;
        Ok(rooms.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn all(&self) -> Result<Vec<SharedRoom>> {
        let rooms = self
            .rooms
            .read()
            .map_err(|_| PickupError::lock_poisoned("rooms"))?;
        Ok(rooms.values().cloned().collect())
    }

    /// Find the live room a player is a member of
    ///
    /// Locks one room at a time; the map lock is never held across an await.
    pub async fn find_by_player(&self, player_id: &str) -> Result<Option<SharedRoom>> {
        for room in self.all()? {
            if room.lock().await.player_in_room(player_id) {
                return Ok(Some(room));
            }
        }
        Ok(None)
    }
}
