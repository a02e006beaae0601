//! Player registry
//!
//! Maps identities to the single live [`Player`] instance for each of them,
//! loading registration data from a [`RegistrationStore`] on first use.

use crate::error::{PickupError, Result};
use crate::player::state::Player;
use crate::player::store::RegistrationStore;
use crate::types::{PlayerId, RegisterOutcome};
use crate::utils::{is_valid_friend_code, is_valid_player_id};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

pub struct PlayerRegistry {
    store: Arc<dyn RegistrationStore>,
    players: RwLock<HashMap<PlayerId, Arc<Player>>>,
}

fn store_failed(error: anyhow::Error) -> anyhow::Error {
    match error.downcast::<PickupError>() {
        Ok(pickup @ PickupError::StoreFailed { .. }) => pickup.into(),
        Ok(other) => PickupError::StoreFailed {
            message: other.to_string(),
        }
        .into(),
        Err(error) => PickupError::StoreFailed {
            message: error.to_string(),
        }
        .into(),
    }
}

impl PlayerRegistry {
    pub fn new(store: Arc<dyn RegistrationStore>) -> Self {
        Self {
            store,
            players: RwLock::new(HashMap::new()),
        }
    }

    /// Look up a player that is already live, without touching the store
    pub fn tracked(&self, player_id: &str) -> Result<Option<Arc<Player>>> {
        let players = self
            .players
            .read()
            .map_err(|_| PickupError::lock_poisoned("players"))?;
        Ok(players.get(player_id).cloned())
    }

    /// Number of live players
    pub fn tracked_count(&self) -> Result<usize> {
        let players = self
            .players
            .read()
            .map_err(|_| PickupError::lock_poisoned("players"))?;
        Ok(players.len())
    }

    /// Get the live player for `player_id`, creating it from its registration
    ///
    /// Concurrent calls for one identity always return the same instance.
    pub fn resolve(&self, player_id: &str) -> Result<Arc<Player>> {
        if !is_valid_player_id(player_id) {
            return Err(PickupError::InvalidPlayerId {
                player_id: player_id.to_string(),
            }
            .into());
        }

        if let Some(player) = self.tracked(player_id)? {
            return Ok(player);
        }

        let registration = self
            .store
            .get(player_id)
            .map_err(store_failed)?
            .ok_or_else(|| PickupError::NotRegistered {
                player_id: player_id.to_string(),
            })?;

        let mut players = self
            .players
            .write()
            .map_err(|_| PickupError::lock_poisoned("players"))?;
        let player = players
            .entry(player_id.to_string())
            .or_insert_with(|| {
                debug!("Tracking player {}", player_id);
                Arc::new(Player::new(player_id, registration.friend_code))
            })
            .clone();
        Ok(player)
    }

    /// Register a friend code, or update the existing one
    pub fn register(&self, player_id: &str, friend_code: &str) -> Result<RegisterOutcome> {
        if !is_valid_player_id(player_id) {
            return Err(PickupError::InvalidPlayerId {
                player_id: player_id.to_string(),
            }
            .into());
        }
        if !is_valid_friend_code(friend_code) {
            return Err(PickupError::InvalidFriendCode {
                friend_code: friend_code.to_string(),
            }
            .into());
        }

        let outcome = if self.store.exists(player_id).map_err(store_failed)? {
            self.store
                .update_friend_code(player_id, friend_code)
                .map_err(store_failed)?;
            RegisterOutcome::Updated
        } else {
            self.store
                .register(player_id, friend_code)
                .map_err(store_failed)?;
            RegisterOutcome::Registered
        };

        if let Some(player) = self.tracked(player_id)? {
            player.set_friend_code(friend_code);
        }

        info!("Player {} registration: {:?}", player_id, outcome);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::as_pickup_error;
    use crate::player::store::{InMemoryRegistrationStore, MockRegistrationStore, Registration};

    fn registry() -> PlayerRegistry {
        PlayerRegistry::new(Arc::new(InMemoryRegistrationStore::new()))
    }

    #[test]
    fn test_register_then_update() {
        let registry = registry();
        assert_eq!(
            registry.register("1", "1111-2222-3333").unwrap(),
            RegisterOutcome::Registered
        );
        let player = registry.resolve("1").unwrap();

        assert_eq!(
            registry.register("1", "4444-5555-6666").unwrap(),
            RegisterOutcome::Updated
        );
        assert_eq!(player.friend_code(), "4444-5555-6666");
    }

    #[test]
    fn test_invalid_input_rejected() {
        let registry = registry();

        let err = registry.register("1", "12-34").unwrap_err();
        assert!(matches!(
            as_pickup_error(&err),
            Some(PickupError::InvalidFriendCode { .. })
        ));

        let err = registry.register("bob", "1111-2222-3333").unwrap_err();
        assert!(matches!(
            as_pickup_error(&err),
            Some(PickupError::InvalidPlayerId { .. })
        ));
    }

    #[test]
    fn test_resolve_unregistered() {
        let registry = registry();
        let err = registry.resolve("7").unwrap_err();
        assert!(matches!(
            as_pickup_error(&err),
            Some(PickupError::NotRegistered { .. })
        ));
        assert!(registry.tracked("7").unwrap().is_none());
    }

    #[test]
    fn test_resolve_returns_same_instance() {
        let registry = Arc::new(registry());
        registry.register("1", "1111-2222-3333").unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.resolve("1").unwrap())
            })
            .collect();
        let players: Vec<Arc<Player>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        for player in &players {
            assert!(Arc::ptr_eq(player, &players[0]));
        }
        assert_eq!(registry.tracked_count().unwrap(), 1);
    }

    #[test]
    fn test_store_failure_is_reported() {
        let mut store = MockRegistrationStore::new();
        store
            .expect_get()
            .returning(|_| Err(anyhow::anyhow!("database is locked")));
        store
            .expect_exists()
            .returning(|_| Err(anyhow::anyhow!("database is locked")));

        let registry = PlayerRegistry::new(Arc::new(store));

        let err = registry.resolve("1").unwrap_err();
        assert!(matches!(
            as_pickup_error(&err),
            Some(PickupError::StoreFailed { .. })
        ));

        let err = registry.register("1", "1111-2222-3333").unwrap_err();
        assert!(matches!(
            as_pickup_error(&err),
            Some(PickupError::StoreFailed { .. })
        ));
    }

    #[test]
    fn test_resolve_reads_store_once() {
        let mut store = MockRegistrationStore::new();
        store
            .expect_get()
            .times(1)
            .returning(|id| Ok(Some(Registration::new(id, "1111-2222-3333"))));

        let registry = PlayerRegistry::new(Arc::new(store));
        let first = registry.resolve("5").unwrap();
        let second = registry.resolve("5").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.friend_code(), "1111-2222-3333");
    }
}
