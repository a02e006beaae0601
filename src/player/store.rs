//! Registration persistence
//!
//! The store keeps the identity to friend-code mapping. Live player state is
//! never persisted.

use crate::error::{PickupError, Result};
use crate::types::PlayerId;
use crate::utils::current_timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, info};

/// A stored registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub player_id: PlayerId,
    pub friend_code: String,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Registration {
    pub fn new(player_id: &str, friend_code: &str) -> Self {
        let now = current_timestamp();
        Self {
            player_id: player_id.to_string(),
            friend_code: friend_code.to_string(),
            registered_at: now,
            updated_at: now,
        }
    }
}

/// Persistent registration storage
#[cfg_attr(test, mockall::automock)]
pub trait RegistrationStore: Send + Sync {
    fn exists(&self, player_id: &str) -> Result<bool>;

    fn register(&self, player_id: &str, friend_code: &str) -> Result<()>;

    fn update_friend_code(&self, player_id: &str, friend_code: &str) -> Result<()>;

    fn get(&self, player_id: &str) -> Result<Option<Registration>>;
}

fn upsert(
    registrations: &mut HashMap<PlayerId, Registration>,
    player_id: &str,
    friend_code: &str,
) {
    match registrations.get_mut(player_id) {
        Some(existing) => {
            existing.friend_code = friend_code.to_string();
            existing.updated_at = current_timestamp();
        }
        None => {
            registrations.insert(
                player_id.to_string(),
                Registration::new(player_id, friend_code),
            );
        }
    }
}

/// Registrations held in memory only
#[derive(Debug, Default)]
pub struct InMemoryRegistrationStore {
    registrations: RwLock<HashMap<PlayerId, Registration>>,
}

impl InMemoryRegistrationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.registrations.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RegistrationStore for InMemoryRegistrationStore {
    fn exists(&self, player_id: &str) -> Result<bool> {
        let registrations = self
            .registrations
            .read()
            .map_err(|_| PickupError::lock_poisoned("registrations"))?;
        Ok(registrations.contains_key(player_id))
    }

    fn register(&self, player_id: &str, friend_code: &str) -> Result<()> {
        let mut registrations = self
            .registrations
            .write()
            .map_err(|_| PickupError::lock_poisoned("registrations"))?;
        upsert(&mut registrations, player_id, friend_code);
        Ok(())
    }

    fn update_friend_code(&self, player_id: &str, friend_code: &str) -> Result<()> {
        self.register(player_id, friend_code)
    }

    fn get(&self, player_id: &str) -> Result<Option<Registration>> {
        let registrations = self
            .registrations
            .read()
            .map_err(|_| PickupError::lock_poisoned("registrations"))?;
        Ok(registrations.get(player_id).cloned())
    }
}

/// Registrations kept in a JSON file, rewritten on every mutation
#[derive(Debug)]
pub struct JsonFileRegistrationStore {
    path: PathBuf,
    registrations: RwLock<HashMap<PlayerId, Registration>>,
}

impl JsonFileRegistrationStore {
    /// Open the file at `path`, starting empty when it does not exist yet
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let registrations: HashMap<PlayerId, Registration> = if path.exists() {
            let contents = std::fs::read_to_string(&path).map_err(|e| {
                PickupError::StoreFailed {
                    message: format!("failed to read {}: {}", path.display(), e),
                }
            })?;
            let list: Vec<Registration> =
                serde_json::from_str(&contents).map_err(|e| PickupError::StoreFailed {
                    message: format!("failed to parse {}: {}", path.display(), e),
                })?;
            list.into_iter()
                .map(|r| (r.player_id.clone(), r))
                .collect()
        } else {
            HashMap::new()
        };

        info!(
            "Opened registration store at {} with {} registrations",
            path.display(),
            registrations.len()
        );

        Ok(Self {
            path,
            registrations: RwLock::new(registrations),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, registrations: &HashMap<PlayerId, Registration>) -> Result<()> {
        let mut list: Vec<&Registration> = registrations.values().collect();
        list.sort_by(|a, b| a.player_id.cmp(&b.player_id));
        let json = serde_json::to_string_pretty(&list)?;

        // Write then rename so a crash never leaves a truncated file
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .and_then(|_| std::fs::rename(&tmp, &self.path))
            .map_err(|e| PickupError::StoreFailed {
                message: format!("failed to write {}: {}", self.path.display(), e),
            })?;

        debug!(
            "Persisted {} registrations to {}",
            list.len(),
            self.path.display()
        );
        Ok(())
    }
}

impl RegistrationStore for JsonFileRegistrationStore {
    fn exists(&self, player_id: &str) -> Result<bool> {
        let registrations = self
            .registrations
            .read()
            .map_err(|_| PickupError::lock_poisoned("registrations"))?;
        Ok(registrations.contains_key(player_id))
    }

    fn register(&self, player_id: &str, friend_code: &str) -> Result<()> {
        let mut registrations = self
            .registrations
            .write()
            .map_err(|_| PickupError::lock_poisoned("registrations"))?;
        let mut updated = registrations.clone();
        upsert(&mut updated, player_id, friend_code);
        self.persist(&updated)?;
        *registrations = updated;
        Ok(())
    }

    fn update_friend_code(&self, player_id: &str, friend_code: &str) -> Result<()> {
        self.register(player_id, friend_code)
    }

    fn get(&self, player_id: &str) -> Result<Option<Registration>> {
        let registrations = self
            .registrations
            .read()
            .map_err(|_| PickupError::lock_poisoned("registrations"))?;
        Ok(registrations.get(player_id).cloned())
    }
}
