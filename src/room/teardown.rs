//! Staged room teardown
//!
//! A room that loses a player is warned three times, then deleted. The
//! countdown runs in its own task and cannot be cancelled by commands.

use crate::error::{PickupError, Result};
use crate::types::RoomId;
use crate::utils::describe_duration;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Waits between the warnings and the final deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeardownSchedule {
    stages: [Duration; 3],
}

impl Default for TeardownSchedule {
    fn default() -> Self {
        Self::new([
            Duration::from_secs(300),
            Duration::from_secs(240),
            Duration::from_secs(60),
        ])
    }
}

impl TeardownSchedule {
    pub fn new(stages: [Duration; 3]) -> Self {
        Self { stages }
    }

    pub fn stages(&self) -> [Duration; 3] {
        self.stages
    }

    /// Time from the first warning to deletion
    pub fn total(&self) -> Duration {
        self.stages.iter().sum()
    }

    /// Warning posted before each stage's wait
    pub fn warnings(&self) -> [String; 3] {
        let [first, second, third] = self.stages;
        [
            format!(
                "A player has left. The room will be closed in {}.",
                describe_duration(first + second + third)
            ),
            format!(
                "Room will be closed in {}.",
                describe_duration(second + third)
            ),
            format!("Room will be closed in {}.", describe_duration(third)),
        ]
    }
}

/// Tracks the teardown task of every room being torn down
#[derive(Debug, Default, Clone)]
pub struct TeardownScheduler {
    tasks: Arc<Mutex<HashMap<RoomId, JoinHandle<()>>>>,
}

impl TeardownScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `job` as the teardown of `room_id`
    ///
    /// Returns false, without spawning, when the room already has one.
    pub fn schedule<F>(&self, room_id: RoomId, job: F) -> Result<bool>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self
            .tasks
            .lock()
            .map_err(|_| PickupError::lock_poisoned("teardown"))?;
        if tasks.contains_key(&room_id) {
            debug!("Room {} already has a teardown scheduled", room_id);
            return Ok(false);
        }

        // The task cannot deregister itself until this guard is released
        let registry = self.tasks.clone();
        let handle = tokio::spawn(async move {
            job.await;
            registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&room_id);
        });
        tasks.insert(room_id, handle);

        info!("Scheduled teardown for room {}", room_id);
        Ok(true)
    }

    pub fn is_scheduled(&self, room_id: RoomId) -> bool {
        self.tasks
            .lock()
            .map(|tasks| tasks.contains_key(&room_id))
            .unwrap_or(false)
    }

    /// Number of teardowns still running
    pub fn pending(&self) -> usize {
        self.tasks.lock().map(|tasks| tasks.len()).unwrap_or(0)
    }

    /// Wait for every running teardown, up to `timeout`
    ///
    /// Returns how many were still running when the time ran out.
    pub async fn wait_for_all(&self, timeout: Duration) -> usize {
        let handles: Vec<(RoomId, JoinHandle<()>)> = match self.tasks.lock() {
            Ok(mut tasks) => tasks.drain().collect(),
            Err(poisoned) => poisoned.into_inner().drain().collect(),
        };
        if handles.is_empty() {
            return 0;
        }

        info!("Waiting for {} room teardowns to finish", handles.len());
        // No deadline when `timeout` is too large to represent
        let deadline = Instant::now().checked_add(timeout);
        let mut unfinished = 0;
        for (room_id, handle) in handles {
            let joined = match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, handle).await,
                None => Ok(handle.await),
            };
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Teardown task for room {} failed: {}", room_id, e),
                Err(_) => {
                    warn!("Teardown for room {} did not finish in time", room_id);
                    unfinished += 1;
                }
            }
        }
        unfinished
    }
}
