//! Pickup manager implementation
//!
//! This module provides the core PickupManager that owns the player registry,
//! one queue per group kind, the set of live rooms and their teardown tasks,
//! and exposes the command surface used by the dispatcher.

use crate::config::AppConfig;
use crate::error::{as_pickup_error, PickupError, Result};
use crate::metrics::MetricsCollector;
use crate::platform::PlatformClient;
use crate::player::{Player, PlayerRegistry, PlayerStatus, RegistrationStore};
use crate::queue::{GroupProvider, MatchQueue, StaticGroupProvider};
use crate::room::provisioning::room_handles;
use crate::room::{
    ActiveRooms, Provisioner, Room, RoomState, SharedRoom, TeardownSchedule, TeardownScheduler,
};
use crate::types::{
    EnqueueOutcome, GroupKind, LeaveOutcome, PlayerId, PresenceOutcome, RegisterOutcome, RoomId,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Statistics about pickup manager operations
#[derive(Debug, Clone, Default, Serialize)]
pub struct PickupStats {
    /// Total number of rooms formed
    pub rooms_formed: u64,
    /// Total number of rooms whose teardown completed
    pub rooms_closed: u64,
    /// Total number of teardowns started
    pub teardowns_started: u64,
    /// Total number of players queued, solo or in a team
    pub players_queued: u64,
    /// Total number of teams queued
    pub teams_queued: u64,
    /// Total number of commands rejected with a user-facing error
    pub commands_rejected: u64,
    /// Current number of live rooms
    pub active_rooms: usize,
    /// Current number of players waiting across all queues
    pub players_waiting: usize,
    pub waiting_by_kind: HashMap<GroupKind, usize>,
    pub active_by_kind: HashMap<GroupKind, usize>,
}

/// The main pickup manager
#[derive(Clone)]
pub struct PickupManager {
    /// Live players, backed by the registration store
    registry: Arc<PlayerRegistry>,
    /// One queue per group kind, created once
    queues: Arc<HashMap<GroupKind, MatchQueue>>,
    /// Rooms formed and not yet closed
    rooms: Arc<ActiveRooms>,
    /// Channel creation and deletion on the platform
    provisioner: Arc<Provisioner>,
    /// Running teardown tasks
    scheduler: TeardownScheduler,
    /// Teardown stage timing
    schedule: TeardownSchedule,
    /// Manager statistics
    stats: Arc<RwLock<PickupStats>>,
    /// Metrics collector for recording performance data
    metrics_collector: Arc<MetricsCollector>,
}

impl PickupManager {
    /// Create a new pickup manager
    pub fn new(
        registry: Arc<PlayerRegistry>,
        provisioner: Arc<Provisioner>,
        schedule: TeardownSchedule,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Result<Self> {
        let groups = provisioner.groups().clone();
        let mut queues = HashMap::new();
        for kind in groups.available_kinds() {
            let config = groups.get_group_config(kind)?;
            info!("Created {} queue with room size {}", kind, config.size);
            queues.insert(kind, MatchQueue::new(kind, config.size));
        }

        Ok(Self {
            registry,
            queues: Arc::new(queues),
            rooms: Arc::new(ActiveRooms::new()),
            provisioner,
            scheduler: TeardownScheduler::new(),
            schedule,
            stats: Arc::new(RwLock::new(PickupStats::default())),
            metrics_collector,
        })
    }

    /// Wire a manager from application configuration
    pub fn from_config(
        config: &AppConfig,
        store: Arc<dyn RegistrationStore>,
        platform: Arc<dyn PlatformClient>,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Result<Self> {
        let groups: Arc<dyn GroupProvider> = Arc::new(StaticGroupProvider::from_settings(
            &config.matchmaking,
            &config.platform,
        )?);
        let provisioner = Arc::new(Provisioner::new(platform, groups, &config.platform));
        Self::new(
            Arc::new(PlayerRegistry::new(store)),
            provisioner,
            TeardownSchedule::new(config.teardown_stages()),
            metrics_collector,
        )
    }

    pub fn registry(&self) -> &Arc<PlayerRegistry> {
        &self.registry
    }

    pub fn rooms(&self) -> &Arc<ActiveRooms> {
        &self.rooms
    }

    pub fn scheduler(&self) -> &TeardownScheduler {
        &self.scheduler
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics_collector
    }

    pub fn platform(&self) -> &Arc<dyn PlatformClient> {
        self.provisioner.platform()
    }

    /// The queue for a group kind
    pub fn queue(&self, kind: GroupKind) -> Result<&MatchQueue> {
        self.queues.get(&kind).ok_or_else(|| {
            PickupError::InternalError {
                message: format!("No queue configured for {} rooms", kind),
            }
            .into()
        })
    }

    fn search_role(&self, kind: GroupKind) -> Result<String> {
        Ok(self
            .provisioner
            .groups()
            .get_group_config(kind)?
            .search_role_id)
    }

    fn update_stats(&self, update: impl FnOnce(&mut PickupStats)) -> Result<()> {
        let mut stats = self
            .stats
            .write()
            .map_err(|_| PickupError::lock_poisoned("stats"))?;
        update(&mut stats);
        Ok(())
    }

    /// Undo a search role grant after a rejected enqueue
    ///
    /// Players that a concurrent command did queue in `kind` keep the role.
    async fn rollback_search_role(&self, players: &[Arc<Player>], kind: GroupKind, role: &str) {
        for player in players {
            if player.status() != PlayerStatus::Searching(kind) {
                self.provisioner.revoke_role(player.id(), role).await;
            }
        }
    }

    /// Record the outcome of one command
    fn finish<T>(&self, command: &str, started: Instant, result: &Result<T>) {
        let outcome = match result {
            Ok(_) => "success",
            Err(e) if as_pickup_error(e).is_some_and(|p| p.is_user_facing()) => "rejected",
            Err(_) => "error",
        };

        match result {
            Err(e) if outcome == "rejected" => {
                debug!("Command {} rejected: {}", command, e);
                if let Err(stats_error) = self.update_stats(|s| s.commands_rejected += 1) {
                    warn!("Failed to update stats: {}", stats_error);
                }
            }
            Err(e) => error!("Command {} failed: {:#}", command, e),
            Ok(_) => {}
        }

        self.metrics_collector
            .record_command(command, outcome, started.elapsed());
    }

    /// Register or update a player's friend code
    pub async fn register(&self, player_id: &str, friend_code: &str) -> Result<RegisterOutcome> {
        let started = Instant::now();
        let result = self.registry.register(player_id, friend_code);
        self.finish("register", started, &result);
        result
    }

    /// Search alone in a group kind
    pub async fn enqueue(&self, player_id: &str, kind: GroupKind) -> Result<EnqueueOutcome> {
        let started = Instant::now();
        info!("Processing enqueue - player_id: '{}', kind: {}", player_id, kind);

        let result = async {
            let player = self.registry.resolve(player_id)?;
            ensure_idle(&player, false)?;

            let queue = self.queue(kind)?;
            let search_role = self.search_role(kind)?;
            self.provisioner.grant_role(player_id, &search_role).await;

            let formed = match queue.enqueue(player.clone()) {
                Ok(formed) => formed,
                Err(e) => {
                    self.rollback_search_role(&[player], kind, &search_role).await;
                    return Err(e);
                }
            };

            self.update_stats(|s| s.players_queued += 1)?;
            self.metrics_collector.record_players_queued(kind, 1, false);

            match formed {
                Some(room) => self.open_room(room).await,
                None => Ok(EnqueueOutcome::Queued {
                    waiting: queue.len()?,
                }),
            }
        }
        .await;

        self.finish("enqueue", started, &result);
        result
    }

    /// Search with a pre-formed team led by `leader_id`
    pub async fn enqueue_team(
        &self,
        leader_id: &str,
        kind: GroupKind,
        member_ids: &[PlayerId],
    ) -> Result<EnqueueOutcome> {
        let started = Instant::now();
        info!(
            "Processing team enqueue - leader: '{}', members: {:?}, kind: {}",
            leader_id, member_ids, kind
        );

        let result = async {
            let leader = self.registry.resolve(leader_id)?;
            ensure_idle(&leader, false)?;

            let mut team = vec![leader];
            for member_id in member_ids {
                let member = self.registry.resolve(member_id).map_err(|e| {
                    let unregistered = match as_pickup_error(&e) {
                        Some(PickupError::NotRegistered { player_id }) => Some(player_id.clone()),
                        _ => None,
                    };
                    match unregistered {
                        Some(player_id) => PickupError::TeamMemberNotRegistered { player_id }.into(),
                        None => e,
                    }
                })?;
                ensure_idle(&member, true)?;
                team.push(member);
            }

            let queue = self.queue(kind)?;
            let search_role = self.search_role(kind)?;
            let team_ids: Vec<PlayerId> = team.iter().map(|p| p.id().to_string()).collect();
            for id in &team_ids {
                self.provisioner.grant_role(id, &search_role).await;
            }

            let formed = match queue.enqueue_team(team.clone()) {
                Ok(formed) => formed,
                Err(e) => {
                    self.rollback_search_role(&team, kind, &search_role).await;
                    return Err(e);
                }
            };

            self.update_stats(|s| {
                s.players_queued += team_ids.len() as u64;
                s.teams_queued += 1;
            })?;
            self.metrics_collector
                .record_players_queued(kind, team_ids.len(), true);

            match formed {
                Some(room) => self.open_room(room).await,
                None => Ok(EnqueueOutcome::Queued {
                    waiting: queue.len()?,
                }),
            }
        }
        .await;

        self.finish("enqueue_team", started, &result);
        result
    }

    /// Leave the current queue or room
    pub async fn leave(&self, player_id: &str) -> Result<LeaveOutcome> {
        let started = Instant::now();
        let result = self.handle_leave(player_id).await;
        self.finish("leave", started, &result);
        result
    }

    async fn handle_leave(&self, player_id: &str) -> Result<LeaveOutcome> {
        let Some(player) = self.registry.tracked(player_id)? else {
            return Ok(LeaveOutcome::NotParticipating);
        };

        if player.is_searching() {
            if let Some(kind) = self.remove_from_queues(&player, "left").await? {
                return Ok(LeaveOutcome::LeftQueue { kind });
            }
        }

        let shared = match player.current_room() {
            Some(room_id) => self.rooms.get(room_id)?,
            None => None,
        };
        let shared = match shared {
            Some(shared) => Some(shared),
            None => self.rooms.find_by_player(player_id).await?,
        };
        let Some(shared) = shared else {
            return Ok(LeaveOutcome::NotParticipating);
        };

        let (room_id, kind, effects, handles, never_active) = {
            let mut room = shared.lock().await;
            if !room.player_in_room(player_id) {
                return Ok(LeaveOutcome::NotParticipating);
            }
            let never_active = room.state() == RoomState::Forming;
            let effects = room.on_player_left(player_id);
            (
                room.id(),
                room.kind(),
                effects,
                room_handles(&room),
                never_active,
            )
        };

        info!(
            "Player {} left {} room {} ({} released, teardown: {})",
            player_id,
            kind,
            room_id,
            effects.released.len(),
            effects.start_teardown
        );

        self.provisioner.deny_access(&handles, player_id).await;
        // A room that never went active still holds its members' search roles
        let search_role = if never_active {
            Some(self.search_role(kind)?)
        } else {
            None
        };
        for released in &effects.released {
            self.provisioner
                .revoke_role(released.id(), self.provisioner.in_progress_role_id())
                .await;
            if let Some(role) = &search_role {
                self.provisioner.revoke_role(released.id(), role).await;
            }
        }

        if effects.start_teardown {
            self.start_teardown(shared, room_id, kind)?;
        }

        Ok(LeaveOutcome::LeftRoom {
            room_id,
            teardown_started: effects.start_teardown,
        })
    }

    /// Presence went offline: drop the player from any queue
    ///
    /// Matched players are left alone.
    pub async fn presence_offline(&self, player_id: &str) -> Result<PresenceOutcome> {
        let started = Instant::now();
        let result = async {
            let Some(player) = self.registry.tracked(player_id)? else {
                return Ok(PresenceOutcome::Ignored);
            };
            if !player.is_searching() {
                return Ok(PresenceOutcome::Ignored);
            }
            Ok(match self.remove_from_queues(&player, "offline").await? {
                Some(kind) => {
                    info!("Removed offline player {} from {} queue", player_id, kind);
                    PresenceOutcome::RemovedFromQueue { kind }
                }
                None => PresenceOutcome::Ignored,
            })
        }
        .await;

        self.finish("presence_offline", started, &result);
        result
    }

    /// Remove a player from whichever queue holds them
    async fn remove_from_queues(
        &self,
        player: &Arc<Player>,
        reason: &str,
    ) -> Result<Option<GroupKind>> {
        for (kind, queue) in self.queues.iter() {
            if queue.remove(player.id())? {
                let search_role = self.search_role(*kind)?;
                self.provisioner.revoke_role(player.id(), &search_role).await;
                self.metrics_collector.record_queue_removal(*kind, reason);
                return Ok(Some(*kind));
            }
        }
        Ok(None)
    }

    /// Track a freshly formed room and provision it
    async fn open_room(&self, room: Room) -> Result<EnqueueOutcome> {
        let room_id = room.id();
        let kind = room.kind();

        self.update_stats(|s| {
            s.rooms_formed += 1;
            *s.active_by_kind.entry(kind).or_insert(0) += 1;
        })?;
        self.metrics_collector.record_room_formed(kind);

        let shared = self.rooms.insert(room)?;

        let timer = self.metrics_collector.start_timer();
        let activation = self.provisioner.activate(&shared).await;
        self.metrics_collector
            .record_provisioning(kind, activation.is_ok(), timer.stop());

        if let Err(e) = activation {
            error!(
                "Failed to activate {} room {}; members must leave to release it: {:#}",
                kind, room_id, e
            );
            return Err(e);
        }

        Ok(EnqueueOutcome::RoomFormed { room_id })
    }

    fn start_teardown(&self, shared: SharedRoom, room_id: RoomId, kind: GroupKind) -> Result<()> {
        let manager = self.clone();
        let scheduled = self.scheduler.schedule(room_id, async move {
            manager.run_teardown(shared, room_id, kind).await;
        })?;

        if scheduled {
            self.update_stats(|s| s.teardowns_started += 1)?;
            self.metrics_collector.record_teardown_started(kind);
        }
        Ok(())
    }

    async fn run_teardown(self, shared: SharedRoom, room_id: RoomId, kind: GroupKind) {
        let primary = shared.lock().await.resources().primary.clone();

        for (warning, wait) in self
            .schedule
            .warnings()
            .iter()
            .zip(self.schedule.stages())
        {
            if let Some(primary) = &primary {
                self.provisioner.post(&primary.id, warning).await;
            }
            tokio::time::sleep(wait).await;
        }

        if let Err(e) = self.provisioner.release(&shared).await {
            error!("Failed to release room {}: {:#}", room_id, e);
        }

        if let Err(e) = self.rooms.remove(room_id) {
            error!("Failed to remove room {}: {}", room_id, e);
        }
        if let Err(e) = self.update_stats(|s| {
            s.rooms_closed += 1;
            if let Some(active) = s.active_by_kind.get_mut(&kind) {
                *active = active.saturating_sub(1);
            }
        }) {
            warn!("Failed to update stats: {}", e);
        }
        self.metrics_collector.record_room_closed(kind);

        info!("Closed {} room {}", kind, room_id);
    }

    /// Get current manager statistics
    pub fn get_stats(&self) -> Result<PickupStats> {
        let mut stats = self
            .stats
            .read()
            .map_err(|_| PickupError::lock_poisoned("stats"))?
            .clone();

        stats.waiting_by_kind.clear();
        for (kind, queue) in self.queues.iter() {
            stats.waiting_by_kind.insert(*kind, queue.len()?);
        }
        stats.players_waiting = stats.waiting_by_kind.values().sum();
        stats.active_rooms = self.rooms.len()?;
        Ok(stats)
    }

    /// Wait for running teardowns; returns how many did not finish in time
    pub async fn shutdown(&self, timeout: Duration) -> usize {
        self.scheduler.wait_for_all(timeout).await
    }
}

/// Reject a player that is already searching or matched
fn ensure_idle(player: &Player, team_member: bool) -> Result<()> {
    let player_id = player.id().to_string();
    match (player.status(), team_member) {
        (PlayerStatus::Idle, _) => Ok(()),
        (_, true) => Err(PickupError::TeamMemberBusy { player_id }.into()),
        (PlayerStatus::Searching(_), false) => Err(PickupError::AlreadySearching { player_id }.into()),
        (PlayerStatus::InMatch(_), false) => Err(PickupError::AlreadyInMatch { player_id }.into()),
    }
}
