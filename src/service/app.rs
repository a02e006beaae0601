//! Main application state and service coordination
//!
//! This module contains the production AppState that wires the registration
//! store, the pickup manager, the AMQP consumer, metrics and background tasks.

use crate::amqp::connection::{AmqpConfig, AmqpConnection};
use crate::amqp::handlers::{log_delivery_error, CommandConsumer, CommandHandler};
use crate::amqp::messages::MessageUtils;
use crate::config::AppConfig;
use crate::error::{as_pickup_error, PickupError, Result as PickupResult};
use crate::matchmaking::PickupManager;
use crate::metrics::health::HealthServerConfig;
use crate::metrics::{HealthServer, MetricsCollector, MetricsService};
use crate::platform::{InMemoryPlatform, PlatformClient};
use crate::player::PlayerStatus;
use crate::player::{InMemoryRegistrationStore, JsonFileRegistrationStore, RegistrationStore};
use crate::service::health::HealthHandle;
use crate::types::{CommandMessage, EnqueueOutcome, LeaveOutcome, RegisterOutcome};
use crate::utils::mention;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("AMQP connection error: {message}")]
    AmqpConnection { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Command handler that drives the pickup manager and replies in chat
pub struct ProductionCommandHandler {
    manager: PickupManager,
    search_channel_id: Option<String>,
}

impl ProductionCommandHandler {
    pub fn new(manager: PickupManager, search_channel_id: Option<String>) -> Self {
        Self {
            manager,
            search_channel_id,
        }
    }

    /// Register and enqueue commands are only taken from the search channel
    fn check_channel(&self, command: &CommandMessage) -> PickupResult<()> {
        let gated = matches!(
            command,
            CommandMessage::Register(_) | CommandMessage::Enqueue(_) | CommandMessage::EnqueueTeam(_)
        );
        match (gated, self.search_channel_id.as_deref(), command.channel_id()) {
            (true, Some(expected), Some(actual)) if expected != actual => {
                Err(PickupError::WrongChannel {
                    channel_id: actual.to_string(),
                }
                .into())
            }
            _ => Ok(()),
        }
    }

    async fn reply(&self, command: &CommandMessage, message: &str) {
        let Some(channel_id) = command.channel_id() else {
            return;
        };
        let content = format!("{}: {}", mention(command.player_id()), message);
        if let Err(e) = self
            .manager
            .platform()
            .send_message(channel_id, &content)
            .await
        {
            warn!("Failed to reply in channel {}: {}", channel_id, e);
        }
    }

    /// Run the command; `Ok(Some(text))` is the success reply, if any
    /// A leave counts only where the player is: the room's text channel
    /// while matched, the search channel while queued
    async fn check_leave_channel(&self, command: &CommandMessage) -> PickupResult<()> {
        let (CommandMessage::Leave(cmd), Some(actual)) = (command, command.channel_id()) else {
            return Ok(());
        };
        let Some(player) = self.manager.registry().tracked(&cmd.player_id)? else {
            return Ok(());
        };

        let expected = match player.status() {
            PlayerStatus::Searching(_) => self.search_channel_id.clone(),
            PlayerStatus::InMatch(room_id) => match self.manager.rooms().get(room_id)? {
                Some(shared) => {
                    let room = shared.lock().await;
                    let primary = room.resources().primary.as_ref().map(|p| p.id.clone());
                    primary
                }
                None => None,
            },
            PlayerStatus::Idle => None,
        };

        match expected {
            Some(expected) if expected != actual => Err(PickupError::WrongChannel {
                channel_id: actual.to_string(),
            }
            .into()),
            _ => Ok(()),
        }
    }

    async fn execute(&self, command: &CommandMessage) -> PickupResult<Option<&'static str>> {
        self.check_channel(command)?;
        self.check_leave_channel(command).await?;
        MessageUtils::validate_command(command)?;

        let reply = match command {
            CommandMessage::Register(cmd) => {
                match self
                    .manager
                    .register(&cmd.player_id, cmd.friend_code.trim())
                    .await?
                {
                    RegisterOutcome::Updated => Some("Your friend code has been updated."),
                    RegisterOutcome::Registered => Some(
                        "Registered successfully! Use !pair, !quad, or !private to start searching.",
                    ),
                }
            }
            CommandMessage::Enqueue(cmd) => {
                match self.manager.enqueue(&cmd.player_id, cmd.group_kind).await? {
                    EnqueueOutcome::Queued { .. } => Some("You have been added to the queue"),
                    EnqueueOutcome::RoomFormed { .. } => None,
                }
            }
            CommandMessage::EnqueueTeam(cmd) => {
                match self
                    .manager
                    .enqueue_team(&cmd.player_id, cmd.group_kind, &cmd.member_ids)
                    .await?
                {
                    EnqueueOutcome::Queued { .. } => Some("Your team has been added to the queue."),
                    EnqueueOutcome::RoomFormed { .. } => None,
                }
            }
            CommandMessage::Leave(cmd) => match self.manager.leave(&cmd.player_id).await? {
                LeaveOutcome::LeftQueue { .. } => Some("You have been removed from the queue."),
                LeaveOutcome::LeftRoom { .. } | LeaveOutcome::NotParticipating => None,
            },
            CommandMessage::PresenceOffline(cmd) => {
                self.manager.presence_offline(&cmd.player_id).await?;
                None
            }
        };
        Ok(reply)
    }
}

#[async_trait]
impl CommandHandler for ProductionCommandHandler {
    async fn handle_command(&self, command: CommandMessage) -> PickupResult<()> {
        let start_time = std::time::Instant::now();

        match self.execute(&command).await {
            Ok(reply) => {
                if let Some(reply) = reply {
                    self.reply(&command, reply).await;
                }
                let elapsed = start_time.elapsed();
                self.manager
                    .metrics()
                    .record_amqp_operation("consume", true, elapsed);
                info!(
                    "Command {} from '{}' processed in {:.2}ms",
                    command.name(),
                    command.player_id(),
                    elapsed.as_secs_f64() * 1000.0
                );
                Ok(())
            }
            Err(e) => {
                // Envelope failures have nobody sensible to reply to
                let rejection = as_pickup_error(&e)
                    .filter(|p| {
                        p.is_user_facing() && !matches!(p, PickupError::InvalidCommand { .. })
                    })
                    .map(|p| (matches!(p, PickupError::WrongChannel { .. }), p.to_string()));

                match rejection {
                    Some((true, _)) => {
                        debug!(
                            "Ignoring {} from '{}' sent from the wrong channel",
                            command.name(),
                            command.player_id()
                        );
                        Ok(())
                    }
                    Some((false, text)) => {
                        self.reply(&command, &text).await;
                        Ok(())
                    }
                    None => Err(e),
                }
            }
        }
    }

    async fn handle_error(&self, error: anyhow::Error, message_data: &[u8]) {
        self.manager
            .metrics()
            .record_amqp_operation("consume", false, Duration::ZERO);
        log_delivery_error(&error, message_data);
    }
}

/// Main application state containing all service components
pub struct AppState {
    /// Application configuration
    config: AppConfig,

    /// Core matchmaking engine
    manager: PickupManager,

    /// AMQP connection, present once started
    amqp_connection: Arc<RwLock<Option<Arc<AmqpConnection>>>>,

    /// Metrics service for monitoring and health checks
    metrics_service: Arc<MetricsService>,

    /// Background task handles
    background_tasks: Vec<JoinHandle<()>>,

    /// AMQP consumer for commands
    command_consumer: Option<CommandConsumer>,

    /// Service status
    is_running: Arc<RwLock<bool>>,
}

impl AppState {
    /// Initialize the application with the in-memory platform
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        Self::with_platform(config, Arc::new(InMemoryPlatform::new())).await
    }

    /// Initialize the application against a given platform client
    pub async fn with_platform(
        config: AppConfig,
        platform: Arc<dyn PlatformClient>,
    ) -> Result<Self, ServiceError> {
        info!("Initializing pickup-room service");
        info!(
            "Configuration: service={}, amqp_url={}, command_queue={}",
            config.service.name, config.amqp.url, config.amqp.command_queue
        );

        crate::config::validate_config(&config).map_err(|e| ServiceError::Configuration {
            message: e.to_string(),
        })?;

        let metrics_collector =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );
        let store = Self::initialize_store(&config)?;
        let manager =
            PickupManager::from_config(&config, store, platform, metrics_collector.clone())
                .map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to initialize pickup manager: {}", e),
                })?;

        let is_running = Arc::new(RwLock::new(false));
        let amqp_connection = Arc::new(RwLock::new(None));
        let health = HealthHandle::new(
            config.service.name.clone(),
            manager.clone(),
            is_running.clone(),
            amqp_connection.clone(),
        );
        let metrics_service = Self::initialize_metrics(&config, metrics_collector, health);

        Ok(Self {
            config,
            manager,
            amqp_connection,
            metrics_service,
            background_tasks: Vec::new(),
            command_consumer: None,
            is_running,
        })
    }

    /// Start all background services and message consumption
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        info!("Starting pickup-room service");

        *self.is_running.write().await = true;

        self.start_metrics_service().await?;
        self.start_amqp_consumption().await?;
        self.start_background_tasks();

        info!("✅ Pickup-room service started successfully");
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&mut self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of pickup-room service");

        *self.is_running.write().await = false;

        if let Some(consumer) = self.command_consumer.take() {
            if let Err(e) = consumer.stop_consuming().await {
                warn!("Failed to stop AMQP consumer: {}", e);
            } else {
                info!("✅ AMQP command consumption stopped");
            }
        }

        let pending = self.manager.scheduler().pending();
        if pending > 0 {
            info!(
                "Waiting up to {:?} for {} room teardowns",
                self.config.shutdown_timeout(),
                pending
            );
        }
        let unfinished = self.manager.shutdown(self.config.shutdown_timeout()).await;
        if unfinished > 0 {
            warn!("{} room teardowns did not finish before shutdown", unfinished);
        }

        self.stop_background_tasks().await;

        info!("Stopping metrics service...");
        if let Err(e) = self.metrics_service.stop().await {
            warn!("Failed to stop metrics service: {}", e);
        } else {
            info!("✅ Metrics service stopped");
        }

        let connection = self.amqp_connection.write().await.take();
        if let Some(connection) = connection {
            match Arc::try_unwrap(connection) {
                Ok(connection) => {
                    if let Err(e) = connection.close().await {
                        warn!("Failed to close AMQP connection: {}", e);
                    }
                }
                Err(_) => warn!("AMQP connection still shared; leaving it to drop"),
            }
        }

        let final_stats =
            self.manager
                .get_stats()
                .map_err(|e| ServiceError::BackgroundTask {
                    message: format!("Failed to get final stats: {}", e),
                })?;

        info!("Final service statistics: {:?}", final_stats);
        info!("✅ Pickup-room service shutdown completed");

        Ok(())
    }

    /// Get service configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Check if service is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// Mark the service available (or not) to health checks
    pub async fn set_running(&self, running: bool) {
        *self.is_running.write().await = running;
    }

    pub fn manager(&self) -> &PickupManager {
        &self.manager
    }

    /// Get metrics service
    pub fn metrics_service(&self) -> Arc<MetricsService> {
        self.metrics_service.clone()
    }

    /// Get AMQP connection for health checks
    pub async fn amqp_connection(&self) -> Option<Arc<AmqpConnection>> {
        self.amqp_connection.read().await.clone()
    }

    /// Handles the health endpoints read from
    pub fn health_handle(&self) -> HealthHandle {
        HealthHandle::new(
            self.config.service.name.clone(),
            self.manager.clone(),
            self.is_running.clone(),
            self.amqp_connection.clone(),
        )
    }

    fn initialize_metrics(
        config: &AppConfig,
        metrics_collector: Arc<MetricsCollector>,
        health: HealthHandle,
    ) -> Arc<MetricsService> {
        info!(
            "Initializing metrics service on port {}",
            config.service.health_port
        );

        let health_config = HealthServerConfig {
            port: config.service.health_port,
            host: "0.0.0.0".to_string(),
        };

        let health_server = Arc::new(
            HealthServer::new(health_config, metrics_collector.clone()).with_health(health),
        );
        Arc::new(MetricsService::new(metrics_collector, health_server))
    }

    fn initialize_store(config: &AppConfig) -> Result<Arc<dyn RegistrationStore>, ServiceError> {
        match &config.storage.registrations_path {
            Some(path) => {
                info!("Loading registrations from {}", path.display());
                let store = JsonFileRegistrationStore::open(path).map_err(|e| {
                    ServiceError::Initialization {
                        message: format!("Failed to open registration store: {}", e),
                    }
                })?;
                Ok(Arc::new(store))
            }
            None => {
                warn!("No registrations path configured; registrations will not survive restarts");
                Ok(Arc::new(InMemoryRegistrationStore::new()))
            }
        }
    }

    async fn start_metrics_service(&mut self) -> Result<(), ServiceError> {
        info!("Starting metrics and health endpoints");

        let metrics_service = self.metrics_service.clone();
        let port = self.config.service.health_port;

        let metrics_handle = tokio::spawn(async move {
            if let Err(e) = metrics_service.start().await {
                error!("Metrics service failed: {}", e);
            } else {
                info!("Metrics service task completed");
            }
        });
        self.background_tasks.push(metrics_handle);

        tokio::time::sleep(Duration::from_millis(100)).await;

        info!("✅ Metrics service started on port {}", port);
        Ok(())
    }

    async fn start_amqp_consumption(&mut self) -> Result<(), ServiceError> {
        info!("Connecting to AMQP broker: {}", self.config.amqp.url);

        let connection = AmqpConnection::new(AmqpConfig::from_settings(&self.config.amqp))
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to connect to AMQP: {}", e),
            })?;

        let channel = connection
            .connection()
            .open_channel(None)
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to open consumer channel: {}", e),
            })?;

        let queue_name = self.config.amqp.command_queue.clone();
        info!("Declaring queue: '{}'...", queue_name);
        let queue_declare_args = amqprs::channel::QueueDeclareArguments::new(&queue_name)
            .durable(true)
            .auto_delete(false)
            .finish();

        channel
            .queue_declare(queue_declare_args)
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to declare queue {}: {}", queue_name, e),
            })?;

        let handler = Arc::new(ProductionCommandHandler::new(
            self.manager.clone(),
            self.config.platform.search_channel_id.clone(),
        ));
        let consumer = CommandConsumer::new(handler, channel);
        consumer
            .start_consuming(&queue_name)
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to start consuming commands: {}", e),
            })?;

        self.command_consumer = Some(consumer);
        *self.amqp_connection.write().await = Some(Arc::new(connection));

        info!(
            "AMQP command consumption started on queue: '{}'",
            queue_name
        );
        Ok(())
    }

    fn start_background_tasks(&mut self) {
        info!("Starting background maintenance tasks...");

        let stats_task = {
            let manager = self.manager.clone();
            let metrics_collector = self.metrics_service.collector();
            let is_running = self.is_running.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(30));
                info!("Metrics update task started");

                while *is_running.read().await {
                    interval.tick().await;

                    match manager.get_stats() {
                        Ok(stats) => {
                            debug!(
                                "Updating metrics - rooms: {}, waiting: {}, formed: {}",
                                stats.active_rooms, stats.players_waiting, stats.rooms_formed
                            );
                            metrics_collector.update_from_stats(&stats);
                        }
                        Err(e) => {
                            warn!("Failed to get pickup stats for metrics update: {}", e);
                        }
                    }
                }

                info!("Metrics update task stopped");
            })
        };

        let health_metrics_task = {
            let metrics_collector = self.metrics_service.collector();
            let manager = self.manager.clone();
            let amqp_connection = self.amqp_connection.clone();
            let is_running = self.is_running.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(60));
                let start_time = tokio::time::Instant::now();
                info!("Health metrics task started");

                while *is_running.read().await {
                    interval.tick().await;

                    let uptime_seconds = start_time.elapsed().as_secs() as i64;
                    metrics_collector
                        .service()
                        .uptime_seconds
                        .set(uptime_seconds);

                    let amqp_up = amqp_connection
                        .read()
                        .await
                        .as_ref()
                        .is_some_and(|connection| connection.is_alive());
                    let manager_up = manager.get_stats().is_ok();

                    metrics_collector.update_component_health("amqp", amqp_up);
                    metrics_collector.update_component_health("pickup_manager", manager_up);
                    metrics_collector.update_component_health("metrics", true);
                    metrics_collector.update_health_status(match (amqp_up, manager_up) {
                        (true, true) => 2,
                        (false, true) => 1,
                        _ => 0,
                    });

                    debug!(
                        "Updated service health metrics - uptime: {}s",
                        uptime_seconds
                    );
                }

                info!("Health metrics task stopped");
            })
        };

        self.background_tasks.push(stats_task);
        self.background_tasks.push(health_metrics_task);

        info!("2 background maintenance tasks started successfully");
    }

    async fn stop_background_tasks(&mut self) {
        let task_count = self.background_tasks.len();
        if task_count == 0 {
            info!("No background tasks to stop");
            return;
        }

        info!("Stopping {} background tasks...", task_count);

        for (i, task) in self.background_tasks.drain(..).enumerate() {
            debug!("Aborting background task {}/{}", i + 1, task_count);
            task.abort();
        }

        tokio::time::sleep(Duration::from_millis(100)).await;

        info!("✅ All {} background tasks stopped", task_count);
    }
}
