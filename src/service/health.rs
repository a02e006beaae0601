//! Health check aggregation
//!
//! Readiness and liveness checks plus a detailed report combining component
//! checks with the pickup manager's statistics.

use crate::amqp::AmqpConnection;
use crate::matchmaking::{PickupManager, PickupStats};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error};

/// Shared handles the health checks read from
#[derive(Clone)]
pub struct HealthHandle {
    service_name: String,
    manager: PickupManager,
    is_running: Arc<RwLock<bool>>,
    amqp_connection: Arc<RwLock<Option<Arc<AmqpConnection>>>>,
}

impl HealthHandle {
    pub fn new(
        service_name: impl Into<String>,
        manager: PickupManager,
        is_running: Arc<RwLock<bool>>,
        amqp_connection: Arc<RwLock<Option<Arc<AmqpConnection>>>>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            manager,
            is_running,
            amqp_connection,
        }
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub fn manager(&self) -> &PickupManager {
        &self.manager
    }

    pub async fn amqp_connection(&self) -> Option<Arc<AmqpConnection>> {
        self.amqp_connection.read().await.clone()
    }
}

/// Health check status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Fold a component status into an overall one
    fn combine(self, other: &HealthStatus) -> HealthStatus {
        match (self, other) {
            (HealthStatus::Unhealthy, _) | (_, HealthStatus::Unhealthy) => HealthStatus::Unhealthy,
            (HealthStatus::Degraded, _) | (_, HealthStatus::Degraded) => HealthStatus::Degraded,
            _ => HealthStatus::Healthy,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "✅ healthy"),
            HealthStatus::Degraded => write!(f, "⚠️  degraded"),
            HealthStatus::Unhealthy => write!(f, "❌ unhealthy"),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    pub service: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    pub name: String,
    pub status: HealthStatus,
    /// Optional error message if not healthy
    pub message: Option<String>,
    /// Check duration in milliseconds
    pub duration_ms: u64,
}

/// Service statistics for health reporting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceStats {
    /// Rooms formed and not yet closed
    pub active_rooms: usize,
    /// Players waiting across all queues
    pub players_waiting: usize,
    /// Rooms formed since service start
    pub rooms_formed: u64,
    /// Rooms closed since service start
    pub rooms_closed: u64,
    /// Players queued since service start
    pub players_queued: u64,
    /// Waiting players per group kind
    pub waiting_by_kind: std::collections::HashMap<String, usize>,
}

impl From<&PickupStats> for ServiceStats {
    fn from(stats: &PickupStats) -> Self {
        Self {
            active_rooms: stats.active_rooms,
            players_waiting: stats.players_waiting,
            rooms_formed: stats.rooms_formed,
            rooms_closed: stats.rooms_closed,
            players_queued: stats.players_queued,
            waiting_by_kind: stats
                .waiting_by_kind
                .iter()
                .map(|(kind, waiting)| (kind.to_string(), *waiting))
                .collect(),
        }
    }
}

impl HealthCheck {
    /// Perform a comprehensive health check of the service
    pub async fn check(health: &HealthHandle) -> Result<Self> {
        let checks = vec![
            Self::check_service_running(health).await,
            Self::check_manager(health),
            Self::check_amqp_health(health).await,
        ];

        let status = checks
            .iter()
            .fold(HealthStatus::Healthy, |overall, check| {
                overall.combine(&check.status)
            });

        let stats = match health.manager().get_stats() {
            Ok(stats) => ServiceStats::from(&stats),
            Err(e) => {
                debug!("Failed to get pickup stats for health check: {}", e);
                ServiceStats::default()
            }
        };

        Ok(HealthCheck {
            status,
            service: health.service_name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now(),
            checks,
            stats,
        })
    }

    /// Simple liveness check - just verify service is running
    pub async fn liveness_check(health: &HealthHandle) -> Result<HealthStatus> {
        if health.is_running().await {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy)
        }
    }

    /// Readiness check - verify service can handle commands
    pub async fn readiness_check(health: &HealthHandle) -> Result<HealthStatus> {
        if !health.is_running().await {
            return Ok(HealthStatus::Unhealthy);
        }

        Ok(Self::check_manager(health).status)
    }

    async fn check_service_running(health: &HealthHandle) -> ComponentCheck {
        let start = std::time::Instant::now();

        let (status, message) = if health.is_running().await {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };

        ComponentCheck {
            name: "service_running".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn check_manager(health: &HealthHandle) -> ComponentCheck {
        let start = std::time::Instant::now();

        let (status, message) = match health.manager().get_stats() {
            Ok(_) => (HealthStatus::Healthy, None),
            Err(e) => {
                error!("Pickup manager stats check failed: {}", e);
                (
                    HealthStatus::Degraded,
                    Some(format!("Stats check failed: {}", e)),
                )
            }
        };

        ComponentCheck {
            name: "pickup_manager".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn check_amqp_health(health: &HealthHandle) -> ComponentCheck {
        let start = std::time::Instant::now();

        let (status, message) = match health.amqp_connection().await {
            Some(connection) if connection.is_alive() => (HealthStatus::Healthy, None),
            Some(_) => (
                HealthStatus::Unhealthy,
                Some("AMQP connection is closed".to_string()),
            ),
            None => (
                HealthStatus::Degraded,
                Some("Not connected to the broker".to_string()),
            ),
        };

        ComponentCheck {
            name: "amqp_connection".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize health check: {}", e))
    }
}
