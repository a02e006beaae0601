//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the pickup-room service using
//! Prometheus metrics.

use crate::matchmaking::PickupStats;
use crate::types::GroupKind;
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the pickup service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Queue-related metrics
    queue_metrics: QueueMetrics,

    /// Room-related metrics
    room_metrics: RoomMetrics,

    /// Performance metrics
    performance_metrics: PerformanceMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Commands processed, by command and outcome
    pub commands_total: IntCounterVec,

    /// AMQP message processing errors
    pub amqp_errors_total: IntCounterVec,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,
}

/// Queue-related metrics
#[derive(Clone)]
pub struct QueueMetrics {
    /// Players currently waiting, by group kind
    pub players_waiting: IntGaugeVec,

    /// Players added to a queue, by group kind and mode (solo or team)
    pub players_queued_total: IntCounterVec,

    /// Players taken out of a queue without a match, by group kind and reason
    pub queue_removals_total: IntCounterVec,
}

/// Room-related metrics
#[derive(Clone)]
pub struct RoomMetrics {
    /// Rooms currently live, by group kind
    pub active_rooms: IntGaugeVec,

    /// Rooms formed
    pub rooms_formed_total: IntCounterVec,

    /// Rooms whose teardown completed
    pub rooms_closed_total: IntCounterVec,

    /// Teardowns started
    pub teardowns_started_total: IntCounterVec,

    /// Activations that failed to create channels
    pub provisioning_failures_total: IntCounterVec,
}

/// Performance metrics
#[derive(Clone)]
pub struct PerformanceMetrics {
    /// Command handling time
    pub command_duration: HistogramVec,

    /// Room provisioning time
    pub provisioning_duration: Histogram,

    /// AMQP operation durations
    pub amqp_operation_duration: HistogramVec,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let queue_metrics = QueueMetrics::new(&registry)?;
        let room_metrics = RoomMetrics::new(&registry)?;
        let performance_metrics = PerformanceMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            queue_metrics,
            room_metrics,
            performance_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Get service metrics
    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    /// Get queue metrics
    pub fn queue(&self) -> &QueueMetrics {
        &self.queue_metrics
    }

    /// Get room metrics
    pub fn room(&self) -> &RoomMetrics {
        &self.room_metrics
    }

    /// Get performance metrics
    pub fn performance(&self) -> &PerformanceMetrics {
        &self.performance_metrics
    }

    /// Refresh gauges from manager stats
    pub fn update_from_stats(&self, stats: &PickupStats) {
        for kind in GroupKind::ALL {
            let waiting = stats.waiting_by_kind.get(&kind).copied().unwrap_or(0);
            self.queue_metrics
                .players_waiting
                .with_label_values(&[kind.as_str()])
                .set(waiting as i64);

            let active = stats.active_by_kind.get(&kind).copied().unwrap_or(0);
            self.room_metrics
                .active_rooms
                .with_label_values(&[kind.as_str()])
                .set(active as i64);
        }
    }

    /// Record a handled command
    pub fn record_command(&self, command: &str, outcome: &str, duration: Duration) {
        self.service_metrics
            .commands_total
            .with_label_values(&[command, outcome])
            .inc();

        self.performance_metrics
            .command_duration
            .with_label_values(&[command])
            .observe(duration.as_secs_f64());
    }

    /// Record players joining a queue
    pub fn record_players_queued(&self, kind: GroupKind, count: usize, team: bool) {
        let mode = if team { "team" } else { "solo" };
        self.queue_metrics
            .players_queued_total
            .with_label_values(&[kind.as_str(), mode])
            .inc_by(count as u64);
    }

    /// Record a player leaving a queue without being matched
    pub fn record_queue_removal(&self, kind: GroupKind, reason: &str) {
        self.queue_metrics
            .queue_removals_total
            .with_label_values(&[kind.as_str(), reason])
            .inc();
    }

    /// Record a room being formed
    pub fn record_room_formed(&self, kind: GroupKind) {
        self.room_metrics
            .rooms_formed_total
            .with_label_values(&[kind.as_str()])
            .inc();

        self.room_metrics
            .active_rooms
            .with_label_values(&[kind.as_str()])
            .inc();
    }

    /// Record the outcome of a room activation
    pub fn record_provisioning(&self, kind: GroupKind, success: bool, duration: Duration) {
        if !success {
            self.room_metrics
                .provisioning_failures_total
                .with_label_values(&[kind.as_str()])
                .inc();
        }

        self.performance_metrics
            .provisioning_duration
            .observe(duration.as_secs_f64());
    }

    /// Record a teardown being started
    pub fn record_teardown_started(&self, kind: GroupKind) {
        self.room_metrics
            .teardowns_started_total
            .with_label_values(&[kind.as_str()])
            .inc();
    }

    /// Record a room being closed
    pub fn record_room_closed(&self, kind: GroupKind) {
        self.room_metrics
            .rooms_closed_total
            .with_label_values(&[kind.as_str()])
            .inc();

        self.room_metrics
            .active_rooms
            .with_label_values(&[kind.as_str()])
            .dec();
    }

    /// Record AMQP operation
    pub fn record_amqp_operation(&self, operation: &str, success: bool, duration: Duration) {
        let status = if success { "success" } else { "error" };

        if !success {
            self.service_metrics
                .amqp_errors_total
                .with_label_values(&[operation])
                .inc();
        }

        self.performance_metrics
            .amqp_operation_duration
            .with_label_values(&[operation, status])
            .observe(duration.as_secs_f64());
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("pickup_room_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let commands_total = IntCounterVec::new(
            Opts::new("pickup_room_commands_total", "Total commands processed"),
            &["command", "outcome"],
        )?;
        registry.register(Box::new(commands_total.clone()))?;

        let amqp_errors_total = IntCounterVec::new(
            Opts::new("pickup_room_amqp_errors_total", "Total AMQP errors"),
            &["operation"],
        )?;
        registry.register(Box::new(amqp_errors_total.clone()))?;

        let health_status = IntGauge::new(
            "pickup_room_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("pickup_room_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        Ok(Self {
            uptime_seconds,
            commands_total,
            amqp_errors_total,
            health_status,
            component_health,
        })
    }
}

impl QueueMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let players_waiting = IntGaugeVec::new(
            Opts::new(
                "pickup_room_players_waiting",
                "Players currently waiting in queue",
            ),
            &["group_kind"],
        )?;
        registry.register(Box::new(players_waiting.clone()))?;

        let players_queued_total = IntCounterVec::new(
            Opts::new("pickup_room_players_queued_total", "Total players queued"),
            &["group_kind", "mode"],
        )?;
        registry.register(Box::new(players_queued_total.clone()))?;

        let queue_removals_total = IntCounterVec::new(
            Opts::new(
                "pickup_room_queue_removals_total",
                "Players removed from a queue without a match",
            ),
            &["group_kind", "reason"],
        )?;
        registry.register(Box::new(queue_removals_total.clone()))?;

        Ok(Self {
            players_waiting,
            players_queued_total,
            queue_removals_total,
        })
    }
}

impl RoomMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let active_rooms = IntGaugeVec::new(
            Opts::new("pickup_room_active_rooms", "Number of live rooms"),
            &["group_kind"],
        )?;
        registry.register(Box::new(active_rooms.clone()))?;

        let rooms_formed_total = IntCounterVec::new(
            Opts::new("pickup_room_rooms_formed_total", "Total rooms formed"),
            &["group_kind"],
        )?;
        registry.register(Box::new(rooms_formed_total.clone()))?;

        let rooms_closed_total = IntCounterVec::new(
            Opts::new("pickup_room_rooms_closed_total", "Total rooms closed"),
            &["group_kind"],
        )?;
        registry.register(Box::new(rooms_closed_total.clone()))?;

        let teardowns_started_total = IntCounterVec::new(
            Opts::new(
                "pickup_room_teardowns_started_total",
                "Total room teardowns started",
            ),
            &["group_kind"],
        )?;
        registry.register(Box::new(teardowns_started_total.clone()))?;

        let provisioning_failures_total = IntCounterVec::new(
            Opts::new(
                "pickup_room_provisioning_failures_total",
                "Total failed room activations",
            ),
            &["group_kind"],
        )?;
        registry.register(Box::new(provisioning_failures_total.clone()))?;

        Ok(Self {
            active_rooms,
            rooms_formed_total,
            rooms_closed_total,
            teardowns_started_total,
            provisioning_failures_total,
        })
    }
}

impl PerformanceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let command_duration = HistogramVec::new(
            HistogramOpts::new(
                "pickup_room_command_duration_seconds",
                "Command handling time",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["command"],
        )?;
        registry.register(Box::new(command_duration.clone()))?;

        let provisioning_duration = Histogram::with_opts(
            HistogramOpts::new(
                "pickup_room_provisioning_duration_seconds",
                "Room provisioning time",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )?;
        registry.register(Box::new(provisioning_duration.clone()))?;

        let amqp_operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "pickup_room_amqp_operation_duration_seconds",
                "AMQP operation duration",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation", "status"],
        )?;
        registry.register(Box::new(amqp_operation_duration.clone()))?;

        Ok(Self {
            command_duration,
            provisioning_duration,
            amqp_operation_duration,
        })
    }
}
