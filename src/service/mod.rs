//! Service layer for the pickup-room service
//!
//! This module contains the main application state, the production command
//! handler and health aggregation.

pub mod app;
pub mod health;

pub use app::{AppState, ProductionCommandHandler, ServiceError};
pub use health::{HealthCheck, HealthStatus};
