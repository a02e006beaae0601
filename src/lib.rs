//! Pickup Room - matchmaking queues and room lifecycle for pickup games
//!
//! Players register a friend code, then search alone or as a team in one of
//! three group kinds. Each queue forms a room as soon as it holds enough
//! players; the room gets private channels on the chat platform, and the
//! first departure starts a staged teardown that deletes them again.

pub mod amqp;
pub mod config;
pub mod error;
pub mod matchmaking;
pub mod metrics;
pub mod platform;
pub mod player;
pub mod queue;
pub mod room;
pub mod service;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{PickupError, Result};
pub use types::*;

// Re-export key components
pub use matchmaking::{PickupManager, PickupStats};
pub use platform::{InMemoryPlatform, PlatformClient};
pub use player::{PlayerRegistry, RegistrationStore};
pub use queue::{GroupProvider, MatchQueue, StaticGroupProvider};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
