//! Matchmaking engine: the manager that ties players, queues and rooms together

pub mod manager;

pub use manager::{PickupManager, PickupStats};
