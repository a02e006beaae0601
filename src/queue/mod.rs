//! Matchmaking queues and the per-kind group configuration they form rooms with

pub mod instance;
pub mod provider;

// Re-export commonly used types
pub use instance::{MatchQueue, WaitingList};
pub use provider::{GroupConfiguration, GroupProvider, StaticGroupProvider};
