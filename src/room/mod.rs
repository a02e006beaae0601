//! Rooms: formed groups, their lifecycle, provisioning and teardown

pub mod instance;
pub mod provisioning;
pub mod registry;
pub mod teardown;

// Re-export commonly used types
pub use instance::{LeaveEffects, Room, RoomResources, RoomState};
pub use provisioning::{roster_message, ProvisioningLock, Provisioner};
pub use registry::{ActiveRooms, SharedRoom};
pub use teardown::{TeardownSchedule, TeardownScheduler};
