//! Players, their live matchmaking status, and registration storage

pub mod registry;
pub mod state;
pub mod store;

pub use registry::PlayerRegistry;
pub use state::{Player, PlayerStatus};
pub use store::{
    InMemoryRegistrationStore, JsonFileRegistrationStore, Registration, RegistrationStore,
};
