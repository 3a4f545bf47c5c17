pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod feeds;
pub mod map;
pub mod session;
pub mod shop;
pub mod state;

pub use api::{MemoryStore, PresenceStore, RestStore};
pub use config::Config;
pub use session::{MapSession, SessionHandle, SessionStatus};
