//! SQLite persistence for MANTIS sessions, shots, heart-rate rows and users.

pub mod error;
pub mod linker;
pub mod sqlite;
pub mod store;

pub use error::{Result, StoreError};
pub use linker::{LinkTarget, SessionLinker};
pub use sqlite::connection::ConnectionConfig;
pub use store::SessionStore;
