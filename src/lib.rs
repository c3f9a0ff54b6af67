// Public modules
pub mod app;
pub mod auth;
pub mod background;
pub mod backend;
pub mod client;
pub mod error;
pub mod local_state;
pub mod observability;
pub mod storage;
pub mod types;
pub mod upload;
pub mod utils;

#[cfg(test)]
mod testing;

// Re-exports
pub use auth::{AuthContext, AuthEvent, AuthSubscription};
pub use background::BackgroundTasks;
pub use backend::Backend;
pub use client::ApiClient;
pub use error::{Error, Result};
pub use local_state::{FileStore, LocalStore, MemoryStore, Theme};
pub use observability::register_biometrics;
pub use storage::ChatStorage;
pub use types::*;
pub use upload::LocalFile;
