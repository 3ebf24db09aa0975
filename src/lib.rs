pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::{ServerSettings, StoreBackend};

pub use adapters::memory::InMemoryStore;
#[cfg(feature = "sqlite")]
pub use adapters::sqlite::SqliteStore;

pub use crate::core::ReviewEngine;
pub use utils::error::{AssignError, Result};
