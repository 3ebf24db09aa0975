#[cfg(feature = "cli")]
pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
pub use cli::CliConfig;
pub use toml_config::TomlConfig;

use crate::core::ConfigProvider;
use crate::utils::error::Result;
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which directory store backs the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Sqlite,
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Memory => f.write_str("memory"),
            StoreBackend::Sqlite => f.write_str("sqlite"),
        }
    }
}

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DATABASE_PATH: &str = "data/reviewers.db";
pub const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 5_000;

/// Fully resolved server settings: defaults, then the TOML file, then the
/// command line (including its environment fallbacks).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub store: StoreBackend,
    pub database_path: String,
    /// Zero disables the per-operation deadline.
    pub operation_timeout_ms: u64,
    pub status_cache: bool,
    pub json_logs: bool,
    pub verbose: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            store: StoreBackend::Memory,
            database_path: DEFAULT_DATABASE_PATH.to_string(),
            operation_timeout_ms: DEFAULT_OPERATION_TIMEOUT_MS,
            status_cache: false,
            json_logs: false,
            verbose: false,
        }
    }
}

impl ConfigProvider for ServerSettings {
    fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn store_backend(&self) -> StoreBackend {
        self.store
    }

    fn database_path(&self) -> &str {
        &self.database_path
    }

    fn operation_timeout_ms(&self) -> u64 {
        self.operation_timeout_ms
    }

    fn status_cache(&self) -> bool {
        self.status_cache
    }
}

impl Validate for ServerSettings {
    fn validate(&self) -> Result<()> {
        validation::validate_non_empty_string("server.host", &self.host)?;
        validation::validate_range("server.port", self.port, 1, u16::MAX)?;
        validation::validate_range(
            "store.operation_timeout_ms",
            self.operation_timeout_ms,
            0,
            600_000,
        )?;
        if self.store == StoreBackend::Sqlite {
            validation::validate_path("store.database_path", &self.database_path)?;
        }
        Ok(())
    }
}
