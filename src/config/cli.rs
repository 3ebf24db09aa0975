use crate::config::{ServerSettings, StoreBackend, TomlConfig};
use crate::utils::error::Result;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Command-line flags. Unset flags fall back to the TOML file, then to the
/// built-in defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Parser)]
#[command(name = "reviewer-assign")]
#[command(about = "Reviewer assignment and pull request lifecycle service")]
pub struct CliConfig {
    /// TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub host: Option<String>,

    #[arg(long, env = "SERVER_PORT")]
    pub port: Option<u16>,

    #[arg(long, value_enum)]
    pub store: Option<StoreBackend>,

    #[arg(long, env = "DATABASE_PATH")]
    pub database_path: Option<String>,

    /// Deadline for each engine operation; 0 disables it
    #[arg(long)]
    pub operation_timeout_ms: Option<u64>,

    /// Cache the status catalog after the first lookup
    #[arg(long, num_args = 0..=1, default_missing_value = "true", require_equals = true)]
    pub status_cache: Option<bool>,

    /// Emit JSON log lines
    #[arg(long, num_args = 0..=1, default_missing_value = "true", require_equals = true)]
    pub json_logs: Option<bool>,

    /// Enable verbose output
    #[arg(long, num_args = 0..=1, default_missing_value = "true", require_equals = true)]
    pub verbose: Option<bool>,
}

impl CliConfig {
    /// Resolves defaults, the optional TOML file and these flags into one
    /// settings value.
    pub fn resolve(&self) -> Result<ServerSettings> {
        let mut settings = match &self.config {
            Some(path) => TomlConfig::from_file(path)?.to_settings(),
            None => ServerSettings::default(),
        };

        if let Some(host) = &self.host {
            settings.host = host.clone();
        }
        if let Some(port) = self.port {
            settings.port = port;
        }
        if let Some(store) = self.store {
            settings.store = store;
        }
        if let Some(path) = &self.database_path {
            settings.database_path = path.clone();
        }
        if let Some(timeout) = self.operation_timeout_ms {
            settings.operation_timeout_ms = timeout;
        }
        if let Some(cache) = self.status_cache {
            settings.status_cache = cache;
        }
        if let Some(json) = self.json_logs {
            settings.json_logs = json;
        }
        if let Some(verbose) = self.verbose {
            settings.verbose = verbose;
        }

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_flags_parse() {
        let cli = CliConfig::try_parse_from([
            "reviewer-assign",
            "--host",
            "127.0.0.1",
            "--port",
            "9000",
            "--store",
            "sqlite",
            "--status-cache",
        ])
        .unwrap();

        let settings = cli.resolve().unwrap();
        assert_eq!(settings.host, "127.0.0.1");
        assert_eq!(settings.port, 9000);
        assert_eq!(settings.store, StoreBackend::Sqlite);
        assert!(settings.status_cache);
    }

    #[test]
    fn test_flags_override_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(
            b"[server]\nport = 7000\nhost = \"10.0.0.1\"\n[store]\nstatus_cache = true\n",
        )
        .unwrap();

        let cli = CliConfig {
            config: Some(file.path().to_path_buf()),
            port: Some(7100),
            ..CliConfig::default()
        };

        let settings = cli.resolve().unwrap();
        assert_eq!(settings.port, 7100);
        assert_eq!(settings.host, "10.0.0.1");
        assert!(settings.status_cache);
    }

    #[test]
    fn test_flags_can_switch_off_file_booleans() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[store]\nstatus_cache = true\n[logging]\njson = true\nverbose = true\n")
            .unwrap();
        let path = file.path().to_string_lossy().into_owned();

        let cli = CliConfig::try_parse_from([
            "reviewer-assign",
            "--config",
            path.as_str(),
            "--status-cache=false",
            "--json-logs=false",
        ])
        .unwrap();

        let settings = cli.resolve().unwrap();
        assert!(!settings.status_cache);
        assert!(!settings.json_logs);
        assert!(settings.verbose);
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let cli = CliConfig {
            config: Some(PathBuf::from("/definitely/not/here.toml")),
            ..CliConfig::default()
        };
        assert!(cli.resolve().is_err());
    }
}
