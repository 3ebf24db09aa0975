use crate::config::{ServerSettings, StoreBackend};
use crate::utils::error::{AssignError, Result};
use crate::utils::validation::Validate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// On-disk configuration. Every section and key is optional; missing values
/// keep their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSection {
    pub backend: Option<StoreBackend>,
    pub database_path: Option<String>,
    pub status_cache: Option<bool>,
    pub operation_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    pub json: Option<bool>,
    pub verbose: Option<bool>,
}

impl TomlConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(AssignError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// Parses configuration after substituting `${VAR}` references.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = Self::substitute_env_vars(content)?;

        toml::from_str(&processed).map_err(|e| AssignError::ConfigError {
            message: format!("TOML parsing error: {e}"),
        })
    }

    /// Unset variables are left as written.
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").map_err(|e| {
            AssignError::ConfigError {
                message: format!("invalid environment pattern: {e}"),
            }
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{var_name}}}"))
        });

        Ok(result.into_owned())
    }

    /// Overlays the values present in this file onto `settings`.
    pub fn apply_to(&self, settings: &mut ServerSettings) {
        if let Some(host) = &self.server.host {
            settings.host = host.clone();
        }
        if let Some(port) = self.server.port {
            settings.port = port;
        }
        if let Some(backend) = self.store.backend {
            settings.store = backend;
        }
        if let Some(path) = &self.store.database_path {
            settings.database_path = path.clone();
        }
        if let Some(cache) = self.store.status_cache {
            settings.status_cache = cache;
        }
        if let Some(timeout) = self.store.operation_timeout_ms {
            settings.operation_timeout_ms = timeout;
        }
        if let Some(json) = self.logging.json {
            settings.json_logs = json;
        }
        if let Some(verbose) = self.logging.verbose {
            settings.verbose = verbose;
        }
    }

    pub fn to_settings(&self) -> ServerSettings {
        let mut settings = ServerSettings::default();
        self.apply_to(&mut settings);
        settings
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.to_settings().validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_full_config() {
        let toml_content = r#"
[server]
host = "127.0.0.1"
port = 9090

[store]
backend = "sqlite"
database_path = "/var/lib/reviewers/db.sqlite"
status_cache = true
operation_timeout_ms = 2500

[logging]
json = true
"#;

        let settings = TomlConfig::from_toml_str(toml_content).unwrap().to_settings();

        assert_eq!(settings.host, "127.0.0.1");
        assert_eq!(settings.port, 9090);
        assert_eq!(settings.store, StoreBackend::Sqlite);
        assert_eq!(settings.database_path, "/var/lib/reviewers/db.sqlite");
        assert!(settings.status_cache);
        assert_eq!(settings.operation_timeout_ms, 2500);
        assert!(settings.json_logs);
        assert!(!settings.verbose);
    }

    #[test]
    fn test_empty_file_keeps_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert_eq!(config.to_settings(), ServerSettings::default());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("REVIEWER_ASSIGN_TEST_DB", "/tmp/from-env.db");

        let config = TomlConfig::from_toml_str(
            r#"
[store]
database_path = "${REVIEWER_ASSIGN_TEST_DB}"
"#,
        )
        .unwrap();
        assert_eq!(config.store.database_path.as_deref(), Some("/tmp/from-env.db"));

        std::env::remove_var("REVIEWER_ASSIGN_TEST_DB");
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let err = TomlConfig::from_toml_str("[store]\nbackend = \"postgres\"\n").unwrap_err();
        assert!(matches!(err, AssignError::ConfigError { .. }));
    }

    #[test]
    fn test_config_validation() {
        let config = TomlConfig::from_toml_str("[store]\noperation_timeout_ms = 900000\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[server]\nport = 7000\n")
            .unwrap();

        let config = TomlConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.to_settings().port, 7000);
    }
}
