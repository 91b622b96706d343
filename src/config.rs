use crate::error::{DataForgeError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Service configuration loaded once at startup from a TOML file.
///
/// The `[[rules]]` entries are kept as raw strings here; they are compiled
/// into a `RuleSet` (and checked for unknown kinds or malformed date formats)
/// before any row is processed.
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

/// One validation/transformation rule bound to a column, as written in the
/// config file. `kind` is one of "email", "date" or "amount"; `format` is
/// only meaningful for date rules.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    pub column: String,
    pub kind: String,
    pub format: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_db_path() -> String {
    "data/dataforge.db".to_string()
}

impl Config {
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();
        let config_content = fs::read_to_string(config_path).map_err(|e| {
            DataForgeError::Config(format!(
                "Failed to read config file '{}': {}",
                config_path.display(),
                e
            ))
        })?;

        let config: Config = toml::from_str(&config_content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config_with_rules() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[server]
host = "127.0.0.1"
port = 9000

[database]
path = "test.db"

[[rules]]
column = "email"
kind = "email"

[[rules]]
column = "date"
kind = "date"
format = "%Y-%m-%d"
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.database.path, "test.db");
        assert_eq!(config.rules.len(), 2);
        assert_eq!(config.rules[0].column, "email");
        assert_eq!(config.rules[1].format.as_deref(), Some("%Y-%m-%d"));
    }

    #[test]
    fn test_missing_config_file_is_config_error() {
        let err = Config::load("does-not-exist.toml").unwrap_err();
        assert!(matches!(err, DataForgeError::Config(_)));
    }
}
