//! Configuration schema for pgstamp
//!
//! Configuration is stored at `~/.config/pgstamp/config.toml`

use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Database server connection
    pub database: DatabaseConfig,

    /// Template cache settings
    pub cache: CacheConfig,

    /// Build command settings
    pub build: BuildConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Database server connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection URL of a maintenance database
    pub url: String,

    /// Maximum pooled connections (each held lock pins one)
    pub max_connections: u32,

    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/postgres".to_string(),
            max_connections: 4,
            connect_timeout_secs: 30,
        }
    }
}

/// Template cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Use the template cache when initializing databases
    pub enabled: bool,

    /// Template name prefix; separates independent caches on one server
    pub prefix: String,

    /// Keep at most N templates (negative = unlimited)
    pub max_size: i64,

    /// Drop templates unused for N days (negative = never)
    pub max_age_days: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prefix: "cache".to_string(),
            max_size: 5,
            max_age_days: 30,
        }
    }
}

/// Settings for the command that builds a database from scratch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Program and arguments. `{database}`, `{modules}` (comma separated)
    /// and `{demo}` (`true`/`false`) are substituted in each argument.
    pub command: Vec<String>,

    /// Extra arguments appended when demo data is requested
    pub demo_args: Vec<String>,

    /// Extra arguments appended when demo data is not requested
    pub no_demo_args: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "odoo".to_string(),
                "--database={database}".to_string(),
                "--init={modules}".to_string(),
                "--stop-after-init".to_string(),
            ],
            demo_args: vec![],
            no_demo_args: vec!["--without-demo=all".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[cache]"));
        assert!(toml.contains("[build]"));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.cache.prefix, "cache");
        assert_eq!(config.cache.max_size, 5);
        assert_eq!(config.cache.max_age_days, 30);
    }

    #[test]
    fn config_deserializes_partial() {
        let toml = r#"
            [cache]
            prefix = "ci"
            max_size = -1
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.cache.prefix, "ci");
        assert_eq!(config.cache.max_size, -1);
        assert_eq!(config.cache.max_age_days, 30); // default preserved
        assert!(config.database.url.starts_with("postgres://"));
    }
}
