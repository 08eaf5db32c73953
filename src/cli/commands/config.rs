//! Config command - show or edit configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager};
use crate::error::{PgstampError, PgstampResult};
use crate::ui::{self, UiContext};

/// Execute the config command
pub async fn execute(args: ConfigArgs, config: &Config, manager: &ConfigManager) -> PgstampResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => show_path(manager),
        Some(ConfigAction::Init { force }) => init_config(manager, force).await?,
        Some(ConfigAction::Set { key, value }) => set_value(manager, config, &key, &value).await?,
    }

    Ok(())
}

fn show_config(config: &Config) -> PgstampResult<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

fn show_path(manager: &ConfigManager) {
    println!("{}", manager.path().display());
}

async fn init_config(manager: &ConfigManager, force: bool) -> PgstampResult<()> {
    let ctx = UiContext::detect();
    let path = manager.path();

    if path.exists() && !force {
        ui::step_warn_hint(
            &ctx,
            &format!("Config already exists at {}", path.display()),
            "Use --force to overwrite",
        );
        return Ok(());
    }

    manager.save(&Config::default()).await?;

    ui::step_ok_detail(
        &ctx,
        "Configuration initialized",
        &path.display().to_string(),
    );

    Ok(())
}

async fn set_value(
    manager: &ConfigManager,
    config: &Config,
    key: &str,
    value: &str,
) -> PgstampResult<()> {
    let ctx = UiContext::detect();
    let mut config = config.clone();
    apply(&mut config, key, value)?;
    ConfigManager::validate(&config)?;

    manager.save(&config).await?;
    ui::step_ok(&ctx, &format!("Set {} = {}", key, value));

    Ok(())
}

/// Set a dot-separated key on `config`
fn apply(config: &mut Config, key: &str, value: &str) -> PgstampResult<()> {
    let parts: Vec<&str> = key.split('.').collect();

    match parts.as_slice() {
        ["general", "log_format"] => config.general.log_format = value.to_string(),

        ["database", "url"] => config.database.url = value.to_string(),
        ["database", "max_connections"] => config.database.max_connections = parse_num(value)?,
        ["database", "connect_timeout_secs"] => {
            config.database.connect_timeout_secs = parse_num(value)?
        }

        ["cache", "enabled"] => config.cache.enabled = parse_bool(value)?,
        ["cache", "prefix"] => config.cache.prefix = value.to_string(),
        ["cache", "max_size"] => config.cache.max_size = parse_num(value)?,
        ["cache", "max_age_days"] => config.cache.max_age_days = parse_num(value)?,

        ["build", "command"] => config.build.command = parse_list(value),
        ["build", "demo_args"] => config.build.demo_args = parse_list(value),
        ["build", "no_demo_args"] => config.build.no_demo_args = parse_list(value),

        _ => {
            return Err(PgstampError::User(format!(
                "Unknown config key: {}. Valid keys: {}",
                key,
                VALID_KEYS.join(", ")
            )))
        }
    }

    Ok(())
}

const VALID_KEYS: &[&str] = &[
    "general.log_format",
    "database.url",
    "database.max_connections",
    "database.connect_timeout_secs",
    "cache.enabled",
    "cache.prefix",
    "cache.max_size",
    "cache.max_age_days",
    "build.command",
    "build.demo_args",
    "build.no_demo_args",
];

/// Whitespace-separated argv
fn parse_list(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_string).collect()
}

fn parse_bool(value: &str) -> PgstampResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(PgstampError::User(format!(
            "Invalid boolean value: {}. Use true/false",
            value
        ))),
    }
}

fn parse_num<T: std::str::FromStr>(value: &str) -> PgstampResult<T> {
    value
        .parse()
        .map_err(|_| PgstampError::User(format!("Invalid number: {}", value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn apply_known_keys() {
        let mut config = Config::default();
        apply(&mut config, "cache.max_size", "-1").unwrap();
        apply(&mut config, "cache.enabled", "no").unwrap();
        apply(&mut config, "build.command", "./odoo-bin -d {database} -i {modules}").unwrap();

        assert_eq!(config.cache.max_size, -1);
        assert!(!config.cache.enabled);
        assert_eq!(config.build.command.len(), 5);
        assert_eq!(config.build.command[2], "{database}");
    }

    #[test]
    fn apply_rejects_unknown_key_and_bad_values() {
        let mut config = Config::default();
        assert!(apply(&mut config, "cache.colour", "x").is_err());
        assert!(apply(&mut config, "cache.max_size", "lots").is_err());
        assert!(apply(&mut config, "cache.enabled", "maybe").is_err());
    }

    #[tokio::test]
    async fn set_persists_and_validates() {
        let temp = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(temp.path().join("config.toml"));

        set_value(&manager, &Config::default(), "cache.prefix", "ci_cache")
            .await
            .unwrap();
        assert_eq!(manager.load().await.unwrap().cache.prefix, "ci_cache");

        let err = set_value(&manager, &Config::default(), "cache.prefix", "Bad-Prefix")
            .await
            .unwrap_err();
        assert!(matches!(err, PgstampError::InvalidPrefix { .. }));
        assert_eq!(manager.load().await.unwrap().cache.prefix, "ci_cache");
    }
}
