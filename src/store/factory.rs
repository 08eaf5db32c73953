//! Store factory
//!
//! Builds the configured template store from application configuration.

use crate::config::schema::DatabaseConfig;
use crate::error::PgstampResult;
use crate::store::postgres::{PostgresConfig, PostgresStore};
use crate::store::TemplateStore;
use std::sync::Arc;
use tracing::debug;

/// Connect the template store described by `config`
///
/// # Returns
/// * `Ok(Arc<dyn TemplateStore>)` - A shared store handle
/// * `Err` - If the server cannot be reached
pub async fn connect_store(config: &DatabaseConfig) -> PgstampResult<Arc<dyn TemplateStore>> {
    debug!(
        "Connecting to {} (max {} connections)",
        redact_url(&config.url),
        config.max_connections
    );

    let store = PostgresStore::connect(&PostgresConfig::from(config)).await?;
    debug!("Connected to {} template store", store.backend_name());
    Ok(Arc::new(store))
}

impl From<&DatabaseConfig> for PostgresConfig {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            url: config.url.clone(),
            max_connections: config.max_connections,
            connect_timeout_secs: config.connect_timeout_secs,
        }
    }
}

/// Hide the password part of a connection URL for logging
pub(crate) fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let Some((credentials, host)) = rest.rsplit_once('@') else {
        return url.to_string();
    };
    match credentials.split_once(':') {
        Some((user, _)) => format!("{}://{}:***@{}", scheme, user, host),
        None => url.to_string(),
    }
}
