//! Init command - provision a database from a recipe

use super::recipe_from_args;
use crate::build::CommandBuilder;
use crate::cache::{days, validate_prefix, EvictionPolicy, TemplateCache};
use crate::cli::args::InitArgs;
use crate::config::Config;
use crate::error::PgstampResult;
use crate::provision::{ProvisionOutcome, Provisioner};
use crate::store::connect_store;
use crate::ui::{self, TaskSpinner, UiContext};
use std::sync::Arc;
use tracing::debug;

/// Execute the init command
pub async fn execute(args: InitArgs, config: &Config) -> PgstampResult<()> {
    let ctx = UiContext::detect();
    let recipe = recipe_from_args(&args.recipe)?;

    let use_cache = config.cache.enabled && !args.no_cache;
    let prefix = args
        .cache_prefix
        .clone()
        .unwrap_or_else(|| config.cache.prefix.clone());
    if use_cache {
        validate_prefix(&prefix)?;
    }
    let mut policy = EvictionPolicy::from_config(&config.cache);
    if let Some(max_size) = args.cache_max_size {
        policy.max_size = max_size;
    }
    if let Some(max_age) = args.cache_max_age {
        policy.max_age = days(max_age);
    }
    debug!("Recipe fingerprint: {}", recipe.fingerprint());

    let store = connect_store(&config.database).await?;
    let builder = Arc::new(CommandBuilder::new(config.build.clone()));

    let mut provisioner =
        Provisioner::new(store.clone(), builder).unless_exists(args.unless_exists);
    if use_cache {
        provisioner = provisioner.with_cache(TemplateCache::new(store, prefix)?, policy);
    }

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&format!("Initializing {}...", args.new_database));

    match provisioner.ensure(&args.new_database, &recipe).await {
        Ok(ProvisionOutcome::Existing) => {
            spinner.stop_warn(&format!("{} already exists", args.new_database));
        }
        Ok(outcome) => {
            spinner.stop(&format!("{} ready ({})", args.new_database, outcome));
        }
        Err(e) => {
            spinner.stop_error(&format!("Failed to initialize {}", args.new_database));
            return Err(e);
        }
    }

    if !use_cache {
        ui::remark(&ctx, "Template cache disabled");
    }

    Ok(())
}
