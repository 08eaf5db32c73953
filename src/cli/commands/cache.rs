//! Cache command - inspect and maintain the template cache

use super::recipe_from_args;
use crate::cache::{days, entry_name, validate_prefix, CacheEntry, EvictionPolicy, TemplateCache};
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat, RecipeArgs};
use crate::config::Config;
use crate::error::PgstampResult;
use crate::store::connect_store;
use crate::ui::{self, UiContext};
use console::style;

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> PgstampResult<()> {
    let prefix = args
        .cache_prefix
        .unwrap_or_else(|| config.cache.prefix.clone());
    validate_prefix(&prefix)?;

    // Fingerprinting never touches the server
    if let CacheAction::Fingerprint(recipe) = &args.action {
        return show_fingerprint(recipe, &prefix);
    }

    let store = connect_store(&config.database).await?;
    let cache = TemplateCache::new(store, prefix)?;

    match args.action {
        CacheAction::List { format } => list_templates(&cache, format).await,
        CacheAction::Size => {
            println!("{}", cache.size().await?);
            Ok(())
        }
        CacheAction::Trim { max_size, max_age } => {
            let mut policy = EvictionPolicy::from_config(&config.cache);
            if let Some(max_size) = max_size {
                policy.max_size = max_size;
            }
            if let Some(max_age) = max_age {
                policy.max_age = days(max_age);
            }
            trim_templates(&cache, &policy).await
        }
        CacheAction::Purge { yes } => purge_templates(&cache, yes).await,
        CacheAction::Fingerprint(_) => Ok(()),
    }
}

fn show_fingerprint(args: &RecipeArgs, prefix: &str) -> PgstampResult<()> {
    let fingerprint = recipe_from_args(args)?.fingerprint();
    println!("{}", fingerprint);
    println!("{}", entry_name(prefix, &fingerprint));
    Ok(())
}

/// List templates, most recently used first
async fn list_templates(cache: &TemplateCache, format: OutputFormat) -> PgstampResult<()> {
    let entries = cache.entries().await?;

    if entries.is_empty() {
        match format {
            OutputFormat::Json => println!("[]"),
            OutputFormat::Plain => {}
            OutputFormat::Table => {
                let ctx = UiContext::detect();
                ui::step_info(
                    &ctx,
                    &format!("No cached templates with prefix '{}'", cache.prefix()),
                );
            }
        }
        return Ok(());
    }

    match format {
        OutputFormat::Table => print_table(&entries),
        OutputFormat::Json => print_json(&entries)?,
        OutputFormat::Plain => print_plain(&entries),
    }

    Ok(())
}

fn print_table(entries: &[CacheEntry]) {
    println!(
        "{:<64} {:<17} {:<17}",
        style("TEMPLATE").bold(),
        style("CREATED").bold(),
        style("LAST USED").bold()
    );
    println!("{}", "-".repeat(100));

    for entry in entries {
        println!(
            "{:<64} {:<17} {:<17}",
            entry.name,
            entry.created_at.format("%Y-%m-%d %H:%M"),
            entry.last_used_at.format("%Y-%m-%d %H:%M")
        );
    }

    println!();
    println!("Total: {} template(s)", entries.len());
}

fn print_json(entries: &[CacheEntry]) -> PgstampResult<()> {
    #[derive(serde::Serialize)]
    struct EntryJson {
        name: String,
        fingerprint: String,
        created_at: String,
        last_used_at: String,
    }

    let json: Vec<EntryJson> = entries
        .iter()
        .map(|e| EntryJson {
            name: e.name.clone(),
            fingerprint: e.fingerprint.to_hex(),
            created_at: e.created_at.to_rfc3339(),
            last_used_at: e.last_used_at.to_rfc3339(),
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

fn print_plain(entries: &[CacheEntry]) {
    for entry in entries {
        println!("{}", entry.name);
    }
}

async fn trim_templates(cache: &TemplateCache, policy: &EvictionPolicy) -> PgstampResult<()> {
    let ctx = UiContext::detect();
    let report = cache.maintain(policy).await?;

    if report.total() == 0 {
        ui::step_info(&ctx, "Nothing to evict");
    } else {
        ui::step_ok(
            &ctx,
            &format!(
                "Evicted {} template(s) ({} by size, {} by age)",
                report.total(),
                report.by_size,
                report.by_age
            ),
        );
    }
    Ok(())
}

async fn purge_templates(cache: &TemplateCache, yes: bool) -> PgstampResult<()> {
    let ctx = UiContext::detect().with_auto_yes(yes);
    let count = cache.size().await? + cache.orphans().await?.len();

    if count == 0 {
        ui::step_info(&ctx, "No cached templates to remove");
        return Ok(());
    }

    let message = format!(
        "Drop {} database(s) with prefix '{}'?",
        count,
        cache.prefix()
    );
    if !ui::confirm(&ctx, &message, false).await? {
        ui::step_info(&ctx, "Aborted");
        return Ok(());
    }

    let removed = cache.purge().await?;
    ui::step_ok(&ctx, &format!("Removed {} template(s)", removed));
    Ok(())
}
