//! Template inventory
//!
//! Reconstructs the set of live templates from the server catalog. There is
//! no in-memory copy: every call re-reads the catalog so that templates
//! created or dropped by other processes are always seen.

use crate::cache::entry::{parse_entry_name, CacheEntry};
use crate::error::PgstampResult;
use crate::store::TemplateStore;
use std::cmp::Ordering;
use tracing::{debug, warn};

/// List the templates under `prefix`, most recently used first
///
/// Databases that look like templates but cannot be parsed are skipped
/// rather than failing the listing.
pub async fn list(store: &dyn TemplateStore, prefix: &str) -> PgstampResult<Vec<CacheEntry>> {
    let namespace = format!("{}-", prefix);
    let databases = store.list_by_prefix(&namespace).await?;

    let mut entries: Vec<CacheEntry> = databases
        .iter()
        .filter_map(|db| {
            let entry = CacheEntry::from_catalog(prefix, &db.name, db.comment.as_deref());
            if entry.is_none() {
                warn!("Ignoring unrecognized database in cache namespace: {}", db.name);
            }
            entry
        })
        .collect();

    entries.sort_by(by_recency);
    debug!("Found {} template(s) under prefix {}", entries.len(), prefix);
    Ok(entries)
}

/// Template-named databases under `prefix` without usable metadata
///
/// An interrupted registration can leave one behind. They are invisible to
/// [`list`] but still occupy the template name.
pub async fn orphans(store: &dyn TemplateStore, prefix: &str) -> PgstampResult<Vec<String>> {
    let namespace = format!("{}-", prefix);
    let databases = store.list_by_prefix(&namespace).await?;

    Ok(databases
        .into_iter()
        .filter(|db| {
            parse_entry_name(prefix, &db.name).is_some()
                && CacheEntry::from_catalog(prefix, &db.name, db.comment.as_deref()).is_none()
        })
        .map(|db| db.name)
        .collect())
}

/// Most recently used first; ties broken by name
fn by_recency(a: &CacheEntry, b: &CacheEntry) -> Ordering {
    b.last_used_at
        .cmp(&a.last_used_at)
        .then_with(|| a.name.cmp(&b.name))
}
