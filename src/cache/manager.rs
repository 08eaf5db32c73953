//! Template cache
//!
//! Registers built databases as templates, clones them on demand and evicts
//! them by size or age. All state lives in the database server; operations
//! on the same fingerprint are serialized by a store lock keyed by the
//! template name.

use crate::cache::clock::{Clock, SystemClock};
use crate::cache::entry::{entry_name, validate_prefix, CacheEntry, EntryMetadata};
use crate::cache::fingerprint::Fingerprint;
use crate::cache::inventory;
use crate::config::schema::CacheConfig;
use crate::error::{PgstampError, PgstampResult};
use crate::store::{Cloner, StoreLock, TemplateStore};
use chrono::TimeDelta;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Eviction limits; a negative value disables the policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionPolicy {
    /// Keep at most this many templates
    pub max_size: i64,
    /// Drop templates unused for at least this long
    pub max_age: TimeDelta,
}

impl EvictionPolicy {
    /// Both policies disabled
    pub fn disabled() -> Self {
        Self {
            max_size: -1,
            max_age: TimeDelta::seconds(-1),
        }
    }

    /// Policy from config, with `max_age_days` clamped to a sane range
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            max_size: config.max_size,
            max_age: days(config.max_age_days),
        }
    }
}

/// Convert a day count to a duration; negative stays negative
pub fn days(days: i64) -> TimeDelta {
    // Roughly 2700 years; older than any template can be
    const MAX_DAYS: i64 = 1_000_000;
    TimeDelta::days(days.clamp(-1, MAX_DAYS))
}

/// Number of templates removed by each policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrimReport {
    /// Removed by `trim_size`
    pub by_size: usize,
    /// Removed by `trim_age`
    pub by_age: usize,
}

impl TrimReport {
    /// Total number removed
    pub fn total(&self) -> usize {
        self.by_size + self.by_age
    }
}

/// Content-addressed cache of template databases
#[derive(Clone)]
pub struct TemplateCache {
    store: Arc<dyn TemplateStore>,
    cloner: Cloner,
    prefix: String,
    clock: Arc<dyn Clock>,
}

impl TemplateCache {
    /// Create a cache over `store` in the `prefix` namespace
    pub fn new(store: Arc<dyn TemplateStore>, prefix: impl Into<String>) -> PgstampResult<Self> {
        let prefix = prefix.into();
        validate_prefix(&prefix)?;

        Ok(Self {
            cloner: Cloner::new(Arc::clone(&store)),
            store,
            prefix,
            clock: Arc::new(SystemClock),
        })
    }

    /// Use a different time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Namespace prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Template database name for a fingerprint
    pub fn entry_name(&self, fingerprint: &Fingerprint) -> String {
        entry_name(&self.prefix, fingerprint)
    }

    /// Fresh listing of live templates, most recently used first
    pub async fn entries(&self) -> PgstampResult<Vec<CacheEntry>> {
        inventory::list(self.store.as_ref(), &self.prefix).await
    }

    /// Names held by databases that lack template metadata
    pub async fn orphans(&self) -> PgstampResult<Vec<String>> {
        inventory::orphans(self.store.as_ref(), &self.prefix).await
    }

    /// Number of live templates
    pub async fn size(&self) -> PgstampResult<usize> {
        Ok(self.entries().await?.len())
    }

    /// Register `source` as the template for `fingerprint`
    ///
    /// Returns `false` when a template already exists, including one that
    /// another process created concurrently. A database holding the template
    /// name without metadata is re-registered and counts as added.
    pub async fn add(&self, source: &str, fingerprint: &Fingerprint) -> PgstampResult<bool> {
        let name = self.entry_name(fingerprint);
        self.with_lock(&name, self.add_locked(source, &name)).await
    }

    async fn add_locked(&self, source: &str, name: &str) -> PgstampResult<bool> {
        if self.store.exists(name).await? {
            if self.find(name).await?.is_some() {
                debug!("Template {} already cached", name);
                return Ok(false);
            }
            warn!("Template {} has no metadata, registering it again", name);
            self.write_metadata(name, &EntryMetadata::new(self.clock.now()))
                .await?;
            return Ok(true);
        }

        match self.cloner.clone_database(source, name).await {
            Ok(()) => {}
            Err(PgstampError::AlreadyExists(_)) => {
                debug!("Template {} appeared concurrently", name);
                return Ok(false);
            }
            Err(e) => return Err(e),
        }

        // Without metadata the clone would be invisible to the inventory
        let metadata = EntryMetadata::new(self.clock.now());
        if let Err(e) = self.write_metadata(name, &metadata).await {
            self.discard(name).await;
            return Err(e);
        }

        info!("Cached {} as template {}", source, name);
        Ok(true)
    }

    /// Clone the template for `fingerprint` into `dest`
    ///
    /// Returns `false` and creates nothing on a cache miss. `dest` must not
    /// exist yet.
    pub async fn create(&self, dest: &str, fingerprint: &Fingerprint) -> PgstampResult<bool> {
        if self.store.exists(dest).await? {
            return Err(PgstampError::DestinationExists(dest.to_string()));
        }

        let name = self.entry_name(fingerprint);
        self.with_lock(&name, self.create_locked(dest, &name)).await
    }

    async fn create_locked(&self, dest: &str, name: &str) -> PgstampResult<bool> {
        let Some(entry) = self.find(name).await? else {
            debug!("Cache miss for {}", name);
            return Ok(false);
        };

        self.cloner
            .clone_database(&entry.name, dest)
            .await
            .map_err(|e| match e {
                PgstampError::AlreadyExists(_) => PgstampError::DestinationExists(dest.to_string()),
                other => other,
            })?;

        // `dest` must not outlive a failed touch
        let metadata = entry.metadata().touched(self.clock.now());
        if let Err(e) = self.write_metadata(&entry.name, &metadata).await {
            self.discard(dest).await;
            return Err(e);
        }

        info!("Created {} from template {}", dest, entry.name);
        Ok(true)
    }

    /// Keep only the `max_size` most recently used templates
    ///
    /// Negative `max_size` disables the policy. Returns the number removed.
    pub async fn trim_size(&self, max_size: i64) -> PgstampResult<usize> {
        let Ok(keep) = usize::try_from(max_size) else {
            return Ok(0);
        };

        let entries = self.entries().await?;
        self.evict_all(entries.iter().skip(keep).map(|e| e.name.as_str()))
            .await
    }

    /// Drop templates not used within `max_age`
    ///
    /// Removes every template with `last_used_at <= now - max_age`; a zero
    /// age removes everything, a negative one disables the policy.
    pub async fn trim_age(&self, max_age: TimeDelta) -> PgstampResult<usize> {
        if max_age < TimeDelta::zero() {
            return Ok(0);
        }
        let Some(cutoff) = self.clock.now().checked_sub_signed(max_age) else {
            return Ok(0);
        };

        let entries = self.entries().await?;
        let stale = entries.iter().filter(|e| e.is_stale(cutoff));
        self.evict_all(stale.map(|e| e.name.as_str())).await
    }

    /// Drop every template in the namespace
    ///
    /// Databases holding a template name without metadata are dropped too.
    pub async fn purge(&self) -> PgstampResult<usize> {
        let entries = self.entries().await?;
        let mut removed = self.evict_all(entries.iter().map(|e| e.name.as_str())).await?;

        let orphans = self.orphans().await?;
        removed += self.evict_all(orphans.iter().map(String::as_str)).await?;
        Ok(removed)
    }

    /// Apply both eviction policies, size first
    pub async fn maintain(&self, policy: &EvictionPolicy) -> PgstampResult<TrimReport> {
        let by_size = self.trim_size(policy.max_size).await?;
        let by_age = self.trim_age(policy.max_age).await?;
        Ok(TrimReport { by_size, by_age })
    }

    async fn evict_all<'a>(&self, names: impl Iterator<Item = &'a str>) -> PgstampResult<usize> {
        let mut removed = 0;
        for name in names {
            if self.with_lock(name, self.evict_locked(name)).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn evict_locked(&self, name: &str) -> PgstampResult<bool> {
        // Another process may have evicted it since the listing
        if !self.store.exists(name).await? {
            debug!("Template {} already gone", name);
            return Ok(false);
        }

        self.cloner.drop_database(name).await?;
        info!("Evicted template {}", name);
        Ok(true)
    }

    /// Live entry registered under `name`
    async fn find(&self, name: &str) -> PgstampResult<Option<CacheEntry>> {
        Ok(self.entries().await?.into_iter().find(|e| e.name == name))
    }

    async fn write_metadata(&self, name: &str, metadata: &EntryMetadata) -> PgstampResult<()> {
        self.store.set_comment(name, &metadata.to_comment()?).await
    }

    /// Best-effort drop of a database this operation just created
    async fn discard(&self, name: &str) {
        if let Err(e) = self.cloner.drop_database(name).await {
            warn!("Failed to remove {} after error: {}", name, e);
        }
    }

    /// Run `op` while holding the store lock for `key`
    ///
    /// The lock is released on every exit path; an operation error wins
    /// over a release error.
    async fn with_lock<T>(
        &self,
        key: &str,
        op: impl Future<Output = PgstampResult<T>>,
    ) -> PgstampResult<T> {
        let lock: Box<dyn StoreLock> = self.store.lock(key).await?;
        let result = op.await;
        let released = lock.release().await;

        match (result, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Err(e), _) | (Ok(_), Err(e)) => Err(e),
        }
    }
}
