//! Database provisioning
//!
//! `ensure` turns a recipe into a ready database: clone the cached template
//! when there is one, otherwise build from scratch and register the result
//! so the next request for the same recipe is fast.

use crate::build::TemplateBuilder;
use crate::cache::{EvictionPolicy, Fingerprint, Recipe, TemplateCache, TrimReport};
use crate::error::{PgstampError, PgstampResult};
use crate::store::TemplateStore;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// How `ensure` produced the database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// Cloned from the cached template
    Cloned(Fingerprint),
    /// Built from scratch; `registered` when it became the new template
    Built {
        fingerprint: Option<Fingerprint>,
        registered: bool,
    },
    /// Destination already existed and `unless_exists` was set
    Existing,
}

impl fmt::Display for ProvisionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cloned(fp) => write!(f, "cloned from template {}", fp),
            Self::Built {
                registered: true, ..
            } => write!(f, "built and cached"),
            Self::Built { .. } => write!(f, "built"),
            Self::Existing => write!(f, "already exists"),
        }
    }
}

/// Provisions databases from recipes, through the cache when enabled
pub struct Provisioner {
    store: Arc<dyn TemplateStore>,
    builder: Arc<dyn TemplateBuilder>,
    cache: Option<TemplateCache>,
    policy: EvictionPolicy,
    unless_exists: bool,
}

impl Provisioner {
    /// Create a provisioner that always builds from scratch
    pub fn new(store: Arc<dyn TemplateStore>, builder: Arc<dyn TemplateBuilder>) -> Self {
        Self {
            store,
            builder,
            cache: None,
            policy: EvictionPolicy::disabled(),
            unless_exists: false,
        }
    }

    /// Clone from and register into `cache`, then apply `policy`
    pub fn with_cache(mut self, cache: TemplateCache, policy: EvictionPolicy) -> Self {
        self.cache = Some(cache);
        self.policy = policy;
        self
    }

    /// Succeed without doing anything when the destination already exists
    pub fn unless_exists(mut self, unless_exists: bool) -> Self {
        self.unless_exists = unless_exists;
        self
    }

    /// Make `dest` a ready database for `recipe`
    pub async fn ensure(&self, dest: &str, recipe: &Recipe) -> PgstampResult<ProvisionOutcome> {
        if self.store.exists(dest).await? {
            if self.unless_exists {
                info!("Database {} already exists, nothing to do", dest);
                return Ok(ProvisionOutcome::Existing);
            }
            return Err(PgstampError::DestinationExists(dest.to_string()));
        }

        let Some(cache) = &self.cache else {
            self.build(dest, recipe).await?;
            return Ok(ProvisionOutcome::Built {
                fingerprint: None,
                registered: false,
            });
        };

        let fingerprint = recipe.fingerprint();
        let outcome = if cache.create(dest, &fingerprint).await? {
            ProvisionOutcome::Cloned(fingerprint)
        } else {
            self.build(dest, recipe).await?;
            let registered = cache.add(dest, &fingerprint).await?;
            ProvisionOutcome::Built {
                fingerprint: Some(fingerprint),
                registered,
            }
        };

        let report = self.maintain(cache).await?;
        if report.total() > 0 {
            info!(
                "Evicted {} template(s) ({} by size, {} by age)",
                report.total(),
                report.by_size,
                report.by_age
            );
        }

        Ok(outcome)
    }

    async fn maintain(&self, cache: &TemplateCache) -> PgstampResult<TrimReport> {
        cache.maintain(&self.policy).await
    }

    /// Run the builder; drop whatever it left behind on failure
    async fn build(&self, dest: &str, recipe: &Recipe) -> PgstampResult<()> {
        let Err(err) = self.builder.build(dest, recipe).await else {
            return Ok(());
        };

        match self.store.exists(dest).await {
            Ok(true) => {
                warn!("Build of {} failed, dropping partial database", dest);
                if let Err(drop_err) = self.store.drop_database(dest).await {
                    warn!("Could not drop partial database {}: {}", dest, drop_err);
                }
            }
            Ok(false) => {}
            Err(check_err) => warn!("Could not check for partial database {}: {}", dest, check_err),
        }

        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::{TimeDelta, TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Builder that writes the recipe's modules into the new database
    struct FakeBuilder {
        store: Arc<MemoryStore>,
        calls: AtomicUsize,
        fail: bool,
    }

    impl FakeBuilder {
        fn new(store: Arc<MemoryStore>) -> Self {
            Self {
                store,
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TemplateBuilder for FakeBuilder {
        async fn build(&self, target: &str, recipe: &Recipe) -> PgstampResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let modules = recipe.modules().collect::<Vec<_>>().join(",");
            self.store.create_database(target, &modules)?;
            if self.fail {
                return Err(PgstampError::Build {
                    database: target.to_string(),
                    reason: "boom".to_string(),
                });
            }
            Ok(())
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        builder: Arc<FakeBuilder>,
        cache: TemplateCache,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let builder = Arc::new(FakeBuilder::new(store.clone()));
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2018, 5, 10, 0, 0, 0).unwrap(),
        ));
        let cache = TemplateCache::new(store.clone(), "tstpfx9")
            .unwrap()
            .with_clock(clock);
        Fixture {
            store,
            builder,
            cache,
        }
    }

    fn provisioner(f: &Fixture, policy: EvictionPolicy) -> Provisioner {
        Provisioner::new(f.store.clone(), f.builder.clone()).with_cache(f.cache.clone(), policy)
    }

    #[tokio::test]
    async fn first_build_then_clone() {
        let f = fixture();
        let p = provisioner(&f, EvictionPolicy::disabled());
        let recipe = Recipe::new(["base", "auth_signup"]);

        let first = p.ensure("db1", &recipe).await.unwrap();
        assert_eq!(
            first,
            ProvisionOutcome::Built {
                fingerprint: Some(recipe.fingerprint()),
                registered: true
            }
        );
        assert_eq!(f.cache.size().await.unwrap(), 1);

        let second = p.ensure("db2", &recipe).await.unwrap();
        assert_eq!(second, ProvisionOutcome::Cloned(recipe.fingerprint()));
        assert_eq!(f.builder.calls(), 1);
        assert_eq!(f.store.contents("db2").as_deref(), Some("auth_signup,base"));
    }

    #[tokio::test]
    async fn without_cache_always_builds() {
        let f = fixture();
        let p = Provisioner::new(f.store.clone(), f.builder.clone());

        p.ensure("db1", &Recipe::new(["base"])).await.unwrap();
        p.ensure("db2", &Recipe::new(["base"])).await.unwrap();

        assert_eq!(f.builder.calls(), 2);
        assert_eq!(f.cache.size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn existing_destination() {
        let f = fixture();
        f.store.create_database("db1", "mine").unwrap();

        let err = provisioner(&f, EvictionPolicy::disabled())
            .ensure("db1", &Recipe::new(["base"]))
            .await
            .unwrap_err();
        assert!(matches!(err, PgstampError::DestinationExists(_)));

        let outcome = provisioner(&f, EvictionPolicy::disabled())
            .unless_exists(true)
            .ensure("db1", &Recipe::new(["base"]))
            .await
            .unwrap();
        assert_eq!(outcome, ProvisionOutcome::Existing);
        assert_eq!(f.store.contents("db1").as_deref(), Some("mine"));
        assert_eq!(f.builder.calls(), 0);
    }

    #[tokio::test]
    async fn failed_build_is_cleaned_up_and_not_cached() {
        let f = fixture();
        let builder = Arc::new(FakeBuilder {
            fail: true,
            ..FakeBuilder::new(f.store.clone())
        });
        let p = Provisioner::new(f.store.clone(), builder)
            .with_cache(f.cache.clone(), EvictionPolicy::disabled());

        let err = p.ensure("db1", &Recipe::new(["base"])).await.unwrap_err();

        assert!(matches!(err, PgstampError::Build { .. }));
        assert!(f.store.contents("db1").is_none());
        assert_eq!(f.cache.size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn eviction_applied_after_provisioning() {
        let f = fixture();
        let p = provisioner(
            &f,
            EvictionPolicy {
                max_size: 1,
                max_age: TimeDelta::days(-1),
            },
        );

        p.ensure("db1", &Recipe::new(["base"])).await.unwrap();
        p.ensure("db2", &Recipe::new(["sale"])).await.unwrap();

        let entries = f.cache.entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        // Both templates share a timestamp; the lower name survives
        let expected = [
            Recipe::new(["base"]).fingerprint(),
            Recipe::new(["sale"]).fingerprint(),
        ]
        .into_iter()
        .min_by_key(|fp| fp.to_hex())
        .unwrap();
        assert_eq!(entries[0].fingerprint, expected);
    }

    #[test]
    fn outcome_display() {
        let fp = Recipe::new(["base"]).fingerprint();
        assert!(ProvisionOutcome::Cloned(fp).to_string().contains(&fp.to_hex()));
        assert_eq!(
            ProvisionOutcome::Built {
                fingerprint: Some(fp),
                registered: true
            }
            .to_string(),
            "built and cached"
        );
        assert_eq!(ProvisionOutcome::Existing.to_string(), "already exists");
    }
}
