//! In-process template store
//!
//! Keeps databases in a map and locks in per-key async mutexes. Shared by
//! every clone of the `Arc` it lives in, which stands in for "every process
//! connected to the same server".

use crate::error::{PgstampError, PgstampResult};
use crate::store::{DatabaseInfo, StoreLock, TemplateStore};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

#[derive(Debug, Clone, Default)]
struct MemoryDatabase {
    contents: String,
    comment: Option<String>,
}

/// Template store backed by process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    databases: Mutex<BTreeMap<String, MemoryDatabase>>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    failing: Mutex<HashSet<&'static str>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a database with the given contents
    pub fn create_database(&self, name: &str, contents: &str) -> PgstampResult<()> {
        self.fail_if_requested("create", name)?;
        let mut databases = self.databases();
        if databases.contains_key(name) {
            return Err(PgstampError::AlreadyExists(name.to_string()));
        }
        databases.insert(
            name.to_string(),
            MemoryDatabase {
                contents: contents.to_string(),
                comment: None,
            },
        );
        Ok(())
    }

    /// Contents of a database, if it exists
    pub fn contents(&self, name: &str) -> Option<String> {
        self.databases().get(name).map(|db| db.contents.clone())
    }

    /// Comment of a database, if it exists and has one
    pub fn comment(&self, name: &str) -> Option<String> {
        self.databases().get(name).and_then(|db| db.comment.clone())
    }

    /// Overwrite a database's contents
    pub fn write(&self, name: &str, contents: &str) -> PgstampResult<()> {
        let mut databases = self.databases();
        let db = databases
            .get_mut(name)
            .ok_or_else(|| PgstampError::DatabaseNotFound(name.to_string()))?;
        db.contents = contents.to_string();
        Ok(())
    }

    /// All database names, sorted
    pub fn names(&self) -> Vec<String> {
        self.databases().keys().cloned().collect()
    }

    /// Make every subsequent call of `operation` fail with a storage error
    ///
    /// Operations: `exists`, `list`, `clone`, `comment`, `drop`, `create`,
    /// `terminate`, `lock`.
    pub fn fail_on(&self, operation: &'static str) {
        self.failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(operation);
    }

    /// Stop failing `operation`
    pub fn recover(&self, operation: &'static str) {
        self.failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(operation);
    }

    fn databases(&self) -> MutexGuard<'_, BTreeMap<String, MemoryDatabase>> {
        self.databases.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn fail_if_requested(&self, operation: &'static str, target: &str) -> PgstampResult<()> {
        let failing = self.failing.lock().unwrap_or_else(|e| e.into_inner());
        if failing.contains(operation) {
            return Err(PgstampError::storage(operation, target, "injected failure"));
        }
        Ok(())
    }
}

/// Held per-key mutex guard
struct MemoryLock {
    _guard: OwnedMutexGuard<()>,
}

#[async_trait]
impl StoreLock for MemoryLock {
    async fn release(self: Box<Self>) -> PgstampResult<()> {
        Ok(())
    }
}

#[async_trait]
impl TemplateStore for MemoryStore {
    async fn exists(&self, name: &str) -> PgstampResult<bool> {
        self.fail_if_requested("exists", name)?;
        Ok(self.databases().contains_key(name))
    }

    async fn list_by_prefix(&self, prefix: &str) -> PgstampResult<Vec<DatabaseInfo>> {
        self.fail_if_requested("list", prefix)?;
        Ok(self
            .databases()
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(name, db)| DatabaseInfo {
                name: name.clone(),
                comment: db.comment.clone(),
            })
            .collect())
    }

    async fn clone_database(&self, source: &str, dest: &str) -> PgstampResult<()> {
        self.fail_if_requested("clone", dest)?;
        let mut databases = self.databases();
        if databases.contains_key(dest) {
            return Err(PgstampError::AlreadyExists(dest.to_string()));
        }
        let contents = databases
            .get(source)
            .map(|db| db.contents.clone())
            .ok_or_else(|| PgstampError::DatabaseNotFound(source.to_string()))?;

        debug!("Cloning {} into {}", source, dest);
        databases.insert(
            dest.to_string(),
            MemoryDatabase {
                contents,
                comment: None,
            },
        );
        Ok(())
    }

    async fn set_comment(&self, name: &str, comment: &str) -> PgstampResult<()> {
        self.fail_if_requested("comment", name)?;
        let mut databases = self.databases();
        let db = databases
            .get_mut(name)
            .ok_or_else(|| PgstampError::DatabaseNotFound(name.to_string()))?;
        db.comment = Some(comment.to_string());
        Ok(())
    }

    async fn drop_database(&self, name: &str) -> PgstampResult<()> {
        self.fail_if_requested("drop", name)?;
        self.databases()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| PgstampError::DatabaseNotFound(name.to_string()))
    }

    async fn terminate_connections(&self, name: &str) -> PgstampResult<()> {
        self.fail_if_requested("terminate", name)
    }

    async fn lock(&self, key: &str) -> PgstampResult<Box<dyn StoreLock>> {
        self.fail_if_requested("lock", key)?;
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(locks.entry(key.to_string()).or_default())
        };
        let guard = mutex.lock_owned().await;
        Ok(Box::new(MemoryLock { _guard: guard }))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn clone_copies_contents_not_comment() {
        let store = MemoryStore::new();
        store.create_database("src", "modules=base").unwrap();
        store.set_comment("src", "note").await.unwrap();

        store.clone_database("src", "dst").await.unwrap();

        assert_eq!(store.contents("dst").as_deref(), Some("modules=base"));
        assert_eq!(store.comment("dst"), None);
    }

    #[tokio::test]
    async fn clones_are_independent() {
        let store = MemoryStore::new();
        store.create_database("src", "v1").unwrap();
        store.clone_database("src", "dst").await.unwrap();

        store.write("dst", "v2").unwrap();

        assert_eq!(store.contents("src").as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn clone_errors() {
        let store = MemoryStore::new();
        store.create_database("src", "").unwrap();
        store.create_database("dst", "").unwrap();

        let err = store.clone_database("src", "dst").await.unwrap_err();
        assert!(matches!(err, PgstampError::AlreadyExists(_)));

        let err = store.clone_database("missing", "other").await.unwrap_err();
        assert!(matches!(err, PgstampError::DatabaseNotFound(_)));
    }

    #[tokio::test]
    async fn drop_missing_is_error() {
        let store = MemoryStore::new();
        let err = store.drop_database("missing").await.unwrap_err();
        assert!(matches!(err, PgstampError::DatabaseNotFound(_)));
    }

    #[tokio::test]
    async fn list_filters_by_prefix() {
        let store = MemoryStore::new();
        store.create_database("cache-a", "").unwrap();
        store.create_database("cache-b", "").unwrap();
        store.create_database("other", "").unwrap();

        let names: Vec<_> = store
            .list_by_prefix("cache-")
            .await
            .unwrap()
            .into_iter()
            .map(|db| db.name)
            .collect();
        assert_eq!(names, vec!["cache-a", "cache-b"]);
    }

    #[tokio::test]
    async fn injected_failures() {
        let store = MemoryStore::new();
        store.fail_on("exists");
        assert!(matches!(
            store.exists("x").await,
            Err(PgstampError::Storage { operation: "exists", .. })
        ));
        store.recover("exists");
        assert!(!store.exists("x").await.unwrap());
    }

    #[tokio::test]
    async fn lock_is_exclusive_per_key() {
        let store = Arc::new(MemoryStore::new());
        let held = store.lock("k").await.unwrap();

        let contender = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.lock("k").await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        // Other keys are not blocked
        store.lock("other").await.unwrap().release().await.unwrap();

        held.release().await.unwrap();
        contender.await.unwrap().unwrap();
    }
}
