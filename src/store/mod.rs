//! Template store abstraction
//!
//! Provides database-level operations the cache is built on:
//! - PostgreSQL: catalog queries, `CREATE DATABASE ... TEMPLATE`, advisory locks
//! - Memory: in-process store for tests and embedding

mod cloner;
mod factory;
mod memory;
pub mod postgres;

pub use cloner::Cloner;
pub use factory::connect_store;
pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use crate::error::PgstampResult;
use async_trait::async_trait;

/// A database as seen in the server catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseInfo {
    /// Database name
    pub name: String,
    /// Database comment, if any
    pub comment: Option<String>,
}

/// Abstract database server interface
///
/// Every call goes to the backing server; implementations must not cache
/// catalog state between calls.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Check whether a database exists
    async fn exists(&self, name: &str) -> PgstampResult<bool>;

    /// List databases whose name starts with `prefix`
    async fn list_by_prefix(&self, prefix: &str) -> PgstampResult<Vec<DatabaseInfo>>;

    /// Create `dest` as a copy of `source`
    ///
    /// Fails with `AlreadyExists` if `dest` is live and `DatabaseNotFound`
    /// if `source` is missing.
    async fn clone_database(&self, source: &str, dest: &str) -> PgstampResult<()>;

    /// Replace a database's comment
    async fn set_comment(&self, name: &str, comment: &str) -> PgstampResult<()>;

    /// Drop a database; a missing database is an error
    async fn drop_database(&self, name: &str) -> PgstampResult<()>;

    /// Disconnect every other session connected to a database
    async fn terminate_connections(&self, name: &str) -> PgstampResult<()>;

    /// Acquire an exclusive lock shared by every client of the server
    ///
    /// The lock must be released if the holder goes away without calling
    /// [`StoreLock::release`].
    async fn lock(&self, key: &str) -> PgstampResult<Box<dyn StoreLock>>;

    /// Human-readable backend name for display
    fn backend_name(&self) -> &'static str;
}

/// A held store lock
#[async_trait]
pub trait StoreLock: Send {
    /// Release the lock
    async fn release(self: Box<Self>) -> PgstampResult<()>;
}
