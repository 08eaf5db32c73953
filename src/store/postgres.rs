//! PostgreSQL template store
//!
//! Databases are cloned with `CREATE DATABASE ... WITH TEMPLATE`, metadata
//! lives in `COMMENT ON DATABASE`, and cross-process exclusion uses
//! session-level advisory locks. Each lock holds its own connection outside
//! the pool, so the statements run under it never compete with it for a
//! pool slot.

use crate::error::{PgstampError, PgstampResult};
use crate::store::{DatabaseInfo, StoreLock, TemplateStore};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::{Connection, Row};
use std::time::Duration;
use tracing::{debug, info, warn};

/// SQLSTATE duplicate_database
const DUPLICATE_DATABASE: &str = "42P04";
/// SQLSTATE invalid_catalog_name
const INVALID_CATALOG_NAME: &str = "3D000";

/// PostgreSQL connection settings
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Connection URL of a maintenance database (e.g. `postgres`)
    pub url: String,
    /// Maximum number of pooled connections
    pub max_connections: u32,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/postgres".to_string(),
            max_connections: 4,
            connect_timeout_secs: 30,
        }
    }
}

/// Template store talking to a PostgreSQL server
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    connect_timeout: Duration,
}

impl PostgresStore {
    /// Wrap an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            connect_timeout: Duration::from_secs(PostgresConfig::default().connect_timeout_secs),
        }
    }

    /// Time allowed for opening a lock connection
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Connect a new pool
    pub async fn connect(config: &PostgresConfig) -> PgstampResult<Self> {
        if config.max_connections == 0 {
            return Err(PgstampError::User(
                "database.max_connections must be at least 1".to_string(),
            ));
        }

        let timeout = Duration::from_secs(config.connect_timeout_secs);
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(timeout)
            .connect(&config.url)
            .await
            .map_err(|e| PgstampError::Connection(e.to_string()))?;

        info!("Connected to PostgreSQL");
        Ok(Self::new(pool).with_connect_timeout(timeout))
    }

    /// Open a connection that is not part of the pool
    async fn dedicated_connection(&self) -> Result<PgConnection, String> {
        let options = self.pool.connect_options();
        match tokio::time::timeout(self.connect_timeout, PgConnection::connect_with(&options)).await
        {
            Ok(conn) => conn.map_err(|e| e.to_string()),
            Err(_) => Err(format!(
                "connection timed out after {}s",
                self.connect_timeout.as_secs()
            )),
        }
    }

    /// Run a DDL statement over the simple query protocol
    ///
    /// `CREATE DATABASE` and friends cannot run inside a transaction block,
    /// so they must not go through a prepared statement.
    async fn execute_ddl(
        &self,
        operation: &'static str,
        target: &str,
        sql: &str,
    ) -> PgstampResult<()> {
        debug!("Executing: {}", sql);
        sqlx::raw_sql(sql)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| classify(operation, target, e))
    }
}

#[async_trait]
impl TemplateStore for PostgresStore {
    async fn exists(&self, name: &str) -> PgstampResult<bool> {
        let row = sqlx::query("SELECT 1 FROM pg_database WHERE datname = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| classify("exists", name, e))?;
        Ok(row.is_some())
    }

    async fn list_by_prefix(&self, prefix: &str) -> PgstampResult<Vec<DatabaseInfo>> {
        let rows = sqlx::query(
            "SELECT datname::text AS name, shobj_description(oid, 'pg_database') AS comment \
             FROM pg_database \
             WHERE left(datname::text, length($1)) = $1 \
             ORDER BY datname",
        )
        .bind(prefix)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| classify("list", prefix, e))?;

        rows.into_iter()
            .map(|row| {
                Ok(DatabaseInfo {
                    name: row
                        .try_get("name")
                        .map_err(|e| classify("list", prefix, e))?,
                    comment: row
                        .try_get("comment")
                        .map_err(|e| classify("list", prefix, e))?,
                })
            })
            .collect()
    }

    async fn clone_database(&self, source: &str, dest: &str) -> PgstampResult<()> {
        let sql = format!(
            "CREATE DATABASE {} WITH TEMPLATE {}",
            quote_ident(dest),
            quote_ident(source)
        );
        match self.execute_ddl("clone", dest, &sql).await {
            // A missing template is reported against the source name
            Err(PgstampError::DatabaseNotFound(_)) => {
                Err(PgstampError::DatabaseNotFound(source.to_string()))
            }
            other => other,
        }
    }

    async fn set_comment(&self, name: &str, comment: &str) -> PgstampResult<()> {
        let sql = format!(
            "COMMENT ON DATABASE {} IS {}",
            quote_ident(name),
            quote_literal(comment)
        );
        self.execute_ddl("comment", name, &sql).await
    }

    async fn drop_database(&self, name: &str) -> PgstampResult<()> {
        let sql = format!("DROP DATABASE {}", quote_ident(name));
        self.execute_ddl("drop", name, &sql).await
    }

    async fn terminate_connections(&self, name: &str) -> PgstampResult<()> {
        let rows = sqlx::query(
            "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
             WHERE datname = $1 AND pid <> pg_backend_pid()",
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| classify("terminate", name, e))?;

        debug!("Terminated {} connection(s) to {}", rows.len(), name);
        Ok(())
    }

    async fn lock(&self, key: &str) -> PgstampResult<Box<dyn StoreLock>> {
        let lock_failed = |reason: String| PgstampError::Lock {
            key: key.to_string(),
            reason,
        };

        let mut conn = self.dedicated_connection().await.map_err(lock_failed)?;
        let lock_id = advisory_key(key);

        debug!("Acquiring advisory lock {} ({})", key, lock_id);
        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(lock_id)
            .execute(&mut conn)
            .await
            .map_err(|e| lock_failed(e.to_string()))?;

        Ok(Box::new(AdvisoryLock {
            conn: Some(conn),
            key: key.to_string(),
            lock_id,
        }))
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

/// Session-level advisory lock owning its connection
struct AdvisoryLock {
    conn: Option<PgConnection>,
    key: String,
    lock_id: i64,
}

#[async_trait]
impl StoreLock for AdvisoryLock {
    async fn release(mut self: Box<Self>) -> PgstampResult<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };

        let unlocked = sqlx::query_scalar::<_, bool>("SELECT pg_advisory_unlock($1)")
            .bind(self.lock_id)
            .fetch_one(&mut conn)
            .await;

        // Ending the session frees the lock even if the unlock failed
        if let Err(e) = conn.close().await {
            debug!("Closing lock connection for {} failed: {}", self.key, e);
        }

        match unlocked {
            Ok(true) => {
                debug!("Released advisory lock {}", self.key);
                Ok(())
            }
            Ok(false) => Err(PgstampError::Lock {
                key: self.key.clone(),
                reason: "lock was not held by this session".to_string(),
            }),
            Err(e) => Err(PgstampError::Lock {
                key: self.key.clone(),
                reason: e.to_string(),
            }),
        }
    }
}

impl Drop for AdvisoryLock {
    fn drop(&mut self) {
        // Dropping the connection closes the socket and the server frees
        // the lock with the session
        if self.conn.take().is_some() {
            warn!("Advisory lock {} dropped without release", self.key);
        }
    }
}

/// Map a lock key to a stable 64-bit advisory lock id
pub fn advisory_key(key: &str) -> i64 {
    let digest = Sha256::digest(key.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(bytes)
}

/// Quote an SQL identifier
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote an SQL string literal (standard_conforming_strings = on)
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Translate a driver error into the crate taxonomy
fn classify(operation: &'static str, target: &str, err: sqlx::Error) -> PgstampError {
    let code = err
        .as_database_error()
        .and_then(|db| db.code())
        .map(|code| code.into_owned());

    match code.as_deref() {
        Some(DUPLICATE_DATABASE) => PgstampError::AlreadyExists(target.to_string()),
        Some(INVALID_CATALOG_NAME) => PgstampError::DatabaseNotFound(target.to_string()),
        _ => match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
                PgstampError::Connection(err.to_string())
            }
            _ => PgstampError::storage(operation, target, err),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Fingerprint, TemplateCache};
    use std::sync::Arc;

    #[test]
    fn quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("cache-abc"), "\"cache-abc\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn quote_literal_escapes_quotes() {
        assert_eq!(quote_literal("{\"a\":1}"), "'{\"a\":1}'");
        assert_eq!(quote_literal("it's"), "'it''s'");
    }

    #[test]
    fn advisory_key_is_stable() {
        assert_eq!(advisory_key("cache-a"), advisory_key("cache-a"));
        assert_ne!(advisory_key("cache-a"), advisory_key("cache-b"));
    }

    #[test]
    fn classify_non_database_errors() {
        let err = classify("list", "cache-", sqlx::Error::PoolTimedOut);
        assert!(matches!(err, PgstampError::Connection(_)));

        let err = classify("drop", "db", sqlx::Error::RowNotFound);
        assert!(matches!(err, PgstampError::Storage { operation: "drop", .. }));
    }

    #[tokio::test]
    async fn connect_rejects_empty_pool() {
        let config = PostgresConfig {
            max_connections: 0,
            ..PostgresConfig::default()
        };
        let err = PostgresStore::connect(&config).await.unwrap_err();
        assert!(matches!(err, PgstampError::User(_)));
    }

    /// Needs a server where the test may create databases, e.g.
    /// `PGSTAMP_TEST_DATABASE_URL=postgres://postgres@localhost/postgres`
    async fn test_store(max_connections: u32) -> Option<Arc<PostgresStore>> {
        let url = std::env::var("PGSTAMP_TEST_DATABASE_URL").ok()?;
        let config = PostgresConfig {
            url,
            max_connections,
            connect_timeout_secs: 10,
        };
        Some(Arc::new(PostgresStore::connect(&config).await.unwrap()))
    }

    #[tokio::test]
    async fn locked_adds_fit_a_single_connection_pool() {
        let Some(store) = test_store(1).await else {
            return;
        };
        let source = format!("pgstamp_src_{}", std::process::id());
        let prefix = format!("pgstamp_t{}", std::process::id());
        store
            .execute_ddl("create", &source, &format!("CREATE DATABASE {}", quote_ident(&source)))
            .await
            .unwrap();

        let cache = TemplateCache::new(store.clone(), prefix).unwrap();
        let fingerprint: Fingerprint = "ab".repeat(20).parse().unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let source = source.clone();
                tokio::spawn(async move { cache.add(&source, &fingerprint).await })
            })
            .collect();

        let mut registered = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() {
                registered += 1;
            }
        }

        assert_eq!(registered, 1);
        assert_eq!(cache.purge().await.unwrap(), 1);
        store.drop_database(&source).await.unwrap();
    }

    #[test]
    fn default_config() {
        let config = PostgresConfig::default();
        assert!(config.url.starts_with("postgres://"));
        assert_eq!(config.max_connections, 4);
    }
}
