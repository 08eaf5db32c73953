//! Database cloning
//!
//! Thin layer over the store for copying and dropping named databases.

use crate::error::{PgstampError, PgstampResult};
use crate::store::TemplateStore;
use std::sync::Arc;
use tracing::{debug, info};

/// Clones and drops databases on a template store
#[derive(Clone)]
pub struct Cloner {
    store: Arc<dyn TemplateStore>,
}

impl Cloner {
    /// Create a cloner over a store
    pub fn new(store: Arc<dyn TemplateStore>) -> Self {
        Self { store }
    }

    /// Create `dest` as an independent copy of `source`
    pub async fn clone_database(&self, source: &str, dest: &str) -> PgstampResult<()> {
        debug!("Cloning database {} into {}", source, dest);
        self.store.clone_database(source, dest).await
    }

    /// Drop a database the caller knows to exist
    pub async fn drop_database(&self, name: &str) -> PgstampResult<()> {
        debug!("Dropping database {}", name);
        self.store.drop_database(name).await
    }

    /// Copy an arbitrary database with up-front checks
    ///
    /// With `force_disconnect`, other sessions on `source` are terminated
    /// first; the server refuses to copy a database that is in use.
    pub async fn copy(&self, source: &str, dest: &str, force_disconnect: bool) -> PgstampResult<()> {
        if self.store.exists(dest).await? {
            return Err(PgstampError::DestinationExists(dest.to_string()));
        }
        if !self.store.exists(source).await? {
            return Err(PgstampError::DatabaseNotFound(source.to_string()));
        }
        if force_disconnect {
            self.store.terminate_connections(source).await?;
        }

        self.clone_database(source, dest).await.map_err(|e| match e {
            PgstampError::AlreadyExists(name) => PgstampError::DestinationExists(name),
            other => other,
        })?;

        info!("Copied database {} to {}", source, dest);
        Ok(())
    }
}
