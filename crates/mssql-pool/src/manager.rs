//! Process-wide registry of named pools.
//!
//! A host embedding this crate identifies a pool by a context name it
//! chooses (typically a catalog or data-source alias) rather than holding
//! the [`Pool`] handle itself across calls. [`PoolManager`] is the shared
//! map of `context name -> Pool` described for this layer: a lazily
//! initialized, mutex-guarded table, the same pattern as the rest of this
//! family's process-wide caches.
//!
//! [`PoolManager::global`] is the process-wide instance an embedding host
//! uses in production. Tests that need isolation from other tests running
//! in the same process should construct their own [`PoolManager::new`]
//! instead of reaching for the global.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mssql_client::Config;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::pool::{Pool, PooledConnection};

static GLOBAL: Lazy<PoolManager> = Lazy::new(PoolManager::new);

/// A process-wide map of named connection pools.
///
/// Each context name is backed by exactly one [`Pool`], created on first
/// use from the `(PoolConfig, Config)` pair supplied to
/// [`PoolManager::acquire`]. Subsequent calls with the same context name
/// reuse the existing pool and ignore the configuration arguments, matching
/// how a catalog-style caller registers a data source once and then
/// acquires from it by name on every query.
pub struct PoolManager {
    pools: Mutex<HashMap<String, Arc<Pool>>>,
}

impl PoolManager {
    /// Create a fresh, empty manager.
    ///
    /// Use this in tests to avoid cross-test interference with the shared
    /// [`PoolManager::global`] instance.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide manager instance.
    pub fn global() -> &'static PoolManager {
        &GLOBAL
    }

    /// Acquire a connection from the named pool, creating it first if this
    /// is the first time `context_name` has been seen.
    ///
    /// `pool_config`/`client_config` are only consulted when the pool is
    /// created; an already-registered context name reuses its existing
    /// pool verbatim.
    pub async fn acquire(
        &self,
        context_name: &str,
        pool_config: PoolConfig,
        client_config: Config,
        acquire_timeout: Duration,
    ) -> Result<PooledConnection, PoolError> {
        let pool = self.get_or_create(context_name, pool_config, client_config).await?;
        pool.get_with_timeout(acquire_timeout).await
    }

    /// Look up a pool that has already been registered under `context_name`,
    /// without creating one.
    #[must_use]
    pub fn get(&self, context_name: &str) -> Option<Arc<Pool>> {
        self.pools.lock().get(context_name).cloned()
    }

    /// Register a pool under `context_name` explicitly, replacing any pool
    /// previously registered there. The previous pool (if any) is returned
    /// so the caller can close it.
    pub fn register(&self, context_name: impl Into<String>, pool: Arc<Pool>) -> Option<Arc<Pool>> {
        self.pools.lock().insert(context_name.into(), pool)
    }

    /// Tear down the pool registered under `context_name`, if any.
    ///
    /// Removes it from the map and closes it so idle connections are
    /// dropped; connections already checked out are closed as they are
    /// returned, per [`Pool::close`].
    pub async fn remove(&self, context_name: &str) {
        let pool = self.pools.lock().remove(context_name);
        if let Some(pool) = pool {
            pool.close().await;
        }
    }

    /// List the context names currently registered.
    #[must_use]
    pub fn context_names(&self) -> Vec<String> {
        self.pools.lock().keys().cloned().collect()
    }

    async fn get_or_create(
        &self,
        context_name: &str,
        pool_config: PoolConfig,
        client_config: Config,
    ) -> Result<Arc<Pool>, PoolError> {
        if let Some(pool) = self.get(context_name) {
            return Ok(pool);
        }

        // Build the candidate pool without holding the map lock across the
        // `.await` — `Pool::new` may spawn a warm-up task but does not block
        // on connecting, so this is cheap and bounded.
        let pool = Arc::new(Pool::new(pool_config, client_config).await?);

        let mut pools = self.pools.lock();
        // Another task may have raced us and inserted first; prefer the
        // winner's pool and let ours be dropped (and closed on drop).
        Ok(Arc::clone(pools.entry(context_name.to_string()).or_insert(pool)))
    }
}

impl Default for PoolManager {
    fn default() -> Self {
        Self::new()
    }
}
