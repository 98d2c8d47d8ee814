//! Connection pool implementation.
//!
//! The pool hands out exclusively-owned [`Client<Ready>`] connections, created
//! from a single [`Config`] (the pool's connection descriptor) and returned
//! through [`PooledConnection::drop`]. Acquisition follows the algorithm used
//! by every connection pool in this family: reuse an idle connection if one
//! is available, validating it first when it has sat idle past
//! `health_check_interval`; otherwise open a fresh connection if the pool is
//! under `max_connections`; otherwise wait on a condition variable bounded by
//! `connection_timeout`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use mssql_client::{Client, Config};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::timeout;

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::lifecycle::ConnectionMetadata;

/// A connection pool for SQL Server.
///
/// The pool manages a set of database connections, providing automatic
/// connection reuse, health checking, and lifecycle management.
///
/// # Example
///
/// ```rust,no_run
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// use mssql_client::Config;
/// use mssql_driver_pool::{Pool, PoolConfig};
///
/// let client_config = Config::from_connection_string(
///     "Server=localhost;Database=master;User Id=sa;Password=secret",
/// )?;
/// let pool = Pool::builder()
///     .client_config(client_config)
///     .max_connections(10)
///     .build()
///     .await?;
///
/// let mut conn = pool.get().await?;
/// let _rows = conn.query("SELECT 1", &[]).await?;
/// // Connection is returned to the pool when `conn` is dropped.
/// # Ok(())
/// # }
/// ```
pub struct Pool {
    config: PoolConfig,
    inner: Arc<PoolInner>,
}

struct PoolInner {
    client_config: Config,
    pool_config: PoolConfig,
    closed: AtomicBool,
    next_connection_id: AtomicU64,
    created_at: Instant,
    state: Mutex<PoolState>,
    /// Notified whenever a connection is released or the pool is closed, so
    /// that waiters blocked in `get()` can re-check availability.
    available: Notify,
    metrics: Mutex<PoolMetricsInner>,
}

struct IdleEntry {
    client: Client<mssql_client::state::Ready>,
    metadata: ConnectionMetadata,
}

#[derive(Default)]
struct PoolState {
    idle: VecDeque<IdleEntry>,
    /// Number of connections currently checked out (active) or pinned.
    active: u32,
    /// Total live connections: `idle.len() + active`.
    total: u32,
}

/// Internal metrics tracking.
#[derive(Debug, Default)]
struct PoolMetricsInner {
    connections_created: u64,
    connections_closed: u64,
    checkouts_successful: u64,
    checkouts_failed: u64,
    health_checks_performed: u64,
    health_checks_failed: u64,
    resets_performed: u64,
    resets_failed: u64,
}

impl Pool {
    /// Create a new pool builder.
    ///
    /// Use the builder to configure the pool before creating it.
    #[must_use]
    pub fn builder() -> PoolBuilder {
        PoolBuilder::new()
    }

    /// Create a new pool with the given configuration.
    ///
    /// For more control over pool creation, use [`Pool::builder()`].
    pub async fn new(pool_config: PoolConfig, client_config: Config) -> Result<Self, PoolError> {
        pool_config.validate()?;

        let inner = Arc::new(PoolInner {
            client_config,
            pool_config: pool_config.clone(),
            closed: AtomicBool::new(false),
            next_connection_id: AtomicU64::new(1),
            created_at: Instant::now(),
            state: Mutex::new(PoolState::default()),
            available: Notify::new(),
            metrics: Mutex::new(PoolMetricsInner::default()),
        });

        tracing::info!(
            min = pool_config.min_connections,
            max = pool_config.max_connections,
            "connection pool created"
        );

        if pool_config.min_connections > 0 {
            inner.clone().spawn_warm_up();
        }

        Ok(Self {
            config: pool_config,
            inner,
        })
    }

    /// Get a connection from the pool.
    ///
    /// This will either return an existing idle connection or create a new one
    /// if the pool is not at capacity. If all connections are in use and the
    /// pool is at capacity, this will wait until a connection becomes available
    /// or the acquisition timeout is reached.
    pub async fn get(&self) -> Result<PooledConnection, PoolError> {
        self.get_with_timeout(self.config.connection_timeout).await
    }

    /// Get a connection from the pool, overriding the configured
    /// `connection_timeout` for this one acquisition.
    ///
    /// Used by [`crate::manager::PoolManager::acquire`] so a single named
    /// pool can serve callers with different acquire-timeout needs.
    pub async fn get_with_timeout(&self, acquire_timeout: Duration) -> Result<PooledConnection, PoolError> {
        match timeout(acquire_timeout, self.inner.acquire()).await {
            Ok(Ok(conn)) => {
                self.inner.metrics.lock().checkouts_successful += 1;
                Ok(conn)
            }
            Ok(Err(e)) => {
                self.inner.metrics.lock().checkouts_failed += 1;
                Err(e)
            }
            Err(_) => {
                self.inner.metrics.lock().checkouts_failed += 1;
                Err(PoolError::Timeout)
            }
        }
    }

    /// Try to get a connection without waiting.
    ///
    /// Returns `None` if no idle connection is immediately available and the
    /// pool is at capacity. Never opens a new connection.
    pub fn try_get(&self) -> Result<Option<PooledConnection>, PoolError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(PoolError::PoolClosed);
        }

        let mut state = self.inner.state.lock();
        while let Some(entry) = state.idle.pop_front() {
            let mut metadata = entry.metadata;
            metadata.mark_checkout();
            state.active += 1;
            drop(state);
            self.inner.metrics.lock().checkouts_successful += 1;
            return Ok(Some(PooledConnection {
                client: Some(entry.client),
                metadata,
                pool: Arc::clone(&self.inner),
            }));
        }
        Ok(None)
    }

    /// Get the current pool status.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock();
        PoolStatus {
            available: state.idle.len() as u32,
            in_use: state.active,
            total: state.total,
            max: self.config.max_connections,
        }
    }

    /// Get pool metrics.
    #[must_use]
    pub fn metrics(&self) -> PoolMetrics {
        let inner = self.inner.metrics.lock();
        PoolMetrics {
            connections_created: inner.connections_created,
            connections_closed: inner.connections_closed,
            checkouts_successful: inner.checkouts_successful,
            checkouts_failed: inner.checkouts_failed,
            health_checks_performed: inner.health_checks_performed,
            health_checks_failed: inner.health_checks_failed,
            resets_performed: inner.resets_performed,
            resets_failed: inner.resets_failed,
            uptime: self.inner.created_at.elapsed(),
        }
    }

    /// Close the pool, dropping all idle connections.
    ///
    /// Connections already checked out are closed as they are returned;
    /// once closed, [`Pool::get`] and [`Pool::try_get`] fail with
    /// [`PoolError::PoolClosed`].
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        let idle: Vec<_> = {
            let mut state = self.inner.state.lock();
            state.total -= state.idle.len() as u32;
            state.idle.drain(..).collect()
        };
        let closed = idle.len() as u64;
        for entry in idle {
            let _ = entry.client.close().await;
        }
        self.inner.metrics.lock().connections_closed += closed;
        self.inner.available.notify_waiters();
        tracing::info!("connection pool closed");
    }

    /// Check if the pool is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Get the pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}

impl PoolInner {
    fn next_connection_id(&self) -> u64 {
        self.next_connection_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Open `min_connections` eagerly so the first callers don't pay the
    /// connect latency. Best-effort: failures are logged, not surfaced.
    fn spawn_warm_up(self: Arc<Self>) {
        tokio::spawn(async move {
            let target = self.pool_config.min_connections;
            for _ in 0..target {
                if self.closed.load(Ordering::Acquire) {
                    return;
                }
                match self.connect().await {
                    Ok((client, metadata)) => {
                        let mut state = self.state.lock();
                        state.idle.push_back(IdleEntry { client, metadata });
                        state.total += 1;
                        drop(state);
                        self.available.notify_one();
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to warm up pool connection");
                        return;
                    }
                }
            }
        });
    }

    async fn connect(&self) -> Result<(Client<mssql_client::state::Ready>, ConnectionMetadata), PoolError> {
        let client = Client::connect(self.client_config.clone())
            .await
            .map_err(|e| PoolError::ConnectionCreation(e.to_string()))?;
        let id = self.next_connection_id();
        self.metrics.lock().connections_created += 1;
        tracing::debug!(connection_id = id, "created new pool connection");
        Ok((client, ConnectionMetadata::new(id)))
    }

    /// Run the acquire algorithm described in the pool's module docs. Loops
    /// because a connection pulled from `idle` may fail validation and must
    /// be discarded, at which point another attempt is made.
    async fn acquire(self: &Arc<Self>) -> Result<PooledConnection, PoolError> {
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(PoolError::PoolClosed);
            }

            enum Candidate {
                Idle(IdleEntry),
                /// A `total` slot was reserved under the lock; the caller
                /// must open a fresh connection and either fill it in or
                /// give the slot back.
                Reserved,
                AtCapacity,
            }

            let candidate = {
                let mut state = self.state.lock();
                if let Some(entry) = state.idle.pop_front() {
                    Candidate::Idle(entry)
                } else if state.total < self.pool_config.max_connections {
                    state.total += 1;
                    Candidate::Reserved
                } else {
                    Candidate::AtCapacity
                }
            };

            match candidate {
                Candidate::Idle(mut entry) => {
                    if entry
                        .metadata
                        .is_idle_expired(self.pool_config.health_check_interval)
                        && !self.validate(&mut entry.client).await
                    {
                        // Validation failed; the connection is discarded and
                        // does not count toward `total` any longer.
                        let mut state = self.state.lock();
                        state.total -= 1;
                        drop(state);
                        self.metrics.lock().connections_closed += 1;
                        self.available.notify_one();
                        continue;
                    }
                    entry.metadata.mark_checkout();
                    self.state.lock().active += 1;
                    return Ok(PooledConnection {
                        client: Some(entry.client),
                        metadata: entry.metadata,
                        pool: Arc::clone(self),
                    });
                }
                Candidate::Reserved => match self.connect().await {
                    Ok((client, mut metadata)) => {
                        metadata.mark_checkout();
                        self.state.lock().active += 1;
                        return Ok(PooledConnection {
                            client: Some(client),
                            metadata,
                            pool: Arc::clone(self),
                        });
                    }
                    Err(e) => {
                        // Give the reserved slot back; this connect attempt
                        // failed but another caller may still succeed.
                        self.state.lock().total -= 1;
                        self.available.notify_one();
                        return Err(e);
                    }
                },
                Candidate::AtCapacity => {
                    self.available.notified().await;
                }
            }
        }
    }

    /// Lightweight liveness check for a connection that has sat idle past
    /// `health_check_interval`. Runs `health_check_query` and reports success.
    async fn validate(&self, client: &mut Client<mssql_client::state::Ready>) -> bool {
        self.metrics.lock().health_checks_performed += 1;
        match client.simple_query(&self.pool_config.health_check_query).await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(error = %e, "pool connection failed health check");
                self.metrics.lock().health_checks_failed += 1;
                false
            }
        }
    }

    /// Release a checked-out connection back to the pool, or drop it if the
    /// pool has been closed or the connection has exceeded `max_lifetime`.
    ///
    /// When `sp_reset_connection` is enabled, the reset runs on a spawned
    /// task (it requires a round-trip and `Drop` cannot be async); the
    /// connection only rejoins `idle` once the reset succeeds, matching the
    /// pool's `test_on_checkin` option.
    fn release(self: &Arc<Self>, client: Client<mssql_client::state::Ready>, mut metadata: ConnectionMetadata) {
        let mut state = self.state.lock();
        state.active -= 1;

        if self.closed.load(Ordering::Acquire) || metadata.is_expired(self.pool_config.max_lifetime) {
            state.total -= 1;
            drop(state);
            self.metrics.lock().connections_closed += 1;
            self.available.notify_one();
            tokio::spawn(async move {
                let _ = client.close().await;
            });
            return;
        }
        drop(state);

        metadata.mark_checkin();

        if self.pool_config.sp_reset_connection {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.reset_and_reidle(client, metadata).await });
        } else {
            self.state.lock().idle.push_back(IdleEntry { client, metadata });
            self.available.notify_one();
        }
    }

    /// Run `sp_reset_connection` on a connection being returned, then either
    /// re-idle it (success) or discard it (failure), decrementing `total`
    /// accordingly in the discard case.
    async fn reset_and_reidle(&self, mut client: Client<mssql_client::state::Ready>, metadata: ConnectionMetadata) {
        self.metrics.lock().resets_performed += 1;
        match client.simple_query("EXEC sp_reset_connection").await {
            Ok(()) => {
                self.state.lock().idle.push_back(IdleEntry { client, metadata });
            }
            Err(e) => {
                tracing::warn!(error = %e, "sp_reset_connection failed, discarding pooled connection");
                self.metrics.lock().resets_failed += 1;
                self.state.lock().total -= 1;
                self.metrics.lock().connections_closed += 1;
                tokio::spawn(async move {
                    let _ = client.close().await;
                });
            }
        }
        self.available.notify_one();
    }

    /// A checked-out connection is being dropped without a live client
    /// (detached, or the client itself errored out of existence). Only the
    /// slot accounting needs to be undone.
    fn release_empty(&self) {
        let mut state = self.state.lock();
        state.active -= 1;
        state.total -= 1;
        drop(state);
        self.available.notify_one();
    }
}

/// Builder for creating a connection pool.
pub struct PoolBuilder {
    pool_config: PoolConfig,
    client_config: Option<Config>,
}

impl PoolBuilder {
    /// Create a new pool builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pool_config: PoolConfig::default(),
            client_config: None,
        }
    }

    /// Set the connection descriptor (host, credentials, database, TLS
    /// policy) used to open every connection in the pool.
    #[must_use]
    pub fn client_config(mut self, config: Config) -> Self {
        self.client_config = Some(config);
        self
    }

    /// Set the full pool configuration at once.
    #[must_use]
    pub fn pool_config(mut self, config: PoolConfig) -> Self {
        self.pool_config = config;
        self
    }

    /// Set the minimum number of connections.
    #[must_use]
    pub fn min_connections(mut self, count: u32) -> Self {
        self.pool_config.min_connections = count;
        self
    }

    /// Set the maximum number of connections.
    #[must_use]
    pub fn max_connections(mut self, count: u32) -> Self {
        self.pool_config.max_connections = count;
        self
    }

    /// Set the connection acquisition timeout.
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.pool_config.connection_timeout = timeout;
        self
    }

    /// Set the idle connection timeout.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_config.idle_timeout = timeout;
        self
    }

    /// Enable or disable `sp_reset_connection` on return.
    #[must_use]
    pub fn sp_reset_connection(mut self, enabled: bool) -> Self {
        self.pool_config.sp_reset_connection = enabled;
        self
    }

    /// Build the pool.
    pub async fn build(self) -> Result<Pool, PoolError> {
        let client_config = self.client_config.ok_or_else(|| {
            PoolError::Configuration("client_config is required to build a pool".into())
        })?;
        Pool::new(self.pool_config, client_config).await
    }
}

impl Default for PoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Status information about the pool.
#[derive(Debug, Clone, Copy)]
pub struct PoolStatus {
    /// Number of idle connections available.
    pub available: u32,
    /// Number of connections currently in use.
    pub in_use: u32,
    /// Total number of connections.
    pub total: u32,
    /// Maximum allowed connections.
    pub max: u32,
}

impl PoolStatus {
    /// Calculate the utilization percentage.
    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.max == 0 {
            return 0.0;
        }
        (self.in_use as f64 / self.max as f64) * 100.0
    }

    /// Check if the pool is at capacity.
    #[must_use]
    pub fn is_at_capacity(&self) -> bool {
        self.total >= self.max
    }
}

/// Metrics collected from the pool.
#[derive(Debug, Clone)]
pub struct PoolMetrics {
    /// Total connections created since pool start.
    pub connections_created: u64,
    /// Total connections closed since pool start.
    pub connections_closed: u64,
    /// Successful connection checkouts.
    pub checkouts_successful: u64,
    /// Failed connection checkouts (timeouts, pool closed, etc.).
    pub checkouts_failed: u64,
    /// Health checks performed.
    pub health_checks_performed: u64,
    /// Health checks that failed.
    pub health_checks_failed: u64,
    /// Connection resets performed.
    pub resets_performed: u64,
    /// Connection resets that failed.
    pub resets_failed: u64,
    /// Time since pool creation.
    pub uptime: Duration,
}

impl PoolMetrics {
    /// Calculate checkout success rate (0.0 to 1.0).
    #[must_use]
    pub fn checkout_success_rate(&self) -> f64 {
        let total = self.checkouts_successful + self.checkouts_failed;
        if total == 0 {
            return 1.0;
        }
        self.checkouts_successful as f64 / total as f64
    }

    /// Calculate health check success rate (0.0 to 1.0).
    #[must_use]
    pub fn health_check_success_rate(&self) -> f64 {
        if self.health_checks_performed == 0 {
            return 1.0;
        }
        let successful = self.health_checks_performed - self.health_checks_failed;
        successful as f64 / self.health_checks_performed as f64
    }
}

/// A connection retrieved from the pool.
///
/// When dropped, the connection is automatically returned to the pool.
/// Use [`detach()`](PooledConnection::detach) to take ownership of the
/// underlying client and remove it from the pool's accounting entirely.
pub struct PooledConnection {
    client: Option<Client<mssql_client::state::Ready>>,
    metadata: ConnectionMetadata,
    pool: Arc<PoolInner>,
}

impl PooledConnection {
    /// Get the connection metadata.
    #[must_use]
    pub fn metadata(&self) -> &ConnectionMetadata {
        &self.metadata
    }

    /// Detach the connection from the pool.
    ///
    /// Returns the underlying [`Client<Ready>`], which the caller now owns
    /// outright. The pool's `total`/`active` counters are decremented as if
    /// the connection had been closed; the caller is responsible for closing
    /// it when done.
    #[must_use]
    pub fn detach(mut self) -> Option<Client<mssql_client::state::Ready>> {
        let client = self.client.take();
        self.pool.release_empty();
        // Prevent `Drop` from also running `release_empty`.
        std::mem::forget(self);
        client
    }
}

impl std::ops::Deref for PooledConnection {
    type Target = Client<mssql_client::state::Ready>;

    fn deref(&self) -> &Self::Target {
        self.client
            .as_ref()
            .expect("pooled connection client is only absent after detach, which consumes self")
    }
}

impl std::ops::DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.client
            .as_mut()
            .expect("pooled connection client is only absent after detach, which consumes self")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        tracing::trace!(connection_id = self.metadata.id, "returning connection to pool");
        match self.client.take() {
            Some(client) => self.pool.release(client, self.metadata.clone()),
            None => self.pool.release_empty(),
        }
    }
}
