//! Unsharded pool manager: one write primary, optional read replicas

use std::sync::Arc;

use crate::adapter::{AcquireHooks, ConnectionAdapter};
use crate::config::{BackendConfig, PoolConfig};
use crate::connection::PooledConnection;
use crate::core::{CoreShard, PoolCore};
use crate::errors::PoolResult;
use crate::health::HealthStatus;
use crate::metrics::{PoolStats, StatsExporter};
use crate::routing::{AcquireRequest, Role};

/// Pool manager for a single, unsharded deployment.
///
/// Composes one write sub-pool and, when read backends are configured, one
/// read sub-pool. Reads are served from the read sub-pool unless the caller
/// forces the primary; with no read backends every request goes to the write
/// sub-pool.
///
/// # Examples
///
/// ```no_run
/// # use shardpool::*;
/// # use std::sync::Arc;
/// # async fn demo<A: ConnectionAdapter>(adapter: Arc<A>) -> PoolResult<(), A::Error> {
/// let pool = ReplicationPool::new(
///     adapter,
///     BackendConfig::new("primary.db", 5432, "app"),
///     vec![
///         BackendConfig::new("replica-1.db", 5432, "app"),
///         BackendConfig::new("replica-2.db", 5432, "app"),
///     ],
///     PoolConfig::default(),
/// )?;
///
/// let conn = pool.acquire_read().await?;
/// // ... run queries ...
/// pool.release(conn).await?;
/// pool.drain().await?;
/// # Ok(())
/// # }
/// ```
pub struct ReplicationPool<A: ConnectionAdapter> {
    core: PoolCore<A>,
}

impl<A: ConnectionAdapter> ReplicationPool<A> {
    pub fn new(
        adapter: Arc<A>,
        write: BackendConfig,
        reads: Vec<BackendConfig>,
        config: PoolConfig,
    ) -> PoolResult<Self, A::Error> {
        let core = PoolCore::new(
            adapter,
            vec![CoreShard {
                shard: None,
                write,
                reads,
            }],
            config,
            None,
        )?;
        Ok(Self { core })
    }

    /// Same as [`ReplicationPool::new`] with acquire hooks installed.
    pub fn with_hooks(
        adapter: Arc<A>,
        write: BackendConfig,
        reads: Vec<BackendConfig>,
        config: PoolConfig,
        hooks: Arc<dyn AcquireHooks<A::Conn, A::Error>>,
    ) -> PoolResult<Self, A::Error> {
        let core = PoolCore::new(
            adapter,
            vec![CoreShard {
                shard: None,
                write,
                reads,
            }],
            config,
            Some(hooks),
        )?;
        Ok(Self { core })
    }

    /// Acquire a connection for the requested role. Any shard id on the
    /// request is ignored; this manager has exactly one implicit shard.
    pub async fn acquire(
        &self,
        mut request: AcquireRequest,
    ) -> PoolResult<PooledConnection<A::Conn>, A::Error> {
        request.shard = None;
        self.core.acquire(request).await
    }

    /// Acquire from the read capacity (falls back to the primary when no
    /// read backends were configured).
    pub async fn acquire_read(&self) -> PoolResult<PooledConnection<A::Conn>, A::Error> {
        self.acquire(AcquireRequest::read()).await
    }

    /// Acquire from the write primary.
    pub async fn acquire_write(&self) -> PoolResult<PooledConnection<A::Conn>, A::Error> {
        self.acquire(AcquireRequest::write()).await
    }

    /// Return a connection to the sub-pool that issued it.
    pub async fn release(&self, conn: PooledConnection<A::Conn>) -> PoolResult<(), A::Error> {
        self.core.release(conn).await
    }

    /// Forcibly close a connection, removing it from its sub-pool.
    pub async fn destroy(&self, conn: PooledConnection<A::Conn>) -> PoolResult<(), A::Error> {
        self.core.destroy(conn).await
    }

    /// Graceful shutdown: both sub-pools drain concurrently.
    pub async fn drain(&self) -> PoolResult<(), A::Error> {
        self.core.drain().await
    }

    /// Forced shutdown without waiting for checked-out connections.
    pub async fn destroy_all_now(&self) -> PoolResult<(), A::Error> {
        self.core.destroy_all_now().await
    }

    /// Whether a dedicated read sub-pool exists.
    pub fn has_read_pool(&self) -> bool {
        self.core.has_read_pool(None)
    }

    /// Total tracked connections across both sub-pools.
    pub fn size(&self) -> usize {
        self.core.stats().size
    }

    /// Idle connections across both sub-pools.
    pub fn available(&self) -> usize {
        self.core.stats().available
    }

    /// Checked-out connections across both sub-pools.
    pub fn using(&self) -> usize {
        self.core.stats().using
    }

    /// Queued acquire calls across both sub-pools.
    pub fn waiting(&self) -> usize {
        self.core.stats().waiting
    }

    /// Counters for one role; a missing read sub-pool contributes zero.
    pub fn role_stats(&self, role: Role) -> PoolStats {
        self.core.stats_for(None, role)
    }

    /// Aggregate counter snapshot.
    pub fn stats(&self) -> PoolStats {
        self.core.stats()
    }

    /// Health snapshot derived from the aggregate counters.
    pub fn health_status(&self) -> HealthStatus {
        HealthStatus::new(self.core.stats(), self.core.capacity())
    }

    /// Per-sub-pool counters in text exposition format.
    pub fn export_stats(&self, pool_name: &str) -> String {
        StatsExporter::export_text(pool_name, &self.core.stats_by_key())
    }
}
