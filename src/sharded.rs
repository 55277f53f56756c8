//! Sharded pool manager: one replication pair per shard

use std::sync::Arc;

use crate::adapter::{AcquireHooks, ConnectionAdapter};
use crate::config::{PoolConfig, ShardTopology};
use crate::connection::PooledConnection;
use crate::core::{CoreShard, PoolCore};
use crate::errors::{PoolError, PoolResult};
use crate::health::HealthStatus;
use crate::metrics::{PoolStats, StatsExporter};
use crate::routing::{AcquireRequest, Role};

/// Pool manager for a horizontally sharded deployment.
///
/// Every operation routes by shard id on top of the role routing of
/// [`ReplicationPool`](crate::ReplicationPool): each shard gets its own
/// write sub-pool and, when it has read backends, its own read sub-pool —
/// independently per shard, so one shard may have replication while another
/// does not.
///
/// Connections acquired here are annotated with their shard id
/// ([`PooledConnection::shard_id`]) so callers holding only the handle can
/// recover the routing; `release`/`destroy` never need it resupplied.
pub struct ShardedReplicationPool<A: ConnectionAdapter> {
    core: PoolCore<A>,
    shard_ids: Vec<String>,
}

impl<A: ConnectionAdapter> ShardedReplicationPool<A> {
    pub fn new(
        adapter: Arc<A>,
        shards: Vec<ShardTopology>,
        config: PoolConfig,
    ) -> PoolResult<Self, A::Error> {
        Self::build(adapter, shards, config, None)
    }

    /// Same as [`ShardedReplicationPool::new`] with acquire hooks installed.
    pub fn with_hooks(
        adapter: Arc<A>,
        shards: Vec<ShardTopology>,
        config: PoolConfig,
        hooks: Arc<dyn AcquireHooks<A::Conn, A::Error>>,
    ) -> PoolResult<Self, A::Error> {
        Self::build(adapter, shards, config, Some(hooks))
    }

    fn build(
        adapter: Arc<A>,
        shards: Vec<ShardTopology>,
        config: PoolConfig,
        hooks: Option<Arc<dyn AcquireHooks<A::Conn, A::Error>>>,
    ) -> PoolResult<Self, A::Error> {
        let shard_ids: Vec<String> = shards.iter().map(|s| s.shard_id.clone()).collect();
        let entries = shards
            .into_iter()
            .map(|s| CoreShard {
                shard: Some(s.shard_id),
                write: s.write,
                reads: s.reads,
            })
            .collect();
        let core = PoolCore::new(adapter, entries, config, hooks)?;
        Ok(Self { core, shard_ids })
    }

    /// Acquire a connection for `(shard, role)`. The request must carry a
    /// shard id; `use_master` forces the shard's write sub-pool even when a
    /// read sub-pool exists.
    pub async fn acquire(
        &self,
        request: AcquireRequest,
    ) -> PoolResult<PooledConnection<A::Conn>, A::Error> {
        if request.shard.is_none() {
            return Err(PoolError::MissingShard);
        }
        self.core.acquire(request).await
    }

    /// Acquire from a shard's read capacity.
    pub async fn acquire_read(
        &self,
        shard: impl Into<String>,
    ) -> PoolResult<PooledConnection<A::Conn>, A::Error> {
        self.acquire(AcquireRequest::read().on_shard(shard)).await
    }

    /// Acquire from a shard's write primary.
    pub async fn acquire_write(
        &self,
        shard: impl Into<String>,
    ) -> PoolResult<PooledConnection<A::Conn>, A::Error> {
        self.acquire(AcquireRequest::write().on_shard(shard)).await
    }

    /// Return a connection to the exact `(role, shard)` sub-pool that issued
    /// it, resolved through the ownership registry.
    pub async fn release(&self, conn: PooledConnection<A::Conn>) -> PoolResult<(), A::Error> {
        self.core.release(conn).await
    }

    /// Forcibly close a connection, removing it from its sub-pool.
    pub async fn destroy(&self, conn: PooledConnection<A::Conn>) -> PoolResult<(), A::Error> {
        self.core.destroy(conn).await
    }

    /// Graceful shutdown fanned out across every shard and role
    /// concurrently; all are attempted even if some fail.
    pub async fn drain(&self) -> PoolResult<(), A::Error> {
        self.core.drain().await
    }

    /// Forced shutdown across every shard and role.
    pub async fn destroy_all_now(&self) -> PoolResult<(), A::Error> {
        self.core.destroy_all_now().await
    }

    /// Configured shard ids, in construction order.
    pub fn shard_ids(&self) -> &[String] {
        &self.shard_ids
    }

    /// Whether a shard has a dedicated read sub-pool.
    pub fn has_read_pool(&self, shard: &str) -> bool {
        self.core.has_read_pool(Some(shard))
    }

    /// Total tracked connections across every shard and role.
    pub fn size(&self) -> usize {
        self.core.stats().size
    }

    /// Idle connections across every shard and role.
    pub fn available(&self) -> usize {
        self.core.stats().available
    }

    /// Checked-out connections across every shard and role.
    pub fn using(&self) -> usize {
        self.core.stats().using
    }

    /// Queued acquire calls across every shard and role.
    pub fn waiting(&self) -> usize {
        self.core.stats().waiting
    }

    /// Total tracked connections for one shard (both roles).
    pub fn shard_size(&self, shard: &str) -> usize {
        self.core.shard_stats(shard).size
    }

    /// Idle connections for one shard.
    pub fn shard_available(&self, shard: &str) -> usize {
        self.core.shard_stats(shard).available
    }

    /// Checked-out connections for one shard.
    pub fn shard_using(&self, shard: &str) -> usize {
        self.core.shard_stats(shard).using
    }

    /// Queued acquire calls for one shard.
    pub fn shard_waiting(&self, shard: &str) -> usize {
        self.core.shard_stats(shard).waiting
    }

    /// Counters for one `(shard, role)` sub-pool; a missing sub-pool
    /// contributes exactly zero.
    pub fn role_stats(&self, shard: &str, role: Role) -> PoolStats {
        self.core.stats_for(Some(shard), role)
    }

    /// Aggregate counter snapshot.
    pub fn stats(&self) -> PoolStats {
        self.core.stats()
    }

    /// Health snapshot derived from the aggregate counters.
    pub fn health_status(&self) -> HealthStatus {
        HealthStatus::new(self.core.stats(), self.core.capacity())
    }

    /// Per-sub-pool counters in text exposition format, labeled
    /// `shard/role`.
    pub fn export_stats(&self, pool_name: &str) -> String {
        StatsExporter::export_text(pool_name, &self.core.stats_by_key())
    }
}
