//! Shared routing core behind both public pool surfaces
//!
//! The unsharded pool is the sharded pool with one implicit shard: both
//! surfaces delegate to a single `RoutingKey -> SubPool` map so the role
//! resolution, ownership routing, and shutdown fan-out logic exists once.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::warn;

use crate::adapter::{AcquireHooks, ConnectionAdapter};
use crate::config::{BackendConfig, PoolConfig};
use crate::connection::{ConnId, PooledConnection};
use crate::errors::{PoolError, PoolResult};
use crate::metrics::PoolStats;
use crate::registry::OwnershipRegistry;
use crate::routing::{AcquireRequest, Role, RoutingKey};
use crate::subpool::SubPool;

/// One shard's worth of backends, already normalized: the write primary plus
/// the (possibly empty) ordered read replica list.
pub(crate) struct CoreShard {
    pub shard: Option<String>,
    pub write: BackendConfig,
    pub reads: Vec<BackendConfig>,
}

enum ShutdownMode {
    Graceful,
    Forced,
}

pub(crate) struct PoolCore<A: ConnectionAdapter> {
    pools: HashMap<RoutingKey, Arc<SubPool<A>>>,
    registry: Arc<OwnershipRegistry>,
    hooks: Option<Arc<dyn AcquireHooks<A::Conn, A::Error>>>,
    config: PoolConfig,
}

impl<A: ConnectionAdapter> PoolCore<A> {
    /// Build the sub-pool map. A write sub-pool is always created per shard;
    /// a read sub-pool only when that shard has read backends, so shards
    /// without replication fall back to their write sub-pool for reads.
    pub(crate) fn new(
        adapter: Arc<A>,
        shards: Vec<CoreShard>,
        config: PoolConfig,
        hooks: Option<Arc<dyn AcquireHooks<A::Conn, A::Error>>>,
    ) -> PoolResult<Self, A::Error> {
        config.validate()?;
        let registry = Arc::new(OwnershipRegistry::new());
        let mut pools = HashMap::new();

        for entry in shards {
            let write_key = RoutingKey::new(entry.shard.clone(), Role::Write);
            pools.insert(
                write_key.clone(),
                SubPool::new(
                    Arc::clone(&adapter),
                    write_key.clone(),
                    vec![entry.write],
                    config.clone(),
                    Arc::clone(&registry),
                ),
            );
            if !entry.reads.is_empty() {
                let read_key = write_key.sibling(Role::Read);
                pools.insert(
                    read_key.clone(),
                    SubPool::new(
                        Arc::clone(&adapter),
                        read_key,
                        entry.reads,
                        config.clone(),
                        Arc::clone(&registry),
                    ),
                );
            }
        }

        Ok(Self {
            pools,
            registry,
            hooks,
            config,
        })
    }

    /// Selection rule: the read sub-pool serves the request iff the role is
    /// read, a read sub-pool exists for the shard, and the caller did not
    /// force the primary. Everything else goes to the write sub-pool.
    fn resolve(&self, request: &AcquireRequest) -> PoolResult<&Arc<SubPool<A>>, A::Error> {
        if request.role == Role::Read && !request.use_master {
            let read_key = RoutingKey::new(request.shard.clone(), Role::Read);
            if let Some(pool) = self.pools.get(&read_key) {
                return Ok(pool);
            }
        }
        let write_key = RoutingKey::new(request.shard.clone(), Role::Write);
        self.pools
            .get(&write_key)
            .ok_or_else(|| PoolError::UnknownShard(request.shard.clone().unwrap_or_default()))
    }

    pub(crate) async fn acquire(
        &self,
        request: AcquireRequest,
    ) -> PoolResult<PooledConnection<A::Conn>, A::Error> {
        if let Some(hooks) = &self.hooks {
            hooks
                .before_acquire(&request)
                .await
                .map_err(PoolError::Hook)?;
        }

        let pool = self.resolve(&request)?;
        let mut conn = pool.acquire().await?;

        if let Some(hooks) = &self.hooks {
            if let Err(err) = hooks.after_acquire(&mut conn, &request).await {
                // A failing hook aborts the acquisition but must not leak
                // the connection.
                if let Err(release_err) = pool.release(conn).await {
                    warn!(error = %release_err, "release after failed after_acquire hook also failed");
                }
                return Err(PoolError::Hook(err));
            }
        }
        Ok(conn)
    }

    /// Find the sub-pool that issued a connection via the ownership
    /// registry. Unknown handles are a caller defect and fail loudly.
    fn owner_of(&self, id: ConnId) -> PoolResult<&Arc<SubPool<A>>, A::Error> {
        let record = self
            .registry
            .lookup(id)
            .ok_or(PoolError::UnrecognizedConnection(id))?;
        self.pools
            .get(&record.routing_key())
            .ok_or_else(|| PoolError::UnknownShard(record.shard.unwrap_or_default()))
    }

    pub(crate) async fn release(
        &self,
        conn: PooledConnection<A::Conn>,
    ) -> PoolResult<(), A::Error> {
        let pool = self.owner_of(conn.id())?;
        pool.release(conn).await
    }

    pub(crate) async fn destroy(
        &self,
        conn: PooledConnection<A::Conn>,
    ) -> PoolResult<(), A::Error> {
        let pool = self.owner_of(conn.id())?;
        pool.destroy(conn).await
    }

    pub(crate) async fn drain(&self) -> PoolResult<(), A::Error> {
        self.shutdown(ShutdownMode::Graceful).await
    }

    pub(crate) async fn destroy_all_now(&self) -> PoolResult<(), A::Error> {
        self.shutdown(ShutdownMode::Forced).await
    }

    /// Fan shutdown out across every sub-pool concurrently. Every sub-pool
    /// is attempted even when some fail; the first failure surfaces once all
    /// have settled.
    async fn shutdown(&self, mode: ShutdownMode) -> PoolResult<(), A::Error> {
        let mut tasks = JoinSet::new();
        for pool in self.pools.values() {
            let pool = Arc::clone(pool);
            match mode {
                ShutdownMode::Graceful => tasks.spawn(async move { pool.drain().await }),
                ShutdownMode::Forced => tasks.spawn(async move { pool.destroy_all_now().await }),
            };
        }

        let mut first_err = None;
        while let Some(settled) = tasks.join_next().await {
            match settled {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    first_err.get_or_insert(err);
                }
                Err(join_err) if join_err.is_panic() => {
                    std::panic::resume_unwind(join_err.into_panic())
                }
                Err(_cancelled) => {}
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Aggregate counters. Each sub-pool's contribution is computed
    /// independently and summed; a missing sub-pool contributes exactly
    /// zero by never appearing in the map.
    pub(crate) fn stats(&self) -> PoolStats {
        self.pools
            .values()
            .map(|pool| pool.stats())
            .fold(PoolStats::default(), PoolStats::merge)
    }

    pub(crate) fn stats_for(&self, shard: Option<&str>, role: Role) -> PoolStats {
        self.pools
            .get(&RoutingKey::new(shard.map(String::from), role))
            .map(|pool| pool.stats())
            .unwrap_or_default()
    }

    pub(crate) fn shard_stats(&self, shard: &str) -> PoolStats {
        self.pools
            .iter()
            .filter(|(key, _)| key.shard.as_deref() == Some(shard))
            .map(|(_, pool)| pool.stats())
            .fold(PoolStats::default(), PoolStats::merge)
    }

    /// Per-routing-key snapshots for metrics export, keyed by the routing
    /// key's display form.
    pub(crate) fn stats_by_key(&self) -> Vec<(String, PoolStats)> {
        let mut entries: Vec<_> = self
            .pools
            .iter()
            .map(|(key, pool)| (key.to_string(), pool.stats()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Maximum connections this manager may hold across all sub-pools.
    pub(crate) fn capacity(&self) -> usize {
        self.pools.len() * self.config.max
    }

    pub(crate) fn has_read_pool(&self, shard: Option<&str>) -> bool {
        self.pools
            .contains_key(&RoutingKey::new(shard.map(String::from), Role::Read))
    }
}
