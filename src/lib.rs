//! # shardpool
//!
//! Replication- and shard-aware connection pool manager: hands out, tracks,
//! and reclaims database connections across a write primary, read replicas,
//! and horizontal shards.
//!
//! ## Features
//!
//! - Per-role, per-shard sub-pools with exact `max` enforcement and FIFO
//!   waiting with acquisition timeouts
//! - Round-robin replica selection for new connections
//! - Idle reaping with a `min` floor, and max-uses connection retirement
//! - Ownership tracking so `release`/`destroy` need only the handle
//! - `use_master` override for read-after-write consistency
//! - `before_acquire`/`after_acquire` lifecycle hooks
//! - Graceful (`drain`) and forced (`destroy_all_now`) shutdown
//! - Counter snapshots, health reporting, and text-exposition export
//!
//! The pool treats opening and closing connections as opaque async
//! operations behind a caller-supplied [`ConnectionAdapter`]; what a
//! connection is used for once acquired is out of scope.
//!
//! ## Quick Start
//!
//! ```no_run
//! # use shardpool::*;
//! # use std::sync::Arc;
//! # async fn demo<A: ConnectionAdapter>(adapter: Arc<A>) -> PoolResult<(), A::Error> {
//! let pool = ShardedReplicationPool::new(
//!     adapter,
//!     vec![
//!         ShardTopology::new("eu-1", BackendConfig::new("eu-1-primary", 5432, "app"))
//!             .with_reads(vec![BackendConfig::new("eu-1-replica", 5432, "app")]),
//!         ShardTopology::new("us-1", BackendConfig::new("us-1-primary", 5432, "app")),
//!     ],
//!     PoolConfig::default().with_max(10),
//! )?;
//!
//! let conn = pool.acquire_read("eu-1").await?;
//! assert_eq!(conn.shard_id(), Some("eu-1"));
//! pool.release(conn).await?;
//! # Ok(())
//! # }
//! ```

mod adapter;
mod config;
mod connection;
mod core;
mod errors;
mod health;
mod metrics;
mod registry;
mod replication;
mod routing;
mod selector;
mod sharded;
mod subpool;

pub use adapter::{AcquireHooks, ConnectionAdapter, NoopHooks};
pub use config::{BackendConfig, PoolConfig, ShardTopology};
pub use connection::{ConnId, PooledConnection};
pub use errors::{AcquireTimeout, PoolError, PoolResult};
pub use health::HealthStatus;
pub use metrics::{PoolStats, StatsExporter};
pub use replication::ReplicationPool;
pub use routing::{AcquireRequest, Role, RoutingKey};
pub use sharded::ShardedReplicationPool;
