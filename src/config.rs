//! Pool and backend configuration

use std::time::Duration;

use crate::errors::PoolError;

/// Sizing and lifecycle configuration for one sub-pool.
///
/// Every sub-pool created by a manager shares the same `PoolConfig`; it is
/// immutable once the manager is constructed.
///
/// # Examples
///
/// ```
/// use shardpool::PoolConfig;
/// use std::time::Duration;
///
/// let config = PoolConfig::new()
///     .with_max(20)
///     .with_min(5)
///     .with_acquire_timeout(Duration::from_secs(10))
///     .with_max_uses(1000);
///
/// assert_eq!(config.max, 20);
/// assert_eq!(config.max_uses, Some(1000));
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolConfig {
    /// Maximum simultaneously-live connections per sub-pool.
    pub max: usize,

    /// Floor the idle reaper never drops below.
    pub min: usize,

    /// How long an `acquire` call may wait for a free slot.
    pub acquire_timeout: Duration,

    /// Idle connections older than this are eligible for reaping.
    pub idle_timeout: Duration,

    /// Interval between idle-reaper sweeps.
    pub reap_interval: Duration,

    /// Retire a connection after this many checkouts instead of recycling it.
    pub max_uses: Option<u64>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max: 5,
            min: 0,
            acquire_timeout: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(10),
            reap_interval: Duration::from_secs(1),
            max_uses: None,
        }
    }
}

impl PoolConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of live connections
    pub fn with_max(mut self, max: usize) -> Self {
        self.max = max;
        self
    }

    /// Set the minimum number of connections kept by the reaper
    pub fn with_min(mut self, min: usize) -> Self {
        self.min = min;
        self
    }

    /// Set the acquisition timeout
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set the idle timeout used by the reaper
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the reaper sweep interval
    pub fn with_reap_interval(mut self, interval: Duration) -> Self {
        self.reap_interval = interval;
        self
    }

    /// Retire connections after a number of uses
    pub fn with_max_uses(mut self, uses: u64) -> Self {
        self.max_uses = Some(uses);
        self
    }

    /// Validate invariants: `0 <= min <= max`, positive acquire timeout.
    pub fn validate<E>(&self) -> Result<(), PoolError<E>> {
        if self.max == 0 {
            return Err(PoolError::InvalidConfig("max must be positive"));
        }
        if self.min > self.max {
            return Err(PoolError::InvalidConfig("min cannot exceed max"));
        }
        if self.acquire_timeout.is_zero() {
            return Err(PoolError::InvalidConfig("acquire timeout must be positive"));
        }
        Ok(())
    }
}

/// Connection parameters for one physical backend.
///
/// The pool never interprets these beyond handing them to the adapter's
/// `connect`; read backends for a role form an ordered sequence consumed
/// round-robin.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BackendConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl BackendConfig {
    pub fn new(host: impl Into<String>, port: u16, database: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            database: database.into(),
            username: None,
            password: None,
        }
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }
}

/// One shard's backends: a write primary plus zero or more read replicas.
///
/// A read sub-pool is created only when `reads` is non-empty; otherwise read
/// requests for this shard fall back to its write sub-pool.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ShardTopology {
    pub shard_id: String,
    pub write: BackendConfig,
    pub reads: Vec<BackendConfig>,
}

impl ShardTopology {
    pub fn new(shard_id: impl Into<String>, write: BackendConfig) -> Self {
        Self {
            shard_id: shard_id.into(),
            write,
            reads: Vec::new(),
        }
    }

    pub fn with_reads(mut self, reads: Vec<BackendConfig>) -> Self {
        self.reads = reads;
        self
    }
}
