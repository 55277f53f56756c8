//! Error types for the pool manager

use std::time::Duration;

use thiserror::Error;

use crate::connection::ConnId;

/// The pool's own acquisition-timeout error: no slot became available
/// within the configured acquire timeout.
///
/// Handed to the adapter's
/// [`map_timeout`](crate::ConnectionAdapter::map_timeout) so a re-wrapping
/// adapter can keep it as the `source()` of its own error.
#[derive(Error, Debug, Clone)]
#[error("timed out after {waited:?} waiting for a connection")]
pub struct AcquireTimeout {
    /// How long the caller actually waited.
    pub waited: Duration,
}

/// Errors raised by pool operations.
///
/// `E` is the adapter's own error type: connect/disconnect failures are
/// carried through unmodified in [`PoolError::Adapter`] since only the
/// adapter knows its own error semantics.
#[derive(Error, Debug)]
pub enum PoolError<E> {
    #[error("invalid role {0:?} - expected \"read\" or \"write\"")]
    InvalidRole(String),

    #[error(transparent)]
    Timeout(AcquireTimeout),

    #[error("connection {0} is not tracked by this pool")]
    UnrecognizedConnection(ConnId),

    #[error("unknown shard {0:?}")]
    UnknownShard(String),

    #[error("shard id is required for a sharded pool")]
    MissingShard,

    #[error("pool has been shut down")]
    PoolClosed,

    #[error("invalid pool configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("acquire hook failed")]
    Hook(#[source] E),

    #[error(transparent)]
    Adapter(E),
}

impl<E> PoolError<E> {
    /// Whether this error is the pool's own acquisition-timeout kind. A
    /// timeout the adapter re-wrapped via
    /// [`map_timeout`](crate::ConnectionAdapter::map_timeout) surfaces as
    /// [`PoolError::Adapter`] instead, so callers match on their own type.
    pub fn is_timeout(&self) -> bool {
        matches!(self, PoolError::Timeout(_))
    }
}

pub type PoolResult<T, E> = Result<T, PoolError<E>>;
