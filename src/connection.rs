//! Checked-out connection handles

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::time::Instant;

/// Stable identity assigned to a connection at creation time.
///
/// The ownership registry is keyed by this id, so release/destroy callers
/// need only the handle, not the routing key that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConnId(pub(crate) u64);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A connection checked out from a pool.
///
/// Dereferences to the adapter's connection type. Hand the handle back via
/// the owning manager's `release` or `destroy`; dropping it without doing so
/// leaks its slot until `destroy_all_now` reclaims the pool.
pub struct PooledConnection<C> {
    pub(crate) conn: C,
    pub(crate) id: ConnId,
    pub(crate) shard: Option<String>,
    pub(crate) uses: u64,
    pub(crate) created_at: Instant,
}

impl<C> PooledConnection<C> {
    pub(crate) fn new(conn: C, id: ConnId, shard: Option<String>, uses: u64) -> Self {
        Self {
            conn,
            id,
            shard,
            uses,
            created_at: Instant::now(),
        }
    }

    /// The pool-assigned identity of this connection.
    pub fn id(&self) -> ConnId {
        self.id
    }

    /// Shard this connection was drawn from, when acquired through the
    /// sharded pool.
    pub fn shard_id(&self) -> Option<&str> {
        self.shard.as_deref()
    }

    /// How many times this connection has been checked out.
    pub fn uses(&self) -> u64 {
        self.uses
    }

    pub(crate) fn into_inner(self) -> C {
        self.conn
    }
}

impl<C> Deref for PooledConnection<C> {
    type Target = C;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl<C> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

impl<C> fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("shard", &self.shard)
            .field("uses", &self.uses)
            .field("age", &self.created_at.elapsed())
            .finish_non_exhaustive()
    }
}
