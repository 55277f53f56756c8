//! Role and shard routing types

use std::fmt;
use std::str::FromStr;

use crate::errors::PoolError;

/// Whether a connection is drawn from the write (primary) or read (replica)
/// capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Role {
    Read,
    Write,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Read => f.write_str("read"),
            Role::Write => f.write_str("write"),
        }
    }
}

impl FromStr for Role {
    type Err = PoolError<std::convert::Infallible>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Role::Read),
            "write" => Ok(Role::Write),
            other => Err(PoolError::InvalidRole(other.to_string())),
        }
    }
}

/// Selects which sub-pool serves a request: one role within one shard.
///
/// The unsharded pool uses `shard: None`; the sharded pool keys every entry
/// by its shard id. Both public surfaces share the same keyed map internally.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoutingKey {
    pub shard: Option<String>,
    pub role: Role,
}

impl RoutingKey {
    pub fn new(shard: Option<String>, role: Role) -> Self {
        Self { shard, role }
    }

    pub(crate) fn sibling(&self, role: Role) -> Self {
        Self {
            shard: self.shard.clone(),
            role,
        }
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.shard {
            Some(shard) => write!(f, "{}/{}", shard, self.role),
            None => write!(f, "{}", self.role),
        }
    }
}

/// Options for one acquisition.
///
/// # Examples
///
/// ```
/// use shardpool::{AcquireRequest, Role};
///
/// let req = AcquireRequest::read().on_shard("eu-1").use_master();
/// assert_eq!(req.role, Role::Read);
/// assert!(req.use_master);
/// ```
#[derive(Debug, Clone)]
pub struct AcquireRequest {
    /// Which capacity to draw from.
    pub role: Role,

    /// Target shard; required by the sharded pool, ignored by the
    /// unsharded one.
    pub shard: Option<String>,

    /// Force the write primary even when a read sub-pool exists, for
    /// read-after-write consistency.
    pub use_master: bool,
}

impl AcquireRequest {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            shard: None,
            use_master: false,
        }
    }

    pub fn read() -> Self {
        Self::new(Role::Read)
    }

    pub fn write() -> Self {
        Self::new(Role::Write)
    }

    pub fn on_shard(mut self, shard: impl Into<String>) -> Self {
        self.shard = Some(shard.into());
        self
    }

    pub fn use_master(mut self) -> Self {
        self.use_master = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PoolError;

    #[test]
    fn role_round_trips_through_str() {
        assert_eq!("read".parse::<Role>().unwrap(), Role::Read);
        assert_eq!("write".parse::<Role>().unwrap(), Role::Write);
    }

    #[test]
    fn unknown_role_is_rejected() {
        let err = "replica".parse::<Role>().unwrap_err();
        assert!(matches!(err, PoolError::InvalidRole(ref s) if s == "replica"));
    }

    #[test]
    fn routing_key_collapses_for_unsharded_pools() {
        let read = RoutingKey::new(None, Role::Read);
        let write = read.sibling(Role::Write);
        assert_eq!(write, RoutingKey::new(None, Role::Write));
        assert_ne!(read, write);
    }
}
