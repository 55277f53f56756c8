//! Connection ownership tracking

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::connection::ConnId;
use crate::routing::{Role, RoutingKey};

/// Where a connection came from, recorded at creation and read back at
/// release/destroy time. Never mutated.
#[derive(Debug, Clone)]
pub(crate) struct OwnershipRecord {
    pub role: Role,
    pub shard: Option<String>,
}

impl OwnershipRecord {
    pub(crate) fn routing_key(&self) -> RoutingKey {
        RoutingKey::new(self.shard.clone(), self.role)
    }
}

/// Explicit side table mapping connection ids to the routing key that
/// produced them.
///
/// Entries are inserted exactly once when a connection is created and removed
/// when it is destroyed, so the table never pins a connection alive and never
/// grows past the set of live connections.
pub(crate) struct OwnershipRegistry {
    records: DashMap<u64, OwnershipRecord>,
    next_id: AtomicU64,
}

impl OwnershipRegistry {
    pub(crate) fn new() -> Self {
        Self {
            records: DashMap::new(),
            next_id: AtomicU64::new(0),
        }
    }

    /// Allocate an id and record ownership for a freshly created connection.
    pub(crate) fn register(&self, role: Role, shard: Option<String>) -> ConnId {
        let id = ConnId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.records.insert(id.0, OwnershipRecord { role, shard });
        id
    }

    /// Look up which sub-pool owns a connection. `None` means the handle was
    /// never issued by this manager or has already been destroyed - always a
    /// caller defect.
    pub(crate) fn lookup(&self, id: ConnId) -> Option<OwnershipRecord> {
        self.records.get(&id.0).map(|r| r.clone())
    }

    pub(crate) fn forget(&self, id: ConnId) {
        self.records.remove(&id.0);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_lookup_forget_round_trip() {
        let registry = OwnershipRegistry::new();
        let id = registry.register(Role::Read, Some("s1".to_string()));

        let record = registry.lookup(id).unwrap();
        assert_eq!(record.role, Role::Read);
        assert_eq!(record.shard.as_deref(), Some("s1"));

        registry.forget(id);
        assert!(registry.lookup(id).is_none());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn ids_are_unique() {
        let registry = OwnershipRegistry::new();
        let a = registry.register(Role::Write, None);
        let b = registry.register(Role::Write, None);
        assert_ne!(a, b);
    }
}
