//! Round-robin backend selection

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::BackendConfig;

/// Distributes new-connection creation across an ordered backend list.
///
/// The counter is owned by one sub-pool instance and is never reset, so the
/// Nth connection that sub-pool ever creates uses `backends[N % len]`
/// regardless of destroy/recreate churn in between.
pub(crate) struct ReplicaSelector {
    backends: Vec<BackendConfig>,
    counter: AtomicUsize,
}

impl ReplicaSelector {
    /// `backends` must be non-empty; sub-pools without read backends are
    /// never constructed.
    pub(crate) fn new(backends: Vec<BackendConfig>) -> Self {
        debug_assert!(!backends.is_empty());
        Self {
            backends,
            counter: AtomicUsize::new(0),
        }
    }

    pub(crate) fn next(&self) -> &BackendConfig {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        &self.backends[n % self.backends.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(host: &str) -> BackendConfig {
        BackendConfig::new(host, 5432, "app")
    }

    #[test]
    fn cycles_backends_in_order() {
        let selector = ReplicaSelector::new(vec![backend("r0"), backend("r1"), backend("r2")]);

        let hosts: Vec<_> = (0..7).map(|_| selector.next().host.clone()).collect();
        assert_eq!(hosts, ["r0", "r1", "r2", "r0", "r1", "r2", "r0"]);
    }

    #[test]
    fn single_backend_is_always_chosen() {
        let selector = ReplicaSelector::new(vec![backend("primary")]);
        for _ in 0..3 {
            assert_eq!(selector.next().host, "primary");
        }
    }
}
