//! Bounded connection pool for one role within one shard

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::adapter::ConnectionAdapter;
use crate::config::{BackendConfig, PoolConfig};
use crate::connection::{ConnId, PooledConnection};
use crate::errors::{AcquireTimeout, PoolError, PoolResult};
use crate::metrics::PoolStats;
use crate::registry::OwnershipRegistry;
use crate::routing::RoutingKey;
use crate::selector::ReplicaSelector;

struct IdleConn<C> {
    conn: C,
    id: ConnId,
    uses: u64,
    idle_since: Instant,
}

struct PoolState<C> {
    /// Oldest idle connection at the front.
    idle: VecDeque<IdleConn<C>>,
    /// Ids currently checked out, tracked so a forced shutdown can purge
    /// their ownership records.
    checked_out: HashSet<ConnId>,
    /// Idle + checked out.
    total: usize,
    closed: bool,
    /// Set by `destroy_all_now`: in-flight checkouts must discard their
    /// connection instead of completing.
    forced: bool,
}

/// One bounded pool of homogeneous connections.
///
/// The semaphore enforces the `max` bound exactly and serves waiters FIFO;
/// all accounting lives under a sync mutex that is never held across an
/// await point. A permit is taken per acquisition and returned on release or
/// destroy, so concurrent callers can never overshoot `max` nor be handed
/// the same connection.
pub(crate) struct SubPool<A: ConnectionAdapter> {
    adapter: Arc<A>,
    key: RoutingKey,
    config: PoolConfig,
    selector: ReplicaSelector,
    registry: Arc<OwnershipRegistry>,
    slots: Arc<Semaphore>,
    state: Mutex<PoolState<A::Conn>>,
    waiting: AtomicUsize,
    /// Signalled whenever the checked-out count may have dropped to zero
    /// while the pool is draining.
    drained: Notify,
    /// Self-reference handed to the reaper task so it never keeps the pool
    /// alive.
    weak: Weak<Self>,
    reaper: Mutex<Option<JoinHandle<()>>>,
    reaper_started: AtomicBool,
}

impl<A: ConnectionAdapter> SubPool<A> {
    pub(crate) fn new(
        adapter: Arc<A>,
        key: RoutingKey,
        backends: Vec<BackendConfig>,
        config: PoolConfig,
        registry: Arc<OwnershipRegistry>,
    ) -> Arc<Self> {
        let pool = Arc::new_cyclic(|weak| Self {
            adapter,
            slots: Arc::new(Semaphore::new(config.max)),
            selector: ReplicaSelector::new(backends),
            registry,
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                checked_out: HashSet::new(),
                total: 0,
                closed: false,
                forced: false,
            }),
            waiting: AtomicUsize::new(0),
            drained: Notify::new(),
            weak: Weak::clone(weak),
            reaper: Mutex::new(None),
            reaper_started: AtomicBool::new(false),
            key,
            config,
        });
        // Construction must work outside a runtime (e.g. in `main` before
        // the runtime starts); the reaper then starts on the first acquire.
        if tokio::runtime::Handle::try_current().is_ok() {
            pool.ensure_reaper();
        }
        pool
    }

    /// Check out a connection, reusing a validated idle one or creating a
    /// new one under the `max` bound. Waits FIFO up to the configured
    /// acquisition timeout.
    pub(crate) async fn acquire(&self) -> PoolResult<PooledConnection<A::Conn>, A::Error> {
        if self.state.lock().closed {
            return Err(PoolError::PoolClosed);
        }
        self.ensure_reaper();

        let started = Instant::now();
        self.waiting.fetch_add(1, Ordering::SeqCst);
        let waited = tokio::time::timeout(
            self.config.acquire_timeout,
            Arc::clone(&self.slots).acquire_owned(),
        )
        .await;
        self.waiting.fetch_sub(1, Ordering::SeqCst);

        let permit = match waited {
            Ok(Ok(permit)) => permit,
            Ok(Err(_closed)) => return Err(PoolError::PoolClosed),
            Err(_elapsed) => {
                let timeout = AcquireTimeout {
                    waited: started.elapsed(),
                };
                return Err(match self.adapter.map_timeout(timeout.clone()) {
                    Some(wrapped) => PoolError::Adapter(wrapped),
                    None => PoolError::Timeout(timeout),
                });
            }
        };
        // The slot is now owned by this acquisition; it is handed back
        // explicitly on release/destroy, or below on failure.
        permit.forget();

        match self.checkout().await {
            Ok(handle) => Ok(handle),
            Err(err) => {
                self.slots.add_permits(1);
                Err(err)
            }
        }
    }

    /// Slot already held: hand out an idle connection or create one.
    async fn checkout(&self) -> PoolResult<PooledConnection<A::Conn>, A::Error> {
        loop {
            let reused = {
                let mut state = self.state.lock();
                if state.closed {
                    return Err(PoolError::PoolClosed);
                }
                match state.idle.pop_front() {
                    Some(idle) => Some(idle),
                    None => {
                        // Reserve the creation slot before releasing the lock.
                        state.total += 1;
                        None
                    }
                }
            };

            let Some(idle) = reused else {
                return self.create().await;
            };

            if self.adapter.validate(&idle.conn) {
                {
                    let mut state = self.state.lock();
                    if !state.forced {
                        state.checked_out.insert(idle.id);
                        return Ok(PooledConnection::new(
                            idle.conn,
                            idle.id,
                            self.key.shard.clone(),
                            idle.uses,
                        ));
                    }
                }
                // Forced shutdown raced this checkout; discard instead of
                // handing out a connection the pool no longer tracks.
                self.discard(idle.id, idle.conn).await;
                return Err(PoolError::PoolClosed);
            }

            // Invalid on reuse: destroy silently and try again.
            debug!(conn = %idle.id, key = %self.key, "idle connection failed validation");
            self.unreserve();
            self.discard(idle.id, idle.conn).await;
        }
    }

    async fn create(&self) -> PoolResult<PooledConnection<A::Conn>, A::Error> {
        let backend = self.selector.next();
        match self.adapter.connect(backend).await {
            Ok(conn) => {
                let id = {
                    let mut state = self.state.lock();
                    if state.forced {
                        None
                    } else {
                        let id = self.registry.register(self.key.role, self.key.shard.clone());
                        state.checked_out.insert(id);
                        Some(id)
                    }
                };
                let Some(id) = id else {
                    self.adapter.disconnect(conn).await.ok();
                    return Err(PoolError::PoolClosed);
                };
                debug!(conn = %id, key = %self.key, host = %backend.host, "opened connection");
                Ok(PooledConnection::new(conn, id, self.key.shard.clone(), 0))
            }
            Err(err) => {
                self.unreserve();
                Err(PoolError::Adapter(err))
            }
        }
    }

    /// Roll back a creation/reuse reservation. After a forced shutdown the
    /// reservation has already been discarded with the rest of the
    /// accounting.
    fn unreserve(&self) {
        let mut state = self.state.lock();
        if !state.forced {
            state.total -= 1;
        }
    }

    /// Drop a connection from the registry and close it, logging rather
    /// than propagating the failure.
    async fn discard(&self, id: ConnId, conn: A::Conn) {
        self.registry.forget(id);
        if let Err(err) = self.adapter.disconnect(conn).await {
            warn!(conn = %id, error = %err, "failed to close discarded connection");
        }
    }

    /// Return a checked-out connection to the idle set, or retire it once it
    /// has exceeded `max_uses`.
    pub(crate) async fn release(
        &self,
        handle: PooledConnection<A::Conn>,
    ) -> PoolResult<(), A::Error> {
        let uses = handle.uses + 1;
        if self.config.max_uses.is_some_and(|max| uses >= max) {
            debug!(conn = %handle.id, key = %self.key, uses, "retiring connection at max uses");
            return self.destroy(handle).await;
        }

        let id = handle.id;
        let conn = handle.into_inner();
        {
            let mut state = self.state.lock();
            state.checked_out.remove(&id);
            state.idle.push_back(IdleConn {
                conn,
                id,
                uses,
                idle_since: Instant::now(),
            });
            if state.closed && state.checked_out.is_empty() {
                self.drained.notify_waiters();
            }
        }
        self.slots.add_permits(1);
        Ok(())
    }

    /// Forcibly close a checked-out connection, removing it from the pool's
    /// accounting. Adapter failures propagate to the caller.
    pub(crate) async fn destroy(
        &self,
        handle: PooledConnection<A::Conn>,
    ) -> PoolResult<(), A::Error> {
        let id = handle.id;
        {
            let mut state = self.state.lock();
            state.checked_out.remove(&id);
            state.total -= 1;
            if state.closed && state.checked_out.is_empty() {
                self.drained.notify_waiters();
            }
        }
        self.registry.forget(id);
        self.slots.add_permits(1);
        self.adapter
            .disconnect(handle.into_inner())
            .await
            .map_err(PoolError::Adapter)
    }

    /// Stop accepting acquisitions, wait for checked-out connections to come
    /// back, then destroy everything. Idempotent.
    pub(crate) async fn drain(&self) -> PoolResult<(), A::Error> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
        }
        self.slots.close();
        self.stop_reaper();

        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            // Register before re-checking so a release between the check and
            // the await cannot be missed.
            notified.as_mut().enable();
            if self.state.lock().checked_out.is_empty() {
                break;
            }
            notified.await;
        }

        self.close_idle().await
    }

    /// Destroy every tracked connection without waiting. Idle connections
    /// are disconnected; checked-out ones are forgotten so their holders
    /// fail on the next release/destroy. Idempotent.
    pub(crate) async fn destroy_all_now(&self) -> PoolResult<(), A::Error> {
        self.slots.close();
        self.stop_reaper();
        {
            let mut state = self.state.lock();
            state.closed = true;
            state.forced = true;
            for id in state.checked_out.drain() {
                self.registry.forget(id);
            }
            // Checked-out connections are no longer tracked; only the idle
            // set remains to be closed below.
            state.total = state.idle.len();
            self.drained.notify_waiters();
        }
        self.close_idle().await
    }

    /// Disconnect every idle connection, attempting all of them and
    /// surfacing the first failure only after the rest have been tried.
    async fn close_idle(&self) -> PoolResult<(), A::Error> {
        let idle: Vec<IdleConn<A::Conn>> = {
            let mut state = self.state.lock();
            state.total -= state.idle.len();
            state.idle.drain(..).collect()
        };

        let mut first_err = None;
        for entry in idle {
            self.registry.forget(entry.id);
            if let Err(err) = self.adapter.disconnect(entry.conn).await {
                warn!(conn = %entry.id, key = %self.key, error = %err, "disconnect failed during shutdown");
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(PoolError::Adapter(err)),
            None => Ok(()),
        }
    }

    /// Start the background reaper once. Must run inside a tokio runtime;
    /// `new` calls it when one is current and `acquire` covers pools built
    /// outside one.
    fn ensure_reaper(&self) {
        if self.config.reap_interval.is_zero() {
            return;
        }
        if self.reaper_started.swap(true, Ordering::SeqCst) {
            return;
        }
        let weak = Weak::clone(&self.weak);
        let interval = self.config.reap_interval;
        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately.
            tick.tick().await;
            loop {
                tick.tick().await;
                let Some(pool) = weak.upgrade() else { break };
                if pool.state.lock().closed {
                    break;
                }
                pool.reap().await;
            }
        });
        *self.reaper.lock() = Some(handle);
    }

    fn stop_reaper(&self) {
        if let Some(handle) = self.reaper.lock().take() {
            handle.abort();
        }
    }

    /// One reaper sweep: destroy idle connections past the idle timeout,
    /// never dropping the pool below `min`.
    async fn reap(&self) {
        let expired = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            let mut expired = Vec::new();
            while state.total > self.config.min {
                match state.idle.front() {
                    Some(oldest) if oldest.idle_since.elapsed() >= self.config.idle_timeout => {
                        let entry = state.idle.pop_front().expect("front exists");
                        state.total -= 1;
                        expired.push(entry);
                    }
                    _ => break,
                }
            }
            expired
        };

        for entry in expired {
            debug!(conn = %entry.id, key = %self.key, "reaping idle connection");
            self.registry.forget(entry.id);
            if let Err(err) = self.adapter.disconnect(entry.conn).await {
                warn!(conn = %entry.id, error = %err, "disconnect failed during reap");
            }
        }
    }

    /// Total tracked connections, idle plus checked out.
    pub(crate) fn size(&self) -> usize {
        self.state.lock().total
    }

    /// Idle connections ready for reuse.
    pub(crate) fn available(&self) -> usize {
        self.state.lock().idle.len()
    }

    /// Connections currently checked out.
    pub(crate) fn using(&self) -> usize {
        self.state.lock().checked_out.len()
    }

    /// Acquire calls currently queued for a slot.
    pub(crate) fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    /// Consistent snapshot of all four counters.
    pub(crate) fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            size: state.total,
            available: state.idle.len(),
            using: state.checked_out.len(),
            waiting: self.waiting.load(Ordering::SeqCst),
        }
    }
}

impl<A: ConnectionAdapter> Drop for SubPool<A> {
    fn drop(&mut self) {
        if let Some(handle) = self.reaper.lock().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::Role;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    #[derive(Debug, thiserror::Error)]
    #[error("test adapter error: {0}")]
    struct TestError(&'static str);

    struct TestConn {
        host: String,
    }

    struct TestAdapter {
        connects: AtomicUsize,
        disconnects: AtomicUsize,
        fail_connect: AtomicBool,
        valid: AtomicBool,
    }

    impl TestAdapter {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                connects: AtomicUsize::new(0),
                disconnects: AtomicUsize::new(0),
                fail_connect: AtomicBool::new(false),
                valid: AtomicBool::new(true),
            })
        }
    }

    #[async_trait::async_trait]
    impl ConnectionAdapter for TestAdapter {
        type Conn = TestConn;
        type Error = TestError;

        async fn connect(&self, backend: &BackendConfig) -> Result<TestConn, TestError> {
            if self.fail_connect.load(Ordering::SeqCst) {
                return Err(TestError("connect refused"));
            }
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(TestConn {
                host: backend.host.clone(),
            })
        }

        async fn disconnect(&self, _conn: TestConn) -> Result<(), TestError> {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn validate(&self, _conn: &TestConn) -> bool {
            self.valid.load(Ordering::SeqCst)
        }
    }

    fn subpool(
        adapter: Arc<TestAdapter>,
        backends: Vec<BackendConfig>,
        config: PoolConfig,
    ) -> Arc<SubPool<TestAdapter>> {
        SubPool::new(
            adapter,
            RoutingKey::new(None, Role::Write),
            backends,
            config,
            Arc::new(OwnershipRegistry::new()),
        )
    }

    fn backend(host: &str) -> BackendConfig {
        BackendConfig::new(host, 5432, "app")
    }

    #[test]
    fn construction_outside_a_runtime_defers_the_reaper() {
        let pool = subpool(TestAdapter::new(), vec![backend("db")], PoolConfig::default());
        assert!(pool.reaper.lock().is_none());
        assert_eq!(pool.size(), 0);
    }

    #[tokio::test]
    async fn acquire_creates_then_reuses() {
        let adapter = TestAdapter::new();
        let pool = subpool(Arc::clone(&adapter), vec![backend("db")], PoolConfig::default());

        let conn = pool.acquire().await.unwrap();
        assert_eq!(pool.using(), 1);
        pool.release(conn).await.unwrap();
        assert_eq!(pool.available(), 1);

        let conn = pool.acquire().await.unwrap();
        assert_eq!(conn.uses(), 1);
        assert_eq!(adapter.connects.load(Ordering::SeqCst), 1);
        pool.release(conn).await.unwrap();
    }

    #[tokio::test]
    async fn max_bound_is_exact_under_burst() {
        let adapter = TestAdapter::new();
        let config = PoolConfig::new()
            .with_max(2)
            .with_acquire_timeout(Duration::from_millis(50));
        let pool = subpool(Arc::clone(&adapter), vec![backend("db")], config);

        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        assert_eq!(pool.using(), 2);

        let err = pool.acquire().await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(pool.size(), 2);

        pool.release(a).await.unwrap();
        pool.release(b).await.unwrap();
    }

    #[tokio::test]
    async fn waiter_advances_when_slot_frees() {
        let adapter = TestAdapter::new();
        let config = PoolConfig::new()
            .with_max(1)
            .with_acquire_timeout(Duration::from_secs(5));
        let pool = subpool(Arc::clone(&adapter), vec![backend("db")], config);

        let held = pool.acquire().await.unwrap();
        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(pool.waiting(), 1);

        pool.release(held).await.unwrap();
        let conn = waiter.await.unwrap().unwrap();
        assert_eq!(pool.waiting(), 0);
        pool.release(conn).await.unwrap();
    }

    #[tokio::test]
    async fn invalid_idle_connection_is_replaced_transparently() {
        let adapter = TestAdapter::new();
        let pool = subpool(Arc::clone(&adapter), vec![backend("db")], PoolConfig::default());

        let conn = pool.acquire().await.unwrap();
        pool.release(conn).await.unwrap();

        adapter.valid.store(false, Ordering::SeqCst);
        let conn = pool.acquire().await.unwrap();
        // The stale connection was destroyed and a fresh one created.
        assert_eq!(adapter.connects.load(Ordering::SeqCst), 2);
        assert_eq!(adapter.disconnects.load(Ordering::SeqCst), 1);
        assert_eq!(pool.size(), 1);
        pool.release(conn).await.unwrap();
    }

    #[tokio::test]
    async fn max_uses_retires_connection_on_release() {
        let adapter = TestAdapter::new();
        let config = PoolConfig::new().with_max_uses(2);
        let pool = subpool(Arc::clone(&adapter), vec![backend("db")], config);

        let conn = pool.acquire().await.unwrap();
        pool.release(conn).await.unwrap();
        let conn = pool.acquire().await.unwrap();
        pool.release(conn).await.unwrap();

        // Second release hit max_uses: destroyed, not recycled.
        assert_eq!(pool.size(), 0);
        assert_eq!(adapter.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn connect_failure_propagates_and_frees_slot() {
        let adapter = TestAdapter::new();
        let config = PoolConfig::new().with_max(1);
        let pool = subpool(Arc::clone(&adapter), vec![backend("db")], config);

        adapter.fail_connect.store(true, Ordering::SeqCst);
        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, PoolError::Adapter(_)));
        assert_eq!(pool.size(), 0);

        // Slot was not leaked by the failed creation.
        adapter.fail_connect.store(false, Ordering::SeqCst);
        let conn = pool.acquire().await.unwrap();
        pool.release(conn).await.unwrap();
    }

    #[tokio::test]
    async fn drain_waits_for_checkouts_then_closes_everything() {
        let adapter = TestAdapter::new();
        let pool = subpool(Arc::clone(&adapter), vec![backend("db")], PoolConfig::default());

        let held = pool.acquire().await.unwrap();
        let spare = pool.acquire().await.unwrap();
        pool.release(spare).await.unwrap();

        let drainer = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.drain().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!drainer.is_finished());

        pool.release(held).await.unwrap();
        drainer.await.unwrap().unwrap();

        assert_eq!(pool.size(), 0);
        assert_eq!(adapter.disconnects.load(Ordering::SeqCst), 2);
        assert!(matches!(
            pool.acquire().await.unwrap_err(),
            PoolError::PoolClosed
        ));
    }

    #[tokio::test]
    async fn destroy_all_now_rejects_queued_acquires() {
        let adapter = TestAdapter::new();
        let config = PoolConfig::new()
            .with_max(1)
            .with_acquire_timeout(Duration::from_secs(5));
        let pool = subpool(Arc::clone(&adapter), vec![backend("db")], config);

        let _held = pool.acquire().await.unwrap();
        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        pool.destroy_all_now().await.unwrap();
        assert!(matches!(
            waiter.await.unwrap().unwrap_err(),
            PoolError::PoolClosed
        ));
        assert_eq!(pool.size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reaper_evicts_stale_idle_but_keeps_min() {
        let adapter = TestAdapter::new();
        let config = PoolConfig::new()
            .with_max(4)
            .with_min(1)
            .with_idle_timeout(Duration::from_millis(100))
            .with_reap_interval(Duration::from_millis(50));
        let pool = subpool(Arc::clone(&adapter), vec![backend("db")], config);

        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        let c = pool.acquire().await.unwrap();
        pool.release(a).await.unwrap();
        pool.release(b).await.unwrap();
        pool.release(c).await.unwrap();
        assert_eq!(pool.available(), 3);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(pool.size(), 1);
        assert_eq!(adapter.disconnects.load(Ordering::SeqCst), 2);
    }
}
