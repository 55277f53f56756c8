//! Adapter and hook seams supplied by the caller

use async_trait::async_trait;

use crate::config::BackendConfig;
use crate::connection::PooledConnection;
use crate::errors::AcquireTimeout;
use crate::routing::AcquireRequest;

/// The pool manager's only boundary: how to open, close, and health-check a
/// physical connection. The pool treats connections as opaque values and
/// never inspects them.
///
/// `connect`/`disconnect` failures propagate unmodified to the caller of the
/// pool operation that triggered them.
#[async_trait]
pub trait ConnectionAdapter: Send + Sync + 'static {
    type Conn: Send + 'static;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open one physical connection to the given backend.
    async fn connect(&self, backend: &BackendConfig) -> Result<Self::Conn, Self::Error>;

    /// Close one connection.
    async fn disconnect(&self, conn: Self::Conn) -> Result<(), Self::Error>;

    /// Health check run before reusing an idle connection. An invalid
    /// connection is destroyed and replaced transparently.
    fn validate(&self, conn: &Self::Conn) -> bool {
        let _ = conn;
        true
    }

    /// Optionally translate an acquisition timeout into a domain-specific
    /// error so callers can catch "pool exhausted" distinctly. Keep the
    /// passed [`AcquireTimeout`] as the new error's `source()` to preserve
    /// the cause chain. Returning `None` keeps the pool's own timeout error.
    fn map_timeout(&self, timeout: AcquireTimeout) -> Option<Self::Error> {
        let _ = timeout;
        None
    }
}

/// Cross-cutting callbacks invoked around every acquisition, e.g. query
/// routing or session stickiness. Both are awaited; an error from either
/// aborts the acquisition without leaking the connection.
#[async_trait]
pub trait AcquireHooks<C: Send, E: Send>: Send + Sync {
    /// Runs before the sub-pool is resolved.
    async fn before_acquire(&self, request: &AcquireRequest) -> Result<(), E> {
        let _ = request;
        Ok(())
    }

    /// Runs after a connection has been obtained. On error the connection is
    /// released back to its sub-pool before the error surfaces.
    async fn after_acquire(
        &self,
        conn: &mut PooledConnection<C>,
        request: &AcquireRequest,
    ) -> Result<(), E> {
        let _ = (conn, request);
        Ok(())
    }
}

/// Default hooks that do nothing.
pub struct NoopHooks;

#[async_trait]
impl<C: Send, E: Send> AcquireHooks<C, E> for NoopHooks {}
