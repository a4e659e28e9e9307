//! Connection pool engine.
//!
//! # Data Flow
//! ```text
//! caller → Nodes::conn()
//!     → Selector picks a backend (round robin by default)
//!     → Node::conn()
//!         - idle list non-empty   → most recently released connection
//!         - below max_open        → factory called inline
//!         - saturated             → queued, opener task fills the request
//!     → Routed<PooledConn> handed to caller
//!
//! caller → put()/drop
//!     → owning Node: oldest waiter → idle list → discard
//! ```
//!
//! # Design Decisions
//! - One mutex per node; the aggregator never holds it
//! - Resources are never closed while a node lock is held
//! - Physical opens for queued callers are serialized through one task per node
//! - Waiter replies are a `Result`, delivered over a oneshot channel

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

pub mod conn;
pub mod error;
pub mod node;
pub mod nodes;

pub use conn::PooledConn;
pub use error::{BoxError, CloseErrors, PoolError};
pub use node::Node;
pub use nodes::{Nodes, Routed};

/// A closeable raw resource managed by the pool.
pub trait Resource: Send + Sized + 'static {
    /// Tear down the resource. The default simply drops it.
    fn close(self) -> Result<(), BoxError> {
        drop(self);
        Ok(())
    }
}

/// Produces new raw resources for a node.
#[async_trait]
pub trait ConnFactory: Send + Sync + 'static {
    type Conn: Resource;

    /// Create a new resource or fail.
    async fn create(&self) -> Result<Self::Conn, BoxError>;
}

#[async_trait]
impl<F: ConnFactory> ConnFactory for Arc<F> {
    type Conn = F::Conn;

    async fn create(&self) -> Result<Self::Conn, BoxError> {
        (**self).create().await
    }
}

/// The pool capability shared by a single node and the aggregator.
#[async_trait]
pub trait ConnPool: Send + Sync {
    /// Handle type given to callers.
    type Conn: Send + 'static;

    /// Acquire a connection, waiting if the pool is saturated.
    async fn conn(&self) -> Result<Self::Conn, PoolError>;

    /// Acquire a connection, giving up after `timeout`.
    ///
    /// A caller that times out leaves no trace in the wait queue.
    async fn conn_timeout(&self, timeout: Duration) -> Result<Self::Conn, PoolError> {
        match tokio::time::timeout(timeout, self.conn()).await {
            Ok(res) => res,
            Err(_) => {
                crate::observability::metrics::record_acquire_timeout();
                Err(PoolError::Timeout(timeout))
            }
        }
    }

    /// Return a connection. Closed connections are dropped silently.
    fn put(&self, conn: Self::Conn);

    /// Close the pool. Idempotent.
    fn close(&self) -> Result<(), PoolError>;

    /// `n <= 0` means unlimited.
    fn set_max_open_conns(&self, n: i32);

    /// `n <= 0` means no idle connections are kept.
    fn set_max_idle_conns(&self, n: i32);

    /// Point-in-time accounting snapshot.
    fn stats(&self) -> PoolStats;
}

/// Accounting snapshot of a pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Live resources: in use plus idle.
    pub num_open: usize,
    /// Creations queued to or running in the opener.
    pub pending_opens: usize,
    /// Connections sitting in the idle list.
    pub idle: usize,
    /// Callers blocked in `conn()`.
    pub waiters: usize,
    /// 0 means unlimited.
    pub max_open: usize,
    /// Effective idle limit.
    pub max_idle: usize,
    pub closed: bool,
}

impl PoolStats {
    /// Connections currently held by callers.
    pub fn in_use(&self) -> usize {
        self.num_open.saturating_sub(self.idle)
    }

    /// Combine two snapshots. An unlimited side makes the sum unlimited.
    pub fn merge(self, other: PoolStats) -> PoolStats {
        let max_open = if self.max_open == 0 || other.max_open == 0 {
            0
        } else {
            self.max_open + other.max_open
        };
        PoolStats {
            num_open: self.num_open + other.num_open,
            pending_opens: self.pending_opens + other.pending_opens,
            idle: self.idle + other.idle,
            waiters: self.waiters + other.waiters,
            max_open,
            max_idle: self.max_idle + other.max_idle,
            closed: self.closed && other.closed,
        }
    }
}
