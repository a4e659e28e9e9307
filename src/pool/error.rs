//! Pool error taxonomy.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Boxed error produced by factories and resource teardown.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by nodes, the aggregator and pooled handles.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool could not be built (no factories, no runtime).
    #[error("invalid pool construction: {0}")]
    Construction(String),

    /// The factory failed to produce a resource. Never retried by the pool.
    #[error("connection factory failed: {0}")]
    Factory(#[source] BoxError),

    /// Acquire attempted on, or still queued at, a closed pool.
    #[error("connection pool closed")]
    Closed,

    /// A bounded acquire gave up waiting.
    #[error("timed out after {0:?} waiting for a connection")]
    Timeout(Duration),

    /// Closing the underlying resource failed.
    #[error("failed to close connection: {0}")]
    Close(#[source] BoxError),

    /// One or more backends failed to close.
    #[error("{0}")]
    CloseAll(CloseErrors),
}

impl PoolError {
    /// Returns true for [`PoolError::Closed`].
    pub fn is_closed(&self) -> bool {
        matches!(self, PoolError::Closed)
    }
}

/// Every backend close failure collected by the aggregator, keyed by backend index.
#[derive(Debug, Default)]
pub struct CloseErrors(pub Vec<(usize, PoolError)>);

impl CloseErrors {
    /// The collected failures in backend order.
    pub fn errors(&self) -> &[(usize, PoolError)] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CloseErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} backend(s) failed to close: ", self.0.len())?;
        for (i, (backend, err)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "backend #{}: {}", backend, err)?;
        }
        Ok(())
    }
}
