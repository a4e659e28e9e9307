//! Backend selection for the aggregator.
//!
//! # Data Flow
//! ```text
//! Nodes::conn()
//!     → snapshot PoolStats of every backend
//!     → Selector::select():
//!         - round_robin.rs (rotate through backends)
//!         - least_conn.rs (pick backend with fewest busy connections)
//!         - random.rs (uniform pick)
//!     → index of the backend that serves the acquire
//! ```
//!
//! # Design Decisions
//! - Selectors only see snapshots; they never touch backend locks
//! - Closed backends are excluded from selection
//! - Strategy is chosen per aggregator through configuration

use serde::{Deserialize, Serialize};

use crate::pool::PoolStats;

pub mod least_conn;
pub mod random;
pub mod round_robin;

/// Picks the backend that serves the next acquire.
pub trait Selector: Send + Sync + std::fmt::Debug {
    /// Index into `backends`, or `None` when every backend is closed.
    fn select(&self, backends: &[PoolStats]) -> Option<usize>;
}

/// Selection policy named in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    #[default]
    RoundRobin,
    LeastConnections,
    Random,
}

impl SelectionStrategy {
    pub fn build(self) -> Box<dyn Selector> {
        match self {
            SelectionStrategy::RoundRobin => Box::new(round_robin::RoundRobin::new()),
            SelectionStrategy::LeastConnections => Box::new(least_conn::LeastConnections::new()),
            SelectionStrategy::Random => Box::new(random::Random),
        }
    }
}

impl std::fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RoundRobin => write!(f, "round_robin"),
            Self::LeastConnections => write!(f, "least_connections"),
            Self::Random => write!(f, "random"),
        }
    }
}
