//! Least Connections selection strategy.

use crate::load_balancer::Selector;
use crate::pool::PoolStats;

/// Least connections selector.
/// Selects the backend with the fewest connections in use or awaited.
#[derive(Debug, Default)]
pub struct LeastConnections;

impl LeastConnections {
    pub fn new() -> Self {
        Self
    }
}

impl Selector for LeastConnections {
    fn select(&self, backends: &[PoolStats]) -> Option<usize> {
        // In case of tie, the first one is selected (stability)
        backends
            .iter()
            .enumerate()
            .filter(|(_, b)| !b.closed)
            .min_by_key(|(_, b)| b.in_use() + b.waiters)
            .map(|(i, _)| i)
    }
}
