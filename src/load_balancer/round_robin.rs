//! Round-robin selection strategy.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::load_balancer::Selector;
use crate::pool::PoolStats;

/// Round-robin selector.
/// Stores an internal counter to rotate through backends.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Selector for RoundRobin {
    fn select(&self, backends: &[PoolStats]) -> Option<usize> {
        if backends.is_empty() {
            return None;
        }

        // Bounded scan so an all-closed set terminates
        let start_count = self.counter.fetch_add(1, Ordering::Relaxed);
        let len = backends.len();

        (0..len)
            .map(|i| (start_count + i) % len)
            .find(|&index| !backends[index].closed)
    }
}
