//! Uniform random selection strategy.

use rand::seq::IteratorRandom;

use crate::load_balancer::Selector;
use crate::pool::PoolStats;

#[derive(Debug, Default)]
pub struct Random;

impl Selector for Random {
    fn select(&self, backends: &[PoolStats]) -> Option<usize> {
        backends
            .iter()
            .enumerate()
            .filter(|(_, b)| !b.closed)
            .map(|(i, _)| i)
            .choose(&mut rand::thread_rng())
    }
}
