//! Multi-backend aggregator.
//!
//! # Responsibilities
//! - Present several nodes as one logical pool
//! - Pick a backend per acquire through a [`Selector`]
//! - Route released connections back to the backend that produced them
//! - Fan out close and limit changes to every backend

use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::ops::{Deref, DerefMut};

use crate::load_balancer::{SelectionStrategy, Selector};
use crate::pool::error::{CloseErrors, PoolError};
use crate::pool::node::Node;
use crate::pool::{ConnFactory, ConnPool, PoolStats};

/// A connection annotated with the index of the backend that produced it.
#[derive(Debug)]
pub struct Routed<C> {
    backend: usize,
    conn: C,
}

impl<C> Routed<C> {
    /// Index of the owning backend.
    pub fn backend(&self) -> usize {
        self.backend
    }

    pub fn into_inner(self) -> C {
        self.conn
    }
}

impl<C> Deref for Routed<C> {
    type Target = C;
    fn deref(&self) -> &C {
        &self.conn
    }
}

impl<C> DerefMut for Routed<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.conn
    }
}

/// One logical pool over a fixed, non-empty set of backends.
pub struct Nodes<P: ConnPool> {
    backends: Vec<P>,
    selector: Box<dyn Selector>,
    closed: Mutex<bool>,
}

impl<F: ConnFactory> Nodes<Node<F>> {
    /// Build one node per factory, selected round robin.
    pub fn new(factories: Vec<F>) -> Result<Self, PoolError> {
        let named = factories
            .into_iter()
            .enumerate()
            .map(|(i, f)| (format!("node-{}", i), f));
        Self::build(named, SelectionStrategy::default())
    }

    /// Build named nodes. Either every node is created or none survive.
    pub fn build<I>(factories: I, strategy: SelectionStrategy) -> Result<Self, PoolError>
    where
        I: IntoIterator<Item = (String, F)>,
    {
        let mut nodes: Vec<Node<F>> = Vec::new();
        for (name, factory) in factories {
            match Node::with_name(name, factory) {
                Ok(node) => nodes.push(node),
                Err(e) => {
                    for node in &nodes {
                        let _ = node.close();
                    }
                    return Err(e);
                }
            }
        }
        Self::from_backends(nodes, strategy.build())
    }
}

impl<P: ConnPool> Nodes<P> {
    /// Compose existing backends.
    pub fn from_backends(backends: Vec<P>, selector: Box<dyn Selector>) -> Result<Self, PoolError> {
        if backends.is_empty() {
            return Err(PoolError::Construction(
                "at least one connection factory is required".into(),
            ));
        }
        tracing::debug!(
            backends = backends.len(),
            selector = ?selector,
            "Aggregator created"
        );
        Ok(Self {
            backends,
            selector,
            closed: Mutex::new(false),
        })
    }

    pub fn backends(&self) -> &[P] {
        &self.backends
    }

    fn select(&self) -> Result<usize, PoolError> {
        if *self.closed.lock() {
            return Err(PoolError::Closed);
        }
        let stats: Vec<PoolStats> = self.backends.iter().map(ConnPool::stats).collect();
        self.selector.select(&stats).ok_or(PoolError::Closed)
    }
}

#[async_trait]
impl<P: ConnPool> ConnPool for Nodes<P> {
    type Conn = Routed<P::Conn>;

    async fn conn(&self) -> Result<Self::Conn, PoolError> {
        let backend = self.select()?;
        let conn = self.backends[backend].conn().await?;
        Ok(Routed { backend, conn })
    }

    fn put(&self, conn: Self::Conn) {
        match self.backends.get(conn.backend) {
            Some(backend) => backend.put(conn.conn),
            None => {
                tracing::warn!(backend = conn.backend, "Connection from unknown backend dropped");
            }
        }
    }

    fn close(&self) -> Result<(), PoolError> {
        *self.closed.lock() = true;

        let mut errors = CloseErrors::default();
        for (i, backend) in self.backends.iter().enumerate() {
            if let Err(e) = backend.close() {
                tracing::warn!(backend = i, error = %e, "Backend failed to close");
                errors.0.push((i, e));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(PoolError::CloseAll(errors))
        }
    }

    fn set_max_open_conns(&self, n: i32) {
        for backend in &self.backends {
            backend.set_max_open_conns(n);
        }
    }

    fn set_max_idle_conns(&self, n: i32) {
        for backend in &self.backends {
            backend.set_max_idle_conns(n);
        }
    }

    fn stats(&self) -> PoolStats {
        let mut stats = self
            .backends
            .iter()
            .map(ConnPool::stats)
            .reduce(PoolStats::merge)
            .unwrap_or_default();
        stats.closed = *self.closed.lock();
        stats
    }
}

impl<P: ConnPool> fmt::Debug for Nodes<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Nodes")
            .field("backends", &self.backends.len())
            .field("selector", &self.selector)
            .field("closed", &*self.closed.lock())
            .finish()
    }
}
