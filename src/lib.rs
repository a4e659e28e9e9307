//! Generic connection pool with fair queuing and multi-backend fan-out.

pub mod config;
pub mod lifecycle;
pub mod load_balancer;
pub mod net;
pub mod observability;
pub mod pool;

pub use config::PoolConfig;
pub use load_balancer::{SelectionStrategy, Selector};
pub use pool::{
    BoxError, ConnFactory, ConnPool, Node, Nodes, PoolError, PoolStats, PooledConn, Resource,
    Routed,
};
