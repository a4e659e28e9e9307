//! Startup orchestration.

use crate::config::PoolConfig;
use crate::net::TcpConnector;
use crate::pool::{ConnPool, Node, Nodes, PoolError};

/// The pool the binary runs: one TCP node per configured backend.
pub type TcpPool = Nodes<Node<TcpConnector>>;

/// Build the pool described by `config` and apply its limits.
///
/// Must run inside a Tokio runtime.
pub fn build_pool(config: &PoolConfig) -> Result<TcpPool, PoolError> {
    let mut connectors = Vec::with_capacity(config.backends.len());
    for backend in &config.backends {
        let connector = TcpConnector::from_config(backend).map_err(|e| {
            PoolError::Construction(format!(
                "backend '{}' has invalid address '{}': {}",
                backend.name, backend.address, e
            ))
        })?;
        connectors.push((backend.name.clone(), connector));
    }

    let pool = Nodes::build(connectors, config.limits.selection)?;
    pool.set_max_open_conns(config.limits.max_open);
    pool.set_max_idle_conns(config.limits.max_idle);

    tracing::info!(
        backends = config.backends.len(),
        max_open = config.limits.max_open,
        max_idle = config.limits.max_idle,
        selection = %config.limits.selection,
        "Pool started"
    );
    Ok(pool)
}
