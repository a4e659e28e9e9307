//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Node needs a connection
//!     → connector.rs (TCP connect with timeout, TCP_NODELAY)
//!     → connection.rs (unique ID for tracing)
//!     → TcpConn handed to the pool as a raw resource
//!
//! TcpConn closed by the pool
//!     → socket shut down and dropped
//! ```
//!
//! # Design Decisions
//! - The pool itself is transport-agnostic; this is one concrete factory
//! - Connect timeouts are enforced here, not in the pool

pub mod connection;
pub mod connector;

pub use connection::ConnectionId;
pub use connector::{TcpConn, TcpConnector};
