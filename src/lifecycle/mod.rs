//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → one TcpConnector per backend → Nodes → limits applied
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → background loops exit → pool closed
//!
//! Signals (signals.rs):
//!     SIGINT/SIGTERM → trigger shutdown
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Closing the pool fails queued callers instead of leaving them hanging

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
