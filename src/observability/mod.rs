//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Nodes, opener tasks and handles produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, per-backend gauges)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Library code only emits; installing subscribers/recorders is the binary's job
//! - Metrics are no-ops until a recorder is installed
//! - Backend name is the only label

pub mod logging;
pub mod metrics;
