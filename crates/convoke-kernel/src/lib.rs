//! convoke-kernel — shared runtime plumbing for the convoke core.
//!
//! This crate holds the pieces every other crate leans on:
//!
//! - [`registry::Registry`] — id-keyed component collections with
//!   enable/disable and load-failure records,
//! - [`logbuf::LogBuffer`] — the ring-buffered, streamable audit log,
//! - [`metrics::MetricsHub`] — per-component call counters,
//! - [`trace::TraceIdGen`] — monotonic request trace ids.

pub mod error;
pub mod logbuf;
pub mod metrics;
pub mod registry;
pub mod trace;

pub use error::{KernelError, Result};
pub use logbuf::{LogBuffer, LogCategory, LogEntry, LogFilter, LogLevel};
pub use metrics::{ComponentMetrics, MetricsHub, MetricsSnapshot};
pub use registry::{ComponentInfo, Registry, SlotStatus};
pub use trace::{TraceId, TraceIdGen};
