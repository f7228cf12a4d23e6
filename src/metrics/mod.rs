//! Training metrics and logging.
//!
//! ## Buffers
//!
//! - [`MetricsBuffer`]: Windowed scalar accumulation between flushes
//! - [`SharedMetricsBuffer`]: Arc wrapper for multi-threaded access
//!
//! ## Loggers
//!
//! - [`ConsoleLogger`]: Pretty-printed console output
//! - [`CSVLogger`]: CSV file logging for analysis
//! - [`MultiLogger`]: Combine multiple loggers

pub mod buffer;
pub mod logger;

pub use buffer::{shared_metrics, MetricsBuffer, SharedMetricsBuffer};
pub use logger::{CSVLogger, ConsoleLogger, MetricsLogger, MultiLogger, VideoFrames};
