//! Agent checkpointing.
//!
//! Saves the agent's combined module record at configurable intervals, tracks
//! the best agent by evaluation return, prunes stale files, and resumes from
//! the latest or best checkpoint.
//!
//! ## Example
//!
//! ```rust,ignore
//! use dreamer_rl::checkpoint::{Checkpointer, CheckpointerConfig};
//!
//! let config = CheckpointerConfig::new("./checkpoints")
//!     .with_save_interval(10_000)
//!     .with_keep_last_n(5)
//!     .with_save_best(true);
//!
//! let mut checkpointer = Checkpointer::new(config)?;
//!
//! // In the training loop:
//! if checkpointer.should_save(step) {
//!     checkpointer.save(&agent.modules(), step, Some(eval_return))?;
//! }
//! ```

pub mod checkpointer;

pub use checkpointer::{CheckpointError, CheckpointInfo, Checkpointer, CheckpointerConfig};
