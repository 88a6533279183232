//! Adaptive poll-voting controller.
//!
//! Wires the deterministic `pacing` core to the real world: an opaque HTTP
//! submission driver, result-page extraction, a scaling pool of auxiliary
//! workers, and a typed live status feed. The binary in `main.rs` adds the
//! CLI and graceful-shutdown plumbing.

pub mod config;
pub mod controller;
pub mod extract;
pub mod pool;
pub mod status;
pub mod submit;

pub use config::{ConfigError, RunConfig};
pub use controller::{IterationOutcome, VoteController, PRIMARY_WORKER};
pub use extract::extract_results;
pub use pool::WorkerPool;
pub use status::{run_renderer, StatusEvent, StatusFeed, WorkerStatus};
pub use submit::{HttpSubmitter, VoteSubmitter};
