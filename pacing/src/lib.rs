//! Deterministic core of the adaptive vote-pacing controller.
//!
//! Everything in this crate is pure state + arithmetic so it can be unit
//! tested without a network or a running worker pool: poll-result
//! interpretation, the four-tier wait policy, the lead backoff governor,
//! the shared counter block, the reconciled audit journal, and the
//! effectiveness verification log.

pub mod backoff;
pub mod counters;
pub mod journal;
pub mod results;
pub mod tiers;
pub mod verification;

pub use backoff::LeadBackoff;
pub use counters::{CounterSnapshot, VoteCounters};
pub use journal::{reconcile, JournalError, SummaryCounters, VoteJournal, VoteRecord};
pub use results::{PollSnapshot, ResultEntry, TargetMatcher};
pub use tiers::PacingTier;
pub use verification::{VerificationLog, VerificationRecord};
