//! Shared counter block mutated by every worker.
//!
//! One mutex guards the whole block so each iteration's update (attempt
//! number, behind count, tier count) lands as a single atomic unit. The
//! lock is only ever held across in-memory arithmetic, never across I/O.

use std::sync::Mutex;

use crate::tiers::PacingTier;

/// Attempt count at which the first effectiveness check runs.
const FIRST_VERIFY_AT: u64 = 1;
/// Interval between subsequent effectiveness checks.
const VERIFY_INTERVAL: u64 = 500;

#[derive(Debug, Default)]
struct Inner {
    attempts: u64,
    consecutive_behind: u64,
    standard: u64,
    initial_accelerated: u64,
    accelerated: u64,
    super_accelerated: u64,
    /// Attempt count at the last verification, so each threshold crossing
    /// triggers exactly one check no matter which worker crossed it.
    last_verified_attempts: u64,
}

/// Point-in-time copy of the counter block, for logging and final stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub attempts: u64,
    pub consecutive_behind: u64,
    pub standard: u64,
    pub initial_accelerated: u64,
    pub accelerated: u64,
    pub super_accelerated: u64,
}

/// Process-wide counters shared by the primary and all auxiliary workers.
#[derive(Debug, Default)]
pub struct VoteCounters {
    inner: Mutex<Inner>,
}

impl VoteCounters {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned counter lock means a worker panicked mid-arithmetic;
        // the counts themselves are still internally consistent.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claim the next attempt number. Called exactly once per iteration,
    /// before any network work.
    pub fn begin_attempt(&self) -> u64 {
        let mut inner = self.lock();
        inner.attempts += 1;
        inner.attempts
    }

    /// Fold a classified, result-bearing iteration into the counters.
    ///
    /// Returns the tier charged for this iteration and the behind count
    /// after the update. The tier is chosen from the *new* behind count.
    pub fn record_result(&self, target_first: bool) -> (PacingTier, u64) {
        let mut inner = self.lock();
        if target_first {
            inner.consecutive_behind = 0;
            inner.standard += 1;
            (PacingTier::Standard, 0)
        } else {
            inner.consecutive_behind += 1;
            let tier = PacingTier::for_behind_count(inner.consecutive_behind);
            match tier {
                PacingTier::InitialAccelerated => inner.initial_accelerated += 1,
                PacingTier::Accelerated => inner.accelerated += 1,
                PacingTier::SuperAccelerated => inner.super_accelerated += 1,
                PacingTier::Standard => unreachable!("behind count is nonzero"),
            }
            (tier, inner.consecutive_behind)
        }
    }

    /// Fold a degenerate success (submission worked, no entries parsed).
    ///
    /// Charged as standard without touching the behind count.
    pub fn record_neutral(&self) -> PacingTier {
        let mut inner = self.lock();
        inner.standard += 1;
        PacingTier::Standard
    }

    /// Tier a failed submission would fall into, from the current behind
    /// count, without mutating anything.
    pub fn speculative_tier(&self) -> PacingTier {
        PacingTier::for_behind_count(self.lock().consecutive_behind)
    }

    /// Current consecutive-behind count.
    pub fn behind_count(&self) -> u64 {
        self.lock().consecutive_behind
    }

    /// Raise the behind count to `n` for the startup fast-path. Never
    /// lowers an already-higher count.
    pub fn seed_behind(&self, n: u64) {
        let mut inner = self.lock();
        if inner.consecutive_behind < n {
            inner.consecutive_behind = n;
        }
    }

    /// Whether an effectiveness check is due at the current global attempt
    /// count. Fires for attempt 1 and every multiple of 500, exactly once
    /// per crossing; returns the attempt count to record against.
    pub fn should_verify(&self) -> Option<u64> {
        let mut inner = self.lock();
        let due = inner.attempts == FIRST_VERIFY_AT || inner.attempts % VERIFY_INTERVAL == 0;
        if due && inner.attempts != inner.last_verified_attempts {
            inner.last_verified_attempts = inner.attempts;
            Some(inner.attempts)
        } else {
            None
        }
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        let inner = self.lock();
        CounterSnapshot {
            attempts: inner.attempts,
            consecutive_behind: inner.consecutive_behind,
            standard: inner.standard,
            initial_accelerated: inner.initial_accelerated,
            accelerated: inner.accelerated,
            super_accelerated: inner.super_accelerated,
        }
    }
}
