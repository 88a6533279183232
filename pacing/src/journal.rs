//! Append-only audit journal with reconciled summary counters.
//!
//! The journal file carries every iteration record plus a rolling summary.
//! Operators sometimes fold historical totals into the summary by hand,
//! so the summary can legitimately exceed what the stored records replay
//! to. Each append therefore reconciles three quantities:
//!
//! ```text
//! offset    = max(0, existing_summary - replay(existing_records))   per field
//! final     = offset + replay(existing_records) + delta(new_record)
//! ```
//!
//! which preserves hand-merged history without double-counting it and
//! without ever losing the newly appended record. `reconcile` is a pure
//! function so this arithmetic is testable away from the filesystem.
//!
//! The whole read-modify-write runs under one lock. Appends are rare
//! relative to network latency, so fully serializing them buys race
//! freedom for the price of nothing measurable.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::results::ResultEntry;
use crate::tiers::PacingTier;

/// Timestamp format shared by the journal, verification log, and session ids.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Journal I/O failures. All of them are recoverable: the caller logs a
/// warning and voting continues.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("journal I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("journal serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One audit record per vote iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteRecord {
    /// Globally unique, monotonically increasing attempt number.
    pub vote_number: u64,
    /// Session this record belongs to.
    pub session_id: String,
    /// Worker that performed the iteration ("primary", "aux-1", ...).
    pub worker_id: String,
    pub timestamp: String,
    /// Whether the submission produced a result page.
    pub success: bool,
    pub target_first: bool,
    /// 1-based standing of the target, when it appeared in the results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_rank: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_percentage: Option<f64>,
    pub consecutive_behind: u64,
    pub tier: PacingTier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_percentage: Option<f64>,
    /// Whether the backoff multiplier was already above 1.0 when this
    /// iteration started.
    pub exponential_backoff: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    /// Leading results at the time of the vote; only saved when the
    /// operator opted in, to keep long-run files small.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_results: Option<Vec<ResultEntry>>,
}

/// Rolling totals carried at the top of the journal.
///
/// `total_votes_submitted` counts successful submissions only; the tier
/// fields count every record, successful or not, and
/// `exponential_backoff_votes` counts records flagged as backoff rounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryCounters {
    #[serde(default)]
    pub total_votes_submitted: u64,
    #[serde(default)]
    pub standard_votes: u64,
    #[serde(default)]
    pub initial_accelerated_votes: u64,
    #[serde(default)]
    pub accelerated_votes: u64,
    #[serde(default)]
    pub super_accelerated_votes: u64,
    #[serde(default)]
    pub exponential_backoff_votes: u64,
}

impl SummaryCounters {
    /// Tally a set of records from scratch.
    pub fn replay(records: &[VoteRecord]) -> Self {
        let mut summary = Self::default();
        for record in records {
            summary.absorb(record);
        }
        summary
    }

    /// The contribution of a single record.
    pub fn delta(record: &VoteRecord) -> Self {
        let mut summary = Self::default();
        summary.absorb(record);
        summary
    }

    fn absorb(&mut self, record: &VoteRecord) {
        if record.success {
            self.total_votes_submitted += 1;
        }
        match record.tier {
            PacingTier::Standard => self.standard_votes += 1,
            PacingTier::InitialAccelerated => self.initial_accelerated_votes += 1,
            PacingTier::Accelerated => self.accelerated_votes += 1,
            PacingTier::SuperAccelerated => self.super_accelerated_votes += 1,
        }
        if record.exponential_backoff {
            self.exponential_backoff_votes += 1;
        }
    }
}

/// Combine the summary found in the file, the replay of its records, and
/// one new record's delta into the summary to write back.
///
/// Any excess of the existing summary over the replay is treated as
/// externally merged history and carried forward unchanged.
pub fn reconcile(
    existing: SummaryCounters,
    replayed: SummaryCounters,
    delta: SummaryCounters,
) -> SummaryCounters {
    fn field(existing: u64, replayed: u64, delta: u64) -> u64 {
        existing.saturating_sub(replayed) + replayed + delta
    }
    SummaryCounters {
        total_votes_submitted: field(
            existing.total_votes_submitted,
            replayed.total_votes_submitted,
            delta.total_votes_submitted,
        ),
        standard_votes: field(
            existing.standard_votes,
            replayed.standard_votes,
            delta.standard_votes,
        ),
        initial_accelerated_votes: field(
            existing.initial_accelerated_votes,
            replayed.initial_accelerated_votes,
            delta.initial_accelerated_votes,
        ),
        accelerated_votes: field(
            existing.accelerated_votes,
            replayed.accelerated_votes,
            delta.accelerated_votes,
        ),
        super_accelerated_votes: field(
            existing.super_accelerated_votes,
            replayed.super_accelerated_votes,
            delta.super_accelerated_votes,
        ),
        exponential_backoff_votes: field(
            existing.exponential_backoff_votes,
            replayed.exponential_backoff_votes,
            delta.exponential_backoff_votes,
        ),
    }
}

/// On-disk shape of the journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalFile {
    /// Start time of the first session that wrote this file; preserved
    /// across restarts.
    pub session_start: String,
    pub target_name: String,
    pub summary: SummaryCounters,
    pub records: Vec<VoteRecord>,
}

impl JournalFile {
    fn fresh(target_name: &str) -> Self {
        Self {
            session_start: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            target_name: target_name.to_string(),
            summary: SummaryCounters::default(),
            records: Vec::new(),
        }
    }
}

/// The journal writer. One instance per run, shared across workers.
#[derive(Debug)]
pub struct VoteJournal {
    path: PathBuf,
    target_name: String,
    lock: Mutex<()>,
}

impl VoteJournal {
    pub fn new(path: impl Into<PathBuf>, target_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            target_name: target_name.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record, reconciling the summary as described in the
    /// module docs. The entire read-modify-write is serialized.
    pub fn append(&self, record: VoteRecord) -> Result<(), JournalError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut file = self.load_or_init();
        let existing = file.summary;
        let replayed = SummaryCounters::replay(&file.records);
        let delta = SummaryCounters::delta(&record);

        file.records.push(record);
        file.summary = reconcile(existing, replayed, delta);

        let json = serde_json::to_string_pretty(&file)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    /// Read the journal back. Intended for tests and final reporting; the
    /// append path uses its own locked load.
    pub fn read(&self) -> Result<JournalFile, JournalError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let contents = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Load the file, reinitializing on absence or corruption. Unreadable
    /// history is discarded rather than crashing the run.
    fn load_or_init(&self) -> JournalFile {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(file) => file,
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e,
                        "Journal unreadable, reinitializing");
                    JournalFile::fresh(&self.target_name)
                }
            },
            Err(_) => JournalFile::fresh(&self.target_name),
        }
    }
}
