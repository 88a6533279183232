//! Poll-result snapshots and target classification.
//!
//! A `PollSnapshot` is one parsed view of the poll standings, ordered by
//! percentage descending. It lives for exactly one iteration: the worker
//! classifies it, derives counters from it, and drops it.

use serde::{Deserialize, Serialize};

/// One entrant in the poll standings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEntry {
    /// Entrant name as shown on the results page.
    pub name: String,
    /// Vote share in percent, 0.0–100.0.
    pub percentage: f64,
}

impl ResultEntry {
    pub fn new(name: impl Into<String>, percentage: f64) -> Self {
        Self {
            name: name.into(),
            percentage,
        }
    }
}

/// A ranked snapshot of the poll, plus the server-reported total when the
/// page exposes one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PollSnapshot {
    /// Entries ordered by percentage descending, deduplicated upstream.
    pub entries: Vec<ResultEntry>,
    /// Total votes cast across all entrants, if the page reported it.
    pub total_votes: Option<u64>,
}

impl PollSnapshot {
    pub fn new(entries: Vec<ResultEntry>, total_votes: Option<u64>) -> Self {
        Self {
            entries,
            total_votes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Matches poll entries against the target entrant's two-part name.
///
/// The poll exposes no stable entrant identifier, only display names that
/// vary in casing and suffixes ("Cutler Whitaker" vs "Cutler Whitaker, sr.").
/// A candidate matches when it contains the full name, or both name tokens,
/// case-insensitively. An unrelated entrant whose name happens to contain
/// both tokens would also match; with nothing better than display text to
/// key on, that ambiguity is accepted.
#[derive(Debug, Clone)]
pub struct TargetMatcher {
    full: String,
    tokens: Vec<String>,
}

impl TargetMatcher {
    pub fn new(target_name: &str) -> Self {
        let full = target_name.to_lowercase();
        let tokens = full.split_whitespace().map(str::to_string).collect();
        Self { full, tokens }
    }

    /// Whether `candidate` names the target entrant.
    pub fn matches(&self, candidate: &str) -> bool {
        let candidate = candidate.to_lowercase();
        if candidate.contains(&self.full) {
            return true;
        }
        !self.tokens.is_empty() && self.tokens.iter().all(|t| candidate.contains(t))
    }

    /// Whether the target holds first place in `snapshot`.
    ///
    /// False on an empty snapshot.
    pub fn is_target_first(&self, snapshot: &PollSnapshot) -> bool {
        snapshot
            .entries
            .first()
            .is_some_and(|top| self.matches(&top.name))
    }

    /// The target's lead over the runner-up.
    ///
    /// Defined only when the target is first and at least two entries exist;
    /// returns `(None, false)` otherwise. The second element reports whether
    /// the margin meets `threshold`.
    pub fn lead_margin(&self, snapshot: &PollSnapshot, threshold: f64) -> (Option<f64>, bool) {
        if snapshot.entries.len() < 2 || !self.is_target_first(snapshot) {
            return (None, false);
        }
        let margin = snapshot.entries[0].percentage - snapshot.entries[1].percentage;
        (Some(margin), margin >= threshold)
    }

    /// 1-based rank and percentage of the target anywhere in the standings.
    pub fn target_standing(&self, snapshot: &PollSnapshot) -> Option<(usize, f64)> {
        snapshot
            .entries
            .iter()
            .position(|e| self.matches(&e.name))
            .map(|idx| (idx + 1, snapshot.entries[idx].percentage))
    }
}
