//! Effectiveness verification log.
//!
//! Every so often the controller cross-checks how many votes it has
//! attempted against how many the poll says the target gained, estimated
//! from the server-reported total and the target's percentage. Purely
//! observational: nothing here feeds back into pacing or pool scaling. It
//! exists so an operator can tell whether submissions are being honored
//! or silently dropped upstream.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::journal::{JournalError, TIMESTAMP_FORMAT};

/// One effectiveness sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub timestamp: String,
    pub session_id: String,
    /// Attempts made by this process, across all workers.
    pub our_vote_count: u64,
    pub total_votes_on_server: u64,
    pub target_percentage: f64,
    /// `floor(total * percentage / 100)`.
    pub target_vote_count_calculated: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_rank: Option<usize>,
    /// Attempts since the previous same-session sample (or since session
    /// start for the first sample).
    pub expected_vote_increase: u64,
    /// Estimated target votes gained since the previous same-session
    /// sample; absent on the first sample. Can go negative when other
    /// entrants surge and the percentage-derived estimate shrinks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_vote_increase: Option<i64>,
    /// `actual / expected * 100`; absent on the first sample or when no
    /// attempts were made between samples.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effectiveness_percentage: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct VerificationFile {
    verification_records: Vec<VerificationRecord>,
}

/// Writer for the verification file. Samples from earlier sessions are
/// kept but never compared against — restarting the tool must not make
/// the first new sample look wildly ineffective.
#[derive(Debug)]
pub struct VerificationLog {
    path: PathBuf,
    session_id: String,
    lock: Mutex<()>,
}

impl VerificationLog {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            session_id: session_id.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record one sample and return it (with the derived increase fields
    /// filled in) for display.
    pub fn record(
        &self,
        our_vote_count: u64,
        total_votes_on_server: u64,
        target_percentage: f64,
        target_rank: Option<usize>,
    ) -> Result<VerificationRecord, JournalError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut file = self.load_or_init();
        let estimate = (total_votes_on_server as f64 * target_percentage / 100.0).floor() as u64;

        let previous = file
            .verification_records
            .iter()
            .rev()
            .find(|r| r.session_id == self.session_id);

        let (expected, actual, effectiveness) = match previous {
            Some(prev) => {
                let expected = our_vote_count.saturating_sub(prev.our_vote_count);
                let actual = estimate as i64 - prev.target_vote_count_calculated as i64;
                let effectiveness =
                    (expected > 0).then(|| actual as f64 / expected as f64 * 100.0);
                (expected, Some(actual), effectiveness)
            }
            None => (our_vote_count, None, None),
        };

        let record = VerificationRecord {
            timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            session_id: self.session_id.clone(),
            our_vote_count,
            total_votes_on_server,
            target_percentage,
            target_vote_count_calculated: estimate,
            target_rank,
            expected_vote_increase: expected,
            actual_vote_increase: actual,
            effectiveness_percentage: effectiveness,
        };

        file.verification_records.push(record.clone());
        let json = serde_json::to_string_pretty(&file)?;
        std::fs::write(&self.path, json)?;
        Ok(record)
    }

    fn load_or_init(&self) -> VerificationFile {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(file) => file,
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e,
                        "Verification file unreadable, reinitializing");
                    VerificationFile::default()
                }
            },
            Err(_) => VerificationFile::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_log(session: &str) -> (tempfile::TempDir, VerificationLog) {
        let dir = tempfile::tempdir().unwrap();
        let log = VerificationLog::new(dir.path().join("vote_verification.json"), session);
        (dir, log)
    }

    #[test]
    fn test_first_record_has_no_comparison() {
        let (_dir, log) = temp_log("session-a");
        let record = log.record(1, 58_836, 23.58, Some(2)).unwrap();

        assert_eq!(record.our_vote_count, 1);
        assert_eq!(record.target_vote_count_calculated, 13_873); // floor
        assert_eq!(record.expected_vote_increase, 1);
        assert!(record.actual_vote_increase.is_none());
        assert!(record.effectiveness_percentage.is_none());
    }

    #[test]
    fn test_second_record_derives_effectiveness() {
        let (_dir, log) = temp_log("session-a");
        log.record(1, 10_000, 20.0, Some(1)).unwrap(); // estimate 2000
        let record = log.record(501, 12_000, 20.0, Some(1)).unwrap(); // estimate 2400

        assert_eq!(record.expected_vote_increase, 500);
        assert_eq!(record.actual_vote_increase, Some(400));
        let eff = record.effectiveness_percentage.unwrap();
        assert!((eff - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_actual_increase_can_be_negative() {
        let (_dir, log) = temp_log("session-a");
        log.record(1, 10_000, 30.0, Some(1)).unwrap(); // estimate 3000
        let record = log.record(101, 11_000, 25.0, Some(1)).unwrap(); // estimate 2750

        assert_eq!(record.actual_vote_increase, Some(-250));
        assert!(record.effectiveness_percentage.unwrap() < 0.0);
    }

    #[test]
    fn test_previous_sessions_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vote_verification.json");

        let old = VerificationLog::new(&path, "session-old");
        old.record(900, 50_000, 10.0, Some(3)).unwrap();

        let new = VerificationLog::new(&path, "session-new");
        let record = new.record(1, 50_500, 10.0, Some(3)).unwrap();

        // Treated as a first sample despite the older record in the file
        assert_eq!(record.expected_vote_increase, 1);
        assert!(record.actual_vote_increase.is_none());
    }

    #[test]
    fn test_zero_expected_yields_no_effectiveness() {
        let (_dir, log) = temp_log("session-a");
        log.record(10, 10_000, 20.0, None).unwrap();
        let record = log.record(10, 10_100, 20.0, None).unwrap();
        assert_eq!(record.expected_vote_increase, 0);
        assert!(record.effectiveness_percentage.is_none());
    }

    #[test]
    fn test_corrupt_file_reinitialized() {
        let (_dir, log) = temp_log("session-a");
        std::fs::write(log.path(), "][").unwrap();
        log.record(1, 1_000, 50.0, Some(1)).unwrap();

        let contents = std::fs::read_to_string(log.path()).unwrap();
        let file: VerificationFile = serde_json::from_str(&contents).unwrap();
        assert_eq!(file.verification_records.len(), 1);
    }

    #[test]
    fn test_records_accumulate() {
        let (_dir, log) = temp_log("session-a");
        for i in 1..=3 {
            log.record(i * 100, 10_000 + i * 50, 20.0, Some(1)).unwrap();
        }
        let contents = std::fs::read_to_string(log.path()).unwrap();
        let file: VerificationFile = serde_json::from_str(&contents).unwrap();
        assert_eq!(file.verification_records.len(), 3);
    }
}
