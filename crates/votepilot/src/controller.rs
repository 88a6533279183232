//! The vote controller: iteration orchestration, the primary loop, and
//! auxiliary worker loops.
//!
//! One `VoteController` owns every piece of mutable run state — counters,
//! backoff, pool slots, journal, verification log — together with their
//! locks, and is shared by reference with every worker task. No code path
//! holds two of its locks at once, so no lock ordering exists to get wrong.
//!
//! Cancellation is cooperative: a single token checked at the top of every
//! loop and between every 1-second sleep slice. An in-flight submission is
//! never interrupted; it runs to its own internal ceiling.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Local;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use pacing::journal::TIMESTAMP_FORMAT;
use pacing::{
    backoff::BackoffAdjustment, CounterSnapshot, LeadBackoff, PacingTier, PollSnapshot,
    TargetMatcher, VerificationLog, VoteCounters, VoteJournal, VoteRecord,
};

use crate::config::RunConfig;
use crate::extract;
use crate::pool::WorkerPool;
use crate::status::StatusFeed;
use crate::submit::VoteSubmitter;

/// Worker id of the always-running primary loop.
pub const PRIMARY_WORKER: &str = "primary";

/// How long shutdown waits for each auxiliary worker before moving on.
const JOIN_WINDOW: Duration = Duration::from_secs(5);

/// How many leading entries a journal record keeps when the operator asked
/// for them.
const TOP_RESULTS_KEPT: usize = 5;

/// What one iteration produced, handed back to the calling loop to drive
/// timing and pool-scaling decisions.
#[derive(Debug)]
pub struct IterationOutcome {
    /// Whether the submission obtained a result page.
    pub success: bool,
    /// The parsed standings, when the page yielded any entries.
    pub snapshot: Option<PollSnapshot>,
    /// Whether the target held first place in those standings.
    pub target_first: bool,
}

/// Owns all mutable run state and the worker loops that share it.
pub struct VoteController {
    config: RunConfig,
    session_id: String,
    matcher: TargetMatcher,
    counters: VoteCounters,
    backoff: Mutex<LeadBackoff>,
    pool: WorkerPool,
    journal: VoteJournal,
    verification: VerificationLog,
    submitter: Arc<dyn VoteSubmitter>,
    status: StatusFeed,
    shutdown: CancellationToken,
}

impl VoteController {
    pub fn new(
        config: RunConfig,
        submitter: Arc<dyn VoteSubmitter>,
        status: StatusFeed,
        shutdown: CancellationToken,
    ) -> Self {
        let session_id = format!(
            "{}_{}",
            Local::now().format(TIMESTAMP_FORMAT),
            &Uuid::new_v4().simple().to_string()[..8]
        );
        let thresholds = (0..config.aux_slot_count())
            .map(|i| config.slot_threshold(i))
            .collect();
        Self {
            matcher: TargetMatcher::new(&config.target_name),
            counters: VoteCounters::new(),
            backoff: Mutex::new(LeadBackoff::new(config.max_backoff_secs)),
            pool: WorkerPool::new(thresholds, config.force_parallel),
            journal: VoteJournal::new(&config.journal_path, config.target_name.as_str()),
            verification: VerificationLog::new(&config.verification_path, session_id.as_str()),
            session_id,
            submitter,
            status,
            shutdown,
            config,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn counters(&self) -> &VoteCounters {
        &self.counters
    }

    pub fn journal(&self) -> &VoteJournal {
        &self.journal
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn backoff_multiplier(&self) -> f64 {
        self.lock_backoff().multiplier()
    }

    fn lock_backoff(&self) -> std::sync::MutexGuard<'_, LeadBackoff> {
        self.backoff.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run the controller to completion: the primary loop until shutdown,
    /// then a bounded join of the auxiliaries. Returns the final counters.
    pub async fn run(self: Arc<Self>) -> CounterSnapshot {
        info!(
            target = %self.config.target_name,
            session = %self.session_id,
            max_workers = self.config.max_workers,
            forced = self.config.force_parallel,
            "Vote controller starting"
        );

        // The fast-path seed waits for the first iteration so the journal
        // and verification files exist before auxiliaries write to them.
        let mut pending_seed = self.startup_seed();

        while !self.shutdown.is_cancelled() {
            let outcome = self.vote_iteration(PRIMARY_WORKER).await;

            if let Some(seed) = pending_seed.take() {
                self.counters.seed_behind(seed);
                info!(seed, "Seeded behind count for requested startup workers");
            }

            let lead_high = self.update_backoff(&outcome);
            Self::scale_pool(&self, &outcome);

            if self.shutdown.is_cancelled() {
                break;
            }
            let (wait, tier) = self.next_primary_wait(&outcome, lead_high);
            self.status.message(
                PRIMARY_WORKER,
                format!("waiting {wait}s before next vote ({tier})"),
            );
            self.cooldown(wait, None).await;
        }

        self.pool.deactivate_all();
        self.pool.join_all(JOIN_WINDOW).await;
        self.counters.snapshot()
    }

    /// Behind-count seed implied by `--start-workers`, if any: the
    /// threshold of the deepest slot the operator asked to start with.
    fn startup_seed(&self) -> Option<u64> {
        (self.config.start_workers > 1 && self.config.aux_slot_count() > 0)
            .then(|| self.config.slot_threshold(self.config.start_workers - 2))
    }

    /// One vote iteration, identical for every worker.
    ///
    /// Infallible by construction: every failure inside is folded into the
    /// outcome (failed attempt, neutral result, logged warning) so the
    /// calling loop never dies.
    pub async fn vote_iteration(&self, worker_id: &str) -> IterationOutcome {
        let sequence = self.counters.begin_attempt();
        let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
        self.status
            .message(worker_id, format!("vote attempt #{sequence}"));
        self.status.processing(worker_id, sequence);

        let started = Instant::now();
        let success = match self.submitter.submit_once().await {
            Ok(ok) => ok,
            Err(e) => {
                warn!(worker = worker_id, error = %e, "Submission errored");
                false
            }
        };

        if !success {
            self.status
                .message(worker_id, format!("vote #{sequence} failed"));
            let tier = self.counters.speculative_tier();
            let behind = self.counters.behind_count();
            self.append_record(VoteRecord {
                vote_number: sequence,
                session_id: self.session_id.clone(),
                worker_id: worker_id.to_string(),
                timestamp,
                success: false,
                target_first: false,
                target_rank: None,
                target_percentage: None,
                consecutive_behind: behind,
                tier,
                lead_percentage: None,
                exponential_backoff: false,
                duration_secs: Some(started.elapsed().as_secs_f64()),
                top_results: None,
            });
            self.status.idle(worker_id);
            return IterationOutcome {
                success: false,
                snapshot: None,
                target_first: false,
            };
        }

        let snapshot = match self.submitter.fetch_last_result_page().await {
            Ok(page) => Some(extract::extract_results(&page)),
            Err(e) => {
                warn!(worker = worker_id, error = %e, "Result page unavailable");
                None
            }
        };

        let Some(snapshot) = snapshot.filter(|s| !s.is_empty()) else {
            // Submission landed but the page gave us nothing to classify.
            self.status
                .message(worker_id, "could not extract results from page");
            let tier = self.counters.record_neutral();
            let behind = self.counters.behind_count();
            self.append_record(VoteRecord {
                vote_number: sequence,
                session_id: self.session_id.clone(),
                worker_id: worker_id.to_string(),
                timestamp,
                success: true,
                target_first: false,
                target_rank: None,
                target_percentage: None,
                consecutive_behind: behind,
                tier,
                lead_percentage: None,
                exponential_backoff: false,
                duration_secs: Some(started.elapsed().as_secs_f64()),
                top_results: None,
            });
            self.status.idle(worker_id);
            return IterationOutcome {
                success: true,
                snapshot: None,
                target_first: false,
            };
        };

        let target_first = self.matcher.is_target_first(&snapshot);
        let (tier, behind) = self.counters.record_result(target_first);
        let (lead, _) = self.matcher.lead_margin(&snapshot, self.config.lead_threshold);
        // Backoff flagging reflects the multiplier as it stood when this
        // iteration ran; the primary adjusts it only after returning.
        let backoff_active = target_first && lead.is_some() && self.lock_backoff().is_active();
        let standing = self.matcher.target_standing(&snapshot);
        let duration = started.elapsed().as_secs_f64();

        self.status.message(
            worker_id,
            match tier {
                PacingTier::Standard => {
                    format!("{} is in first place", self.config.target_name)
                }
                _ => format!(
                    "{} behind for {behind} consecutive rounds ({tier})",
                    self.config.target_name
                ),
            },
        );

        self.append_record(VoteRecord {
            vote_number: sequence,
            session_id: self.session_id.clone(),
            worker_id: worker_id.to_string(),
            timestamp,
            success: true,
            target_first,
            target_rank: standing.map(|(rank, _)| rank),
            target_percentage: standing.map(|(_, pct)| pct),
            consecutive_behind: behind,
            tier,
            lead_percentage: lead,
            exponential_backoff: backoff_active,
            duration_secs: Some(duration),
            top_results: self
                .config
                .save_top_results
                .then(|| snapshot.entries.iter().take(TOP_RESULTS_KEPT).cloned().collect()),
        });

        if worker_id == PRIMARY_WORKER {
            self.maybe_verify(&snapshot, standing);
        }

        self.status.idle(worker_id);
        IterationOutcome {
            success: true,
            snapshot: Some(snapshot),
            target_first,
        }
    }

    /// Effectiveness check on the fixed cadence (attempt 1, then every
    /// 500th), driven by the global counter and performed by the primary
    /// only.
    fn maybe_verify(&self, snapshot: &PollSnapshot, standing: Option<(usize, f64)>) {
        let Some(global_attempts) = self.counters.should_verify() else {
            return;
        };
        let (Some(total), Some((rank, pct))) = (snapshot.total_votes, standing) else {
            return;
        };
        match self.verification.record(global_attempts, total, pct, Some(rank)) {
            Ok(record) => {
                if let Some(eff) = record.effectiveness_percentage {
                    self.status.message(
                        PRIMARY_WORKER,
                        format!(
                            "verification: expected +{}, actual {:+}, effectiveness {eff:.1}%",
                            record.expected_vote_increase,
                            record.actual_vote_increase.unwrap_or(0),
                        ),
                    );
                }
            }
            Err(e) => warn!(error = %e, "Failed to write verification record"),
        }
    }

    /// Fold a classified primary iteration into the backoff multiplier.
    /// Returns whether the lead was at or above the threshold.
    fn update_backoff(&self, outcome: &IterationOutcome) -> bool {
        let Some(snapshot) = &outcome.snapshot else {
            return false;
        };
        if !outcome.target_first {
            return false;
        }
        let (lead, above) = self.matcher.lead_margin(snapshot, self.config.lead_threshold);
        let adjustment = self.lock_backoff().note_lead(above);
        match adjustment {
            BackoffAdjustment::Increased(multiplier) => self.status.message(
                PRIMARY_WORKER,
                format!(
                    "backoff active (lead {:.2}%, multiplier {multiplier:.2}x)",
                    lead.unwrap_or(0.0)
                ),
            ),
            BackoffAdjustment::Reset => self.status.message(
                PRIMARY_WORKER,
                format!("backoff reset (lead {:.2}%)", lead.unwrap_or(0.0)),
            ),
            BackoffAdjustment::Unchanged => {}
        }
        above
    }

    /// The primary's post-iteration slot scan. Takes the shared handle so
    /// newly started auxiliaries can own a reference to the controller.
    fn scale_pool(this: &Arc<Self>, outcome: &IterationOutcome) {
        let behind = this.counters.behind_count();
        let ctrl = Arc::clone(this);
        let changes = this.pool.scale(behind, outcome.target_first, move |slot| {
            let ctrl = Arc::clone(&ctrl);
            tokio::spawn(async move { ctrl.run_auxiliary(slot).await })
        });
        for slot in &changes.started {
            info!(slot, behind, "Auxiliary worker slot activated");
        }
        for slot in &changes.stopped {
            info!(slot, behind, target_first = outcome.target_first,
                "Auxiliary worker slot deactivated");
        }
    }

    /// Auxiliary worker loop for one slot: iterate, re-check the slot's
    /// reason to exist, sleep at the fastest tier.
    async fn run_auxiliary(&self, slot: usize) {
        let worker_id = format!("aux-{}", slot + 1);
        self.status.message(&worker_id, "auxiliary worker starting");

        loop {
            if self.shutdown.is_cancelled() || !self.pool.is_active(slot) {
                break;
            }
            let _ = self.vote_iteration(&worker_id).await;

            let behind = self.counters.behind_count();
            if !self.pool.should_continue(slot, behind) {
                break;
            }

            let wait = PacingTier::SuperAccelerated.draw_wait(&mut rand::thread_rng());
            self.status.message(
                &worker_id,
                format!("waiting {wait}s before next vote (super_accelerated)"),
            );
            self.cooldown(wait, Some(slot)).await;
        }

        self.pool.mark_inactive(slot);
        self.status.message(&worker_id, "auxiliary worker stopped");
    }

    /// Pick the primary's next wait: behind tiers when the target trails a
    /// parsed result, otherwise a standard draw stretched by any active
    /// backoff.
    fn next_primary_wait(&self, outcome: &IterationOutcome, lead_high: bool) -> (u64, PacingTier) {
        let behind = self.counters.behind_count();
        let mut rng = rand::thread_rng();

        if outcome.snapshot.is_some() && !outcome.target_first {
            let tier = PacingTier::for_behind_count(behind);
            (tier.draw_wait(&mut rng), tier)
        } else {
            let base = PacingTier::Standard.draw_wait(&mut rng);
            let backoff = self.lock_backoff();
            let wait = if lead_high && backoff.is_active() {
                backoff.scaled_wait(base)
            } else {
                base
            };
            (wait, PacingTier::Standard)
        }
    }

    /// Sleep in 1-second slices, bailing on shutdown or (for auxiliaries)
    /// slot deactivation. The only cancellation points in the system.
    async fn cooldown(&self, secs: u64, slot: Option<usize>) {
        for _ in 0..secs {
            if self.shutdown.is_cancelled() {
                return;
            }
            if let Some(i) = slot {
                if !self.pool.is_active(i) {
                    return;
                }
            }
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                _ = self.shutdown.cancelled() => return,
            }
        }
    }

    fn append_record(&self, record: VoteRecord) {
        if let Err(e) = self.journal.append(record) {
            warn!(error = %e, "Failed to write journal record, voting continues");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submit::MockVoteSubmitter;
    use std::path::Path;

    fn results_page(entries: &[(&str, f64)], total: Option<u64>) -> String {
        let mut page = String::new();
        for (name, pct) in entries {
            page.push_str(&format!(
                r#"<div class="pds-feedback-group">
                     <span class="pds-answer-text">{name}, sr., Somewhere (Utah) football</span>
                     <span class="pds-feedback-per">{pct}%</span>
                   </div>"#
            ));
        }
        if let Some(total) = total {
            page.push_str(&format!("<div>Total Votes: {total}</div>"));
        }
        page
    }

    fn test_config(dir: &Path) -> RunConfig {
        RunConfig {
            target_name: "Cutler Whitaker".into(),
            journal_path: dir.join("voting_activity.json"),
            verification_path: dir.join("vote_verification.json"),
            ..Default::default()
        }
    }

    fn controller(dir: &Path, mock: MockVoteSubmitter) -> Arc<VoteController> {
        controller_with(test_config(dir), mock)
    }

    fn controller_with(config: RunConfig, mock: MockVoteSubmitter) -> Arc<VoteController> {
        let (status, _rx) = StatusFeed::channel();
        Arc::new(VoteController::new(
            config,
            Arc::new(mock),
            status,
            CancellationToken::new(),
        ))
    }

    fn behind_page() -> String {
        results_page(
            &[("Dylan Papushak", 40.0), ("Cutler Whitaker", 30.0)],
            Some(10_000),
        )
    }

    #[tokio::test]
    async fn test_failed_submission_recorded_and_counted() {
        let dir = tempfile::tempdir().unwrap();
        let mut mock = MockVoteSubmitter::new();
        mock.expect_submit_once().returning(|| Ok(false));
        let ctrl = controller(dir.path(), mock);

        let outcome = ctrl.vote_iteration(PRIMARY_WORKER).await;
        assert!(!outcome.success);
        assert!(outcome.snapshot.is_none());

        let file = ctrl.journal().read().unwrap();
        assert_eq!(file.records.len(), 1);
        let record = &file.records[0];
        assert_eq!(record.vote_number, 1);
        assert!(!record.success);
        assert_eq!(record.tier, PacingTier::Standard);
        assert_eq!(file.summary.total_votes_submitted, 0);
        assert_eq!(file.summary.standard_votes, 1);
    }

    #[tokio::test]
    async fn test_submitter_error_counts_as_failed_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let mut mock = MockVoteSubmitter::new();
        mock.expect_submit_once()
            .returning(|| Err(anyhow::anyhow!("driver crashed")));
        let ctrl = controller(dir.path(), mock);

        let outcome = ctrl.vote_iteration(PRIMARY_WORKER).await;
        assert!(!outcome.success);
        assert_eq!(ctrl.counters().snapshot().attempts, 1);
    }

    #[tokio::test]
    async fn test_five_behind_rounds_match_expected_tier_counts() {
        let dir = tempfile::tempdir().unwrap();
        let mut mock = MockVoteSubmitter::new();
        mock.expect_submit_once().returning(|| Ok(true));
        mock.expect_fetch_last_result_page()
            .returning(|| Ok(behind_page()));
        let ctrl = controller(dir.path(), mock);

        for _ in 0..5 {
            let outcome = ctrl.vote_iteration(PRIMARY_WORKER).await;
            assert!(outcome.success);
            assert!(!outcome.target_first);
        }

        let snap = ctrl.counters().snapshot();
        assert_eq!(snap.consecutive_behind, 5);
        assert_eq!(snap.initial_accelerated, 4);
        assert_eq!(snap.accelerated, 1);

        let file = ctrl.journal().read().unwrap();
        assert_eq!(file.records.len(), 5);
        assert_eq!(file.records[4].tier, PacingTier::Accelerated);
        assert_eq!(file.records[4].consecutive_behind, 5);
        assert_eq!(file.records[0].target_rank, Some(2));
    }

    #[tokio::test]
    async fn test_empty_page_is_neutral_standard() {
        let dir = tempfile::tempdir().unwrap();
        let mut mock = MockVoteSubmitter::new();
        mock.expect_submit_once().returning(|| Ok(true));
        mock.expect_fetch_last_result_page()
            .returning(|| Ok("<html><body>maintenance</body></html>".into()));
        let ctrl = controller(dir.path(), mock);

        // Put the counter in a behind state first, then confirm the neutral
        // iteration leaves it alone.
        ctrl.counters().seed_behind(3);
        let outcome = ctrl.vote_iteration(PRIMARY_WORKER).await;
        assert!(outcome.success);
        assert!(outcome.snapshot.is_none());
        assert!(!outcome.target_first);

        let snap = ctrl.counters().snapshot();
        assert_eq!(snap.consecutive_behind, 3);
        assert_eq!(snap.standard, 1);
    }

    #[tokio::test]
    async fn test_result_page_fetch_error_is_neutral() {
        let dir = tempfile::tempdir().unwrap();
        let mut mock = MockVoteSubmitter::new();
        mock.expect_submit_once().returning(|| Ok(true));
        mock.expect_fetch_last_result_page()
            .returning(|| Err(anyhow::anyhow!("no result page captured yet")));
        let ctrl = controller(dir.path(), mock);

        let outcome = ctrl.vote_iteration(PRIMARY_WORKER).await;
        assert!(outcome.success);
        assert!(outcome.snapshot.is_none());
        assert_eq!(ctrl.counters().snapshot().standard, 1);
    }

    #[tokio::test]
    async fn test_high_lead_grows_backoff_multiplier() {
        let dir = tempfile::tempdir().unwrap();
        let mut mock = MockVoteSubmitter::new();
        mock.expect_submit_once().returning(|| Ok(true));
        mock.expect_fetch_last_result_page().returning(|| {
            Ok(results_page(
                &[("Cutler Whitaker", 35.0), ("Dylan Papushak", 18.0)],
                Some(10_000),
            ))
        });
        let ctrl = controller(dir.path(), mock);

        let outcome = ctrl.vote_iteration(PRIMARY_WORKER).await;
        assert!(outcome.target_first);

        // Lead is 17.0 against a 15.0 threshold
        let lead_high = ctrl.update_backoff(&outcome);
        assert!(lead_high);
        assert!((ctrl.backoff_multiplier() - 1.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_modest_lead_resets_backoff() {
        let dir = tempfile::tempdir().unwrap();
        let mut mock = MockVoteSubmitter::new();
        mock.expect_submit_once().returning(|| Ok(true));
        mock.expect_fetch_last_result_page().returning(|| {
            Ok(results_page(
                &[("Cutler Whitaker", 30.0), ("Dylan Papushak", 28.0)],
                None,
            ))
        });
        let ctrl = controller(dir.path(), mock);

        // Pre-grow the multiplier, then observe a below-threshold lead.
        ctrl.lock_backoff().note_lead(true);
        assert!(ctrl.backoff_multiplier() > 1.0);

        let outcome = ctrl.vote_iteration(PRIMARY_WORKER).await;
        let lead_high = ctrl.update_backoff(&outcome);
        assert!(!lead_high);
        assert_eq!(ctrl.backoff_multiplier(), 1.0);
    }

    #[tokio::test]
    async fn test_backoff_flag_reflects_multiplier_at_iteration_start() {
        let dir = tempfile::tempdir().unwrap();
        let mut mock = MockVoteSubmitter::new();
        mock.expect_submit_once().returning(|| Ok(true));
        mock.expect_fetch_last_result_page().returning(|| {
            Ok(results_page(
                &[("Cutler Whitaker", 35.0), ("Dylan Papushak", 18.0)],
                None,
            ))
        });
        let ctrl = controller(dir.path(), mock);

        // First iteration starts with multiplier 1.0: not a backoff vote,
        // even though its own classification will grow the multiplier.
        let outcome = ctrl.vote_iteration(PRIMARY_WORKER).await;
        ctrl.update_backoff(&outcome);
        let file = ctrl.journal().read().unwrap();
        assert!(!file.records[0].exponential_backoff);

        // Second iteration sees the grown multiplier.
        ctrl.vote_iteration(PRIMARY_WORKER).await;
        let file = ctrl.journal().read().unwrap();
        assert!(file.records[1].exponential_backoff);
        assert_eq!(file.summary.exponential_backoff_votes, 1);
    }

    #[tokio::test]
    async fn test_first_attempt_writes_verification_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut mock = MockVoteSubmitter::new();
        mock.expect_submit_once().returning(|| Ok(true));
        mock.expect_fetch_last_result_page()
            .returning(|| Ok(behind_page()));
        let ctrl = controller(dir.path(), mock);

        ctrl.vote_iteration(PRIMARY_WORKER).await;

        let raw =
            std::fs::read_to_string(dir.path().join("vote_verification.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let records = parsed["verification_records"].as_array().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["our_vote_count"], 1);
        // 10_000 * 30% = 3_000
        assert_eq!(records[0]["target_vote_count_calculated"], 3_000);
    }

    #[tokio::test]
    async fn test_auxiliary_iterations_do_not_verify() {
        let dir = tempfile::tempdir().unwrap();
        let mut mock = MockVoteSubmitter::new();
        mock.expect_submit_once().returning(|| Ok(true));
        mock.expect_fetch_last_result_page()
            .returning(|| Ok(behind_page()));
        let ctrl = controller(dir.path(), mock);

        ctrl.vote_iteration("aux-1").await;
        assert!(!dir.path().join("vote_verification.json").exists());
    }

    #[tokio::test]
    async fn test_next_wait_uses_behind_tier_range() {
        let dir = tempfile::tempdir().unwrap();
        let mut mock = MockVoteSubmitter::new();
        mock.expect_submit_once().returning(|| Ok(true));
        mock.expect_fetch_last_result_page()
            .returning(|| Ok(behind_page()));
        let ctrl = controller(dir.path(), mock);

        let outcome = ctrl.vote_iteration(PRIMARY_WORKER).await;
        let (wait, tier) = ctrl.next_primary_wait(&outcome, false);
        assert_eq!(tier, PacingTier::InitialAccelerated);
        let (lo, hi) = tier.wait_range();
        assert!(wait >= lo && wait <= hi);
    }

    #[tokio::test]
    async fn test_next_wait_standard_scaled_by_active_backoff() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockVoteSubmitter::new();
        let ctrl = controller(dir.path(), mock);

        for _ in 0..10 {
            ctrl.lock_backoff().note_lead(true);
        }
        let outcome = IterationOutcome {
            success: true,
            snapshot: Some(PollSnapshot::default()),
            target_first: true,
        };
        let (wait, tier) = ctrl.next_primary_wait(&outcome, true);
        assert_eq!(tier, PacingTier::Standard);
        // 53..=67 at the 5.0x cap, clamped to 300
        assert!(wait >= 265 && wait <= 300);
    }

    #[tokio::test]
    async fn test_startup_seed_targets_requested_slot() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunConfig {
            start_workers: 3,
            ..test_config(dir.path())
        };
        let ctrl = controller_with(config, MockVoteSubmitter::new());
        // Third worker overall = auxiliary slot 1 = threshold 30
        assert_eq!(ctrl.startup_seed(), Some(30));

        let config = RunConfig {
            start_workers: 1,
            ..test_config(dir.path())
        };
        let ctrl = controller_with(config, MockVoteSubmitter::new());
        assert_eq!(ctrl.startup_seed(), None);
    }

    #[tokio::test]
    async fn test_run_exits_immediately_when_already_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let (status, _rx) = StatusFeed::channel();
        let token = CancellationToken::new();
        token.cancel();
        let ctrl = Arc::new(VoteController::new(
            test_config(dir.path()),
            Arc::new(MockVoteSubmitter::new()),
            status,
            token,
        ));
        let snapshot = ctrl.run().await;
        assert_eq!(snapshot.attempts, 0);
    }

    #[tokio::test]
    async fn test_scale_pool_starts_and_stops_slots() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockVoteSubmitter::new();
        let ctrl = controller(dir.path(), mock);

        ctrl.counters().seed_behind(30);
        let outcome = IterationOutcome {
            success: true,
            snapshot: Some(PollSnapshot::default()),
            target_first: false,
        };
        VoteController::scale_pool(&ctrl, &outcome);
        assert_eq!(ctrl.pool().active_count(), 2); // thresholds 20 and 30

        // Target regains first place: the scan clears every slot.
        let ahead = IterationOutcome {
            success: true,
            snapshot: Some(PollSnapshot::default()),
            target_first: true,
        };
        ctrl.counters().record_result(true);
        VoteController::scale_pool(&ctrl, &ahead);
        assert_eq!(ctrl.pool().active_count(), 0);
    }
}
