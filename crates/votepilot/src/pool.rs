//! Auxiliary worker pool.
//!
//! One slot per potential auxiliary worker. Slot `i` activates when the
//! consecutive-behind count reaches `base + i * step` and deactivates when
//! the count drops back below its threshold or the target regains first
//! place — unless forced mode is on, in which case slots only ever stop at
//! shutdown. A slot's backing task keeps running until it observes its
//! slot inactive; a restart spawns a fresh task only once the previous one
//! has actually finished.

use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::warn;

#[derive(Debug)]
struct Slot {
    active: bool,
    threshold: u64,
    handle: Option<JoinHandle<()>>,
}

/// What one scaling pass changed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ScaleOutcome {
    /// Slots whose activation threshold was newly met.
    pub started: Vec<usize>,
    /// Slots deactivated by this pass.
    pub stopped: Vec<usize>,
}

/// Slot state for every auxiliary worker, guarded by its own lock.
pub struct WorkerPool {
    slots: Mutex<Vec<Slot>>,
    forced: bool,
}

impl WorkerPool {
    pub fn new(thresholds: Vec<u64>, forced: bool) -> Self {
        let slots = thresholds
            .into_iter()
            .map(|threshold| Slot {
                active: false,
                threshold,
                handle: None,
            })
            .collect();
        Self {
            slots: Mutex::new(slots),
            forced,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Slot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn slot_count(&self) -> usize {
        self.lock().len()
    }

    pub fn threshold(&self, slot: usize) -> Option<u64> {
        self.lock().get(slot).map(|s| s.threshold)
    }

    pub fn is_active(&self, slot: usize) -> bool {
        self.lock().get(slot).is_some_and(|s| s.active)
    }

    pub fn active_count(&self) -> usize {
        self.lock().iter().filter(|s| s.active).count()
    }

    /// The auxiliary loop's continuation check: still active, and either
    /// still past threshold or forced on.
    pub fn should_continue(&self, slot: usize, behind: u64) -> bool {
        let slots = self.lock();
        let Some(s) = slots.get(slot) else {
            return false;
        };
        s.active && (behind >= s.threshold || self.forced)
    }

    /// Mark a slot inactive. Idempotent; the auxiliary loop calls this on
    /// every exit path.
    pub fn mark_inactive(&self, slot: usize) {
        if let Some(s) = self.lock().get_mut(slot) {
            s.active = false;
        }
    }

    /// The primary's post-iteration scan. Activates newly eligible slots
    /// (spawning via `spawn` when the previous task has exited) and
    /// deactivates slots that lost their reason to run.
    pub fn scale(
        &self,
        behind: u64,
        target_first: bool,
        mut spawn: impl FnMut(usize) -> JoinHandle<()>,
    ) -> ScaleOutcome {
        let mut outcome = ScaleOutcome::default();
        let mut slots = self.lock();
        for (i, slot) in slots.iter_mut().enumerate() {
            if behind >= slot.threshold && !slot.active {
                slot.active = true;
                outcome.started.push(i);
                let previous_running = slot.handle.as_ref().is_some_and(|h| !h.is_finished());
                if !previous_running {
                    slot.handle = Some(spawn(i));
                }
            } else if slot.active && !self.forced && (target_first || behind < slot.threshold) {
                slot.active = false;
                outcome.stopped.push(i);
            }
        }
        outcome
    }

    /// Deactivate every slot. Used at shutdown regardless of forced mode.
    pub fn deactivate_all(&self) {
        for slot in self.lock().iter_mut() {
            slot.active = false;
        }
    }

    /// Wait for every spawned auxiliary task, bounded per worker.
    pub async fn join_all(&self, per_worker: Duration) {
        let handles: Vec<(usize, JoinHandle<()>)> = {
            let mut slots = self.lock();
            slots
                .iter_mut()
                .enumerate()
                .filter_map(|(i, s)| s.handle.take().map(|h| (i, h)))
                .collect()
        };
        for (i, handle) in handles {
            if tokio::time::timeout(per_worker, handle).await.is_err() {
                warn!(slot = i, "Auxiliary worker did not stop within the join window");
            }
        }
    }
}
