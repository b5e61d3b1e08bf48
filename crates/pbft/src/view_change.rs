//! View change component for liveness.
//!
//! View changes are explicit transitions. This component only tracks progress
//! so that an optional stall detector can request the same transition when
//! in-flight requests stop making progress, and it counts the VIEW_CHANGE
//! announcements seen from peers.

use hybrid_types::{ReplicaId, ViewNumber};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::{debug, info};

/// View change state for one replica.
pub struct ViewChangeState {
    /// Stall timeout. `None` disables the detector.
    timeout: Option<Duration>,

    /// Time of last progress (execution, or work arriving while idle).
    last_progress_time: Duration,

    /// View this replica is in.
    current_view: ViewNumber,

    /// View changes applied so far.
    view_changes: u64,

    /// Replicas that announced each view.
    announcements: BTreeMap<ViewNumber, BTreeSet<ReplicaId>>,

    /// Current time.
    now: Duration,
}

impl ViewChangeState {
    /// Create a new view change state.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            last_progress_time: Duration::ZERO,
            current_view: ViewNumber::INITIAL,
            view_changes: 0,
            announcements: BTreeMap::new(),
            now: Duration::ZERO,
        }
    }

    /// Set the current time.
    pub fn set_time(&mut self, now: Duration) {
        self.now = now;
    }

    /// Get the current view.
    pub fn current_view(&self) -> ViewNumber {
        self.current_view
    }

    /// Number of view changes applied.
    pub fn view_changes(&self) -> u64 {
        self.view_changes
    }

    /// Whether the stall detector is enabled.
    pub fn detector_enabled(&self) -> bool {
        self.timeout.is_some()
    }

    /// Check if a view change should occur.
    ///
    /// Returns true if the detector is enabled, work is in flight, and the
    /// timeout has elapsed since last progress.
    pub fn should_change_view(&self, in_flight: usize) -> bool {
        let Some(timeout) = self.timeout else {
            return false;
        };
        if in_flight == 0 {
            return false;
        }
        let elapsed = self.now.saturating_sub(self.last_progress_time);
        elapsed > timeout
    }

    /// Reset the stall clock due to progress.
    pub fn reset_timeout(&mut self) {
        self.last_progress_time = self.now;
    }

    /// Handle a detector tick. Returns true if a view change is due.
    pub fn on_view_change_timer(&mut self, in_flight: usize) -> bool {
        if !self.should_change_view(in_flight) {
            debug!(
                current_view = self.current_view.0,
                in_flight,
                now = ?self.now,
                last_progress_time = ?self.last_progress_time,
                "View change timer fired but should_change_view = false"
            );
            return false;
        }

        info!(
            current_view = self.current_view.0,
            in_flight,
            timeout = ?self.timeout,
            "View change timer fired, triggering view change"
        );
        true
    }

    /// Record that the replica moved to `new_view`.
    pub fn apply_view_change(&mut self, new_view: ViewNumber) {
        debug_assert!(new_view > self.current_view);
        self.current_view = new_view;
        self.view_changes += 1;
        self.last_progress_time = self.now;
        self.cleanup_old_announcements();
    }

    /// Record a VIEW_CHANGE announcement. Returns how many distinct replicas
    /// have announced `view`.
    pub fn record_announcement(&mut self, view: ViewNumber, replica: ReplicaId) -> usize {
        if view < self.current_view {
            return 0;
        }
        let voters = self.announcements.entry(view).or_default();
        voters.insert(replica);
        voters.len()
    }

    fn cleanup_old_announcements(&mut self) {
        let current = self.current_view;
        self.announcements.retain(|view, _| *view >= current);
    }
}
