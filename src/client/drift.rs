//! Bounded, rate-limited drift correction.
//!
//! The controller never touches the player. Each poll it compares the
//! player's reported position with the synced position and answers with a
//! [`DriftAction`]; only [`DriftAction::Seek`] asks the caller to act.

use super::constants::{
    CORRECTION_COOLDOWN_MS, DRIFT_SUSTAIN_MS, HARD_SEEK_THRESHOLD_SECS, IN_SYNC_RESET_MS,
    IN_SYNC_THRESHOLD_SECS, MAX_CONSECUTIVE_CORRECTIONS, SEEK_SETTLE_MS, SUSPENSION_MS,
};

#[derive(Debug, Clone)]
pub struct DriftConfig {
    pub in_sync_threshold: f64,
    pub hard_threshold: f64,
    pub sustain_ms: u64,
    pub cooldown_ms: u64,
    pub max_consecutive: u32,
    pub suspension_ms: u64,
    pub in_sync_reset_ms: u64,
    pub seek_settle_ms: u64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            in_sync_threshold: IN_SYNC_THRESHOLD_SECS,
            hard_threshold: HARD_SEEK_THRESHOLD_SECS,
            sustain_ms: DRIFT_SUSTAIN_MS,
            cooldown_ms: CORRECTION_COOLDOWN_MS,
            max_consecutive: MAX_CONSECUTIVE_CORRECTIONS,
            suspension_ms: SUSPENSION_MS,
            in_sync_reset_ms: IN_SYNC_RESET_MS,
            seek_settle_ms: SEEK_SETTLE_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DriftAction {
    /// Nothing to compare: paused, offline, or a seek still settling.
    Skip,
    InSync,
    /// Visible drift that does not (yet) warrant a seek.
    Syncing { drift: f64 },
    /// Correction wanted, but the previous one was too recent.
    CoolingDown { drift: f64 },
    /// Too many consecutive corrections; correction is paused.
    Suspended { drift: f64 },
    /// Hard seek the player to `position`.
    Seek { position: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncStatus {
    #[default]
    Idle,
    InSync,
    Syncing,
    Correcting,
    Suspended,
}

impl DriftAction {
    pub fn status(&self) -> SyncStatus {
        match self {
            Self::Skip => SyncStatus::Idle,
            Self::InSync => SyncStatus::InSync,
            Self::Syncing { .. } | Self::CoolingDown { .. } => SyncStatus::Syncing,
            Self::Seek { .. } => SyncStatus::Correcting,
            Self::Suspended { .. } => SyncStatus::Suspended,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DriftController {
    config: DriftConfig,
    consecutive: u32,
    last_correction: Option<u64>,
    suspended_until: Option<u64>,
    seek_started: Option<u64>,
    drift_since: Option<u64>,
    in_sync_since: Option<u64>,
}

impl DriftController {
    pub fn new(config: DriftConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn consecutive_corrections(&self) -> u32 {
        self.consecutive
    }

    pub fn seek_in_flight(&self, now_ms: u64) -> bool {
        self.seek_started
            .is_some_and(|started| now_ms.saturating_sub(started) < self.config.seek_settle_ms)
    }

    /// Marks a seek that did not come from this controller (e.g. an authoritative state change).
    pub fn begin_seek(&mut self, now_ms: u64) {
        self.seek_started = Some(now_ms);
        self.drift_since = None;
    }

    pub fn seek_completed(&mut self) {
        self.seek_started = None;
    }

    /// Clears all bookkeeping. Used on manual seeks, room changes and teardown.
    pub fn reset(&mut self) {
        let config = std::mem::take(&mut self.config);
        *self = Self::new(config);
    }

    pub fn evaluate(
        &mut self,
        now_ms: u64,
        synced: f64,
        local: f64,
        playing: bool,
        enabled: bool,
    ) -> DriftAction {
        if !enabled || !playing {
            self.drift_since = None;
            self.in_sync_since = None;
            return DriftAction::Skip;
        }
        if self.seek_in_flight(now_ms) {
            return DriftAction::Skip;
        }
        self.seek_started = None;

        let drift = (synced - local).abs();

        if drift < self.config.in_sync_threshold {
            self.drift_since = None;
            let since = *self.in_sync_since.get_or_insert(now_ms);
            if now_ms.saturating_sub(since) >= self.config.in_sync_reset_ms {
                self.consecutive = 0;
            }
            return DriftAction::InSync;
        }
        self.in_sync_since = None;

        if drift <= self.config.hard_threshold {
            self.drift_since = None;
            return DriftAction::Syncing { drift };
        }

        let since = *self.drift_since.get_or_insert(now_ms);
        if now_ms.saturating_sub(since) < self.config.sustain_ms {
            return DriftAction::Syncing { drift };
        }

        if let Some(until) = self.suspended_until {
            if now_ms < until {
                return DriftAction::Suspended { drift };
            }
            self.suspended_until = None;
            self.consecutive = 0;
        }

        if self
            .last_correction
            .is_some_and(|last| now_ms.saturating_sub(last) < self.config.cooldown_ms)
        {
            return DriftAction::CoolingDown { drift };
        }

        if self.consecutive >= self.config.max_consecutive {
            self.suspended_until = Some(now_ms + self.config.suspension_ms);
            tracing::warn!(
                "Drift correction suspended for {} ms after {} consecutive seeks",
                self.config.suspension_ms,
                self.consecutive
            );
            return DriftAction::Suspended { drift };
        }

        self.consecutive += 1;
        self.last_correction = Some(now_ms);
        self.seek_started = Some(now_ms);
        self.drift_since = None;
        DriftAction::Seek { position: synced }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Polls once a second from `from` to `to` (inclusive) with the player
    /// `behind` seconds behind, completing every seek immediately.
    fn run(
        controller: &mut DriftController,
        from: u64,
        to: u64,
        behind: f64,
    ) -> Vec<(u64, DriftAction)> {
        let mut actions = Vec::new();
        let mut t = from;
        while t <= to {
            let synced = 100.0 + t as f64 / 1000.0;
            let action = controller.evaluate(t, synced, synced - behind, true, true);
            if matches!(action, DriftAction::Seek { .. }) {
                controller.seek_completed();
            }
            actions.push((t, action));
            t += 1_000;
        }
        actions
    }

    fn seeks(actions: &[(u64, DriftAction)]) -> Vec<u64> {
        actions
            .iter()
            .filter(|(_, a)| matches!(a, DriftAction::Seek { .. }))
            .map(|(t, _)| *t)
            .collect()
    }

    #[test]
    fn sustained_drift_fires_exactly_one_seek() {
        let mut controller = DriftController::default();
        let actions = run(&mut controller, 0, 9_000, 6.0);
        assert_eq!(seeks(&actions), vec![2_000]);
        assert_eq!(actions[0].1.status(), SyncStatus::Syncing);
    }

    #[test]
    fn second_divergence_within_cooldown_does_not_seek() {
        let mut controller = DriftController::default();
        assert_eq!(seeks(&run(&mut controller, 0, 2_000, 6.0)), vec![2_000]);
        run(&mut controller, 3_000, 4_000, 0.5);

        let again = run(&mut controller, 5_000, 11_000, 6.0);
        assert!(seeks(&again).is_empty());
        assert!(matches!(again.last().unwrap().1, DriftAction::CoolingDown { .. }));

        let later = run(&mut controller, 12_000, 12_000, 6.0);
        assert_eq!(seeks(&later), vec![12_000]);
    }

    #[test]
    fn brief_spikes_do_not_seek() {
        let mut controller = DriftController::default();
        let mut actions = run(&mut controller, 0, 1_000, 6.0);
        actions.extend(run(&mut controller, 2_000, 2_000, 0.2));
        actions.extend(run(&mut controller, 3_000, 4_000, 6.0));
        assert!(seeks(&actions).is_empty());
    }

    #[test]
    fn advisory_band_never_seeks() {
        let mut controller = DriftController::default();
        let actions = run(&mut controller, 0, 20_000, 3.5);
        assert!(seeks(&actions).is_empty());
        assert!(actions.iter().all(|(_, a)| a.status() == SyncStatus::Syncing));
    }

    #[test]
    fn cap_suspends_then_recovers() {
        let mut controller = DriftController::default();
        let actions = run(&mut controller, 0, 61_000, 6.0);
        assert_eq!(seeks(&actions), vec![2_000, 12_000, 22_000]);
        assert!(matches!(
            actions.iter().find(|(t, _)| *t == 32_000).unwrap().1,
            DriftAction::Suspended { .. }
        ));

        let resumed = run(&mut controller, 62_000, 62_000, 6.0);
        assert_eq!(seeks(&resumed), vec![62_000]);
        assert_eq!(controller.consecutive_corrections(), 1);
    }

    #[test]
    fn sustained_sync_resets_counter() {
        let mut controller = DriftController::default();
        run(&mut controller, 0, 2_000, 6.0);
        assert_eq!(controller.consecutive_corrections(), 1);
        run(&mut controller, 3_000, 12_000, 0.5);
        assert_eq!(controller.consecutive_corrections(), 1);
        run(&mut controller, 13_000, 13_000, 0.5);
        assert_eq!(controller.consecutive_corrections(), 0);
    }

    #[test]
    fn in_flight_seek_suppresses_evaluation() {
        let mut controller = DriftController::default();
        controller.begin_seek(1_000);
        assert_eq!(controller.evaluate(2_000, 50.0, 0.0, true, true), DriftAction::Skip);
        // Settles on its own after the timeout.
        assert!(matches!(
            controller.evaluate(2_500, 50.0, 0.0, true, true),
            DriftAction::Syncing { .. }
        ));
    }

    #[test]
    fn paused_or_disabled_skips() {
        let mut controller = DriftController::default();
        assert_eq!(controller.evaluate(0, 50.0, 0.0, false, true), DriftAction::Skip);
        assert_eq!(controller.evaluate(0, 50.0, 0.0, true, false), DriftAction::Skip);
    }

    #[test]
    fn manual_seek_resets_bookkeeping() {
        let mut controller = DriftController::default();
        run(&mut controller, 0, 2_000, 6.0);
        controller.reset();
        assert_eq!(controller.consecutive_corrections(), 0);

        let actions = run(&mut controller, 3_000, 5_000, 6.0);
        assert_eq!(seeks(&actions), vec![5_000]);
    }
}
