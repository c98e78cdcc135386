//! Time-boxed position lock on top of [`TrackedPointFilter`].

use crate::algorithm::tracking::{TrackedPointFilter, TrackingConfig};
use crate::models::observation::{Observation, TrackOutput};

pub const DEFAULT_LOCK_DURATION_S: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LockState {
    Unlocked,
    Locked {
        position: (f64, f64),
        started_at: f64,
    },
}

impl LockState {
    pub fn is_locked(self) -> bool {
        matches!(self, LockState::Locked { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    Locked,
    /// No position was supplied and the filter has not seen an observation yet.
    NotReady,
}

#[derive(Debug, Clone)]
pub struct LockStateMachine {
    filter: TrackedPointFilter,
    state: LockState,
    lock_duration_s: f64,
}

impl Default for LockStateMachine {
    fn default() -> Self {
        Self::new(TrackedPointFilter::default(), DEFAULT_LOCK_DURATION_S)
    }
}

impl LockStateMachine {
    pub fn new(filter: TrackedPointFilter, lock_duration_s: f64) -> Self {
        let lock_duration_s = if lock_duration_s.is_finite() {
            lock_duration_s.max(0.0)
        } else {
            DEFAULT_LOCK_DURATION_S
        };
        Self {
            filter,
            state: LockState::Unlocked,
            lock_duration_s,
        }
    }

    pub fn with_config(config: TrackingConfig, lock_duration_s: f64) -> Self {
        Self::new(TrackedPointFilter::new(config), lock_duration_s)
    }

    pub fn filter(&self) -> &TrackedPointFilter {
        &self.filter
    }

    pub fn state(&self) -> LockState {
        self.state
    }

    pub fn lock_duration_s(&self) -> f64 {
        self.lock_duration_s
    }

    /// Freezes the reported position at `position`, or at the current
    /// filtered position when `None`.
    pub fn lock(&mut self, position: Option<(f64, f64)>, now: f64) -> LockOutcome {
        let Some(position) = position.or_else(|| self.filter.filtered_position()) else {
            log::debug!("lock: tracker not initialized, ignoring lock request");
            return LockOutcome::NotReady;
        };

        self.state = LockState::Locked {
            position,
            started_at: now,
        };
        log::debug!(
            "lock: frozen at ({:.1}, {:.1}) for {:.3}s",
            position.0,
            position.1,
            self.lock_duration_s
        );
        LockOutcome::Locked
    }

    pub fn unlock(&mut self) {
        self.state = LockState::Unlocked;
    }

    /// Expires the lock once `lock_duration_s` has passed. Returns the state
    /// after the check.
    pub fn tick(&mut self, now: f64) -> LockState {
        if let LockState::Locked { started_at, .. } = self.state {
            // A non-finite clock reading keeps the lock rather than guessing.
            if now.is_finite() && now - started_at > self.lock_duration_s {
                log::debug!("lock: expired after {:.3}s", now - started_at);
                self.state = LockState::Unlocked;
            }
        }
        self.state
    }

    /// Seconds left on the current lock, `None` when unlocked.
    pub fn lock_remaining(&self, now: f64) -> Option<f64> {
        match self.state {
            LockState::Locked { started_at, .. } => {
                Some((self.lock_duration_s - (now - started_at)).max(0.0))
            }
            LockState::Unlocked => None,
        }
    }

    /// Feeds the filter and reports either the live estimate or the frozen
    /// position. The filter keeps updating while locked.
    pub fn update(&mut self, observation: &Observation) -> Option<TrackOutput> {
        let live = self.filter.update(observation);
        self.tick(observation.timestamp);
        self.report(live)
    }

    /// Reported position: frozen while locked, otherwise the filtered one.
    pub fn position(&mut self, now: f64) -> Option<(f64, f64)> {
        match self.tick(now) {
            LockState::Locked { position, .. } => Some(position),
            LockState::Unlocked => self.filter.filtered_position(),
        }
    }

    /// Aim point: frozen while locked, otherwise the predicted one.
    pub fn predicted_position(&mut self, now: f64) -> Option<(f64, f64)> {
        match self.tick(now) {
            LockState::Locked { position, .. } => Some(position),
            LockState::Unlocked => self.filter.predicted_position(),
        }
    }

    /// Drops the track and any lock.
    pub fn reset(&mut self) {
        self.filter.reset();
        self.state = LockState::Unlocked;
    }

    fn report(&self, live: Option<TrackOutput>) -> Option<TrackOutput> {
        match self.state {
            LockState::Locked { position, .. } => Some(TrackOutput {
                filtered: position,
                predicted: position,
                velocity: live.map(|output| output.velocity).unwrap_or_default(),
                is_locked: true,
            }),
            LockState::Unlocked => live,
        }
    }
}
