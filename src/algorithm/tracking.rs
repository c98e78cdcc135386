//! Constant-velocity Kalman filter for a single tracked point.
//!
//! State vector is `[x, y, vx, vy]`. Observations only measure position, so
//! velocity is inferred from successive corrections. Time steps come from the
//! observation timestamps and may be irregular.

use serde::{Deserialize, Serialize};

use crate::models::observation::{Observation, TrackOutput};

/// Smallest time step the transition matrix is built with.
pub const MIN_DT: f64 = 0.001;

type Mat4 = [[f64; 4]; 4];
type Vec4 = [f64; 4];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackingConfig {
    /// Diagonal process noise added on every prediction.
    pub process_noise: f64,
    /// Diagonal measurement noise of the detector.
    pub measurement_noise: f64,
    /// Diagonal of the covariance the filter starts from.
    pub initial_covariance: f64,
    /// Seconds `predicted` is extrapolated ahead of `filtered`.
    pub lead_time_s: f64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            process_noise: 0.03,
            measurement_noise: 0.1,
            initial_covariance: 1.0,
            lead_time_s: 0.05,
        }
    }
}

impl TrackingConfig {
    pub fn normalized(self) -> Self {
        let defaults = Self::default();
        Self {
            process_noise: positive_or(self.process_noise, defaults.process_noise),
            measurement_noise: positive_or(self.measurement_noise, defaults.measurement_noise),
            initial_covariance: positive_or(self.initial_covariance, defaults.initial_covariance),
            lead_time_s: if self.lead_time_s.is_finite() {
                self.lead_time_s.max(0.0)
            } else {
                defaults.lead_time_s
            },
        }
    }
}

/// Estimate owned by one filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerState {
    pub position: (f64, f64),
    pub velocity: (f64, f64),
    pub covariance: Mat4,
    pub initialized: bool,
}

impl TrackerState {
    fn empty(initial_covariance: f64) -> Self {
        Self {
            position: (0.0, 0.0),
            velocity: (0.0, 0.0),
            covariance: scaled_identity(initial_covariance),
            initialized: false,
        }
    }

    fn vector(&self) -> Vec4 {
        [
            self.position.0,
            self.position.1,
            self.velocity.0,
            self.velocity.1,
        ]
    }

    fn set_vector(&mut self, state: Vec4) {
        self.position = (state[0], state[1]);
        self.velocity = (state[2], state[3]);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerStats {
    pub updates: u64,
    pub rejected: u64,
    pub last_timestamp: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct TrackedPointFilter {
    config: TrackingConfig,
    state: TrackerState,
    last_timestamp: Option<f64>,
    stats: TrackerStats,
}

impl Default for TrackedPointFilter {
    fn default() -> Self {
        Self::new(TrackingConfig::default())
    }
}

impl TrackedPointFilter {
    pub fn new(config: TrackingConfig) -> Self {
        let config = config.normalized();
        Self {
            state: TrackerState::empty(config.initial_covariance),
            config,
            last_timestamp: None,
            stats: TrackerStats::default(),
        }
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    pub fn state(&self) -> &TrackerState {
        &self.state
    }

    pub fn stats(&self) -> TrackerStats {
        self.stats
    }

    pub fn is_initialized(&self) -> bool {
        self.state.initialized
    }

    pub fn velocity(&self) -> (f64, f64) {
        self.state.velocity
    }

    /// Current filtered position, `None` before the first observation.
    pub fn filtered_position(&self) -> Option<(f64, f64)> {
        self.state.initialized.then_some(self.state.position)
    }

    /// Filtered position extrapolated by the lead time.
    pub fn predicted_position(&self) -> Option<(f64, f64)> {
        self.filtered_position().map(|_| self.extrapolate(self.config.lead_time_s))
    }

    /// Last estimate without consuming an observation.
    pub fn output(&self) -> Option<TrackOutput> {
        if !self.state.initialized {
            return None;
        }
        Some(TrackOutput {
            filtered: self.state.position,
            predicted: self.extrapolate(self.config.lead_time_s),
            velocity: self.state.velocity,
            is_locked: false,
        })
    }

    /// Drops the estimate; the next observation starts a fresh track.
    pub fn reset(&mut self) {
        self.state = TrackerState::empty(self.config.initial_covariance);
        self.last_timestamp = None;
    }

    /// Consumes one observation. Returns `None` when the observation has a
    /// non-finite position; the estimate is left untouched in that case.
    pub fn update(&mut self, observation: &Observation) -> Option<TrackOutput> {
        if !observation.has_finite_position() {
            self.stats.rejected += 1;
            log::debug!(
                "tracker: rejected non-finite observation ({}, {})",
                observation.x,
                observation.y
            );
            return None;
        }

        self.stats.updates += 1;

        if !self.state.initialized {
            self.state = TrackerState {
                position: observation.position(),
                velocity: (0.0, 0.0),
                covariance: scaled_identity(self.config.initial_covariance),
                initialized: true,
            };
            self.record_timestamp(observation.timestamp);
            return self.output();
        }

        let dt = self.elapsed_since_last(observation.timestamp);
        self.predict(dt);
        self.correct(observation.position());
        self.record_timestamp(observation.timestamp);
        self.output()
    }

    /// Time update: advances the state by `dt` seconds.
    pub fn predict(&mut self, dt: f64) {
        if !self.state.initialized {
            return;
        }
        let dt = safe_dt(dt);
        let transition = transition_matrix(dt);

        let state = mat_vec(&transition, &self.state.vector());
        self.state.set_vector(state);

        let mut covariance = mat_mul(
            &mat_mul(&transition, &self.state.covariance),
            &transpose(&transition),
        );
        for (i, row) in covariance.iter_mut().enumerate() {
            row[i] += self.config.process_noise;
        }
        self.state.covariance = covariance;
    }

    /// Measurement update with a position observation.
    fn correct(&mut self, measurement: (f64, f64)) {
        let p = self.state.covariance;
        let r = self.config.measurement_noise;

        // S = H P H^T + R, where H selects the position rows.
        let s00 = p[0][0] + r;
        let s01 = p[0][1];
        let s10 = p[1][0];
        let s11 = p[1][1] + r;
        let det = s00 * s11 - s01 * s10;
        if !det.is_finite() || det.abs() < f64::EPSILON {
            log::warn!("tracker: singular innovation covariance, skipping correction");
            return;
        }
        let inv = [[s11 / det, -s01 / det], [-s10 / det, s00 / det]];

        // K = P H^T S^-1 (4x2).
        let mut gain = [[0.0f64; 2]; 4];
        for (i, row) in gain.iter_mut().enumerate() {
            row[0] = p[i][0] * inv[0][0] + p[i][1] * inv[1][0];
            row[1] = p[i][0] * inv[0][1] + p[i][1] * inv[1][1];
        }

        let state = self.state.vector();
        let innovation = [measurement.0 - state[0], measurement.1 - state[1]];
        let mut corrected = state;
        for (i, value) in corrected.iter_mut().enumerate() {
            *value += gain[i][0] * innovation[0] + gain[i][1] * innovation[1];
        }
        self.state.set_vector(corrected);

        // P = (I - K H) P
        let mut updated = [[0.0f64; 4]; 4];
        for i in 0..4 {
            for j in 0..4 {
                updated[i][j] = p[i][j] - (gain[i][0] * p[0][j] + gain[i][1] * p[1][j]);
            }
        }
        self.state.covariance = updated;
    }

    fn extrapolate(&self, lead: f64) -> (f64, f64) {
        (
            self.state.position.0 + self.state.velocity.0 * lead,
            self.state.position.1 + self.state.velocity.1 * lead,
        )
    }

    fn elapsed_since_last(&self, timestamp: f64) -> f64 {
        match self.last_timestamp {
            Some(last) if timestamp.is_finite() => timestamp - last,
            _ => MIN_DT,
        }
    }

    fn record_timestamp(&mut self, timestamp: f64) {
        if !timestamp.is_finite() {
            return;
        }
        // A timestamp that goes backwards never rewinds the clock.
        let next = match self.last_timestamp {
            Some(last) => last.max(timestamp),
            None => timestamp,
        };
        self.last_timestamp = Some(next);
        self.stats.last_timestamp = Some(next);
    }
}

fn safe_dt(dt: f64) -> f64 {
    if dt.is_finite() && dt > MIN_DT {
        dt
    } else {
        MIN_DT
    }
}

fn positive_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        fallback
    }
}

fn scaled_identity(scale: f64) -> Mat4 {
    let mut m = [[0.0; 4]; 4];
    for (i, row) in m.iter_mut().enumerate() {
        row[i] = scale;
    }
    m
}

fn transition_matrix(dt: f64) -> Mat4 {
    [
        [1.0, 0.0, dt, 0.0],
        [0.0, 1.0, 0.0, dt],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ]
}

fn mat_vec(m: &Mat4, v: &Vec4) -> Vec4 {
    let mut out = [0.0; 4];
    for (i, row) in m.iter().enumerate() {
        out[i] = row.iter().zip(v.iter()).map(|(a, b)| a * b).sum();
    }
    out
}

fn mat_mul(a: &Mat4, b: &Mat4) -> Mat4 {
    let mut out = [[0.0; 4]; 4];
    for i in 0..4 {
        for j in 0..4 {
            out[i][j] = (0..4).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

fn transpose(m: &Mat4) -> Mat4 {
    let mut out = [[0.0; 4]; 4];
    for i in 0..4 {
        for j in 0..4 {
            out[j][i] = m[i][j];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME_DT: f64 = 1.0 / 60.0;

    fn obs(x: f64, y: f64, ts: f64) -> Observation {
        Observation::new(x, y, 1.0, ts)
    }

    #[test]
    fn first_observation_initializes_from_raw_measurement() {
        let mut filter = TrackedPointFilter::default();
        assert!(filter.output().is_none());

        let output = filter.update(&obs(120.0, 80.0, 0.0)).expect("initialized");
        assert_eq!(output.filtered, (120.0, 80.0));
        assert_eq!(output.predicted, (120.0, 80.0));
        assert_eq!(output.velocity, (0.0, 0.0));
        assert!(filter.is_initialized());
    }

    #[test]
    fn stationary_target_velocity_converges_to_zero() {
        let mut filter = TrackedPointFilter::default();
        filter.update(&obs(100.0, 100.0, 0.0));
        filter.update(&obs(110.0, 100.0, FRAME_DT));

        let mut early_speed = 0.0f64;
        for frame in 2..302 {
            let output = filter
                .update(&obs(110.0, 100.0, frame as f64 * FRAME_DT))
                .expect("finite observation");
            let speed = output.velocity.0.hypot(output.velocity.1);
            if frame == 10 {
                early_speed = speed;
            }
        }

        let (vx, vy) = filter.velocity();
        let final_speed = vx.hypot(vy);
        assert!(early_speed > 0.1);
        assert!(final_speed < 0.05, "velocity did not settle: {final_speed}");
        assert!(final_speed < early_speed);
    }

    #[test]
    fn identical_observations_never_create_velocity() {
        let mut filter = TrackedPointFilter::default();
        for frame in 0..50 {
            filter.update(&obs(50.0, 50.0, frame as f64 * FRAME_DT));
        }
        assert_eq!(filter.velocity(), (0.0, 0.0));
        assert_eq!(filter.filtered_position(), Some((50.0, 50.0)));
    }

    #[test]
    fn moving_target_produces_forward_prediction() {
        let mut filter = TrackedPointFilter::default();
        let mut last = None;
        for frame in 0..120 {
            let ts = frame as f64 * FRAME_DT;
            last = filter.update(&obs(100.0 + 120.0 * ts, 50.0, ts));
        }

        let output = last.expect("tracking");
        assert!(output.velocity.0 > 60.0);
        assert!(output.predicted.0 > output.filtered.0);
        assert!((output.predicted.1 - 50.0).abs() < 1e-6);
    }

    #[test]
    fn duplicate_and_reversed_timestamps_use_minimum_dt() {
        let mut filter = TrackedPointFilter::default();
        filter.update(&obs(0.0, 0.0, 1.0));
        let same = filter.update(&obs(5.0, 0.0, 1.0)).expect("duplicate ts");
        let back = filter.update(&obs(6.0, 0.0, 0.5)).expect("reversed ts");
        let nan = filter.update(&obs(7.0, 0.0, f64::NAN)).expect("nan ts");

        for output in [same, back, nan] {
            assert!(output.filtered.0.is_finite());
            assert!(output.velocity.0.is_finite());
        }
        assert_eq!(filter.stats().last_timestamp, Some(1.0));
    }

    #[test]
    fn non_finite_positions_are_rejected() {
        let mut filter = TrackedPointFilter::default();
        assert!(filter.update(&obs(f64::NAN, 0.0, 0.0)).is_none());
        assert!(!filter.is_initialized());

        filter.update(&obs(10.0, 10.0, 0.0));
        assert!(filter.update(&obs(10.0, f64::INFINITY, 0.1)).is_none());
        assert_eq!(filter.filtered_position(), Some((10.0, 10.0)));
        assert_eq!(filter.stats().rejected, 2);
        assert_eq!(filter.stats().updates, 1);
    }

    #[test]
    fn reset_forces_cold_start() {
        let mut filter = TrackedPointFilter::default();
        filter.update(&obs(10.0, 10.0, 0.0));
        filter.update(&obs(20.0, 10.0, 0.1));
        filter.reset();
        assert!(filter.filtered_position().is_none());

        let output = filter.update(&obs(200.0, 200.0, 5.0)).expect("restart");
        assert_eq!(output.filtered, (200.0, 200.0));
        assert_eq!(output.velocity, (0.0, 0.0));
    }

    #[test]
    fn normalized_config_replaces_invalid_noise() {
        let config = TrackingConfig {
            process_noise: -1.0,
            measurement_noise: f64::NAN,
            initial_covariance: 0.0,
            lead_time_s: -0.2,
        }
        .normalized();
        assert_eq!(config.process_noise, 0.03);
        assert_eq!(config.measurement_noise, 0.1);
        assert_eq!(config.initial_covariance, 1.0);
        assert_eq!(config.lead_time_s, 0.0);
    }
}
