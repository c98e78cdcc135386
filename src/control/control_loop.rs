//! Per-detection orchestration: track, gate, deadzone, plan, send.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::algorithm::lock::{LockOutcome, LockStateMachine, DEFAULT_LOCK_DURATION_S};
use crate::algorithm::motion_planner::MotionPlanner;
use crate::algorithm::threshold::{self, ResolutionProfile};
use crate::config::FollowConfig;
use crate::control::activation::{ActivationSource, AlwaysActive};
use crate::device::adapter::DeviceProtocolAdapter;
use crate::device::error::DeviceError;
use crate::device::transport::DeviceTransport;
use crate::models::observation::{distance, Observation, Resolution};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PointerMode {
    /// The pointer stays at the origin and the view moves under it.
    #[default]
    Anchored,
    /// The pointer advances by every executed move.
    Accumulate,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControlConfig {
    /// Observation gap after which the track is restarted from scratch.
    pub staleness_window_s: f64,
    pub lock_duration_s: f64,
    /// Pointer position in detector space.
    pub pointer_origin: (f64, f64),
    pub pointer_mode: PointerMode,
    /// Device units per detector pixel.
    pub move_scale: f64,
    /// Largest move, in device units along either axis, issued for one frame.
    /// Longer offsets are shortened along the same direction.
    pub max_frame_displacement: i32,
    pub resolution: Resolution,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            staleness_window_s: 0.25,
            lock_duration_s: DEFAULT_LOCK_DURATION_S,
            pointer_origin: (160.0, 160.0),
            pointer_mode: PointerMode::Anchored,
            move_scale: 1.0,
            max_frame_displacement: 512,
            resolution: Resolution::default(),
        }
    }
}

impl ControlConfig {
    pub fn normalized(self) -> Self {
        let defaults = Self::default();
        let positive_or = |value: f64, fallback: f64| {
            if value.is_finite() && value > 0.0 {
                value
            } else {
                fallback
            }
        };
        let origin_ok = self.pointer_origin.0.is_finite() && self.pointer_origin.1.is_finite();
        Self {
            staleness_window_s: positive_or(self.staleness_window_s, defaults.staleness_window_s),
            lock_duration_s: positive_or(self.lock_duration_s, defaults.lock_duration_s),
            pointer_origin: if origin_ok {
                self.pointer_origin
            } else {
                defaults.pointer_origin
            },
            pointer_mode: self.pointer_mode,
            move_scale: positive_or(self.move_scale, defaults.move_scale),
            max_frame_displacement: if self.max_frame_displacement > 0 {
                self.max_frame_displacement
            } else {
                defaults.max_frame_displacement
            },
            resolution: self.resolution,
        }
    }
}

/// Blocking pause between motion steps.
pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// What one frame did.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// Activation gate closed; tracked but not acted on.
    Inactive,
    /// Observation had no usable position.
    Rejected,
    WithinDeadzone { distance: f64, threshold: f64 },
    Moved { dx: i32, dy: i32, steps: usize },
    /// A step was dropped after reconnect and retry; the rest of the plan was abandoned.
    Dropped { sent_steps: usize, error: DeviceError },
    /// No device could be opened; nothing is sent until [`ControlLoop::reconnect`] succeeds.
    DeviceUnavailable,
}

pub struct ControlLoop<T, S = ThreadSleeper, A = AlwaysActive>
where
    T: DeviceTransport,
    S: Sleeper,
    A: ActivationSource,
{
    config: ControlConfig,
    tracker: LockStateMachine,
    planner: MotionPlanner,
    device: DeviceProtocolAdapter<T>,
    sleeper: S,
    activation: A,
    profile: ResolutionProfile,
    pointer: (f64, f64),
    last_seen: Option<f64>,
    device_available: bool,
}

impl<T: DeviceTransport> ControlLoop<T> {
    pub fn new(config: &FollowConfig, transport: T) -> Self {
        Self::with_parts(config, transport, ThreadSleeper, AlwaysActive)
    }
}

impl<T, S, A> ControlLoop<T, S, A>
where
    T: DeviceTransport,
    S: Sleeper,
    A: ActivationSource,
{
    pub fn with_parts(config: &FollowConfig, transport: T, sleeper: S, activation: A) -> Self {
        let control = config.control.normalized();
        let resolution = control.resolution;
        Self {
            tracker: LockStateMachine::with_config(config.tracking, control.lock_duration_s),
            planner: MotionPlanner::new(config.motion),
            device: DeviceProtocolAdapter::new(transport, config.device.clone()),
            sleeper,
            activation,
            profile: ResolutionProfile::new(resolution.width, resolution.height),
            pointer: control.pointer_origin,
            last_seen: None,
            device_available: true,
            config: control,
        }
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    pub fn tracker(&self) -> &LockStateMachine {
        &self.tracker
    }

    pub fn planner(&self) -> &MotionPlanner {
        &self.planner
    }

    pub fn device(&self) -> &DeviceProtocolAdapter<T> {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut DeviceProtocolAdapter<T> {
        &mut self.device
    }

    pub fn is_device_available(&self) -> bool {
        self.device_available
    }

    pub fn resolution_profile(&self) -> ResolutionProfile {
        self.profile
    }

    pub fn base_threshold(&self) -> f64 {
        self.profile.base_threshold
    }

    pub fn pointer(&self) -> (f64, f64) {
        self.pointer
    }

    pub fn set_pointer(&mut self, position: (f64, f64)) {
        if position.0.is_finite() && position.1.is_finite() {
            self.pointer = position;
        }
    }

    /// Recomputes the base deadzone for a new display size.
    pub fn set_resolution(&mut self, width: u32, height: u32) {
        if self.profile.width == width && self.profile.height == height {
            return;
        }
        self.profile = ResolutionProfile::new(width, height);
        log::info!(
            "set_resolution: {}x{} base threshold {:.2}px",
            width,
            height,
            self.profile.base_threshold
        );
    }

    pub fn lock(&mut self, position: Option<(f64, f64)>, now: f64) -> LockOutcome {
        self.tracker.lock(position, now)
    }

    pub fn unlock(&mut self) {
        self.tracker.unlock();
    }

    /// Retries the device connection after it was reported unavailable.
    pub fn reconnect(&mut self) -> Result<(), DeviceError> {
        self.device.reconnect()?;
        self.device_available = true;
        Ok(())
    }

    /// Handles one detection. Runs to completion, including every step sleep.
    pub fn process(&mut self, observation: &Observation) -> FrameOutcome {
        self.expire_stale_track(observation.timestamp);

        let Some(track) = self.tracker.update(observation) else {
            return FrameOutcome::Rejected;
        };
        self.mark_seen(observation.timestamp);

        if !self.activation.is_active() {
            return FrameOutcome::Inactive;
        }
        if !self.device_available {
            return FrameOutcome::DeviceUnavailable;
        }

        let target = track.predicted;
        let gap = distance(self.pointer, target);
        let base = self.profile.base_threshold;
        let confidence = observation.clamped_confidence();
        if !threshold::should_move(gap, base, confidence) {
            return FrameOutcome::WithinDeadzone {
                distance: gap,
                threshold: threshold::movement_threshold(base, confidence),
            };
        }

        let (dx, dy) = self.frame_displacement(target);
        if dx == 0 && dy == 0 {
            return FrameOutcome::WithinDeadzone {
                distance: gap,
                threshold: threshold::movement_threshold(base, confidence),
            };
        }

        self.execute(dx, dy)
    }

    /// Frame without a detection: expires the lock and drops a stale track.
    pub fn process_miss(&mut self, now: f64) {
        self.tracker.tick(now);
        self.expire_stale_track(now);
    }

    /// Pointer-to-target offset in device units, capped per frame.
    fn frame_displacement(&self, target: (f64, f64)) -> (i32, i32) {
        let x = (target.0 - self.pointer.0) * self.config.move_scale;
        let y = (target.1 - self.pointer.1) * self.config.move_scale;
        let limit = self.config.max_frame_displacement as f64;
        let longest = x.abs().max(y.abs());
        let shrink = if longest > limit {
            log::debug!("process: capping {longest:.0} unit move to {limit}");
            limit / longest
        } else {
            1.0
        };
        ((x * shrink).round() as i32, (y * shrink).round() as i32)
    }

    fn execute(&mut self, dx: i32, dy: i32) -> FrameOutcome {
        let plan = self.planner.plan(dx, dy);
        let steps = plan.len();
        log::debug!("process: moving ({dx}, {dy}) in {steps} steps");

        let mut sent_steps = 0usize;
        let mut executed = (0i64, 0i64);
        for step in plan {
            match self.device.move_relative(step.dx, step.dy) {
                Ok(()) => {
                    sent_steps += 1;
                    executed.0 += step.dx as i64;
                    executed.1 += step.dy as i64;
                    self.sleeper
                        .sleep(Duration::try_from_secs_f64(step.delay_s).unwrap_or_default());
                }
                Err(error) if error.is_unavailable() => {
                    log::warn!("process: device unavailable, pausing output");
                    self.device_available = false;
                    self.advance_pointer(executed);
                    return FrameOutcome::DeviceUnavailable;
                }
                Err(error) => {
                    log::warn!("process: step {sent_steps} of {steps} dropped: {error}");
                    self.advance_pointer(executed);
                    return FrameOutcome::Dropped { sent_steps, error };
                }
            }
        }

        self.advance_pointer(executed);
        FrameOutcome::Moved { dx, dy, steps }
    }

    fn advance_pointer(&mut self, executed: (i64, i64)) {
        if self.config.pointer_mode == PointerMode::Accumulate {
            self.pointer.0 += executed.0 as f64 / self.config.move_scale;
            self.pointer.1 += executed.1 as f64 / self.config.move_scale;
        }
    }

    fn expire_stale_track(&mut self, now: f64) {
        let Some(last) = self.last_seen else {
            return;
        };
        if now.is_finite() && now - last > self.config.staleness_window_s {
            log::debug!("process: track stale for {:.3}s, restarting", now - last);
            self.tracker.reset();
            self.last_seen = None;
        }
    }

    fn mark_seen(&mut self, timestamp: f64) {
        if !timestamp.is_finite() {
            return;
        }
        self.last_seen = Some(match self.last_seen {
            Some(last) => last.max(timestamp),
            None => timestamp,
        });
    }
}
