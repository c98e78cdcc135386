pub mod algorithm;
pub mod config;
pub mod control;
pub mod device;
pub mod models;

pub use algorithm::lock::{LockOutcome, LockState, LockStateMachine};
pub use algorithm::motion_planner::{MotionPlan, MotionPlanner, MotionStep};
pub use algorithm::tracking::TrackedPointFilter;
pub use config::FollowConfig;
pub use control::control_loop::{ControlLoop, FrameOutcome};
pub use device::adapter::DeviceProtocolAdapter;
pub use device::error::DeviceError;
pub use device::frame::DeviceFrame;
pub use models::observation::Observation;

/// Installs the `env_logger` backend. Honors `RUST_LOG`, defaults to `info`,
/// and is a no-op when a logger is already set.
pub fn init_logging() {
    let env = env_logger::Env::default().default_filter_or("info");
    if env_logger::Builder::from_env(env).try_init().is_err() {
        log::debug!("init_logging: logger already installed");
    }
}
