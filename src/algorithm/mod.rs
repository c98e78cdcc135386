pub mod lock;
pub mod motion_planner;
pub mod threshold;
pub mod tracking;
