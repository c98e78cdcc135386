//! Activation gate sampled between frames.
//!
//! The loop only emits motion while the gate reports active. The gate is a
//! shared atomic flag; with the `global-hook` feature a background thread
//! (`pf-activation-hook`) flips it from a global keyboard/mouse hook.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub trait ActivationSource {
    fn is_active(&self) -> bool;
}

/// Gate that never closes.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysActive;

impl ActivationSource for AlwaysActive {
    fn is_active(&self) -> bool {
        true
    }
}

/// Shareable flag, set by whatever samples the activation key.
#[derive(Debug, Clone, Default)]
pub struct AtomicActivation(Arc<AtomicBool>);

impl AtomicActivation {
    pub fn new(active: bool) -> Self {
        Self(Arc::new(AtomicBool::new(active)))
    }

    pub fn set(&self, active: bool) {
        self.0.store(active, Ordering::Relaxed);
    }
}

impl ActivationSource for AtomicActivation {
    fn is_active(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

impl<A: ActivationSource + ?Sized> ActivationSource for Box<A> {
    fn is_active(&self) -> bool {
        (**self).is_active()
    }
}

#[cfg(feature = "global-hook")]
pub use self::hook::{spawn_activation_hook, ActivationKey};

#[cfg(feature = "global-hook")]
mod hook {
    use super::AtomicActivation;

    /// Input that holds the gate open while pressed.
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub enum ActivationKey {
        Key(rdev::Key),
        Button(rdev::Button),
    }

    /// Starts one background thread with a global input hook that keeps
    /// `gate` in sync with `key`. Call once per process.
    pub fn spawn_activation_hook(
        gate: AtomicActivation,
        key: ActivationKey,
    ) -> std::io::Result<std::thread::JoinHandle<()>> {
        std::thread::Builder::new()
            .name("pf-activation-hook".to_string())
            .spawn(move || {
                if let Err(e) = rdev::listen(move |event| handle_event(&gate, key, event)) {
                    log::error!("rdev::listen error: {e:?}");
                }
            })
    }

    fn handle_event(gate: &AtomicActivation, key: ActivationKey, event: rdev::Event) {
        match (key, event.event_type) {
            (ActivationKey::Key(wanted), rdev::EventType::KeyPress(pressed)) if wanted == pressed => {
                gate.set(true);
            }
            (ActivationKey::Key(wanted), rdev::EventType::KeyRelease(released))
                if wanted == released =>
            {
                gate.set(false);
            }
            (ActivationKey::Button(wanted), rdev::EventType::ButtonPress(pressed))
                if wanted == pressed =>
            {
                gate.set(true);
            }
            (ActivationKey::Button(wanted), rdev::EventType::ButtonRelease(released))
                if wanted == released =>
            {
                gate.set(false);
            }
            _ => {}
        }
    }
}
