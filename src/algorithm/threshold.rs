//! Resolution- and confidence-aware deadzone thresholds.

use serde::{Deserialize, Serialize};

const REFERENCE_PIXELS: f64 = 1920.0 * 1080.0;
const REFERENCE_THRESHOLD_PX: f64 = 4.0;

pub const MIN_BASE_THRESHOLD: f64 = 2.0;
pub const MAX_BASE_THRESHOLD: f64 = 12.0;
pub const MIN_MOVEMENT_THRESHOLD: f64 = 1.0;
pub const MAX_MOVEMENT_THRESHOLD: f64 = 20.0;

/// Deadzone for a display, scaled with pixel density relative to 1080p.
pub fn base_threshold(width: u32, height: u32) -> f64 {
    let scale = pixel_density(width, height).sqrt();
    clamp_finite(
        REFERENCE_THRESHOLD_PX * scale,
        MIN_BASE_THRESHOLD,
        MAX_BASE_THRESHOLD,
    )
}

/// Lower confidence widens the deadzone. `confidence` is expected in `[0, 1]`;
/// the result is bounded either way.
pub fn movement_threshold(base: f64, confidence: f64) -> f64 {
    clamp_finite(
        base * (2.0 - confidence),
        MIN_MOVEMENT_THRESHOLD,
        MAX_MOVEMENT_THRESHOLD,
    )
}

/// Tighter deadzone for targets that are already close.
pub fn precision_threshold(base: f64, target_distance: f64) -> f64 {
    if target_distance < 50.0 {
        base * 0.5
    } else if target_distance < 100.0 {
        base * 0.7
    } else {
        base
    }
}

pub fn should_move(distance: f64, base: f64, confidence: f64) -> bool {
    distance > movement_threshold(base, confidence)
}

pub fn pixel_density(width: u32, height: u32) -> f64 {
    (width as f64 * height as f64) / REFERENCE_PIXELS
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionClass {
    FullHdOrLower,
    Qhd,
    Uhd,
    UltraHigh,
}

impl ResolutionClass {
    pub fn classify(width: u32) -> Self {
        match width {
            0..=1920 => ResolutionClass::FullHdOrLower,
            1921..=2560 => ResolutionClass::Qhd,
            2561..=3840 => ResolutionClass::Uhd,
            _ => ResolutionClass::UltraHigh,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionProfile {
    pub width: u32,
    pub height: u32,
    pub class: ResolutionClass,
    pub base_threshold: f64,
    pub pixel_density: f64,
}

impl ResolutionProfile {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            class: ResolutionClass::classify(width),
            base_threshold: base_threshold(width, height),
            pixel_density: pixel_density(width, height),
        }
    }
}

// NaN falls to the lower bound instead of propagating.
fn clamp_finite(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        return min;
    }
    value.clamp(min, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_resolution_yields_reference_threshold() {
        assert!((base_threshold(1920, 1080) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn base_threshold_scales_with_density_and_stays_bounded() {
        let qhd = base_threshold(2560, 1440);
        assert!(qhd > 4.0 && qhd < 6.0);
        assert_eq!(base_threshold(0, 0), MIN_BASE_THRESHOLD);
        assert_eq!(base_threshold(640, 480), MIN_BASE_THRESHOLD);
        assert_eq!(base_threshold(u32::MAX, u32::MAX), MAX_BASE_THRESHOLD);

        for (w, h) in [(1, 1), (800, 600), (1366, 768), (3840, 2160), (7680, 4320)] {
            let value = base_threshold(w, h);
            assert!((MIN_BASE_THRESHOLD..=MAX_BASE_THRESHOLD).contains(&value));
        }
    }

    #[test]
    fn full_confidence_keeps_base_threshold() {
        for base in [2.0, 4.0, 7.5, 12.0] {
            assert!((movement_threshold(base, 1.0) - base).abs() < 1e-12);
        }
    }

    #[test]
    fn zero_confidence_doubles_base_threshold_within_bounds() {
        assert!((movement_threshold(4.0, 0.0) - 8.0).abs() < 1e-12);
        assert_eq!(movement_threshold(12.0, 0.0), 20.0);
        assert_eq!(movement_threshold(0.2, 0.0), 1.0);
    }

    #[test]
    fn malformed_confidence_is_still_bounded() {
        assert_eq!(movement_threshold(4.0, 50.0), MIN_MOVEMENT_THRESHOLD);
        assert_eq!(movement_threshold(4.0, -50.0), MAX_MOVEMENT_THRESHOLD);
        assert_eq!(movement_threshold(4.0, f64::NAN), MIN_MOVEMENT_THRESHOLD);
    }

    #[test]
    fn precision_threshold_tightens_for_close_targets() {
        assert_eq!(precision_threshold(4.0, 10.0), 2.0);
        assert!((precision_threshold(4.0, 75.0) - 2.8).abs() < 1e-12);
        assert_eq!(precision_threshold(4.0, 150.0), 4.0);
    }

    #[test]
    fn should_move_only_outside_deadzone() {
        assert!(!should_move(4.0, 4.0, 1.0));
        assert!(should_move(4.1, 4.0, 1.0));
        assert!(!should_move(6.0, 4.0, 0.5));
    }

    #[test]
    fn profile_classifies_common_displays() {
        assert_eq!(
            ResolutionProfile::new(1920, 1080).class,
            ResolutionClass::FullHdOrLower
        );
        assert_eq!(ResolutionProfile::new(2560, 1440).class, ResolutionClass::Qhd);
        assert_eq!(ResolutionProfile::new(3840, 2160).class, ResolutionClass::Uhd);
        assert_eq!(
            ResolutionProfile::new(5120, 2880).class,
            ResolutionClass::UltraHigh
        );
        assert!((ResolutionProfile::new(3840, 2160).pixel_density - 4.0).abs() < 1e-12);
    }
}
