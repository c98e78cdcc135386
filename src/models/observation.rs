//! Per-frame values exchanged between the detector, the tracker and the control loop.

use serde::{Deserialize, Serialize};

/// One raw detection. Coordinates are in detector space (e.g. 320x320).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub x: f64,
    pub y: f64,
    /// Detector confidence, nominally `[0, 1]`.
    pub confidence: f64,
    /// Seconds on any monotonic clock shared by all observations.
    pub timestamp: f64,
}

impl Observation {
    pub fn new(x: f64, y: f64, confidence: f64, timestamp: f64) -> Self {
        Self {
            x,
            y,
            confidence,
            timestamp,
        }
    }

    pub fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    pub fn has_finite_position(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Confidence clamped to `[0, 1]`; non-finite values count as zero.
    pub fn clamped_confidence(&self) -> f64 {
        if self.confidence.is_finite() {
            self.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Tracker output for one update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackOutput {
    pub filtered: (f64, f64),
    /// `filtered` extrapolated by the configured lead time.
    pub predicted: (f64, f64),
    pub velocity: (f64, f64),
    pub is_locked: bool,
}

/// Display size reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

pub fn distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    (b.0 - a.0).hypot(b.1 - a.1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_observation_with_camel_case_fields() {
        let observation = Observation::new(10.0, 20.0, 0.9, 1.5);
        let json = serde_json::to_string(&observation).expect("serialize observation");
        assert!(json.contains("\"timestamp\":1.5"));

        let back: Observation = serde_json::from_str(&json).expect("deserialize observation");
        assert_eq!(back, observation);
    }

    #[test]
    fn clamps_out_of_range_confidence() {
        assert_eq!(Observation::new(0.0, 0.0, 1.7, 0.0).clamped_confidence(), 1.0);
        assert_eq!(Observation::new(0.0, 0.0, -0.3, 0.0).clamped_confidence(), 0.0);
        assert_eq!(
            Observation::new(0.0, 0.0, f64::NAN, 0.0).clamped_confidence(),
            0.0
        );
    }

    #[test]
    fn detects_non_finite_positions() {
        assert!(Observation::new(1.0, 2.0, 1.0, 0.0).has_finite_position());
        assert!(!Observation::new(f64::INFINITY, 2.0, 1.0, 0.0).has_finite_position());
        assert!(!Observation::new(1.0, f64::NAN, 1.0, 0.0).has_finite_position());
    }
}
