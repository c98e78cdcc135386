//! Fixed 5-byte wire frame.
//!
//! | Offset | Field    |
//! |--------|----------|
//! | 0      | button   |
//! | 1      | x        |
//! | 2      | y        |
//! | 3      | wheel    |
//! | 4      | reserved |
//!
//! Every field is a signed byte sent as its two's-complement `u8`. The
//! reserved byte is always zero.

use serde::{Deserialize, Serialize};

pub const FRAME_LEN: usize = 5;

/// Largest relative motion one frame can carry on each axis.
pub const MAX_AXIS_DELTA: i32 = i8::MAX as i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    pub fn code(self) -> i8 {
        match self {
            MouseButton::Left => 1,
            MouseButton::Right => 2,
            MouseButton::Middle => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceFrame {
    pub button: i8,
    pub x: i8,
    pub y: i8,
    pub wheel: i8,
}

impl DeviceFrame {
    /// Builds a frame, saturating every field to the signed-byte range.
    pub fn new(button: i32, x: i32, y: i32, wheel: i32) -> Self {
        Self {
            button: clamp_i8(button),
            x: clamp_i8(x),
            y: clamp_i8(y),
            wheel: clamp_i8(wheel),
        }
    }

    pub fn movement(dx: i32, dy: i32) -> Self {
        Self::new(0, dx, dy, 0)
    }

    pub fn press(button: MouseButton) -> Self {
        Self::new(button.code() as i32, 0, 0, 0)
    }

    pub fn release() -> Self {
        Self::default()
    }

    pub fn scroll(delta: i32) -> Self {
        Self::new(0, 0, 0, delta)
    }

    pub fn encode(&self) -> [u8; FRAME_LEN] {
        [
            self.button as u8,
            self.x as u8,
            self.y as u8,
            self.wheel as u8,
            0,
        ]
    }

    /// Inverse of [`encode`](Self::encode); the reserved byte is ignored.
    pub fn decode(bytes: &[u8; FRAME_LEN]) -> Self {
        Self {
            button: bytes[0] as i8,
            x: bytes[1] as i8,
            y: bytes[2] as i8,
            wheel: bytes[3] as i8,
        }
    }
}

fn clamp_i8(value: i32) -> i8 {
    value.clamp(i8::MIN as i32, i8::MAX as i32) as i8
}

/// Splits a displacement into per-frame chunks that each fit one frame.
/// Both axes finish on the same chunk count.
pub fn split_displacement(dx: i32, dy: i32) -> Vec<(i32, i32)> {
    let largest = dx.unsigned_abs().max(dy.unsigned_abs()) as i64;
    if largest == 0 {
        return vec![(0, 0)];
    }
    let chunks = (largest + MAX_AXIS_DELTA as i64 - 1) / MAX_AXIS_DELTA as i64;

    let mut out = Vec::with_capacity(chunks as usize);
    let mut sent = (0i64, 0i64);
    for chunk in 1..=chunks {
        let want_x = dx as i64 * chunk / chunks;
        let want_y = dy as i64 * chunk / chunks;
        out.push(((want_x - sent.0) as i32, (want_y - sent.1) as i32));
        sent = (want_x, want_y);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_one_encodes_as_255() {
        let bytes = DeviceFrame::movement(-1, 0).encode();
        assert_eq!(bytes, [0, 255, 0, 0, 0]);
    }

    #[test]
    fn positive_limit_encodes_verbatim() {
        let bytes = DeviceFrame::movement(127, -128).encode();
        assert_eq!(bytes[1], 127);
        assert_eq!(bytes[2], 128);
    }

    #[test]
    fn out_of_range_values_saturate() {
        let frame = DeviceFrame::new(300, 1000, -1000, -129);
        assert_eq!(frame.button, 127);
        assert_eq!(frame.x, 127);
        assert_eq!(frame.y, -128);
        assert_eq!(frame.wheel, -128);
        assert_eq!(frame.encode()[4], 0);
    }

    #[test]
    fn decode_reverses_twos_complement() {
        let frame = DeviceFrame::decode(&[1, 255, 128, 3, 0]);
        assert_eq!(frame, DeviceFrame::new(1, -1, -128, 3));
    }

    #[test]
    fn button_codes_match_bitmask() {
        assert_eq!(DeviceFrame::press(MouseButton::Left).encode()[0], 1);
        assert_eq!(DeviceFrame::press(MouseButton::Right).encode()[0], 2);
        assert_eq!(DeviceFrame::press(MouseButton::Middle).encode()[0], 4);
        assert_eq!(DeviceFrame::release().encode(), [0; FRAME_LEN]);
    }

    #[test]
    fn split_keeps_chunks_in_range_and_sum_exact() {
        for (dx, dy) in [(0, 0), (127, -128), (300, 10), (-1000, 999), (5, -3)] {
            let chunks = split_displacement(dx, dy);
            let sum = chunks
                .iter()
                .fold((0, 0), |acc, (x, y)| (acc.0 + x, acc.1 + y));
            assert_eq!(sum, (dx, dy));
            assert!(chunks
                .iter()
                .all(|(x, y)| x.abs() <= MAX_AXIS_DELTA && y.abs() <= MAX_AXIS_DELTA));
        }
        assert_eq!(split_displacement(300, 0).len(), 3);
    }
}
