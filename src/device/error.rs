use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// Neither the primary name nor any enumerated path could be opened.
    #[error("device not found ({attempts} candidate paths tried)")]
    NotFound { attempts: usize },

    /// The send failed, the reconnect succeeded and the single retry failed too.
    #[error("device command dropped after reconnect and retry")]
    SendDropped,

    #[error("failed to open device {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("invalid device handle: {0}")]
    InvalidHandle(String),
}

impl DeviceError {
    /// True when the loop should stop sending until the caller reconnects.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, DeviceError::NotFound { .. })
    }
}
