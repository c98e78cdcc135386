//! Frame delivery with lazy open, enumeration and reconnect-once semantics.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::device::error::DeviceError;
use crate::device::frame::{split_displacement, DeviceFrame, MouseButton};
use crate::device::transport::{DeviceAddress, DeviceTransport};

/// Time a button stays down during [`DeviceProtocolAdapter::click`].
pub const CLICK_HOLD: Duration = Duration::from_millis(10);

/// Adapter shared between producers; the lock covers send and reconnect alike.
pub type SharedDevice<T> = Arc<Mutex<DeviceProtocolAdapter<T>>>;

pub struct DeviceProtocolAdapter<T: DeviceTransport> {
    transport: T,
    address: DeviceAddress,
    handle: Option<T::Handle>,
    opened_path: Option<String>,
}

impl<T: DeviceTransport> DeviceProtocolAdapter<T> {
    pub fn new(transport: T, address: DeviceAddress) -> Self {
        Self {
            transport,
            address,
            handle: None,
            opened_path: None,
        }
    }

    pub fn into_shared(self) -> SharedDevice<T> {
        Arc::new(Mutex::new(self))
    }

    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Path of the currently open device.
    pub fn opened_path(&self) -> Option<&str> {
        self.opened_path.as_deref()
    }

    /// Opens the device if it is not already open. Tries the primary name,
    /// then each enumerated path, stopping at the first success.
    pub fn open(&mut self) -> Result<(), DeviceError> {
        if self.handle.is_some() {
            return Ok(());
        }

        let candidates = self.address.candidates();
        for path in &candidates {
            match self.transport.open(path) {
                Ok(handle) => {
                    log::info!("open: connected to {path}");
                    self.handle = Some(handle);
                    self.opened_path = Some(path.clone());
                    return Ok(());
                }
                Err(err) => log::debug!("open: {err}"),
            }
        }

        log::warn!("open: no device among {} candidates", candidates.len());
        Err(DeviceError::NotFound {
            attempts: candidates.len(),
        })
    }

    pub fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.transport.close(handle);
            log::debug!(
                "close: released {}",
                self.opened_path.as_deref().unwrap_or("device")
            );
        }
        self.opened_path = None;
    }

    pub fn reconnect(&mut self) -> Result<(), DeviceError> {
        self.close();
        self.open()
    }

    /// Sends one frame. A failed call closes the handle, reconnects and
    /// retries exactly once.
    pub fn send(&mut self, frame: DeviceFrame) -> Result<(), DeviceError> {
        let bytes = frame.encode();
        self.open()?;
        if self.control(&bytes)? {
            return Ok(());
        }

        log::warn!("send: control call failed, reconnecting");
        self.reconnect()?;
        if self.control(&bytes)? {
            return Ok(());
        }

        log::error!("send: retry failed, dropping frame {bytes:?}");
        Err(DeviceError::SendDropped)
    }

    /// Relative move; displacements beyond one frame are split.
    pub fn move_relative(&mut self, dx: i32, dy: i32) -> Result<(), DeviceError> {
        for (x, y) in split_displacement(dx, dy) {
            self.send(DeviceFrame::movement(x, y))?;
        }
        Ok(())
    }

    /// Press, hold for [`CLICK_HOLD`], release.
    pub fn click(&mut self, button: MouseButton) -> Result<(), DeviceError> {
        self.click_held(button, CLICK_HOLD)
    }

    /// Press followed by release after `hold`. Blocks the caller, and any
    /// other producer of a [`SharedDevice`], for the duration.
    pub fn click_held(&mut self, button: MouseButton, hold: Duration) -> Result<(), DeviceError> {
        self.send(DeviceFrame::press(button))?;
        if !hold.is_zero() {
            std::thread::sleep(hold);
        }
        self.send(DeviceFrame::release())
    }

    pub fn scroll(&mut self, delta: i32) -> Result<(), DeviceError> {
        self.send(DeviceFrame::scroll(delta))
    }

    fn control(&mut self, bytes: &[u8]) -> Result<bool, DeviceError> {
        let handle = self
            .handle
            .as_ref()
            .ok_or_else(|| DeviceError::InvalidHandle("device is not open".to_string()))?;
        Ok(self
            .transport
            .control(handle, self.address.control_code, bytes))
    }
}

impl<T: DeviceTransport> Drop for DeviceProtocolAdapter<T> {
    fn drop(&mut self) {
        self.close();
    }
}
