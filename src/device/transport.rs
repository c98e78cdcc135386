//! OS boundary of the device adapter.

use serde::{Deserialize, Serialize};

use crate::device::error::DeviceError;

/// Opens, drives and closes a control-code-addressed device.
pub trait DeviceTransport {
    type Handle;

    fn open(&mut self, path: &str) -> Result<Self::Handle, DeviceError>;

    /// Issues one control call with `input` and a zero-length output buffer.
    fn control(&mut self, handle: &Self::Handle, code: u32, input: &[u8]) -> bool;

    fn close(&mut self, handle: Self::Handle);
}

/// How candidate device paths are formed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceAddress {
    /// Symbolic name tried before enumerating.
    pub primary: String,
    /// Prefix of enumerated paths; the 4-digit index follows it.
    pub path_prefix: String,
    /// Interface identifier appended after the index.
    pub interface_id: String,
    /// Enumerated indices run `1..=max_index`.
    pub max_index: u32,
    /// Operation code passed to every control call.
    pub control_code: u32,
}

impl Default for DeviceAddress {
    fn default() -> Self {
        Self {
            primary: r"\\.\PointerFollow".to_string(),
            path_prefix: r"\??\ROOT#SYSTEM#".to_string(),
            interface_id: "{00000000-0000-0000-0000-000000000000}".to_string(),
            max_index: 9,
            // CTL_CODE(FILE_DEVICE_UNKNOWN, 0x800, METHOD_BUFFERED, FILE_ANY_ACCESS)
            control_code: 0x0022_2000,
        }
    }
}

impl DeviceAddress {
    pub fn indexed_path(&self, index: u32) -> String {
        format!("{}{:04}#{}", self.path_prefix, index, self.interface_id)
    }

    /// Primary name first, then every enumerated path in index order.
    pub fn candidates(&self) -> Vec<String> {
        let mut paths = Vec::with_capacity(self.max_index as usize + 1);
        if !self.primary.is_empty() {
            paths.push(self.primary.clone());
        }
        paths.extend((1..=self.max_index).map(|index| self.indexed_path(index)));
        paths
    }
}

#[cfg(windows)]
pub use self::windows_impl::WindowsDeviceTransport;

#[cfg(windows)]
mod windows_impl {
    use windows::core::HSTRING;
    use windows::Win32::Foundation::{
        CloseHandle, GENERIC_READ, GENERIC_WRITE, HANDLE, INVALID_HANDLE_VALUE,
    };
    use windows::Win32::Storage::FileSystem::{
        CreateFileW, FILE_ATTRIBUTE_NORMAL, FILE_SHARE_MODE, OPEN_EXISTING,
    };
    use windows::Win32::System::IO::DeviceIoControl;

    use super::DeviceTransport;
    use crate::device::error::DeviceError;

    /// `CreateFileW` / `DeviceIoControl` / `CloseHandle`.
    #[derive(Debug, Default)]
    pub struct WindowsDeviceTransport;

    impl DeviceTransport for WindowsDeviceTransport {
        type Handle = HANDLE;

        /// Opens an existing device only; a path that does not resolve fails.
        fn open(&mut self, path: &str) -> Result<HANDLE, DeviceError> {
            let wide = HSTRING::from(path);
            let handle = unsafe {
                CreateFileW(
                    &wide,
                    GENERIC_READ.0 | GENERIC_WRITE.0,
                    FILE_SHARE_MODE(0),
                    None,
                    OPEN_EXISTING,
                    FILE_ATTRIBUTE_NORMAL,
                    HANDLE::default(),
                )
            }
            .map_err(|e| DeviceError::Open {
                path: path.to_string(),
                reason: e.to_string(),
            })?;

            if handle.is_invalid() || handle == INVALID_HANDLE_VALUE {
                return Err(DeviceError::InvalidHandle(path.to_string()));
            }
            Ok(handle)
        }

        fn control(&mut self, handle: &HANDLE, code: u32, input: &[u8]) -> bool {
            let mut returned = 0u32;
            let result = unsafe {
                DeviceIoControl(
                    *handle,
                    code,
                    Some(input.as_ptr().cast()),
                    input.len() as u32,
                    None,
                    0,
                    Some(&mut returned),
                    None,
                )
            };
            if let Err(err) = &result {
                log::debug!("DeviceIoControl failed: {err}");
            }
            result.is_ok()
        }

        fn close(&mut self, handle: HANDLE) {
            if let Err(err) = unsafe { CloseHandle(handle) } {
                log::warn!("CloseHandle returned an error: {err}");
            }
        }
    }
}
