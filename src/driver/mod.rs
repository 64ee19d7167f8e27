//! Native driver seams.
//!
//! These traits stand in for the RTOS services the bridge sits on top of:
//! the WLAN manager, an out-of-band provisioning service (one-shot/AirKiss)
//! and serial devices. Callbacks registered through them may fire on any
//! thread, so every callback type is `Send + Sync`.
//!
//! Host builds use the simulated implementations in [`crate::sim`].

use crate::script::StatusCode;
use crate::uart::UartConfig;
use crate::wlan::{DeviceName, WlanMode};
use std::fmt;
use std::sync::Arc;

/// RT-Thread style generic error status.
const STATUS_ERROR: i32 = -1;
/// RT-Thread style "not supported" status.
const STATUS_NOSYS: i32 = -6;

/// Callback receiving raw native WLAN event codes.
pub type NativeEventHandler = Arc<dyn Fn(u32) + Send + Sync>;

/// Callback invoked by a provisioning service when it finishes.
pub type ProvisioningCallback = Arc<dyn Fn(ProvisioningReport) + Send + Sync>;

/// Receive-indicate hook: called with the number of bytes available.
pub type RxIndicate = Box<dyn Fn(usize) + Send + Sync>;

/// Errors reported by native drivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// A native call returned a non-zero status.
    Status(i32),
    /// The named device does not exist.
    DeviceNotFound(String),
    /// The driver does not implement this operation.
    NotSupported(&'static str),
}

impl DriverError {
    /// Native status code for this error.
    pub fn status(&self) -> i32 {
        match self {
            Self::Status(code) => *code,
            Self::DeviceNotFound(_) => STATUS_ERROR,
            Self::NotSupported(_) => STATUS_NOSYS,
        }
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(code) => write!(f, "driver returned status {}", code),
            Self::DeviceNotFound(name) => write!(f, "device not found: {}", name),
            Self::NotSupported(op) => write!(f, "operation not supported: {}", op),
        }
    }
}

impl std::error::Error for DriverError {}

impl StatusCode for DriverError {
    fn code(&self) -> i32 {
        self.status()
    }
}

/// WLAN management service.
///
/// `connect` and `disconnect` block until the native stack returns; the
/// bridge always calls `connect` from a dedicated worker thread.
pub trait WlanDriver: Send + Sync {
    /// Whether a device with this name is registered.
    fn device_exists(&self, device: &DeviceName) -> bool;

    /// Current mode of a device. Unknown devices report [`WlanMode::None`].
    fn mode(&self, device: &DeviceName) -> WlanMode;

    fn set_mode(&self, device: &DeviceName, mode: WlanMode) -> Result<(), DriverError>;

    /// Blocking station connect.
    fn connect(&self, ssid: &str, password: &str) -> Result<(), DriverError>;

    fn disconnect(&self) -> Result<(), DriverError>;

    fn is_connected(&self) -> bool;

    /// Whether the station has an IP address.
    fn is_ready(&self) -> bool;

    fn set_autoreconnect(&self, enable: bool);

    fn autoreconnect(&self) -> bool;

    /// Start a scan. Completion is reported by the scan-done event.
    fn scan(&self) -> Result<(), DriverError>;

    /// Number of results from the last scan.
    fn scan_result_count(&self) -> usize;

    /// Station MAC address, if the hardware has reported one.
    fn mac(&self) -> Option<[u8; 6]>;

    /// Signal strength. Positive in station mode, negative otherwise.
    fn rssi(&self) -> i32;

    /// Install the handler for all native WLAN events.
    fn set_event_handler(&self, handler: NativeEventHandler);
}

/// Provisioning protocol to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningProtocol {
    /// Vendor one-shot provisioning. `mode` is passed through untouched.
    OneShot { mode: i32 },
    /// WeChat AirKiss.
    AirKiss,
}

/// Result delivered by a provisioning service.
///
/// `state == 0` means success; the credentials are raw bytes as received
/// over the air.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningReport {
    pub state: i32,
    pub ssid: Option<Vec<u8>>,
    pub password: Option<Vec<u8>>,
}

impl ProvisioningReport {
    /// A successful report.
    pub fn success(ssid: impl Into<Vec<u8>>, password: Option<&[u8]>) -> Self {
        Self {
            state: 0,
            ssid: Some(ssid.into()),
            password: password.map(<[u8]>::to_vec),
        }
    }

    /// A failed report with no credentials.
    pub fn failure(state: i32) -> Self {
        Self {
            state,
            ssid: None,
            password: None,
        }
    }
}

/// Out-of-band credential delivery service.
pub trait ProvisioningService: Send + Sync {
    fn start(
        &self,
        protocol: ProvisioningProtocol,
        callback: ProvisioningCallback,
    ) -> Result<(), DriverError>;

    fn stop(&self);

    /// Native state value, passed through to scripts.
    fn state(&self) -> i32;
}

/// An opened or openable serial device.
pub trait SerialPort: Send {
    fn configure(&mut self, config: &UartConfig) -> Result<(), DriverError>;

    /// Open in interrupt-RX mode and install the receive-indicate hook.
    fn open(&mut self, rx_indicate: RxIndicate) -> Result<(), DriverError>;

    /// Returns the number of bytes written.
    fn write(&mut self, data: &[u8]) -> usize;

    /// Returns the number of bytes read into `buf`.
    fn read(&mut self, buf: &mut [u8]) -> usize;

    fn close(&mut self) -> Result<(), DriverError>;
}

/// Lookup of serial devices by name.
pub trait SerialBackend: Send {
    fn find(&mut self, name: &str) -> Option<Box<dyn SerialPort>>;
}
