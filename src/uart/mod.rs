//! UART access for scripts.
//!
//! Only `uart1` can be opened from scripts; slot 0 belongs to the system
//! console. Data-ready signals arrive from the driver's interrupt context and
//! reach the script callback through the bridge.

mod config;
mod registry;

pub use config::{
    BitOrder, Parity, StopBits, UartConfig, DEFAULT_BAUD_RATE, DEFAULT_BUFFER_SIZE,
    MAX_BUFFER_SIZE,
};
pub use registry::{UartRegistry, UartRxCallback};

use crate::driver::DriverError;
use crate::script::StatusCode;
use std::fmt;

/// UART number, as in the device name `uart<N>`.
pub type UartId = u8;

/// Size of the UART table.
pub const MAX_UART_COUNT: usize = 2;

/// The only UART scripts may configure.
pub const SCRIPT_UART_ID: UartId = 1;

/// Errors from UART operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UartError {
    /// This id cannot be used from scripts.
    UnsupportedId(UartId),
    /// The backend has no device with this name.
    DeviceNotFound(String),
    /// Line settings are out of range.
    InvalidConfig(String),
    /// The driver failed.
    Driver(DriverError),
}

impl fmt::Display for UartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedId(id) => write!(f, "uart{} is not available", id),
            Self::DeviceNotFound(name) => write!(f, "uart device not found: {}", name),
            Self::InvalidConfig(msg) => write!(f, "invalid uart config: {}", msg),
            Self::Driver(e) => write!(f, "uart driver error: {}", e),
        }
    }
}

impl std::error::Error for UartError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Driver(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DriverError> for UartError {
    fn from(e: DriverError) -> Self {
        Self::Driver(e)
    }
}

impl StatusCode for UartError {
    fn code(&self) -> i32 {
        match self {
            Self::UnsupportedId(_) => 2,
            Self::DeviceNotFound(_) => 4,
            Self::InvalidConfig(_) => 7,
            Self::Driver(e) => e.status(),
        }
    }
}
