//! WLAN device identifiers, modes and MAC addresses.

use std::fmt;

/// Name of the default station device.
pub const DEFAULT_DEVICE: &str = "wlan0";

/// Name of the secondary device.
pub const SECONDARY_DEVICE: &str = "wlan1";

/// A WLAN device name.
///
/// Scripts may pass a string, used verbatim, or an integer where `1` selects
/// `wlan1` and anything else selects `wlan0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceName(String);

impl DeviceName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Map an integer selector to a device name.
    pub fn from_index(index: i64) -> Self {
        match index {
            1 => Self::new(SECONDARY_DEVICE),
            _ => Self::new(DEFAULT_DEVICE),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DeviceName {
    fn default() -> Self {
        Self::new(DEFAULT_DEVICE)
    }
}

impl From<&str> for DeviceName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<i64> for DeviceName {
    fn from(index: i64) -> Self {
        Self::from_index(index)
    }
}

impl fmt::Display for DeviceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// WLAN operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WlanMode {
    #[default]
    None,
    Station,
    Ap,
}

impl WlanMode {
    /// Numeric value exposed to scripts (`NONE`, `STATION`, `AP`).
    pub fn code(self) -> i64 {
        match self {
            Self::None => 0,
            Self::Station => 1,
            Self::Ap => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::Station),
            2 => Some(Self::Ap),
            _ => None,
        }
    }
}

/// A 6-byte station MAC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Wrap raw octets. Returns `None` for the all-zero address, which
    /// drivers report before the hardware is up.
    pub fn new(octets: [u8; 6]) -> Option<Self> {
        if octets == [0; 6] {
            None
        } else {
            Some(Self(octets))
        }
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// 12-character uppercase hex form without separators.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02X}", b)).collect()
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
