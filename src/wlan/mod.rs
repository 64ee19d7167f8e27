//! WLAN management exposed to the scripting thread.
//!
//! - [`device`] - device names, modes and MAC addresses
//! - [`join`] - the shared last-join credentials
//! - [`event`] - native event mapping and link state
//! - [`dispatch`] - publishing notifications to scripts
//! - [`manager`] - the operations scripts call

pub mod device;
pub mod dispatch;
pub mod event;
pub mod join;
pub mod manager;

pub use device::{DeviceName, MacAddress, WlanMode, DEFAULT_DEVICE, SECONDARY_DEVICE};
pub use dispatch::{publish, ProvisioningOutcome, Published, PROVISIONING_TOPIC};
pub use event::{ApState, LinkState, Notification, StationState, WlanEvent, SCAN_REPORT_CODE};
pub use join::{JoinInfo, JoinState, MAX_PASSWORD_LEN, MAX_SSID_LEN, NATIVE_BUFFER_LEN};
pub use manager::{
    ConnectOutcome, ConnectTask, ProvisioningRequest, WlanError, WlanManager,
    CONNECT_THREAD_NAME, DEFAULT_ONESHOT_MODE,
};
