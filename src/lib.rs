//! WLAN and UART bridge for an embedded scripting engine.
//!
//! Native WLAN, provisioning and serial callbacks fire on arbitrary threads.
//! This library funnels them through a bounded queue to the single scripting
//! thread, which drains it and publishes named notifications to scripts.
//!
//! Everything except the driver implementations is platform-independent and
//! tested on the host against the simulated drivers in [`sim`].

pub mod bridge;
pub mod config;
pub mod context;
pub mod driver;
pub mod script;
pub mod sim;
pub mod uart;
pub mod wlan;

// Re-export commonly used items
pub use bridge::{BridgeError, BridgeMessage, BridgeSender, DrainReport, EventQueue};
pub use config::{BridgeConfig, ConfigError};
pub use context::EngineContext;
pub use script::{error_values, GlobalTable, ScriptRuntime, ScriptValue, StatusCode};
pub use uart::{UartConfig, UartError};
pub use wlan::{ConnectTask, DeviceName, JoinInfo, WlanError, WlanEvent, WlanManager, WlanMode};
