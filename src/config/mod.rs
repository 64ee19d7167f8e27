//! Bridge configuration.
//!
//! All fields have defaults, so an empty JSON object is a valid config.
//!
//! ```
//! use wlan_uart_bridge::config::BridgeConfig;
//!
//! let config = BridgeConfig::from_json_str(r#"{"queue_capacity": 64}"#).unwrap();
//! assert_eq!(config.queue_capacity, 64);
//! assert_eq!(config.default_device, "wlan0");
//! ```

use crate::bridge::{DEFAULT_QUEUE_CAPACITY, MAX_QUEUE_CAPACITY};
use crate::script::StatusCode;
use crate::wlan::DEFAULT_DEVICE;
use serde::Deserialize;
use std::fmt;
use std::path::Path;

/// Environment variable naming a JSON config file.
pub const CONFIG_ENV_VAR: &str = "BRIDGE_CONFIG";

/// Default stack size for connect worker threads.
pub const DEFAULT_WORKER_STACK_SIZE: usize = 16 * 1024;

/// Smallest accepted worker stack.
pub const MIN_WORKER_STACK_SIZE: usize = 4 * 1024;

/// Errors loading or validating configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Queue capacity must be at least 1.
    ZeroCapacity,
    /// Queue capacity above the maximum.
    CapacityTooLarge { capacity: usize, max: usize },
    /// Worker stack below the minimum.
    StackTooSmall { size: usize, min: usize },
    /// Default device name is empty.
    EmptyDevice,
    /// File could not be read.
    Io(String),
    /// JSON did not parse.
    InvalidFormat(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroCapacity => write!(f, "queue capacity must be at least 1"),
            Self::CapacityTooLarge { capacity, max } => {
                write!(f, "queue capacity too large: {} (max {})", capacity, max)
            }
            Self::StackTooSmall { size, min } => {
                write!(f, "worker stack too small: {} bytes (min {})", size, min)
            }
            Self::EmptyDevice => write!(f, "default device cannot be empty"),
            Self::Io(msg) => write!(f, "cannot read config: {}", msg),
            Self::InvalidFormat(msg) => write!(f, "invalid format: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl StatusCode for ConfigError {
    fn code(&self) -> i32 {
        match self {
            Self::Io(_) => 5,
            _ => 7,
        }
    }
}

/// Settings for one [`crate::EngineContext`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Bridge queue slots.
    pub queue_capacity: usize,
    /// Stack size for connect workers, in bytes.
    pub worker_stack_size: usize,
    /// Device used when an operation names none.
    pub default_device: String,
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(ConfigError::CapacityTooLarge {
                capacity: self.queue_capacity,
                max: MAX_QUEUE_CAPACITY,
            });
        }
        if self.worker_stack_size < MIN_WORKER_STACK_SIZE {
            return Err(ConfigError::StackTooSmall {
                size: self.worker_stack_size,
                min: MIN_WORKER_STACK_SIZE,
            });
        }
        if self.default_device.is_empty() {
            return Err(ConfigError::EmptyDevice);
        }
        Ok(())
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::InvalidFormat(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    /// Load from the file named by [`CONFIG_ENV_VAR`], or defaults if unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) if !path.is_empty() => Self::load(Path::new(&path)),
            _ => Ok(Self::default()),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            worker_stack_size: DEFAULT_WORKER_STACK_SIZE,
            default_device: DEFAULT_DEVICE.to_string(),
        }
    }
}
