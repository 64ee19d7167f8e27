//! Messages carried by the bridge.

use crate::script::{ScriptError, ScriptRuntime};
use crate::uart::UartId;
use crate::wlan::{ProvisioningOutcome, WlanEvent};
use std::fmt;

/// Handler run on the scripting thread for a [`BridgeMessage::Call`].
pub type CallHandler = Box<dyn FnOnce(&mut dyn ScriptRuntime) -> Result<(), ScriptError> + Send>;

/// A unit of work posted from native context to the scripting thread.
///
/// Every payload is typed; nothing travels as a bare integer or pointer.
pub enum BridgeMessage {
    /// A WLAN lifecycle event.
    Wlan(WlanEvent),
    /// A provisioning service finished.
    Provisioning(ProvisioningOutcome),
    /// Data is ready on a UART slot.
    UartRx { id: UartId, available: usize },
    /// Arbitrary handler for any other producer.
    Call {
        name: &'static str,
        handler: CallHandler,
    },
}

impl BridgeMessage {
    /// Wrap a closure as a [`BridgeMessage::Call`].
    pub fn call<F>(name: &'static str, handler: F) -> Self
    where
        F: FnOnce(&mut dyn ScriptRuntime) -> Result<(), ScriptError> + Send + 'static,
    {
        Self::Call {
            name,
            handler: Box::new(handler),
        }
    }

    /// Short label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Wlan(event) => event.topic(),
            Self::Provisioning(_) => "provisioning",
            Self::UartRx { .. } => "uart-rx",
            Self::Call { name, .. } => *name,
        }
    }
}

impl fmt::Debug for BridgeMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wlan(event) => f.debug_tuple("Wlan").field(event).finish(),
            Self::Provisioning(outcome) => f.debug_tuple("Provisioning").field(outcome).finish(),
            Self::UartRx { id, available } => f
                .debug_struct("UartRx")
                .field("id", id)
                .field("available", available)
                .finish(),
            Self::Call { name, .. } => f
                .debug_struct("Call")
                .field("name", name)
                .finish_non_exhaustive(),
        }
    }
}
