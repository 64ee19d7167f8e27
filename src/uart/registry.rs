//! Fixed table of UARTs opened on behalf of scripts.

use super::{UartConfig, UartError, UartId, MAX_UART_COUNT, SCRIPT_UART_ID};
use crate::bridge::{BridgeMessage, BridgeSender};
use crate::driver::{SerialBackend, SerialPort};
use crate::script::{ScriptError, ScriptRuntime};
use log::{debug, info, warn};
use std::fmt;

/// Script-side receive callback: `(runtime, id, bytes_available)`.
pub type UartRxCallback =
    Box<dyn FnMut(&mut dyn ScriptRuntime, UartId, usize) -> Result<(), ScriptError>>;

/// An opened port and its callback. Exists only when fully set up.
struct DeviceSlot {
    config: UartConfig,
    port: Box<dyn SerialPort>,
    callback: UartRxCallback,
}

/// UART table owned by the scripting thread.
pub struct UartRegistry {
    backend: Box<dyn SerialBackend>,
    bridge: BridgeSender,
    slots: [Option<DeviceSlot>; MAX_UART_COUNT],
}

impl UartRegistry {
    pub fn new(backend: Box<dyn SerialBackend>, bridge: BridgeSender) -> Self {
        Self {
            backend,
            bridge,
            slots: Default::default(),
        }
    }

    fn slot_mut(&mut self, id: UartId) -> Option<&mut DeviceSlot> {
        self.slots.get_mut(id as usize).and_then(Option::as_mut)
    }

    /// Open and configure a UART, routing its data-ready signal to `callback`.
    ///
    /// The slot is only registered if every step succeeds. Setting up an
    /// already open id closes the old port first.
    pub fn setup<F>(&mut self, config: UartConfig, callback: F) -> Result<(), UartError>
    where
        F: FnMut(&mut dyn ScriptRuntime, UartId, usize) -> Result<(), ScriptError> + 'static,
    {
        let id = config.id;
        if id != SCRIPT_UART_ID {
            return Err(UartError::UnsupportedId(id));
        }
        config.validate()?;

        if self.is_open(id) {
            debug!("uart{} already open, closing before re-setup", id);
            self.close(id)?;
        }

        let name = config.device_name();
        let mut port = self
            .backend
            .find(&name)
            .ok_or_else(|| UartError::DeviceNotFound(name.clone()))?;
        port.configure(&config)?;

        let bridge = self.bridge.clone();
        port.open(Box::new(move |available: usize| {
            if let Err(e) = bridge.post(BridgeMessage::UartRx { id, available }) {
                warn!("uart{} rx signal lost: {}", id, e);
            }
        }))?;

        info!("Opened {}", config);
        self.slots[id as usize] = Some(DeviceSlot {
            config,
            port,
            callback: Box::new(callback),
        });
        Ok(())
    }

    /// Write to an open UART. Returns 0 if the id is not registered.
    pub fn write(&mut self, id: UartId, data: &[u8]) -> usize {
        match self.slot_mut(id) {
            Some(slot) => slot.port.write(data),
            None => 0,
        }
    }

    /// Read up to `len` bytes, at most the slot's buffer size per call.
    /// Empty if the id is not registered.
    pub fn read(&mut self, id: UartId, len: usize) -> Vec<u8> {
        let Some(slot) = self.slot_mut(id) else {
            return Vec::new();
        };
        let mut buf = vec![0u8; len.min(slot.config.buffer_size)];
        let n = slot.port.read(&mut buf);
        buf.truncate(n);
        buf
    }

    /// Close a UART. Closing an unregistered id succeeds.
    ///
    /// If the port refuses to close the slot stays registered.
    pub fn close(&mut self, id: UartId) -> Result<(), UartError> {
        let Some(slot) = self.slot_mut(id) else {
            return Ok(());
        };
        slot.port.close()?;
        self.slots[id as usize] = None;
        info!("Closed uart{}", id);
        Ok(())
    }

    pub fn is_open(&self, id: UartId) -> bool {
        matches!(self.slots.get(id as usize), Some(Some(_)))
    }

    /// Settings of an open UART.
    pub fn config(&self, id: UartId) -> Option<UartConfig> {
        self.slots
            .get(id as usize)
            .and_then(Option::as_ref)
            .map(|slot| slot.config)
    }

    /// Run the callback for a drained data-ready message.
    ///
    /// Signals for slots closed in the meantime are ignored.
    pub fn notify(
        &mut self,
        runtime: &mut dyn ScriptRuntime,
        id: UartId,
        available: usize,
    ) -> Result<(), ScriptError> {
        match self.slot_mut(id) {
            Some(slot) => (slot.callback)(runtime, id, available),
            None => {
                debug!("uart{} rx for closed slot ignored", id);
                Ok(())
            }
        }
    }

    /// Close every open slot, logging failures.
    pub fn close_all(&mut self) {
        for id in 0..MAX_UART_COUNT as UartId {
            if let Err(e) = self.close(id) {
                warn!("uart{} close failed: {}", id, e);
            }
        }
    }
}

impl fmt::Debug for UartRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let open: Vec<UartId> = (0..MAX_UART_COUNT as UartId)
            .filter(|id| self.is_open(*id))
            .collect();
        f.debug_struct("UartRegistry").field("open", &open).finish()
    }
}
