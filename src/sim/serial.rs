//! In-memory serial devices.

use super::lock;
use crate::driver::{DriverError, RxIndicate, SerialBackend, SerialPort};
use crate::uart::UartConfig;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

const STATUS_IO_ERROR: i32 = -1;

#[derive(Default)]
struct PortState {
    config: Option<UartConfig>,
    open: bool,
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    rx_indicate: Option<RxIndicate>,
    fail_open: bool,
    fail_close: bool,
    close_count: usize,
}

/// A serial device shared between the backend and the test driving it.
#[derive(Clone, Default)]
pub struct SimSerialPort {
    state: Arc<Mutex<PortState>>,
}

impl SimSerialPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes arrive on the line. Fires the receive-indicate hook if open.
    pub fn receive(&self, data: &[u8]) {
        let mut state = lock(&self.state);
        if !state.open {
            return;
        }
        state.rx.extend(data);
        let available = state.rx.len();
        if let Some(indicate) = &state.rx_indicate {
            indicate(available);
        }
    }

    /// Everything written so far.
    pub fn written(&self) -> Vec<u8> {
        lock(&self.state).tx.clone()
    }

    pub fn is_open(&self) -> bool {
        lock(&self.state).open
    }

    pub fn config(&self) -> Option<UartConfig> {
        lock(&self.state).config
    }

    pub fn close_count(&self) -> usize {
        lock(&self.state).close_count
    }

    pub fn fail_open(&self, fail: bool) {
        lock(&self.state).fail_open = fail;
    }

    pub fn fail_close(&self, fail: bool) {
        lock(&self.state).fail_close = fail;
    }
}

impl SerialPort for SimSerialPort {
    fn configure(&mut self, config: &UartConfig) -> Result<(), DriverError> {
        lock(&self.state).config = Some(*config);
        Ok(())
    }

    fn open(&mut self, rx_indicate: RxIndicate) -> Result<(), DriverError> {
        let mut state = lock(&self.state);
        if state.fail_open {
            return Err(DriverError::Status(STATUS_IO_ERROR));
        }
        state.open = true;
        state.rx_indicate = Some(rx_indicate);
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> usize {
        let mut state = lock(&self.state);
        if !state.open {
            return 0;
        }
        state.tx.extend_from_slice(data);
        data.len()
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        let mut state = lock(&self.state);
        let n = buf.len().min(state.rx.len());
        for (dst, src) in buf.iter_mut().zip(state.rx.drain(..n)) {
            *dst = src;
        }
        n
    }

    fn close(&mut self) -> Result<(), DriverError> {
        let mut state = lock(&self.state);
        if state.fail_close {
            return Err(DriverError::Status(STATUS_IO_ERROR));
        }
        state.open = false;
        state.rx_indicate = None;
        state.close_count += 1;
        Ok(())
    }
}

/// Named set of [`SimSerialPort`]s.
#[derive(Clone, Default)]
pub struct SimSerialBackend {
    ports: HashMap<String, SimSerialPort>,
}

impl SimSerialBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_port(mut self, name: &str) -> Self {
        self.ports.insert(name.to_string(), SimSerialPort::new());
        self
    }

    /// Test-side handle to a port.
    pub fn port(&self, name: &str) -> Option<SimSerialPort> {
        self.ports.get(name).cloned()
    }
}

impl SerialBackend for SimSerialBackend {
    fn find(&mut self, name: &str) -> Option<Box<dyn SerialPort>> {
        self.ports
            .get(name)
            .cloned()
            .map(|port| Box::new(port) as Box<dyn SerialPort>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_receive_when_closed_is_dropped() {
        let mut port = SimSerialPort::new();
        port.receive(b"lost");
        let mut buf = [0u8; 8];
        assert_eq!(port.read(&mut buf), 0);
    }

    #[test]
    fn test_indicate_reports_backlog() {
        let mut port = SimSerialPort::new();
        let last = Arc::new(AtomicUsize::new(0));
        let sink = last.clone();
        port.open(Box::new(move |n: usize| sink.store(n, Ordering::SeqCst)))
            .unwrap();
        port.receive(b"ab");
        port.receive(b"cd");
        assert_eq!(last.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_backend_lookup() {
        let mut backend = SimSerialBackend::new().with_port("uart1");
        assert!(backend.find("uart1").is_some());
        assert!(backend.find("uart2").is_none());
    }
}
