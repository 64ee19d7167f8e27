//! In-memory WLAN driver and provisioning service.

use super::lock;
use crate::driver::{
    DriverError, NativeEventHandler, ProvisioningCallback, ProvisioningProtocol,
    ProvisioningReport, ProvisioningService, WlanDriver,
};
use crate::wlan::{DeviceName, WlanEvent, WlanMode, DEFAULT_DEVICE};
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Status returned for a refused connect.
const STATUS_CONNECT_FAILED: i32 = -1;
/// Status returned when a helper thread cannot be created.
const STATUS_NO_MEMORY: i32 = -5;

/// Delay before a simulated scan completes.
const SCAN_DELAY: Duration = Duration::from_millis(10);

const DEFAULT_MAC: [u8; 6] = [0x02, 0x00, 0x5e, 0x10, 0x20, 0x30];

struct SimState {
    devices: HashMap<String, WlanMode>,
    networks: Vec<(String, String)>,
    connected: Option<String>,
    ready: bool,
    autoreconnect: bool,
    scan_results: usize,
    mac: [u8; 6],
}

/// Blocks simulated connects until released.
#[derive(Clone, Default)]
struct Gate {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Gate {
    fn close(&self) {
        *lock(&self.inner.0) = true;
    }

    fn open(&self) {
        *lock(&self.inner.0) = false;
        self.inner.1.notify_all();
    }

    fn pass(&self) {
        let mut closed = lock(&self.inner.0);
        while *closed {
            closed = match self.inner.1.wait(closed) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }
}

/// Handle returned by [`SimWlan::hold_connects`]. Releases on drop.
pub struct ConnectGate {
    gate: Gate,
}

impl ConnectGate {
    pub fn release(&self) {
        self.gate.open();
    }
}

impl Drop for ConnectGate {
    fn drop(&mut self) {
        self.gate.open();
    }
}

/// Counts driver work still running on background threads.
#[derive(Clone, Default)]
struct Busy {
    inner: Arc<(Mutex<usize>, Condvar)>,
}

impl Busy {
    fn enter(&self) {
        *lock(&self.inner.0) += 1;
    }

    fn leave(&self) {
        let mut count = lock(&self.inner.0);
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.inner.1.notify_all();
        }
    }

    fn wait_idle(&self, timeout: Duration) -> bool {
        let guard = lock(&self.inner.0);
        match self.inner.1.wait_timeout_while(guard, timeout, |count| *count > 0) {
            Ok((_, result)) => !result.timed_out(),
            Err(poisoned) => !poisoned.into_inner().1.timed_out(),
        }
    }
}

/// Simulated WLAN manager.
///
/// Events are delivered on the thread that causes them: the connect worker
/// for connect results, a helper thread for scan completion. Only `wlan0` is
/// registered unless more devices are added.
#[derive(Clone)]
pub struct SimWlan {
    state: Arc<Mutex<SimState>>,
    handler: Arc<Mutex<Option<NativeEventHandler>>>,
    gate: Gate,
    busy: Busy,
}

impl SimWlan {
    pub fn new() -> Self {
        let mut devices = HashMap::new();
        devices.insert(DEFAULT_DEVICE.to_string(), WlanMode::Station);
        Self {
            state: Arc::new(Mutex::new(SimState {
                devices,
                networks: Vec::new(),
                connected: None,
                ready: false,
                autoreconnect: false,
                scan_results: 0,
                mac: DEFAULT_MAC,
            })),
            handler: Arc::new(Mutex::new(None)),
            gate: Gate::default(),
            busy: Busy::default(),
        }
    }

    /// Add a reachable network. An empty password means open.
    pub fn with_network(self, ssid: &str, password: &str) -> Self {
        lock(&self.state)
            .networks
            .push((ssid.to_string(), password.to_string()));
        self
    }

    pub fn with_device(self, name: &str) -> Self {
        lock(&self.state)
            .devices
            .insert(name.to_string(), WlanMode::None);
        self
    }

    pub fn with_mac(self, mac: [u8; 6]) -> Self {
        lock(&self.state).mac = mac;
        self
    }

    /// Make every connect block until the returned gate is released.
    pub fn hold_connects(&self) -> ConnectGate {
        self.gate.close();
        ConnectGate {
            gate: self.gate.clone(),
        }
    }

    /// Wait for in-flight connects and scans. Returns false on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.busy.wait_idle(timeout)
    }

    /// Poll `condition` until it holds or `timeout` passes.
    pub fn wait_until<F>(&self, timeout: Duration, condition: F) -> bool
    where
        F: Fn(&Self) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            if condition(self) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }

    /// Deliver a raw native event code, as the RTOS would.
    pub fn emit_code(&self, code: u32) {
        let handler = lock(&self.handler).clone();
        match handler {
            Some(handler) => handler(code),
            None => debug!("sim wlan: no handler for event {}", code),
        }
    }

    fn emit(&self, event: WlanEvent) {
        self.emit_code(event.code());
    }

    /// A station joins the simulated access point.
    pub fn associate_client(&self) {
        self.emit(WlanEvent::ApAssociated);
    }

    pub fn disassociate_client(&self) {
        self.emit(WlanEvent::ApDisassociated);
    }

    /// The access point drops the station link.
    pub fn drop_link(&self) {
        let was_connected = {
            let mut state = lock(&self.state);
            state.ready = false;
            state.connected.take().is_some()
        };
        if was_connected {
            self.emit(WlanEvent::StaDisconnected);
        }
    }
}

impl Default for SimWlan {
    fn default() -> Self {
        Self::new()
    }
}

impl WlanDriver for SimWlan {
    fn device_exists(&self, device: &DeviceName) -> bool {
        lock(&self.state).devices.contains_key(device.as_str())
    }

    fn mode(&self, device: &DeviceName) -> WlanMode {
        lock(&self.state)
            .devices
            .get(device.as_str())
            .copied()
            .unwrap_or_default()
    }

    fn set_mode(&self, device: &DeviceName, mode: WlanMode) -> Result<(), DriverError> {
        let previous = {
            let mut state = lock(&self.state);
            let slot = state
                .devices
                .get_mut(device.as_str())
                .ok_or_else(|| DriverError::DeviceNotFound(device.to_string()))?;
            std::mem::replace(slot, mode)
        };
        match (previous, mode) {
            (WlanMode::Ap, WlanMode::Ap) => {}
            (_, WlanMode::Ap) => self.emit(WlanEvent::ApStart),
            (WlanMode::Ap, _) => self.emit(WlanEvent::ApStop),
            _ => {}
        }
        Ok(())
    }

    fn connect(&self, ssid: &str, password: &str) -> Result<(), DriverError> {
        self.busy.enter();
        self.gate.pass();

        let accepted = {
            let mut state = lock(&self.state);
            let known = state
                .networks
                .iter()
                .any(|(s, p)| s == ssid && p == password);
            if known {
                state.connected = Some(ssid.to_string());
                state.ready = true;
            } else {
                state.connected = None;
                state.ready = false;
            }
            known
        };

        let result = if accepted {
            self.emit(WlanEvent::StaConnected);
            self.emit(WlanEvent::Ready);
            Ok(())
        } else {
            self.emit(WlanEvent::StaConnectFailed);
            Err(DriverError::Status(STATUS_CONNECT_FAILED))
        };
        self.busy.leave();
        result
    }

    fn disconnect(&self) -> Result<(), DriverError> {
        self.drop_link();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        lock(&self.state).connected.is_some()
    }

    fn is_ready(&self) -> bool {
        lock(&self.state).ready
    }

    fn set_autoreconnect(&self, enable: bool) {
        lock(&self.state).autoreconnect = enable;
    }

    fn autoreconnect(&self) -> bool {
        lock(&self.state).autoreconnect
    }

    fn scan(&self) -> Result<(), DriverError> {
        self.busy.enter();
        let sim = self.clone();
        let spawned = thread::Builder::new()
            .name("sim-scan".to_string())
            .spawn(move || {
                thread::sleep(SCAN_DELAY);
                {
                    let mut state = lock(&sim.state);
                    state.scan_results = state.networks.len();
                }
                sim.emit(WlanEvent::ScanDone);
                sim.busy.leave();
            });
        if let Err(e) = spawned {
            warn!("sim wlan: scan thread failed: {}", e);
            self.busy.leave();
            return Err(DriverError::Status(STATUS_NO_MEMORY));
        }
        Ok(())
    }

    fn scan_result_count(&self) -> usize {
        lock(&self.state).scan_results
    }

    fn mac(&self) -> Option<[u8; 6]> {
        Some(lock(&self.state).mac)
    }

    fn rssi(&self) -> i32 {
        if self.is_connected() {
            55
        } else {
            -1
        }
    }

    fn set_event_handler(&self, handler: NativeEventHandler) {
        *lock(&self.handler) = Some(handler);
    }
}

struct ProvisionerState {
    state: i32,
    protocol: Option<ProvisioningProtocol>,
    callback: Option<ProvisioningCallback>,
}

/// Simulated provisioning service. A test drives completion explicitly.
pub struct SimProvisioner {
    inner: Mutex<ProvisionerState>,
}

impl SimProvisioner {
    /// Native state while a run is active.
    pub const RUNNING: i32 = 1;
    pub const IDLE: i32 = 0;

    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ProvisionerState {
                state: Self::IDLE,
                protocol: None,
                callback: None,
            }),
        }
    }

    pub fn last_protocol(&self) -> Option<ProvisioningProtocol> {
        lock(&self.inner).protocol
    }

    /// Finish the active run by invoking its callback on a separate thread.
    ///
    /// Blocks until the callback returns. Returns false if no run was active.
    pub fn complete(&self, report: ProvisioningReport) -> bool {
        let callback = {
            let mut inner = lock(&self.inner);
            inner.state = Self::IDLE;
            inner.callback.take()
        };
        let Some(callback) = callback else {
            warn!("sim provisioner: no active run");
            return false;
        };

        let spawned = thread::Builder::new()
            .name("sim-provision".to_string())
            .spawn(move || callback(report));
        match spawned {
            Ok(handle) => handle.join().is_ok(),
            Err(e) => {
                warn!("sim provisioner: callback thread failed: {}", e);
                false
            }
        }
    }
}

impl Default for SimProvisioner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProvisioningService for SimProvisioner {
    fn start(
        &self,
        protocol: ProvisioningProtocol,
        callback: ProvisioningCallback,
    ) -> Result<(), DriverError> {
        let mut inner = lock(&self.inner);
        inner.state = Self::RUNNING;
        inner.protocol = Some(protocol);
        inner.callback = Some(callback);
        Ok(())
    }

    fn stop(&self) {
        let mut inner = lock(&self.inner);
        inner.state = Self::IDLE;
        inner.callback = None;
    }

    fn state(&self) -> i32 {
        lock(&self.inner).state
    }
}
