//! WLAN operations exposed to scripts.
//!
//! [`WlanManager`] is owned by the scripting-thread context. It forwards
//! queries to the native driver, keeps the shared [`JoinState`], launches
//! connect attempts on worker threads, and wires native WLAN and provisioning
//! callbacks into the bridge.

use super::device::{DeviceName, MacAddress, WlanMode};
use super::dispatch::ProvisioningOutcome;
use super::event::{LinkState, WlanEvent};
use super::join::{JoinInfo, JoinState};
use crate::bridge::{BridgeMessage, BridgeSender};
use crate::config::BridgeConfig;
use crate::driver::{
    DriverError, ProvisioningCallback, ProvisioningProtocol, ProvisioningReport,
    ProvisioningService, WlanDriver,
};
use crate::script::{ScriptValue, StatusCode};
use log::{debug, error, info, warn};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Name given to connect worker threads.
pub const CONNECT_THREAD_NAME: &str = "wlanj";

/// Default one-shot provisioning mode (UDP broadcast).
pub const DEFAULT_ONESHOT_MODE: i32 = 0;

/// Errors from WLAN operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WlanError {
    /// The connect worker thread could not be created.
    Spawn(String),
    /// SSID is empty.
    SsidEmpty,
    /// No device with this name is registered.
    DeviceNotFound(DeviceName),
    /// No provisioning service is attached.
    ProvisioningUnavailable,
    /// The native driver reported an error.
    Driver(DriverError),
}

impl fmt::Display for WlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn(e) => write!(f, "fail to create wlan thread: {}", e),
            Self::SsidEmpty => write!(f, "SSID cannot be empty"),
            Self::DeviceNotFound(name) => write!(f, "wlan device not found: {}", name),
            Self::ProvisioningUnavailable => write!(f, "no provisioning service available"),
            Self::Driver(e) => write!(f, "wlan driver error: {}", e),
        }
    }
}

impl std::error::Error for WlanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Driver(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DriverError> for WlanError {
    fn from(e: DriverError) -> Self {
        Self::Driver(e)
    }
}

impl StatusCode for WlanError {
    fn code(&self) -> i32 {
        match self {
            Self::Spawn(_) => 1,
            Self::SsidEmpty => 3,
            Self::DeviceNotFound(_) => 4,
            Self::ProvisioningUnavailable => 5,
            Self::Driver(e) => e.status(),
        }
    }
}

/// How a connect attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// The driver reported a successful connect.
    Connected,
    /// The driver refused or failed.
    Failed(DriverError),
    /// Cancelled before starting, or undone after completing.
    Cancelled,
    /// The worker ended without reporting (it panicked).
    WorkerLost,
}

/// Handle to a connect attempt running on its own thread.
///
/// The caller may await the outcome, block on it, cancel it, or simply drop
/// the handle; the attempt keeps running either way and its effects still
/// arrive as WLAN events over the bridge.
#[derive(Debug)]
pub struct ConnectTask {
    ssid: String,
    cancel: CancellationToken,
    finished: Arc<AtomicBool>,
    outcome: oneshot::Receiver<ConnectOutcome>,
}

impl ConnectTask {
    /// SSID this attempt targets.
    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    /// Request cancellation.
    ///
    /// If the worker has not called the driver yet it skips the connect. If
    /// the driver connect is already in flight and succeeds, the worker
    /// disconnects again and reports [`ConnectOutcome::Cancelled`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the worker has produced its outcome.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Non-blocking check. Returns the outcome once, then `None`.
    pub fn try_outcome(&mut self) -> Option<ConnectOutcome> {
        match self.outcome.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => None,
        }
    }

    /// Wait asynchronously for the outcome.
    pub async fn outcome(self) -> ConnectOutcome {
        self.outcome.await.unwrap_or(ConnectOutcome::WorkerLost)
    }

    /// Block the current thread until the outcome is known.
    ///
    /// Must not be called from within an async runtime.
    pub fn wait(self) -> ConnectOutcome {
        self.outcome
            .blocking_recv()
            .unwrap_or(ConnectOutcome::WorkerLost)
    }

    /// Abandon the attempt explicitly.
    pub fn detach(self) {
        debug!("connect attempt to {} detached", self.ssid);
    }
}

/// Start a blocking driver connect on a dedicated thread.
fn spawn_connect(
    driver: Arc<dyn WlanDriver>,
    info: JoinInfo,
    stack_size: usize,
    cancel: CancellationToken,
) -> Result<ConnectTask, WlanError> {
    let (tx, rx) = oneshot::channel();
    let ssid = info.ssid().to_string();
    let token = cancel.clone();
    let finished = Arc::new(AtomicBool::new(false));
    let done = finished.clone();

    thread::Builder::new()
        .name(CONNECT_THREAD_NAME.to_string())
        .stack_size(stack_size)
        .spawn(move || {
            let outcome = run_connect(driver.as_ref(), &info, &token);
            done.store(true, Ordering::Release);
            // The handle may have been dropped; that is fine.
            let _ = tx.send(outcome);
        })
        .map_err(|e| {
            error!("fail to create wlan-connect thread: {}", e);
            WlanError::Spawn(e.to_string())
        })?;

    Ok(ConnectTask {
        ssid,
        cancel,
        finished,
        outcome: rx,
    })
}

fn run_connect(driver: &dyn WlanDriver, info: &JoinInfo, cancel: &CancellationToken) -> ConnectOutcome {
    if cancel.is_cancelled() {
        debug!("connect to {} cancelled before start", info.ssid());
        return ConnectOutcome::Cancelled;
    }

    info!("Connecting to WiFi: {}", info.ssid());
    match driver.connect(info.ssid(), info.password()) {
        Ok(()) if cancel.is_cancelled() => {
            info!("connect to {} cancelled in flight, disconnecting", info.ssid());
            if let Err(e) = driver.disconnect() {
                warn!("disconnect after cancelled connect failed: {}", e);
            }
            ConnectOutcome::Cancelled
        }
        Ok(()) => ConnectOutcome::Connected,
        Err(e) => {
            warn!("connect to {} failed: {}", info.ssid(), e);
            ConnectOutcome::Failed(e)
        }
    }
}

/// What to start in [`WlanManager::start_provisioning`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvisioningRequest {
    pub protocol: ProvisioningProtocol,
    /// Connect with the received credentials as soon as they arrive.
    pub autojoin: bool,
}

impl ProvisioningRequest {
    pub fn oneshot(mode: i32, autojoin: bool) -> Self {
        Self {
            protocol: ProvisioningProtocol::OneShot { mode },
            autojoin,
        }
    }

    pub fn airkiss(autojoin: bool) -> Self {
        Self {
            protocol: ProvisioningProtocol::AirKiss,
            autojoin,
        }
    }
}

impl Default for ProvisioningRequest {
    fn default() -> Self {
        Self::oneshot(DEFAULT_ONESHOT_MODE, true)
    }
}

/// WLAN side of the scripting context.
pub struct WlanManager {
    driver: Arc<dyn WlanDriver>,
    provisioner: Option<Arc<dyn ProvisioningService>>,
    join: JoinState,
    bridge: BridgeSender,
    link: LinkState,
    default_device: DeviceName,
    worker_stack_size: usize,
    /// Parent of every connect task's token; cancelled on shutdown.
    tasks: CancellationToken,
}

impl WlanManager {
    /// Create the manager and route the driver's events into the bridge.
    pub fn new(driver: Arc<dyn WlanDriver>, bridge: BridgeSender, config: &BridgeConfig) -> Self {
        let sender = bridge.clone();
        driver.set_event_handler(Arc::new(move |code: u32| {
            debug!("wlan event -> {}", code);
            match WlanEvent::from_code(code) {
                Some(event) => {
                    if let Err(e) = sender.post(BridgeMessage::Wlan(event)) {
                        warn!("wlan event {} not delivered: {}", event, e);
                    }
                }
                None => debug!("ignoring unbridged wlan event {}", code),
            }
        }));

        Self {
            driver,
            provisioner: None,
            join: JoinState::new(),
            bridge,
            link: LinkState::new(),
            default_device: DeviceName::new(config.default_device.as_str()),
            worker_stack_size: config.worker_stack_size,
            tasks: CancellationToken::new(),
        }
    }

    /// Attach a provisioning service.
    pub fn with_provisioner(mut self, provisioner: Arc<dyn ProvisioningService>) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    fn device_or_default(&self, device: Option<DeviceName>) -> DeviceName {
        device.unwrap_or_else(|| self.default_device.clone())
    }

    // ==================== Mode ====================

    /// Mode of `device` (default device if `None`).
    pub fn mode(&self, device: Option<DeviceName>) -> WlanMode {
        self.driver.mode(&self.device_or_default(device))
    }

    /// Set the mode of `device`. Fails if the device is not registered.
    pub fn set_mode(&self, device: Option<DeviceName>, mode: WlanMode) -> Result<(), WlanError> {
        let device = self.device_or_default(device);
        if !self.driver.device_exists(&device) {
            debug!("set_mode: {} not found", device);
            return Err(WlanError::DeviceNotFound(device));
        }
        self.driver.set_mode(&device, mode)?;
        Ok(())
    }

    // ==================== Station ====================

    /// Store the credentials and launch a connect attempt.
    ///
    /// Returns as soon as the worker is running; success of the launch says
    /// nothing about success of the connection.
    pub fn connect(&mut self, ssid: &str, password: Option<&str>) -> Result<ConnectTask, WlanError> {
        let info = JoinInfo::from_parts(ssid, password.unwrap_or(""));
        if info.is_empty() {
            return Err(WlanError::SsidEmpty);
        }
        self.join.store(info.clone());

        let task = spawn_connect(
            self.driver.clone(),
            info,
            self.worker_stack_size,
            self.tasks.child_token(),
        )?;
        self.link.connect_requested();
        Ok(task)
    }

    /// Disconnect if connected. Returns true only if a connection was torn
    /// down.
    pub fn disconnect(&mut self) -> bool {
        if !self.driver.is_connected() {
            return false;
        }
        match self.driver.disconnect() {
            Ok(()) => {
                info!("Disconnected from WiFi");
                self.link.disconnect_requested();
                true
            }
            Err(e) => {
                warn!("disconnect failed: {}", e);
                false
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.driver.is_connected()
    }

    /// Whether the station has an IP address.
    pub fn is_ready(&self) -> bool {
        self.driver.is_ready()
    }

    /// Optionally change auto-reconnect, then report the current setting.
    pub fn autoreconnect(&self, enable: Option<bool>) -> bool {
        if let Some(enable) = enable {
            self.driver.set_autoreconnect(enable);
        }
        self.driver.autoreconnect()
    }

    /// Start a scan; completion arrives as `WLAN_SCAN_DONE`.
    pub fn scan(&mut self) -> Result<(), WlanError> {
        self.driver.scan()?;
        self.link.scan_requested();
        Ok(())
    }

    pub fn scan_info_count(&self) -> usize {
        self.driver.scan_result_count()
    }

    pub fn mac(&self) -> Option<MacAddress> {
        self.driver.mac().and_then(MacAddress::new)
    }

    /// MAC as a 12-character uppercase hex string.
    pub fn mac_hex(&self) -> Option<String> {
        self.mac().map(|mac| mac.to_hex())
    }

    /// MAC as 6 raw bytes.
    pub fn mac_raw(&self) -> Option<[u8; 6]> {
        self.mac().map(|mac| mac.octets())
    }

    pub fn rssi(&self) -> i32 {
        self.driver.rssi()
    }

    // ==================== Join info ====================

    /// Last stored credentials, or `None` if no SSID is stored.
    pub fn last_join_info(&self) -> Option<JoinInfo> {
        let info = self.join.snapshot();
        if info.is_empty() {
            None
        } else {
            Some(info)
        }
    }

    /// Script return values: nothing, `ssid`, or `ssid, password`.
    pub fn last_join_values(&self) -> Vec<ScriptValue> {
        match self.last_join_info() {
            None => Vec::new(),
            Some(info) if info.is_open() => vec![ScriptValue::from(info.ssid())],
            Some(info) => vec![
                ScriptValue::from(info.ssid()),
                ScriptValue::from(info.password()),
            ],
        }
    }

    /// Shared credential record, for producers outside this manager.
    pub fn join_state(&self) -> &JoinState {
        &self.join
    }

    // ==================== Provisioning ====================

    /// Start a provisioning service run.
    pub fn start_provisioning(&self, request: ProvisioningRequest) -> Result<(), WlanError> {
        let provisioner = self
            .provisioner
            .as_ref()
            .ok_or(WlanError::ProvisioningUnavailable)?;

        if request.protocol == ProvisioningProtocol::AirKiss {
            // AirKiss listens in station mode on the primary device
            if let Err(e) = self.driver.set_mode(&DeviceName::default(), WlanMode::Station) {
                warn!("could not switch to station mode for AirKiss: {}", e);
            }
        }

        info!("starting provisioning: {:?}", request);
        provisioner.start(request.protocol, self.provisioning_callback(request.autojoin))?;
        Ok(())
    }

    pub fn stop_provisioning(&self) {
        if let Some(provisioner) = &self.provisioner {
            provisioner.stop();
        }
    }

    /// Native provisioning state, or `None` without a service.
    pub fn provisioning_state(&self) -> Option<i32> {
        self.provisioner.as_ref().map(|p| p.state())
    }

    /// Callback handed to the provisioning service. Runs on its thread.
    fn provisioning_callback(&self, autojoin: bool) -> ProvisioningCallback {
        let join = self.join.clone();
        let bridge = self.bridge.clone();
        let driver = self.driver.clone();
        let stack_size = self.worker_stack_size;
        let tasks = self.tasks.clone();

        Arc::new(move |report: ProvisioningReport| {
            info!("provisioning callback state={}", report.state);
            let received = match (report.state, report.ssid.as_deref()) {
                (0, Some(ssid)) => {
                    Some(JoinInfo::from_raw(ssid, report.password.as_deref()))
                        .filter(|info| !info.is_empty())
                }
                _ => None,
            };

            let stored = join.reset_to(received);
            let outcome = if stored.is_empty() {
                ProvisioningOutcome::Failed
            } else {
                info!("provisioning received ssid {}", stored.ssid());
                ProvisioningOutcome::Succeeded(stored.clone())
            };

            if autojoin && outcome.is_success() {
                match spawn_connect(driver.clone(), stored, stack_size, tasks.child_token()) {
                    Ok(task) => task.detach(),
                    Err(e) => warn!("autojoin after provisioning failed: {}", e),
                }
            }

            if let Err(e) = bridge.post(BridgeMessage::Provisioning(outcome)) {
                warn!("provisioning result not delivered: {}", e);
            }
        })
    }

    // ==================== Link state ====================

    pub fn link(&self) -> &LinkState {
        &self.link
    }

    /// Apply a drained event to the link state.
    pub(crate) fn apply_event(&mut self, event: WlanEvent) {
        self.link.apply(event);
    }

    /// Cancel outstanding connect attempts and stop provisioning.
    pub fn shutdown(&mut self) {
        self.tasks.cancel();
        self.stop_provisioning();
    }
}

impl fmt::Debug for WlanManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WlanManager")
            .field("join", &self.join)
            .field("link", &self.link)
            .field("default_device", &self.default_device)
            .field("has_provisioner", &self.provisioner.is_some())
            .finish_non_exhaustive()
    }
}
