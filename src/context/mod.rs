//! The per-engine bridge context.
//!
//! An [`EngineContext`] belongs to the scripting thread. It owns the script
//! runtime, the consumer end of the bridge, the WLAN manager and the UART
//! table. Native callbacks only ever reach it through the bridge.

use crate::bridge::{
    dispatch_isolated, BridgeMessage, BridgeSender, BridgeStats, Dispatch, DrainReport,
    EventQueue,
};
use crate::config::{BridgeConfig, ConfigError};
use crate::driver::{ProvisioningService, SerialBackend, WlanDriver};
use crate::script::{ScriptError, ScriptRuntime};
use crate::uart::{UartConfig, UartError, UartId, UartRegistry};
use crate::wlan::{publish, WlanManager};
use log::{debug, info, warn};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Routes drained messages to their consumers.
struct Dispatcher<'a, R: ScriptRuntime> {
    runtime: &'a mut R,
    wlan: &'a mut WlanManager,
    uart: &'a mut UartRegistry,
}

impl<R: ScriptRuntime> Dispatch for Dispatcher<'_, R> {
    fn dispatch(&mut self, message: BridgeMessage) -> Result<(), ScriptError> {
        match message {
            BridgeMessage::Wlan(event) => {
                self.wlan.apply_event(event);
                publish(&mut *self.runtime, &event.notification())?;
            }
            BridgeMessage::Provisioning(outcome) => {
                publish(&mut *self.runtime, &outcome.notification())?;
            }
            BridgeMessage::UartRx { id, available } => {
                self.uart.notify(&mut *self.runtime, id, available)?;
            }
            BridgeMessage::Call { handler, .. } => handler(&mut *self.runtime)?,
        }
        Ok(())
    }
}

/// Bridge state for one scripting engine.
pub struct EngineContext<R: ScriptRuntime> {
    runtime: R,
    queue: EventQueue,
    sender: BridgeSender,
    wlan: WlanManager,
    uart: UartRegistry,
}

impl<R: ScriptRuntime> EngineContext<R> {
    /// Build the context and install the driver callbacks.
    pub fn new(
        runtime: R,
        driver: Arc<dyn WlanDriver>,
        serial: Box<dyn SerialBackend>,
        config: &BridgeConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let (sender, queue) = EventQueue::bounded(config.queue_capacity);
        let wlan = WlanManager::new(driver, sender.clone(), config);
        let uart = UartRegistry::new(serial, sender.clone());
        info!(
            "bridge context ready (queue {}, device {})",
            config.queue_capacity, config.default_device
        );
        Ok(Self {
            runtime,
            queue,
            sender,
            wlan,
            uart,
        })
    }

    /// Attach a provisioning service.
    pub fn with_provisioner(mut self, provisioner: Arc<dyn ProvisioningService>) -> Self {
        self.wlan = self.wlan.with_provisioner(provisioner);
        self
    }

    /// A producer handle for other native sources.
    pub fn sender(&self) -> BridgeSender {
        self.sender.clone()
    }

    pub fn stats(&self) -> &BridgeStats {
        self.queue.stats()
    }

    /// Messages waiting to be drained.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn runtime_mut(&mut self) -> &mut R {
        &mut self.runtime
    }

    pub fn wlan(&self) -> &WlanManager {
        &self.wlan
    }

    pub fn wlan_mut(&mut self) -> &mut WlanManager {
        &mut self.wlan
    }

    // ==================== UART ====================

    pub fn uart_setup<F>(&mut self, config: UartConfig, callback: F) -> Result<(), UartError>
    where
        F: FnMut(&mut dyn ScriptRuntime, UartId, usize) -> Result<(), ScriptError> + 'static,
    {
        self.uart.setup(config, callback)
    }

    pub fn uart_write(&mut self, id: UartId, data: &[u8]) -> usize {
        self.uart.write(id, data)
    }

    pub fn uart_read(&mut self, id: UartId, len: usize) -> Vec<u8> {
        self.uart.read(id, len)
    }

    pub fn uart_close(&mut self, id: UartId) -> Result<(), UartError> {
        self.uart.close(id)
    }

    pub fn uart(&self) -> &UartRegistry {
        &self.uart
    }

    // ==================== Consumer loops ====================

    fn dispatcher(&mut self) -> (&mut EventQueue, Dispatcher<'_, R>) {
        (
            &mut self.queue,
            Dispatcher {
                runtime: &mut self.runtime,
                wlan: &mut self.wlan,
                uart: &mut self.uart,
            },
        )
    }

    /// Dispatch everything currently queued, in order.
    pub fn drain(&mut self) -> DrainReport {
        let (queue, mut dispatcher) = self.dispatcher();
        queue.drain(&mut dispatcher)
    }

    /// Block for the next message, then drain the rest.
    ///
    /// Must not be called from inside an async runtime.
    pub fn wait_and_drain(&mut self) -> DrainReport {
        let (queue, mut dispatcher) = self.dispatcher();
        let mut report = DrainReport::default();
        if let Some(first) = queue.blocking_recv() {
            report.record(dispatch_isolated(&mut dispatcher, first));
            report += queue.drain(&mut dispatcher);
        }
        report
    }

    /// Dispatch messages as they arrive until `cancel` fires.
    ///
    /// The context keeps a sender of its own, so the loop only ends through
    /// cancellation.
    pub async fn run(&mut self, cancel: CancellationToken) -> DrainReport {
        let mut report = DrainReport::default();
        loop {
            let (queue, mut dispatcher) = self.dispatcher();
            let message = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("bridge run loop cancelled");
                    break;
                }
                message = queue.recv() => message,
            };
            match message {
                Some(message) => report.record(dispatch_isolated(&mut dispatcher, message)),
                None => break,
            }
        }
        report
    }

    /// Tear down: cancel pending connects, stop provisioning, close UARTs.
    ///
    /// Messages still queued are discarded. Returns the runtime.
    pub fn shutdown(mut self) -> R {
        self.wlan.shutdown();
        self.uart.close_all();
        let discarded = self.queue.len();
        if discarded > 0 {
            warn!("discarding {} queued bridge messages", discarded);
        }
        let stats = self.queue.stats();
        info!(
            "bridge context shut down (posted {}, dropped {})",
            stats.posted(),
            stats.dropped()
        );
        self.runtime
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::ProvisioningReport;
    use crate::script::{GlobalTable, ScriptValue, PUBLISH_FUNCTION};
    use crate::sim::{SimProvisioner, SimSerialBackend, SimWlan};
    use crate::wlan::{
        ApState, ConnectOutcome, ProvisioningRequest, StationState, WlanEvent, WlanMode,
    };
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::thread;
    use std::time::Duration;

    type Calls = Rc<RefCell<Vec<Vec<ScriptValue>>>>;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn recording_runtime() -> (GlobalTable, Calls) {
        let calls: Calls = Rc::new(RefCell::new(Vec::new()));
        let sink = calls.clone();
        let mut table = GlobalTable::new();
        table.register(PUBLISH_FUNCTION, move |args| {
            sink.borrow_mut().push(args.to_vec());
            Ok(())
        });
        (table, calls)
    }

    fn topics(calls: &Calls) -> Vec<String> {
        calls
            .borrow()
            .iter()
            .filter_map(|args| args.first().and_then(|v| v.as_str()).map(str::to_string))
            .collect()
    }

    fn context(
        driver: Arc<SimWlan>,
        serial: SimSerialBackend,
    ) -> (EngineContext<GlobalTable>, Calls) {
        init_logging();
        let (runtime, calls) = recording_runtime();
        let ctx = EngineContext::new(runtime, driver, Box::new(serial), &BridgeConfig::default())
            .unwrap();
        (ctx, calls)
    }

    // ==================== Construction Tests ====================

    #[test]
    fn test_invalid_config_rejected() {
        let config = BridgeConfig {
            queue_capacity: 0,
            ..BridgeConfig::default()
        };
        let result = EngineContext::new(
            GlobalTable::new(),
            Arc::new(SimWlan::new()),
            Box::new(SimSerialBackend::new()),
            &config,
        );
        assert!(matches!(result, Err(ConfigError::ZeroCapacity)));
    }

    #[test]
    fn test_oversized_queue_rejected() {
        let config = BridgeConfig {
            queue_capacity: usize::MAX,
            ..BridgeConfig::default()
        };
        let result = EngineContext::new(
            GlobalTable::new(),
            Arc::new(SimWlan::new()),
            Box::new(SimSerialBackend::new()),
            &config,
        );
        assert!(matches!(result, Err(ConfigError::CapacityTooLarge { .. })));
    }

    // ==================== WLAN Flow Tests ====================

    #[test]
    fn test_connect_publishes_events_in_order() {
        let driver = Arc::new(SimWlan::new().with_network("home", "password1"));
        let (mut ctx, calls) = context(driver, SimSerialBackend::new());

        let task = ctx.wlan_mut().connect("home", Some("password1")).unwrap();
        assert_eq!(task.wait(), ConnectOutcome::Connected);

        let report = ctx.drain();
        assert_eq!(report.dispatched, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(
            calls.borrow().clone(),
            vec![
                vec![ScriptValue::from("WLAN_STA_CONNECTED"), ScriptValue::Int(1)],
                vec![ScriptValue::from("WLAN_READY")],
            ]
        );
        assert_eq!(ctx.wlan().link().station(), StationState::Connected);
        assert!(ctx.wlan().link().is_ready());
    }

    #[test]
    fn test_failed_connect_publishes_zero() {
        let driver = Arc::new(SimWlan::new());
        let (mut ctx, calls) = context(driver, SimSerialBackend::new());

        let task = ctx.wlan_mut().connect("nowhere", None).unwrap();
        assert!(matches!(task.wait(), ConnectOutcome::Failed(_)));
        ctx.drain();

        assert_eq!(
            calls.borrow()[0],
            vec![ScriptValue::from("WLAN_STA_CONNECTED"), ScriptValue::Int(0)]
        );
        assert_eq!(ctx.wlan().link().station(), StationState::Disconnected);
    }

    #[test]
    fn test_ap_events_update_link_state() {
        let driver = Arc::new(SimWlan::new());
        let (mut ctx, calls) = context(driver.clone(), SimSerialBackend::new());

        ctx.wlan().set_mode(None, WlanMode::Ap).unwrap();
        driver.associate_client();
        driver.associate_client();
        driver.disassociate_client();
        ctx.drain();

        assert_eq!(ctx.wlan().link().ap(), ApState::Started { clients: 1 });
        assert_eq!(
            topics(&calls),
            vec![
                "WLAN_AP_START",
                "WLAN_AP_ASSOCIATED",
                "WLAN_AP_ASSOCIATED",
                "WLAN_AP_DISASSOCIATED"
            ]
        );
    }

    #[test]
    fn test_scan_report_is_not_bridged() {
        let driver = Arc::new(SimWlan::new());
        let (mut ctx, calls) = context(driver.clone(), SimSerialBackend::new());
        driver.emit_code(crate::wlan::SCAN_REPORT_CODE);
        driver.emit_code(42);
        assert_eq!(ctx.drain().total(), 0);
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn test_missing_publish_target_is_noop() {
        init_logging();
        let driver = Arc::new(SimWlan::new());
        let mut ctx = EngineContext::new(
            GlobalTable::new(),
            driver.clone(),
            Box::new(SimSerialBackend::new()),
            &BridgeConfig::default(),
        )
        .unwrap();

        driver.emit_code(WlanEvent::Ready.code());
        let report = ctx.drain();
        assert_eq!(report.dispatched, 1);
        assert_eq!(report.failed, 0);
    }

    #[test]
    fn test_failing_publish_does_not_stop_drain() {
        init_logging();
        let driver = Arc::new(SimWlan::new());
        let mut runtime = GlobalTable::new();
        let seen = Rc::new(RefCell::new(0));
        let counter = seen.clone();
        runtime.register(PUBLISH_FUNCTION, move |args| {
            *counter.borrow_mut() += 1;
            if args.first().and_then(|v| v.as_str()) == Some("WLAN_READY") {
                return Err(ScriptError::new("subscriber error"));
            }
            Ok(())
        });
        let mut ctx = EngineContext::new(
            runtime,
            driver.clone(),
            Box::new(SimSerialBackend::new()),
            &BridgeConfig::default(),
        )
        .unwrap();

        driver.emit_code(WlanEvent::Ready.code());
        driver.emit_code(WlanEvent::ScanDone.code());
        let report = ctx.drain();
        assert_eq!(report.failed, 1);
        assert_eq!(report.dispatched, 1);
        assert_eq!(*seen.borrow(), 2);
    }

    #[test]
    fn test_panicking_call_does_not_stop_drain() {
        let driver = Arc::new(SimWlan::new());
        let (mut ctx, calls) = context(driver.clone(), SimSerialBackend::new());
        let sender = ctx.sender();

        sender
            .post_call("boom", |_| panic!("handler exploded"))
            .unwrap();
        driver.emit_code(WlanEvent::Ready.code());

        let report = ctx.drain();
        assert_eq!(report.failed, 1);
        assert_eq!(report.dispatched, 1);
        assert_eq!(topics(&calls), vec!["WLAN_READY"]);
    }

    #[test]
    fn test_queue_full_drops_are_counted() {
        init_logging();
        let driver = Arc::new(SimWlan::new());
        let config = BridgeConfig {
            queue_capacity: 2,
            ..BridgeConfig::default()
        };
        let (runtime, calls) = recording_runtime();
        let mut ctx =
            EngineContext::new(runtime, driver.clone(), Box::new(SimSerialBackend::new()), &config)
                .unwrap();

        for _ in 0..5 {
            driver.emit_code(WlanEvent::ScanDone.code());
        }
        assert_eq!(ctx.pending(), 2);
        assert_eq!(ctx.stats().dropped(), 3);
        assert_eq!(ctx.stats().posted(), 2);

        assert_eq!(ctx.drain().dispatched, 2);
        assert_eq!(calls.borrow().len(), 2);
    }

    #[test]
    fn test_fifo_across_threads() {
        let driver = Arc::new(SimWlan::new());
        let (mut ctx, _calls) = context(driver, SimSerialBackend::new());

        let producers: Vec<_> = (0..3i64)
            .map(|producer| {
                let sender = ctx.sender();
                thread::spawn(move || {
                    for seq in 0..5i64 {
                        sender
                            .post_call("seq", move |rt| {
                                rt.call_global(
                                    "record",
                                    &[ScriptValue::Int(producer), ScriptValue::Int(seq)],
                                )
                                .unwrap_or(Ok(()))
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        let order = Rc::new(RefCell::new(Vec::new()));
        let sink = order.clone();
        ctx.runtime_mut().register("record", move |args| {
            let producer = args[0].as_int().unwrap();
            let seq = args[1].as_int().unwrap();
            sink.borrow_mut().push((producer, seq));
            Ok(())
        });

        assert_eq!(ctx.drain().dispatched, 15);
        let order = order.borrow();
        for producer in 0..3 {
            let seqs: Vec<i64> = order
                .iter()
                .filter(|(p, _)| *p == producer)
                .map(|(_, s)| *s)
                .collect();
            assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
        }
    }

    // ==================== Join Info Tests ====================

    #[test]
    fn test_last_join_info_visible_before_worker_completes() {
        let driver = Arc::new(SimWlan::new().with_network("office", "password2"));
        let gate = driver.hold_connects();
        let (mut ctx, _calls) = context(driver, SimSerialBackend::new());

        let task = ctx.wlan_mut().connect("office", Some("password2")).unwrap();
        assert_eq!(
            ctx.wlan().last_join_values(),
            vec![ScriptValue::from("office"), ScriptValue::from("password2")]
        );
        gate.release();
        assert_eq!(task.wait(), ConnectOutcome::Connected);
    }

    // ==================== Provisioning Tests ====================

    #[test]
    fn test_provisioning_success_publishes_credentials() {
        let driver = Arc::new(SimWlan::new());
        let provisioner = Arc::new(SimProvisioner::new());
        let (ctx, calls) = context(driver, SimSerialBackend::new());
        let mut ctx = ctx.with_provisioner(provisioner.clone());

        ctx.wlan()
            .start_provisioning(ProvisioningRequest::oneshot(0, false))
            .unwrap();
        assert!(provisioner.complete(ProvisioningReport::success(
            "lab",
            Some(b"labpass1".as_slice())
        )));
        ctx.drain();

        assert_eq!(
            calls.borrow().clone(),
            vec![vec![
                ScriptValue::from("WLAN_PW_RE"),
                ScriptValue::Int(1),
                ScriptValue::from("lab"),
                ScriptValue::from("labpass1"),
            ]]
        );
    }

    #[test]
    fn test_provisioning_failure_publishes_no_credentials() {
        let driver = Arc::new(SimWlan::new());
        let provisioner = Arc::new(SimProvisioner::new());
        let (ctx, calls) = context(driver, SimSerialBackend::new());
        let mut ctx = ctx.with_provisioner(provisioner.clone());

        ctx.wlan_mut().connect("old", Some("oldpass1")).unwrap().detach();
        ctx.wlan()
            .start_provisioning(ProvisioningRequest::airkiss(true))
            .unwrap();
        assert!(provisioner.complete(ProvisioningReport::failure(-2)));
        ctx.drain();

        assert!(ctx.wlan().last_join_info().is_none());
        let published = calls.borrow();
        let pw_re: Vec<_> = published
            .iter()
            .filter(|args| args.first().and_then(|v| v.as_str()) == Some("WLAN_PW_RE"))
            .collect();
        assert_eq!(pw_re.len(), 1);
        assert_eq!(
            *pw_re[0],
            vec![ScriptValue::from("WLAN_PW_RE"), ScriptValue::Int(0)]
        );
    }

    // ==================== UART Tests ====================

    #[test]
    fn test_uart_rx_reaches_script_callback() {
        let serial = SimSerialBackend::new().with_port("uart1");
        let port = serial.port("uart1").unwrap();
        let (mut ctx, calls) = context(Arc::new(SimWlan::new()), serial);

        ctx.uart_setup(UartConfig::default(), |rt, id, available| {
            rt.call_global(
                PUBLISH_FUNCTION,
                &[
                    ScriptValue::from("UART_RX"),
                    ScriptValue::Int(i64::from(id)),
                    ScriptValue::Int(available as i64),
                ],
            )
            .unwrap_or(Ok(()))
        })
        .unwrap();

        let isr = thread::spawn(move || port.receive(b"hello"));
        isr.join().unwrap();

        assert_eq!(ctx.drain().dispatched, 1);
        assert_eq!(
            calls.borrow()[0],
            vec![
                ScriptValue::from("UART_RX"),
                ScriptValue::Int(1),
                ScriptValue::Int(5)
            ]
        );
        assert_eq!(ctx.uart_read(1, 16), b"hello");
        assert_eq!(ctx.uart_write(1, b"bye"), 3);
        assert_eq!(ctx.uart_close(1), Ok(()));
        assert_eq!(ctx.uart_write(1, b"bye"), 0);
    }

    #[test]
    fn test_uart_read_huge_len_is_bounded() {
        let serial = SimSerialBackend::new().with_port("uart1");
        let port = serial.port("uart1").unwrap();
        let (mut ctx, _calls) = context(Arc::new(SimWlan::new()), serial);

        ctx.uart_setup(UartConfig::default(), |_, _, _| Ok(())).unwrap();
        port.receive(b"ping");
        assert_eq!(ctx.uart_read(1, usize::MAX), b"ping");
    }

    #[test]
    fn test_rx_queued_before_close_is_ignored() {
        let serial = SimSerialBackend::new().with_port("uart1");
        let port = serial.port("uart1").unwrap();
        let (mut ctx, calls) = context(Arc::new(SimWlan::new()), serial);

        ctx.uart_setup(UartConfig::default(), |rt, _, _| {
            rt.call_global(PUBLISH_FUNCTION, &[ScriptValue::from("UART_RX")])
                .unwrap_or(Ok(()))
        })
        .unwrap();
        port.receive(b"late");
        ctx.uart_close(1).unwrap();

        assert_eq!(ctx.drain().dispatched, 1);
        assert!(calls.borrow().is_empty());
    }

    // ==================== Loop Tests ====================

    #[test]
    fn test_wait_and_drain_blocks_for_producer() {
        let driver = Arc::new(SimWlan::new().with_network("a", ""));
        let (mut ctx, calls) = context(driver.clone(), SimSerialBackend::new());

        ctx.wlan_mut().scan().unwrap();
        let report = ctx.wait_and_drain();
        assert_eq!(report.total(), 1);
        assert_eq!(topics(&calls), vec!["WLAN_SCAN_DONE"]);
        assert_eq!(ctx.wlan().scan_info_count(), 1);
        assert_eq!(ctx.wlan().link().station(), StationState::Idle);
    }

    #[tokio::test]
    async fn test_run_until_cancelled() {
        let driver = Arc::new(SimWlan::new());
        let (mut ctx, calls) = context(driver.clone(), SimSerialBackend::new());
        let cancel = CancellationToken::new();
        let sender = ctx.sender();
        let stop = cancel.clone();

        let producer = thread::spawn(move || {
            driver.emit_code(WlanEvent::ApStart.code());
            driver.emit_code(WlanEvent::ApStop.code());
            sender
                .post_call("stop", move |_| {
                    stop.cancel();
                    Ok(())
                })
                .unwrap();
        });

        let report = ctx.run(cancel).await;
        producer.join().unwrap();
        assert_eq!(report.dispatched, 3);
        assert_eq!(topics(&calls), vec!["WLAN_AP_START", "WLAN_AP_STOP"]);
    }

    #[test]
    fn test_shutdown_closes_uart_and_stops_provisioning() {
        let serial = SimSerialBackend::new().with_port("uart1");
        let port = serial.port("uart1").unwrap();
        let driver = Arc::new(SimWlan::new());
        let provisioner = Arc::new(SimProvisioner::new());
        let (ctx, _calls) = context(driver.clone(), serial);
        let mut ctx = ctx.with_provisioner(provisioner.clone());

        ctx.uart_setup(UartConfig::default(), |_, _, _| Ok(())).unwrap();
        ctx.wlan()
            .start_provisioning(ProvisioningRequest::default())
            .unwrap();

        let runtime = ctx.shutdown();
        assert!(runtime.contains(PUBLISH_FUNCTION));
        assert!(!port.is_open());
        assert_eq!(provisioner.state(), SimProvisioner::IDLE);
        assert!(driver.wait_idle(Duration::from_secs(1)));
    }
}
