//! Host demo of the WLAN/UART bridge against the simulated drivers.
//!
//! Runs a short scenario (connect, scan, UART loopback, provisioning) and
//! then keeps draining the bridge until Ctrl+C.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin host-bridge
//! BRIDGE_CONFIG=bridge.json cargo run --bin host-bridge
//! ```

use log::{error, info, warn};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wlan_uart_bridge::driver::ProvisioningReport;
use wlan_uart_bridge::script::PUBLISH_FUNCTION;
use wlan_uart_bridge::sim::{SimProvisioner, SimSerialBackend, SimWlan};
use wlan_uart_bridge::wlan::ProvisioningRequest;
use wlan_uart_bridge::{
    error_values, BridgeConfig, EngineContext, GlobalTable, ScriptValue, UartConfig, WlanMode,
};

const DEMO_SSID: &str = "demo-net";
const DEMO_PASSWORD: &str = "demo-pass";

fn script_runtime() -> GlobalTable {
    let mut runtime = GlobalTable::new();
    runtime.register(PUBLISH_FUNCTION, |args: &[ScriptValue]| {
        let rendered: Vec<String> = args.iter().map(ToString::to_string).collect();
        info!("{}({})", PUBLISH_FUNCTION, rendered.join(", "));
        Ok(())
    });
    runtime
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("=== WLAN/UART bridge host demo starting ===");

    let config = match BridgeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let driver = Arc::new(SimWlan::new().with_network(DEMO_SSID, DEMO_PASSWORD));
    let provisioner = Arc::new(SimProvisioner::new());
    let serial = SimSerialBackend::new().with_port("uart1");
    let uart_line = serial.port("uart1");

    let mut ctx = match EngineContext::new(script_runtime(), driver, Box::new(serial), &config)
    {
        Ok(ctx) => ctx.with_provisioner(provisioner.clone()),
        Err(e) => {
            error!("Failed to create bridge context: {}", e);
            std::process::exit(1);
        }
    };

    // Station connect; the result arrives as WLAN_STA_CONNECTED
    if let Err(e) = ctx.wlan().set_mode(None, WlanMode::Station) {
        warn!("set_mode failed: {:?}", error_values(&e));
    }
    match ctx.wlan_mut().connect(DEMO_SSID, Some(DEMO_PASSWORD)) {
        Ok(task) => task.detach(),
        Err(e) => warn!("connect failed: {:?}", error_values(&e)),
    }
    if let Err(e) = ctx.wlan_mut().scan() {
        warn!("scan failed: {:?}", error_values(&e));
    }

    // UART echo: whatever arrives is reported to scripts
    let uart = ctx.uart_setup(UartConfig::default(), |runtime, id, available| {
        runtime
            .call_global(
                PUBLISH_FUNCTION,
                &[
                    ScriptValue::from("UART_RX"),
                    ScriptValue::Int(i64::from(id)),
                    ScriptValue::Int(available as i64),
                ],
            )
            .unwrap_or(Ok(()))
    });
    match (uart, uart_line) {
        (Ok(()), Some(line)) => {
            info!("uart1 open, injecting test data");
            line.receive(b"+READY\r\n");
        }
        (Err(e), _) => warn!("uart setup failed: {:?}", error_values(&e)),
        (Ok(()), None) => {}
    }

    // Provisioning delivers fresh credentials and rejoins
    match ctx
        .wlan()
        .start_provisioning(ProvisioningRequest::oneshot(0, true))
    {
        Ok(()) => {
            let report =
                ProvisioningReport::success(DEMO_SSID, Some(DEMO_PASSWORD.as_bytes()));
            if !provisioner.complete(report) {
                warn!("provisioning did not complete");
            }
        }
        Err(e) => warn!("provisioning unavailable: {:?}", error_values(&e)),
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        on_signal.cancel();
    });

    info!("Draining bridge (Ctrl+C to exit)...");
    let report = ctx.run(cancel).await;
    info!(
        "Run loop finished: {} dispatched, {} failed",
        report.dispatched, report.failed
    );

    if let Some(info) = ctx.wlan().last_join_info() {
        info!("Last joined network: {}", info.ssid());
    }
    ctx.shutdown();
    info!("=== WLAN/UART bridge host demo stopped ===");
}
