//! Simulated drivers for host builds and tests.
//!
//! They call back from their own threads the way RTOS drivers do, so the
//! bridge is exercised under the same conditions as on hardware.

mod serial;
mod wlan;

pub use serial::{SimSerialBackend, SimSerialPort};
pub use wlan::{ConnectGate, SimProvisioner, SimWlan};

use log::warn;
use std::sync::{Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("sim mutex was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}
