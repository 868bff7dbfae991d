//! Simulated instruments
//!
//! Every simulated instrument keeps its state behind a shared handle, so a
//! test (or the dry-run binary) can inspect it through a probe after the
//! instrument itself has been moved into a run. Faults can be scripted per
//! operation and are consumed by the matching call.

pub mod clock;
pub mod fault;
pub mod laser;
pub mod logger;
pub mod power_supply;
pub mod pyrometer;

pub use clock::SimClock;
pub use fault::FaultScript;
pub use laser::{LaserProbe, SimLaser};
pub use logger::{LoggerProbe, SimLogger};
pub use power_supply::{SimPowerSupply, SupplyOp, SupplyProbe};
pub use pyrometer::{PyrometerProbe, SimPyrometer};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a shared simulator state, ignoring poisoning from a panicked test
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
