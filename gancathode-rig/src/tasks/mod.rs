//! Run tasks
//!
//! Each run owns its instruments on a dedicated worker thread and reports
//! through listeners.

mod common;
pub mod heat_cleaning;
pub mod nea;
pub mod worker;

use std::time::Duration;

use gancathode_core::state::StopReason;

pub use common::Listener;
pub use heat_cleaning::HeatCleaningRunner;
pub use nea::NeaRunner;
pub use worker::{spawn_heat_cleaning, spawn_nea, RunHandle};

/// Outcome of a run that ended without a fatal error
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    /// Why the run ended
    pub reason: StopReason,
    /// Records produced
    pub ticks: u32,
    /// Ticks that started late because the previous one overran
    pub overruns: u32,
    /// Device timeouts absorbed
    pub transient_faults: u32,
    /// Log writes that failed
    pub log_failures: u32,
    /// Time from the first tick to the end of the run
    pub elapsed: Duration,
}
