//! Simulated data logger
//!
//! Channels return fixed voltages set through the probe. One channel can be
//! wired to a [`LaserProbe`] to act as the photocurrent shunt: it reads
//! `dark + emitted_mw * volts_per_mw`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gancathode_core::scheduler::Clock;
use gancathode_core::traits::{DataLogger, VoltageUnit};
use gancathode_core::DeviceError;

use super::clock::SimClock;
use super::fault::FaultScript;
use super::laser::LaserProbe;
use super::lock;

#[derive(Debug, Clone)]
struct Photodiode {
    channel: u16,
    dark_volts: f64,
    volts_per_mw: f64,
    laser: LaserProbe,
}

#[derive(Debug, Default)]
struct LoggerState {
    voltages: HashMap<u16, f64>,
    photodiode: Option<Photodiode>,
    reads: Vec<u16>,
    faults: FaultScript<u16>,
}

impl LoggerState {
    fn sample(&self, channel: u16) -> f64 {
        if let Some(pd) = &self.photodiode {
            if pd.channel == channel {
                return pd.dark_volts + pd.laser.emitted_mw() * pd.volts_per_mw;
            }
        }
        // Unknown channels behave like a failed channel: NaN, not an error
        self.voltages.get(&channel).copied().unwrap_or(f64::NAN)
    }
}

/// Simulated multi-channel voltage logger
#[derive(Debug, Default)]
pub struct SimLogger {
    state: Arc<Mutex<LoggerState>>,
    clock: Option<SimClock>,
}

/// Inspection and scripting handle for a [`SimLogger`]
#[derive(Debug, Clone)]
pub struct LoggerProbe {
    state: Arc<Mutex<LoggerState>>,
}

impl SimLogger {
    /// Create a logger with no channels wired
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the fixed voltage of `channel`
    pub fn with_channel(self, channel: u16, volts: f64) -> Self {
        lock(&self.state).voltages.insert(channel, volts);
        self
    }

    /// Wire `channel` to a photodiode lit by `laser`
    pub fn with_photodiode(
        self,
        channel: u16,
        dark_volts: f64,
        volts_per_mw: f64,
        laser: LaserProbe,
    ) -> Self {
        lock(&self.state).photodiode = Some(Photodiode {
            channel,
            dark_volts,
            volts_per_mw,
            laser,
        });
        self
    }

    /// Let integrated reads take virtual time on `clock`
    pub fn with_clock(mut self, clock: SimClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Handle for inspecting and scripting this logger
    pub fn probe(&self) -> LoggerProbe {
        LoggerProbe {
            state: Arc::clone(&self.state),
        }
    }
}

impl LoggerProbe {
    /// Change the fixed voltage of `channel`
    pub fn set_voltage(&self, channel: u16, volts: f64) {
        lock(&self.state).voltages.insert(channel, volts);
    }

    /// Fail the next read of `channel`
    pub fn inject(&self, channel: u16, error: DeviceError) {
        lock(&self.state).faults.inject(channel, error);
    }

    /// Fail the read of `channel` after `skip` successful ones
    pub fn inject_after(&self, channel: u16, skip: usize, error: DeviceError) {
        lock(&self.state).faults.inject_after(channel, skip, error);
    }

    /// Number of reads of `channel`, failed ones included
    pub fn read_count(&self, channel: u16) -> usize {
        lock(&self.state).reads.iter().filter(|c| **c == channel).count()
    }
}

impl DataLogger for SimLogger {
    fn read_voltage(&mut self, channel: u16, unit: VoltageUnit) -> Result<f64, DeviceError> {
        let mut s = lock(&self.state);
        s.reads.push(channel);
        s.faults.check(channel)?;
        Ok(unit.from_volts(s.sample(channel)))
    }

    fn read_integrated_voltage(
        &mut self,
        channel: u16,
        unit: VoltageUnit,
        count: u32,
        interval: Duration,
    ) -> Result<f64, DeviceError> {
        let value = {
            let mut s = lock(&self.state);
            s.reads.push(channel);
            s.faults.check(channel)?;
            s.sample(channel)
        };
        if let Some(clock) = &self.clock {
            clock.sleep(interval * count);
        }
        Ok(unit.from_volts(value))
    }
}
