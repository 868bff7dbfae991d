//! Simulated diode laser

use std::sync::{Arc, Mutex};

use gancathode_core::traits::Laser;
use gancathode_core::DeviceError;

use super::fault::FaultScript;
use super::lock;

#[derive(Debug, Default)]
struct LaserState {
    power_mw: f64,
    on: bool,
    off_count: u32,
    power_writes: Vec<f64>,
    faults: FaultScript<bool>,
}

/// Simulated laser
#[derive(Debug, Default)]
pub struct SimLaser {
    state: Arc<Mutex<LaserState>>,
}

/// Inspection handle for a [`SimLaser`]
#[derive(Debug, Clone)]
pub struct LaserProbe {
    state: Arc<Mutex<LaserState>>,
}

impl SimLaser {
    /// Create a laser, emission off
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for inspecting this laser
    pub fn probe(&self) -> LaserProbe {
        LaserProbe {
            state: Arc::clone(&self.state),
        }
    }
}

impl LaserProbe {
    /// Optical power currently emitted (0 when off)
    pub fn emitted_mw(&self) -> f64 {
        let s = lock(&self.state);
        if s.on {
            s.power_mw
        } else {
            0.0
        }
    }

    /// Check if emission is on
    pub fn is_on(&self) -> bool {
        lock(&self.state).on
    }

    /// Number of `set_output(false)` calls
    pub fn off_count(&self) -> u32 {
        lock(&self.state).off_count
    }

    /// Accepted power setpoints, in order
    pub fn power_writes(&self) -> Vec<f64> {
        lock(&self.state).power_writes.clone()
    }

    /// Fail the next `set_output(on)` call with the given `on` value
    pub fn inject_output(&self, on: bool, error: DeviceError) {
        lock(&self.state).faults.inject(on, error);
    }
}

impl Laser for SimLaser {
    fn set_power_mw(&mut self, milliwatts: f64) -> Result<(), DeviceError> {
        let mut s = lock(&self.state);
        s.power_mw = milliwatts;
        s.power_writes.push(milliwatts);
        Ok(())
    }

    fn set_output(&mut self, on: bool) -> Result<(), DeviceError> {
        let mut s = lock(&self.state);
        if !on {
            s.off_count += 1;
        }
        s.faults.check(on)?;
        s.on = on;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emission() {
        let mut laser = SimLaser::new();
        let probe = laser.probe();

        laser.set_power_mw(2.0).unwrap();
        assert_eq!(probe.emitted_mw(), 0.0);

        laser.set_output(true).unwrap();
        assert_eq!(probe.emitted_mw(), 2.0);

        laser.set_output(false).unwrap();
        assert!(!probe.is_on());
        assert_eq!(probe.off_count(), 1);
    }
}
