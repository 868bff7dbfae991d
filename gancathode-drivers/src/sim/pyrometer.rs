//! Simulated pyrometer

use std::sync::{Arc, Mutex};

use gancathode_core::traits::Pyrometer;
use gancathode_core::DeviceError;

use super::fault::FaultScript;
use super::lock;

#[derive(Debug, Default)]
struct PyrometerState {
    temperature: f64,
    reads: usize,
    faults: FaultScript<()>,
}

/// Simulated pyrometer reading a settable temperature
#[derive(Debug, Default)]
pub struct SimPyrometer {
    state: Arc<Mutex<PyrometerState>>,
}

/// Inspection and scripting handle for a [`SimPyrometer`]
#[derive(Debug, Clone)]
pub struct PyrometerProbe {
    state: Arc<Mutex<PyrometerState>>,
}

impl SimPyrometer {
    /// Create a pyrometer reading `celsius`
    pub fn new(celsius: f64) -> Self {
        let pyro = Self::default();
        lock(&pyro.state).temperature = celsius;
        pyro
    }

    /// Handle for inspecting and scripting this pyrometer
    pub fn probe(&self) -> PyrometerProbe {
        PyrometerProbe {
            state: Arc::clone(&self.state),
        }
    }
}

impl PyrometerProbe {
    /// Change the reported temperature
    pub fn set_temperature(&self, celsius: f64) {
        lock(&self.state).temperature = celsius;
    }

    /// Fail the next read
    pub fn inject(&self, error: DeviceError) {
        lock(&self.state).faults.inject((), error);
    }

    /// Number of reads, failed ones included
    pub fn read_count(&self) -> usize {
        lock(&self.state).reads
    }
}

impl Pyrometer for SimPyrometer {
    fn read_temperature(&mut self) -> Result<f64, DeviceError> {
        let mut s = lock(&self.state);
        s.reads += 1;
        s.faults.check(())?;
        Ok(s.temperature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_and_fault() {
        let mut pyro = SimPyrometer::new(550.0);
        let probe = pyro.probe();

        assert_eq!(pyro.read_temperature().unwrap(), 550.0);
        probe.inject(DeviceError::timeout("read_temperature"));
        assert!(pyro.read_temperature().unwrap_err().is_transient());

        probe.set_temperature(600.0);
        assert_eq!(pyro.read_temperature().unwrap(), 600.0);
        assert_eq!(probe.read_count(), 3);
    }
}
