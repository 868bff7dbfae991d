//! Simulated power supply
//!
//! Drives a resistive load: in constant-current operation the output
//! current is the setpoint unless the voltage setpoint (compliance) limits
//! it first.

use std::sync::{Arc, Mutex};

use gancathode_core::traits::PowerSupply;
use gancathode_core::DeviceError;
use tracing::debug;

use super::fault::FaultScript;
use super::lock;

/// Power-supply operations, for fault scripting and call counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupplyOp {
    SetVoltage,
    SetCurrent,
    SetOutput,
    MeasureVoltage,
    MeasureCurrent,
    MeasurePower,
    SetOvp,
    SetOcp,
}

#[derive(Debug)]
struct SupplyState {
    name: &'static str,
    load_ohms: f64,
    voltage_setpoint: f64,
    current_setpoint: f64,
    output: bool,
    ovp: Option<f64>,
    ocp: Option<f64>,
    output_on_count: u32,
    output_off_count: u32,
    current_writes: Vec<f64>,
    calls: Vec<SupplyOp>,
    faults: FaultScript<SupplyOp>,
}

impl SupplyState {
    fn call(&mut self, op: SupplyOp) -> Result<(), DeviceError> {
        self.calls.push(op);
        self.faults.check(op)
    }

    fn output_current(&self) -> f64 {
        if !self.output {
            return 0.0;
        }
        let limited = self.voltage_setpoint / self.load_ohms;
        self.current_setpoint.min(limited).max(0.0)
    }
}

/// Simulated constant-current supply with a resistive load
#[derive(Debug)]
pub struct SimPowerSupply {
    state: Arc<Mutex<SupplyState>>,
}

/// Inspection handle for a [`SimPowerSupply`]
#[derive(Debug, Clone)]
pub struct SupplyProbe {
    state: Arc<Mutex<SupplyState>>,
}

impl SimPowerSupply {
    /// Create a supply named `name` driving `load_ohms`
    pub fn new(name: &'static str, load_ohms: f64) -> Self {
        Self {
            state: Arc::new(Mutex::new(SupplyState {
                name,
                load_ohms: load_ohms.max(f64::MIN_POSITIVE),
                voltage_setpoint: 0.0,
                current_setpoint: 0.0,
                output: false,
                ovp: None,
                ocp: None,
                output_on_count: 0,
                output_off_count: 0,
                current_writes: Vec::new(),
                calls: Vec::new(),
                faults: FaultScript::new(),
            })),
        }
    }

    /// Handle for inspecting and scripting this supply
    pub fn probe(&self) -> SupplyProbe {
        SupplyProbe {
            state: Arc::clone(&self.state),
        }
    }
}

impl SupplyProbe {
    /// Fail the next call of `op`
    pub fn inject(&self, op: SupplyOp, error: DeviceError) {
        lock(&self.state).faults.inject(op, error);
    }

    /// Fail the call of `op` after `skip` successful ones
    pub fn inject_after(&self, op: SupplyOp, skip: usize, error: DeviceError) {
        lock(&self.state).faults.inject_after(op, skip, error);
    }

    /// Check if the output is on
    pub fn is_output_on(&self) -> bool {
        lock(&self.state).output
    }

    /// Number of `set_output(true)` calls
    pub fn output_on_count(&self) -> u32 {
        lock(&self.state).output_on_count
    }

    /// Number of `set_output(false)` calls
    pub fn output_off_count(&self) -> u32 {
        lock(&self.state).output_off_count
    }

    /// Accepted current setpoints, in order
    pub fn current_writes(&self) -> Vec<f64> {
        lock(&self.state).current_writes.clone()
    }

    /// Voltage setpoint
    pub fn voltage_setpoint(&self) -> f64 {
        lock(&self.state).voltage_setpoint
    }

    /// Protection limits `(ovp, ocp)` if set
    pub fn protection(&self) -> (Option<f64>, Option<f64>) {
        let s = lock(&self.state);
        (s.ovp, s.ocp)
    }

    /// Number of calls of `op`, failed ones included
    pub fn call_count(&self, op: SupplyOp) -> usize {
        lock(&self.state).calls.iter().filter(|c| **c == op).count()
    }
}

impl PowerSupply for SimPowerSupply {
    fn set_voltage(&mut self, volts: f64) -> Result<(), DeviceError> {
        let mut s = lock(&self.state);
        s.call(SupplyOp::SetVoltage)?;
        if let Some(ovp) = s.ovp {
            if volts > ovp {
                return Err(DeviceError::Protocol(format!(
                    "{}: voltage {volts} V above OVP {ovp} V",
                    s.name
                )));
            }
        }
        s.voltage_setpoint = volts;
        Ok(())
    }

    fn set_current(&mut self, amps: f64) -> Result<(), DeviceError> {
        let mut s = lock(&self.state);
        s.call(SupplyOp::SetCurrent)?;
        if let Some(ocp) = s.ocp {
            if amps > ocp {
                return Err(DeviceError::Protocol(format!(
                    "{}: current {amps} A above OCP {ocp} A",
                    s.name
                )));
            }
        }
        s.current_setpoint = amps;
        s.current_writes.push(amps);
        Ok(())
    }

    fn set_output(&mut self, on: bool) -> Result<(), DeviceError> {
        let mut s = lock(&self.state);
        // Counted before the fault check: the attempt is what matters
        if on {
            s.output_on_count += 1;
        } else {
            s.output_off_count += 1;
        }
        s.call(SupplyOp::SetOutput)?;
        s.output = on;
        debug!(supply = s.name, on, "output switched");
        Ok(())
    }

    fn measure_voltage(&mut self) -> Result<f64, DeviceError> {
        let mut s = lock(&self.state);
        s.call(SupplyOp::MeasureVoltage)?;
        Ok(s.output_current() * s.load_ohms)
    }

    fn measure_current(&mut self) -> Result<f64, DeviceError> {
        let mut s = lock(&self.state);
        s.call(SupplyOp::MeasureCurrent)?;
        Ok(s.output_current())
    }

    fn measure_power(&mut self) -> Result<f64, DeviceError> {
        let mut s = lock(&self.state);
        s.call(SupplyOp::MeasurePower)?;
        let i = s.output_current();
        Ok(i * i * s.load_ohms)
    }

    fn set_ovp(&mut self, volts: f64) -> Result<(), DeviceError> {
        let mut s = lock(&self.state);
        s.call(SupplyOp::SetOvp)?;
        s.ovp = Some(volts);
        Ok(())
    }

    fn set_ocp(&mut self, amps: f64) -> Result<(), DeviceError> {
        let mut s = lock(&self.state);
        s.call(SupplyOp::SetOcp)?;
        s.ocp = Some(amps);
        Ok(())
    }
}
