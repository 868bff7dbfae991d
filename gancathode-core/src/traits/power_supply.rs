//! Programmable power-supply trait

use crate::error::DeviceError;

/// Trait for a programmable DC power supply
///
/// Implementations wrap one instrument channel (heater or AMD). Every call
/// may time out ([`DeviceError::Timeout`], recoverable) or fail for good
/// (any other [`DeviceError`]).
pub trait PowerSupply {
    /// Set the voltage setpoint (compliance limit in constant-current use)
    fn set_voltage(&mut self, volts: f64) -> Result<(), DeviceError>;

    /// Set the current setpoint
    fn set_current(&mut self, amps: f64) -> Result<(), DeviceError>;

    /// Switch the output on or off
    fn set_output(&mut self, on: bool) -> Result<(), DeviceError>;

    /// Measure the output voltage
    fn measure_voltage(&mut self) -> Result<f64, DeviceError>;

    /// Measure the output current
    fn measure_current(&mut self) -> Result<f64, DeviceError>;

    /// Measure the output power
    fn measure_power(&mut self) -> Result<f64, DeviceError>;

    /// Set the over-voltage protection limit
    fn set_ovp(&mut self, volts: f64) -> Result<(), DeviceError>;

    /// Set the over-current protection limit
    fn set_ocp(&mut self, amps: f64) -> Result<(), DeviceError>;
}

impl<T: PowerSupply + ?Sized> PowerSupply for Box<T> {
    fn set_voltage(&mut self, volts: f64) -> Result<(), DeviceError> {
        (**self).set_voltage(volts)
    }

    fn set_current(&mut self, amps: f64) -> Result<(), DeviceError> {
        (**self).set_current(amps)
    }

    fn set_output(&mut self, on: bool) -> Result<(), DeviceError> {
        (**self).set_output(on)
    }

    fn measure_voltage(&mut self) -> Result<f64, DeviceError> {
        (**self).measure_voltage()
    }

    fn measure_current(&mut self) -> Result<f64, DeviceError> {
        (**self).measure_current()
    }

    fn measure_power(&mut self) -> Result<f64, DeviceError> {
        (**self).measure_power()
    }

    fn set_ovp(&mut self, volts: f64) -> Result<(), DeviceError> {
        (**self).set_ovp(volts)
    }

    fn set_ocp(&mut self, amps: f64) -> Result<(), DeviceError> {
        (**self).set_ocp(amps)
    }
}
