//! Diode laser trait (NEA Activation)

use crate::error::DeviceError;

/// Trait for the illumination laser
pub trait Laser {
    /// Set the optical output power in milliwatts
    fn set_power_mw(&mut self, milliwatts: f64) -> Result<(), DeviceError>;

    /// Switch emission on or off
    fn set_output(&mut self, on: bool) -> Result<(), DeviceError>;
}

impl<T: Laser + ?Sized> Laser for Box<T> {
    fn set_power_mw(&mut self, milliwatts: f64) -> Result<(), DeviceError> {
        (**self).set_power_mw(milliwatts)
    }

    fn set_output(&mut self, on: bool) -> Result<(), DeviceError> {
        (**self).set_output(on)
    }
}
