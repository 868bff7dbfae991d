//! Pyrometer trait

use crate::error::DeviceError;

/// Trait for a non-contact temperature sensor
pub trait Pyrometer {
    /// Read the sample temperature in degrees Celsius
    fn read_temperature(&mut self) -> Result<f64, DeviceError>;
}

impl<T: Pyrometer + ?Sized> Pyrometer for Box<T> {
    fn read_temperature(&mut self) -> Result<f64, DeviceError> {
        (**self).read_temperature()
    }
}
