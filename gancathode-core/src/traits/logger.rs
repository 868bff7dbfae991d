//! Data logger (voltmeter/scanner) trait

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DeviceError;

/// Unit a logger reading is returned in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoltageUnit {
    /// Volts
    #[default]
    Volts,
    /// Millivolts
    Millivolts,
}

impl VoltageUnit {
    /// Convert a value in volts into this unit
    pub fn from_volts(self, volts: f64) -> f64 {
        match self {
            VoltageUnit::Volts => volts,
            VoltageUnit::Millivolts => volts * 1e3,
        }
    }

    /// Convert a value in this unit into volts
    pub fn to_volts(self, value: f64) -> f64 {
        match self {
            VoltageUnit::Volts => value,
            VoltageUnit::Millivolts => value * 1e-3,
        }
    }
}

/// Trait for a multi-channel voltage logger
///
/// A channel error is reported as a NaN reading, not as an error; callers
/// treat NaN as a warning.
pub trait DataLogger {
    /// Read one voltage sample from `channel`
    fn read_voltage(&mut self, channel: u16, unit: VoltageUnit) -> Result<f64, DeviceError>;

    /// Average `count` samples taken `interval` apart
    fn read_integrated_voltage(
        &mut self,
        channel: u16,
        unit: VoltageUnit,
        count: u32,
        interval: Duration,
    ) -> Result<f64, DeviceError>;
}

impl<T: DataLogger + ?Sized> DataLogger for Box<T> {
    fn read_voltage(&mut self, channel: u16, unit: VoltageUnit) -> Result<f64, DeviceError> {
        (**self).read_voltage(channel, unit)
    }

    fn read_integrated_voltage(
        &mut self,
        channel: u16,
        unit: VoltageUnit,
        count: u32,
        interval: Duration,
    ) -> Result<f64, DeviceError> {
        (**self).read_integrated_voltage(channel, unit, count, interval)
    }
}
