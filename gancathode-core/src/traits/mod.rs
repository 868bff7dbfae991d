//! Instrument abstraction traits
//!
//! These traits define the interface between the run logic and the
//! instrument drivers (VISA/serial implementations live outside the core).

pub mod laser;
pub mod logger;
pub mod power_supply;
pub mod pyrometer;

pub use laser::Laser;
pub use logger::{DataLogger, VoltageUnit};
pub use power_supply::PowerSupply;
pub use pyrometer::Pyrometer;
