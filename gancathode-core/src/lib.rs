//! Hardware-agnostic core of the photocathode rig
//!
//! This crate contains all run logic that does not depend on specific
//! instruments:
//!
//! - Instrument abstraction traits (power supply, logger, pyrometer, laser)
//! - Heat Cleaning sequence steps, plans and the tick scheduler
//! - Run state machine
//! - Per-tick records and calibration formulas
//! - Configuration type definitions and validation

#![deny(unsafe_code)]

pub mod calibration;
pub mod config;
pub mod error;
pub mod record;
pub mod scheduler;
pub mod state;
pub mod traits;

pub use error::{ConfigError, DeviceError};
