//! Instrument implementations
//!
//! This crate provides concrete implementations of the traits defined in
//! gancathode-core. Real VISA/serial drivers are maintained with the GUI
//! application; this crate carries the simulated bench used for dry runs
//! and tests:
//!
//! - Power supply with a resistive load model
//! - Data logger with fixed gauge voltages and a laser-driven photocurrent
//! - Pyrometer
//! - Diode laser
//! - Manually advanced clock

#![deny(unsafe_code)]

pub mod sim;
