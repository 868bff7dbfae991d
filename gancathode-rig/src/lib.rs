//! Runs of the GaN photocathode rig
//!
//! Heat Cleaning and NEA Activation runners, the worker threads they run
//! on, the log recorder and the channels observers read records from.

#![deny(unsafe_code)]

pub mod channels;
pub mod error;
pub mod hardware;
pub mod recorder;
pub mod tasks;

pub use error::RunError;
