//! Error types shared by the core and the rig tasks
//!
//! Device errors are split into transient (a single call timed out) and
//! fatal (anything else). Configuration errors are always raised before
//! the first instrument call of a run.

use thiserror::Error;

/// Errors reported by instrument implementations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    /// Instrument did not answer within its configured timeout
    #[error("timeout during {operation}")]
    Timeout {
        /// Operation that timed out (e.g. "measure_voltage")
        operation: &'static str,
    },

    /// Instrument disconnected or the session could not be used
    #[error("connection error: {0}")]
    Connection(String),

    /// Malformed or unexpected response
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl DeviceError {
    /// Shorthand for a timeout on `operation`
    pub const fn timeout(operation: &'static str) -> Self {
        Self::Timeout { operation }
    }

    /// Check if the error is recoverable on the next tick
    pub fn is_transient(&self) -> bool {
        matches!(self, DeviceError::Timeout { .. })
    }
}

/// Configuration rejected before a run starts
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Sequence has no steps
    #[error("sequence plan is empty")]
    EmptyPlan,

    /// Step duration is zero, negative or not finite
    #[error("step {index}: duration must be positive, got {duration_s}")]
    InvalidDuration {
        /// Position of the step in the configured sequence
        index: usize,
        /// Rejected duration
        duration_s: f64,
    },

    /// Rising exponent is not positive, or any exponent is negative or not finite
    #[error("step {index}: exponent must be a positive number, got {exponent}")]
    InvalidExponent {
        /// Position of the step in the configured sequence
        index: usize,
        /// Rejected exponent
        exponent: f64,
    },

    /// More steps than the plan can hold
    #[error("sequence has {count} steps, at most {max} are supported")]
    TooManySteps {
        /// Configured step count
        count: usize,
        /// Capacity of the plan
        max: usize,
    },

    /// Repeat count of zero
    #[error("repeat count must be at least 1")]
    ZeroRepeat,

    /// Tick interval is zero, negative or not finite
    #[error("step interval must be positive, got {0} s")]
    InvalidInterval(f64),

    /// Negative or non-finite current or voltage limit
    #[error("{channel}: {field} must be a non-negative number, got {value}")]
    InvalidLimit {
        /// Channel name ("HC", "AMD", ...)
        channel: &'static str,
        /// Offending field
        field: &'static str,
        /// Rejected value
        value: f64,
    },

    /// Target current above the over-current protection limit
    #[error("{channel}: max current {current_a} A exceeds OCP {ocp_a} A")]
    CurrentAboveOcp {
        /// Channel name
        channel: &'static str,
        /// Configured target current
        current_a: f64,
        /// Configured OCP limit
        ocp_a: f64,
    },

    /// Neither supply is enabled
    #[error("no power supply channel is enabled")]
    NoChannelEnabled,

    /// A channel is enabled but no instrument was provided for it
    #[error("{0} is enabled but no instrument is connected")]
    MissingDevice(&'static str),

    /// Any other invalid parameter
    #[error("invalid parameter {field}: {reason}")]
    InvalidParameter {
        /// Parameter name
        field: &'static str,
        /// Why it was rejected
        reason: &'static str,
    },

    /// TOML could not be parsed into the configuration types
    #[error("config parse error: {0}")]
    Parse(String),

    /// Config file could not be read
    #[error("config file error: {0}")]
    Io(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e.to_string())
    }
}
