//! Run errors

use thiserror::Error;

use gancathode_core::{ConfigError, DeviceError};

/// Why a run did not complete normally
///
/// Transient device timeouts never surface here; they are counted in the
/// run summary instead.
#[derive(Error, Debug)]
pub enum RunError {
    /// Settings or rig rejected before any instrument was touched
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Fatal instrument error; outputs were switched off
    #[error("{device}: {source}")]
    Device {
        /// Instrument that failed
        device: &'static str,
        /// Underlying error
        #[source]
        source: DeviceError,
    },

    /// The worker thread could not be started
    #[error("failed to start run worker: {0}")]
    Spawn(std::io::Error),

    /// The worker thread panicked; outputs were switched off while unwinding
    #[error("run worker panicked")]
    WorkerPanicked,
}

impl RunError {
    /// Fatal error from `device`
    pub fn device(device: &'static str, source: DeviceError) -> Self {
        Self::Device { device, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = RunError::device("HC", DeviceError::Connection("port closed".into()));
        assert_eq!(err.to_string(), "HC: connection error: port closed");

        let err = RunError::from(ConfigError::MissingDevice("pyrometer"));
        assert!(matches!(err, RunError::Config(ConfigError::MissingDevice(_))));
    }
}
