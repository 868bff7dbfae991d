//! TOML configuration file
//!
//! ```toml
//! [heat_cleaning]
//! step_interval_s = 10
//! repeat = 1
//! pyrometer = true
//!
//! [[heat_cleaning.sequence]]
//! kind = "rising"
//! duration_s = 3600
//! exponent = 1.5
//!
//! [heat_cleaning.heater]
//! enabled = true
//! max_current_a = 3.2
//! voltage_limit_v = 12
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::types::{HeatCleaningConfig, NeaConfig};
use crate::error::ConfigError;

/// Top-level rig configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RigConfig {
    /// Heat Cleaning experiment, if configured
    #[serde(default)]
    pub heat_cleaning: Option<HeatCleaningConfig>,
    /// NEA Activation experiment, if configured
    #[serde(default)]
    pub nea: Option<NeaConfig>,
}

/// Parse TOML text into a [`RigConfig`]
pub fn parse_config(input: &str) -> Result<RigConfig, ConfigError> {
    Ok(toml::from_str(input)?)
}

/// Read and parse a configuration file
pub fn load_file(path: impl AsRef<Path>) -> Result<RigConfig, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
    let config = parse_config(&text)?;
    info!(path = %path.display(), "loaded configuration");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::StepKind;

    const SAMPLE: &str = r#"
[heat_cleaning]
step_interval_s = 10
repeat = 2
pyrometer = true
comment = "GaN #12"

[[heat_cleaning.sequence]]
kind = "rising"
duration_s = 3600
exponent = 1.5

[[heat_cleaning.sequence]]
kind = "heat_cleaning"
duration_s = 1800

[[heat_cleaning.sequence]]
kind = "decrease"
duration_s = 3600

[[heat_cleaning.sequence]]
kind = "wait"
duration_s = 600

[heat_cleaning.heater]
enabled = true
max_current_a = 3.2
voltage_limit_v = 12.0
ovp_v = 15.0
ocp_a = 4.0

[heat_cleaning.amd]
enabled = false

[heat_cleaning.pressure]
ext = 111
sip = 112
"#;

    #[test]
    fn test_parse_heat_cleaning() {
        let config = parse_config(SAMPLE).unwrap();
        let hc = config.heat_cleaning.unwrap();

        assert_eq!(hc.repeat, 2);
        assert_eq!(hc.sequence.len(), 4);
        assert_eq!(hc.sequence[0].kind, StepKind::Rising);
        assert_eq!(hc.sequence[0].exponent, 1.5);
        assert_eq!(hc.sequence[1].exponent, 1.0);
        assert_eq!(hc.pressure.ext, 111);
        assert!(config.nea.is_none());

        let settings = hc.validate().unwrap();
        assert_eq!(settings.plan.total_duration(), 2.0 * 9600.0);
        assert!(settings.pyrometer);
        assert!(settings.amd.is_none());
    }

    #[test]
    fn test_parse_nea_defaults() {
        let config = parse_config("[nea]\nlaser_power_mw = 2.5\n").unwrap();
        let nea = config.nea.unwrap();
        assert_eq!(nea.laser_power_mw, 2.5);
        assert_eq!(nea.step_interval_s, 5.0);
    }

    #[test]
    fn test_unknown_kind_is_parse_error() {
        let result = parse_config(
            "[heat_cleaning]\n[[heat_cleaning.sequence]]\nkind = \"anneal\"\nduration_s = 1\n",
        );
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = load_file("/nonexistent/gancathode.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
