//! Configuration type definitions
//!
//! Plain data deserialised from the rig's TOML file (or filled in by the
//! GUI through [`HeatCleaningBuilder`]), and the validated settings a run
//! is started with. Validation happens before any instrument is touched.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::record::{Channel, ColumnLayout};
use crate::scheduler::{tick_interval, SequencePlan, StepKind};

/// Default tick interval (seconds)
pub const DEFAULT_STEP_INTERVAL_S: f64 = 10.0;

/// Default EXT gauge logger channel
pub const DEFAULT_EXT_CHANNEL: u16 = 101;

/// Default SIP logger channel
pub const DEFAULT_SIP_CHANNEL: u16 = 102;

fn default_exponent() -> f64 {
    1.0
}

fn default_repeat() -> u32 {
    1
}

fn default_step_interval() -> f64 {
    DEFAULT_STEP_INTERVAL_S
}

/// One configured sequence step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepConfig {
    /// Step kind
    pub kind: StepKind,
    /// Duration in seconds
    pub duration_s: f64,
    /// Rising exponent (ignored by other kinds)
    #[serde(default = "default_exponent")]
    pub exponent: f64,
}

/// Power-supply channel configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Channel is driven during the run
    pub enabled: bool,
    /// Target (full-scale) current in A
    pub max_current_a: f64,
    /// Voltage setpoint, acting as compliance limit, in V
    pub voltage_limit_v: f64,
    /// Over-voltage protection in V
    pub ovp_v: f64,
    /// Over-current protection in A
    pub ocp_a: f64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_current_a: 0.0,
            voltage_limit_v: 10.0,
            ovp_v: 12.0,
            ocp_a: 5.0,
        }
    }
}

/// Validated limits of an enabled channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChannelLimits {
    /// Target (full-scale) current in A
    pub max_current_a: f64,
    /// Voltage setpoint in V
    pub voltage_limit_v: f64,
    /// Over-voltage protection in V
    pub ovp_v: f64,
    /// Over-current protection in A
    pub ocp_a: f64,
}

impl ChannelConfig {
    /// Validate the channel; `None` when disabled
    pub fn validate(&self, channel: Channel) -> Result<Option<ChannelLimits>, ConfigError> {
        if !self.enabled {
            return Ok(None);
        }

        let label = channel.label();
        for (field, value) in [
            ("max_current_a", self.max_current_a),
            ("voltage_limit_v", self.voltage_limit_v),
            ("ovp_v", self.ovp_v),
            ("ocp_a", self.ocp_a),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidLimit {
                    channel: label,
                    field,
                    value,
                });
            }
        }

        if self.max_current_a > self.ocp_a {
            return Err(ConfigError::CurrentAboveOcp {
                channel: label,
                current_a: self.max_current_a,
                ocp_a: self.ocp_a,
            });
        }

        Ok(Some(ChannelLimits {
            max_current_a: self.max_current_a,
            voltage_limit_v: self.voltage_limit_v,
            ovp_v: self.ovp_v,
            ocp_a: self.ocp_a,
        }))
    }
}

/// Logger channels of the vacuum gauges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PressureChannels {
    /// EXT gauge channel
    pub ext: u16,
    /// SIP channel
    pub sip: u16,
}

impl Default for PressureChannels {
    fn default() -> Self {
        Self {
            ext: DEFAULT_EXT_CHANNEL,
            sip: DEFAULT_SIP_CHANNEL,
        }
    }
}

/// Heat Cleaning experiment configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatCleaningConfig {
    /// Tick interval in seconds
    #[serde(default = "default_step_interval")]
    pub step_interval_s: f64,
    /// Number of passes over `sequence`
    #[serde(default = "default_repeat")]
    pub repeat: u32,
    /// Ordered steps of one pass
    #[serde(default)]
    pub sequence: Vec<StepConfig>,
    /// Heater supply
    #[serde(default)]
    pub heater: ChannelConfig,
    /// AMD supply
    #[serde(default)]
    pub amd: ChannelConfig,
    /// Read the pyrometer each tick
    #[serde(default)]
    pub pyrometer: bool,
    /// Gauge channels on the data logger
    #[serde(default)]
    pub pressure: PressureChannels,
    /// Free-text comment for the log header
    #[serde(default)]
    pub comment: String,
}

impl Default for HeatCleaningConfig {
    fn default() -> Self {
        Self {
            step_interval_s: DEFAULT_STEP_INTERVAL_S,
            repeat: 1,
            sequence: Vec::new(),
            heater: ChannelConfig::default(),
            amd: ChannelConfig::default(),
            pyrometer: false,
            pressure: PressureChannels::default(),
            comment: String::new(),
        }
    }
}

/// Validated Heat Cleaning settings a run is started with
#[derive(Debug, Clone, PartialEq)]
pub struct HeatCleaningSettings {
    /// Immutable sequence plan
    pub plan: SequencePlan,
    /// Tick interval in seconds
    pub step_interval_s: f64,
    /// Heater limits, if enabled
    pub heater: Option<ChannelLimits>,
    /// AMD limits, if enabled
    pub amd: Option<ChannelLimits>,
    /// Read the pyrometer each tick
    pub pyrometer: bool,
    /// Gauge channels
    pub pressure: PressureChannels,
    /// Log header comment
    pub comment: String,
}

impl HeatCleaningSettings {
    /// Limits of `channel`, if enabled
    pub fn channel(&self, channel: Channel) -> Option<&ChannelLimits> {
        match channel {
            Channel::Heater => self.heater.as_ref(),
            Channel::Amd => self.amd.as_ref(),
        }
    }

    /// Log columns carried by this run
    pub fn layout(&self) -> ColumnLayout {
        ColumnLayout {
            heater: self.heater.is_some(),
            amd: self.amd.is_some(),
        }
    }
}

impl HeatCleaningConfig {
    /// Start a builder with defaults
    pub fn builder() -> HeatCleaningBuilder {
        HeatCleaningBuilder::default()
    }

    /// Validate and build the run settings
    pub fn validate(&self) -> Result<HeatCleaningSettings, ConfigError> {
        tick_interval(self.step_interval_s)?;

        let plan = SequencePlan::from_parts(
            self.sequence
                .iter()
                .map(|s| (s.kind, s.duration_s, s.exponent)),
            self.repeat,
        )?;

        let heater = self.heater.validate(Channel::Heater)?;
        let amd = self.amd.validate(Channel::Amd)?;
        if heater.is_none() && amd.is_none() {
            return Err(ConfigError::NoChannelEnabled);
        }

        Ok(HeatCleaningSettings {
            plan,
            step_interval_s: self.step_interval_s,
            heater,
            amd,
            pyrometer: self.pyrometer,
            pressure: self.pressure,
            comment: self.comment.clone(),
        })
    }
}

/// Builder for Heat Cleaning settings
#[derive(Debug, Clone, Default)]
pub struct HeatCleaningBuilder {
    config: HeatCleaningConfig,
}

impl HeatCleaningBuilder {
    /// Append a step
    pub fn step(mut self, kind: StepKind, duration_s: f64, exponent: f64) -> Self {
        self.config.sequence.push(StepConfig {
            kind,
            duration_s,
            exponent,
        });
        self
    }

    /// Append a Rising step
    pub fn rising(self, duration_s: f64, exponent: f64) -> Self {
        self.step(StepKind::Rising, duration_s, exponent)
    }

    /// Append a plateau step
    pub fn heat_cleaning(self, duration_s: f64) -> Self {
        self.step(StepKind::HeatCleaning, duration_s, 1.0)
    }

    /// Append a Decrease step
    pub fn decrease(self, duration_s: f64) -> Self {
        self.step(StepKind::Decrease, duration_s, 1.0)
    }

    /// Append a Wait step
    pub fn wait(self, duration_s: f64) -> Self {
        self.step(StepKind::Wait, duration_s, 1.0)
    }

    /// Number of passes over the sequence
    pub fn repeat(mut self, repeat: u32) -> Self {
        self.config.repeat = repeat;
        self
    }

    /// Tick interval in seconds
    pub fn step_interval(mut self, seconds: f64) -> Self {
        self.config.step_interval_s = seconds;
        self
    }

    /// Enable a supply channel with the given target current and compliance
    pub fn channel(mut self, channel: Channel, max_current_a: f64, voltage_limit_v: f64) -> Self {
        let cfg = match channel {
            Channel::Heater => &mut self.config.heater,
            Channel::Amd => &mut self.config.amd,
        };
        cfg.enabled = true;
        cfg.max_current_a = max_current_a;
        cfg.voltage_limit_v = voltage_limit_v;
        self
    }

    /// Set the protection limits of a channel
    pub fn protection(mut self, channel: Channel, ovp_v: f64, ocp_a: f64) -> Self {
        let cfg = match channel {
            Channel::Heater => &mut self.config.heater,
            Channel::Amd => &mut self.config.amd,
        };
        cfg.ovp_v = ovp_v;
        cfg.ocp_a = ocp_a;
        self
    }

    /// Read the pyrometer each tick
    pub fn pyrometer(mut self, enabled: bool) -> Self {
        self.config.pyrometer = enabled;
        self
    }

    /// Gauge channels
    pub fn pressure(mut self, ext: u16, sip: u16) -> Self {
        self.config.pressure = PressureChannels { ext, sip };
        self
    }

    /// Log header comment
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.config.comment = comment.into();
        self
    }

    /// Raw configuration built so far
    pub fn config(&self) -> &HeatCleaningConfig {
        &self.config
    }

    /// Validate and build
    pub fn build(self) -> Result<HeatCleaningSettings, ConfigError> {
        self.config.validate()
    }
}

/// NEA Activation experiment configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NeaConfig {
    /// Tick interval in seconds
    pub step_interval_s: f64,
    /// Stop after this many seconds (runs until stopped when unset)
    pub duration_s: Option<f64>,
    /// Laser power in mW
    pub laser_power_mw: f64,
    /// Laser wavelength in nm
    pub wavelength_nm: f64,
    /// Logger channel across the photocurrent shunt
    pub photocurrent_channel: u16,
    /// Shunt resistance in ohms
    pub shunt_ohms: f64,
    /// Samples averaged per bright/dark reading
    pub integration_count: u32,
    /// Spacing of averaged samples in ms
    pub integration_interval_ms: u64,
    /// Wait after switching the laser before reading, in ms
    pub laser_settle_ms: u64,
    /// AMD supply
    pub amd: ChannelConfig,
    /// Gauge channels
    pub pressure: PressureChannels,
    /// Log header comment
    pub comment: String,
}

impl Default for NeaConfig {
    fn default() -> Self {
        Self {
            step_interval_s: 5.0,
            duration_s: None,
            laser_power_mw: 1.0,
            wavelength_nm: 406.0,
            photocurrent_channel: 103,
            shunt_ohms: 1.0e4,
            integration_count: 10,
            integration_interval_ms: 20,
            laser_settle_ms: 200,
            amd: ChannelConfig::default(),
            pressure: PressureChannels::default(),
            comment: String::new(),
        }
    }
}

/// Validated NEA Activation settings
#[derive(Debug, Clone, PartialEq)]
pub struct NeaSettings {
    /// Tick interval in seconds
    pub step_interval_s: f64,
    /// Stop after this many seconds
    pub duration_s: Option<f64>,
    /// Initial laser power in mW
    pub laser_power_mw: f64,
    /// Laser wavelength in nm
    pub wavelength_nm: f64,
    /// Photocurrent logger channel
    pub photocurrent_channel: u16,
    /// Shunt resistance in ohms
    pub shunt_ohms: f64,
    /// Samples per bright/dark reading
    pub integration_count: u32,
    /// Sample spacing in ms
    pub integration_interval_ms: u64,
    /// Laser settle time in ms
    pub laser_settle_ms: u64,
    /// AMD limits, if enabled
    pub amd: Option<ChannelLimits>,
    /// Gauge channels
    pub pressure: PressureChannels,
    /// Log header comment
    pub comment: String,
}

impl NeaConfig {
    /// Validate and build the run settings
    pub fn validate(&self) -> Result<NeaSettings, ConfigError> {
        tick_interval(self.step_interval_s)?;
        if let Some(d) = self.duration_s {
            if !d.is_finite() || d <= 0.0 {
                return Err(ConfigError::InvalidParameter {
                    field: "duration_s",
                    reason: "must be positive",
                });
            }
        }
        if !self.laser_power_mw.is_finite() || self.laser_power_mw < 0.0 {
            return Err(ConfigError::InvalidParameter {
                field: "laser_power_mw",
                reason: "must be a non-negative number",
            });
        }
        if !self.wavelength_nm.is_finite() || self.wavelength_nm <= 0.0 {
            return Err(ConfigError::InvalidParameter {
                field: "wavelength_nm",
                reason: "must be positive",
            });
        }
        if !self.shunt_ohms.is_finite() || self.shunt_ohms <= 0.0 {
            return Err(ConfigError::InvalidParameter {
                field: "shunt_ohms",
                reason: "must be positive",
            });
        }
        if self.integration_count == 0 {
            return Err(ConfigError::InvalidParameter {
                field: "integration_count",
                reason: "must be at least 1",
            });
        }

        Ok(NeaSettings {
            step_interval_s: self.step_interval_s,
            duration_s: self.duration_s,
            laser_power_mw: self.laser_power_mw,
            wavelength_nm: self.wavelength_nm,
            photocurrent_channel: self.photocurrent_channel,
            shunt_ohms: self.shunt_ohms,
            integration_count: self.integration_count,
            integration_interval_ms: self.integration_interval_ms,
            laser_settle_ms: self.laser_settle_ms,
            amd: self.amd.validate(Channel::Amd)?,
            pressure: self.pressure,
            comment: self.comment.clone(),
        })
    }
}
