//! Per-tick result records
//!
//! Each tick produces a fresh record that is written to the log file and
//! handed to UI listeners as an independent copy. Missing measurements
//! (timeouts, disabled instruments) are `None` and are written as `NaN`.

use core::fmt::Write as _;

use serde::Serialize;

use crate::state::RunState;

/// Power-supply channel of the rig
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Channel {
    /// Main sample heater
    Heater,
    /// Auxiliary degas supply
    Amd,
}

impl Channel {
    /// Short label used in log columns and messages
    pub const fn label(self) -> &'static str {
        match self {
            Channel::Heater => "HC",
            Channel::Amd => "AMD",
        }
    }
}

/// Setpoint and read-back of one power-supply channel
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ChannelReading {
    /// Current written this tick (A)
    pub target_current: f64,
    /// Measured output voltage (V)
    pub voltage: Option<f64>,
    /// Measured output current (A)
    pub current: Option<f64>,
    /// Measured output power (W)
    pub power: Option<f64>,
}

/// One Heat Cleaning tick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatCleaningRecord {
    /// Seconds since the run started
    pub elapsed_total: f64,
    /// Seconds since the active step started
    pub elapsed_in_step: f64,
    /// Index of the active step in the repeated plan
    pub sequence_index: usize,
    /// Name of the active step kind
    pub sequence_name: &'static str,
    /// Repetition pass (0-based)
    pub repetition: u32,
    /// Heater channel, if enabled
    pub heater: Option<ChannelReading>,
    /// AMD channel, if enabled
    pub amd: Option<ChannelReading>,
    /// Pyrometer temperature (°C)
    pub temperature: Option<f64>,
    /// EXT gauge pressure (Pa)
    pub ext_pressure: Option<f64>,
    /// SIP pressure (Pa)
    pub sip_pressure: Option<f64>,
    /// Previous tick ran past its interval
    pub overrun: bool,
}

/// Which optional columns a log file carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnLayout {
    /// Heater columns present
    pub heater: bool,
    /// AMD columns present
    pub amd: bool,
}

impl HeatCleaningRecord {
    /// Reading for `channel`, if that channel is enabled
    pub fn channel(&self, channel: Channel) -> Option<&ChannelReading> {
        match channel {
            Channel::Heater => self.heater.as_ref(),
            Channel::Amd => self.amd.as_ref(),
        }
    }

    /// Tab-delimited column names for `layout`
    pub fn log_columns(layout: ColumnLayout) -> String {
        let mut cols = String::from("Time[s]\tStepTime[s]\tIndex\tSequence");
        for (enabled, channel) in [(layout.heater, Channel::Heater), (layout.amd, Channel::Amd)] {
            if enabled {
                let l = channel.label();
                let _ = write!(
                    cols,
                    "\t{l}_Target[A]\t{l}_Voltage[V]\t{l}_Current[A]\t{l}_Power[W]"
                );
            }
        }
        cols.push_str("\tTemperature[C]\tPressure_EXT[Pa]\tPressure_SIP[Pa]");
        cols
    }

    /// Tab-delimited line matching [`HeatCleaningRecord::log_columns`]
    pub fn to_log_line(&self) -> String {
        let mut line = String::with_capacity(160);
        let _ = write!(
            line,
            "{:.1}\t{:.1}\t{}\t{}",
            self.elapsed_total, self.elapsed_in_step, self.sequence_index, self.sequence_name
        );
        for reading in [&self.heater, &self.amd].into_iter().flatten() {
            let _ = write!(
                line,
                "\t{:.4}\t{}\t{}\t{}",
                reading.target_current,
                fixed(reading.voltage, 4),
                fixed(reading.current, 4),
                fixed(reading.power, 4)
            );
        }
        let _ = write!(
            line,
            "\t{}\t{}\t{}",
            fixed(self.temperature, 1),
            scientific(self.ext_pressure),
            scientific(self.sip_pressure)
        );
        line
    }
}

/// One NEA Activation tick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NeaRecord {
    /// Seconds since the run started
    pub elapsed_total: f64,
    /// Integrated photocurrent-channel voltage with the laser on (V)
    pub bright_voltage: Option<f64>,
    /// Integrated photocurrent-channel voltage with the laser off (V)
    pub dark_voltage: Option<f64>,
    /// Photocurrent (A)
    pub photocurrent: Option<f64>,
    /// Laser power setpoint (mW)
    pub laser_power_mw: f64,
    /// Quantum efficiency (%)
    pub quantum_efficiency: Option<f64>,
    /// AMD channel, if enabled
    pub amd: Option<ChannelReading>,
    /// EXT gauge pressure (Pa)
    pub ext_pressure: Option<f64>,
    /// SIP pressure (Pa)
    pub sip_pressure: Option<f64>,
}

impl NeaRecord {
    /// Tab-delimited column names
    pub fn log_columns(amd: bool) -> String {
        let mut cols = String::from(
            "Time[s]\tBright[V]\tDark[V]\tPhotocurrent[A]\tLaserPower[mW]\tQE[%]",
        );
        if amd {
            cols.push_str("\tAMD_Target[A]\tAMD_Voltage[V]\tAMD_Current[A]\tAMD_Power[W]");
        }
        cols.push_str("\tPressure_EXT[Pa]\tPressure_SIP[Pa]");
        cols
    }

    /// Tab-delimited line matching [`NeaRecord::log_columns`]
    pub fn to_log_line(&self) -> String {
        let mut line = String::with_capacity(160);
        let _ = write!(
            line,
            "{:.1}\t{}\t{}\t{}\t{:.3}\t{}",
            self.elapsed_total,
            fixed(self.bright_voltage, 6),
            fixed(self.dark_voltage, 6),
            scientific(self.photocurrent),
            self.laser_power_mw,
            scientific(self.quantum_efficiency)
        );
        if let Some(amd) = &self.amd {
            let _ = write!(
                line,
                "\t{:.4}\t{}\t{}\t{}",
                amd.target_current,
                fixed(amd.voltage, 4),
                fixed(amd.current, 4),
                fixed(amd.power, 4)
            );
        }
        let _ = write!(
            line,
            "\t{}\t{}",
            scientific(self.ext_pressure),
            scientific(self.sip_pressure)
        );
        line
    }
}

/// Run status update for UI listeners
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatusUpdate {
    /// New run state
    pub state: RunState,
    /// Seconds since the run started (0 before the first tick)
    pub elapsed_total: f64,
}

fn fixed(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(v) if !v.is_nan() => format!("{v:.precision$}"),
        _ => "NaN".into(),
    }
}

fn scientific(value: Option<f64>) -> String {
    match value {
        Some(v) if !v.is_nan() => format!("{v:.3e}"),
        _ => "NaN".into(),
    }
}
