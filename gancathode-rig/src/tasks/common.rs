//! Per-tick instrument I/O shared by the runners
//!
//! Error policy: a timeout is transient (warn, count, the value is left
//! missing for this tick); any other device error is fatal and ends the
//! run. NaN from a logger channel is a warning only.

use std::io::Write;
use std::time::Duration;

use tracing::{info, warn};

use gancathode_core::calibration;
use gancathode_core::config::{ChannelLimits, PressureChannels};
use gancathode_core::record::{Channel, ChannelReading, StatusUpdate};
use gancathode_core::state::{RunState, StopReason};
use gancathode_core::traits::{DataLogger, PowerSupply, VoltageUnit};
use gancathode_core::DeviceError;

use super::RunSummary;
use crate::channels::RecordListener;
use crate::error::RunError;
use crate::recorder::LogRecorder;

/// Boxed listener owned by a runner
pub type Listener<R> = Box<dyn RecordListener<R>>;

/// Counters kept while a run is active
#[derive(Debug, Default)]
pub(crate) struct RunStats {
    pub ticks: u32,
    pub overruns: u32,
    pub transient_faults: u32,
    pub log_failures: u32,
}

impl RunStats {
    /// Sort a device result into value, transient miss or fatal error
    pub fn check<T>(
        &mut self,
        device: &'static str,
        result: Result<T, DeviceError>,
    ) -> Result<Option<T>, RunError> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_transient() => {
                self.transient_faults += 1;
                warn!(device, error = %e, "transient device fault, value skipped");
                Ok(None)
            }
            Err(source) => Err(RunError::device(device, source)),
        }
    }

    pub fn overrun(&mut self, interval: Duration) {
        self.overruns += 1;
        warn!(
            interval_s = interval.as_secs_f64(),
            overruns = self.overruns,
            "tick took longer than its interval"
        );
    }

    pub fn summary(&self, reason: StopReason, elapsed: Duration) -> RunSummary {
        RunSummary {
            reason,
            ticks: self.ticks,
            overruns: self.overruns,
            transient_faults: self.transient_faults,
            log_failures: self.log_failures,
            elapsed,
        }
    }
}

/// Program protection, compliance and `current_a`, then switch on
///
/// Every error is fatal here: a supply whose limits could not be set must
/// not be switched on.
pub(crate) fn power_up<S: PowerSupply + ?Sized>(
    supply: &mut S,
    channel: Channel,
    limits: &ChannelLimits,
    current_a: f64,
) -> Result<(), RunError> {
    let device = channel.label();
    let fatal = |source| RunError::device(device, source);

    supply.set_ovp(limits.ovp_v).map_err(fatal)?;
    supply.set_ocp(limits.ocp_a).map_err(fatal)?;
    supply.set_voltage(limits.voltage_limit_v).map_err(fatal)?;
    supply.set_current(current_a).map_err(fatal)?;
    supply.set_output(true).map_err(fatal)?;

    info!(
        channel = device,
        max_current_a = limits.max_current_a,
        voltage_limit_v = limits.voltage_limit_v,
        ovp_v = limits.ovp_v,
        ocp_a = limits.ocp_a,
        "output on"
    );
    Ok(())
}

/// Write `target_a` and read the supply back
pub(crate) fn drive_supply<S: PowerSupply + ?Sized>(
    supply: &mut S,
    channel: Channel,
    target_a: f64,
    stats: &mut RunStats,
) -> Result<ChannelReading, RunError> {
    // A missed write leaves the previous setpoint in effect
    stats.check(channel.label(), supply.set_current(target_a))?;
    read_supply(supply, channel, target_a, stats)
}

/// Read voltage, current and power of a supply
pub(crate) fn read_supply<S: PowerSupply + ?Sized>(
    supply: &mut S,
    channel: Channel,
    target_a: f64,
    stats: &mut RunStats,
) -> Result<ChannelReading, RunError> {
    let device = channel.label();
    Ok(ChannelReading {
        target_current: target_a,
        voltage: stats.check(device, supply.measure_voltage())?,
        current: stats.check(device, supply.measure_current())?,
        power: stats.check(device, supply.measure_power())?,
    })
}

/// Read both gauges and convert them to pressures in Pa
pub(crate) fn read_pressures<L: DataLogger + ?Sized>(
    logger: &mut L,
    channels: PressureChannels,
    stats: &mut RunStats,
) -> Result<(Option<f64>, Option<f64>), RunError> {
    let ext = read_channel(logger, channels.ext, stats)?.map(calibration::ext_pressure);
    let sip = read_channel(logger, channels.sip, stats)?.map(calibration::sip_pressure);
    Ok((ext, sip))
}

/// Single logger reading in volts
pub(crate) fn read_channel<L: DataLogger + ?Sized>(
    logger: &mut L,
    channel: u16,
    stats: &mut RunStats,
) -> Result<Option<f64>, RunError> {
    let volts = stats.check("logger", logger.read_voltage(channel, VoltageUnit::Volts))?;
    Ok(drop_nan(channel, volts))
}

/// Averaged logger reading in volts
pub(crate) fn read_integrated<L: DataLogger + ?Sized>(
    logger: &mut L,
    channel: u16,
    count: u32,
    spacing: Duration,
    stats: &mut RunStats,
) -> Result<Option<f64>, RunError> {
    let volts = stats.check(
        "logger",
        logger.read_integrated_voltage(channel, VoltageUnit::Volts, count, spacing),
    )?;
    Ok(drop_nan(channel, volts))
}

fn drop_nan(channel: u16, volts: Option<f64>) -> Option<f64> {
    match volts {
        Some(v) if v.is_nan() => {
            warn!(channel, "logger channel returned NaN");
            None
        }
        other => other,
    }
}

/// Write the log header; a failure only degrades persistence
pub(crate) fn write_header<W: Write>(
    recorder: &mut LogRecorder<W>,
    comment: &str,
    notes: &[String],
    columns: &str,
    stats: &mut RunStats,
) {
    let start = chrono::Local::now();
    if let Err(e) = recorder.write_header(&start, comment, notes, columns) {
        stats.log_failures += 1;
        warn!(error = %e, "log header write failed, measurement continues");
    }
}

/// Log a record and hand it to every listener
pub(crate) fn emit<R, W: Write>(
    record: &R,
    line: &str,
    recorder: &mut LogRecorder<W>,
    listeners: &mut [Listener<R>],
    stats: &mut RunStats,
) {
    if let Err(e) = recorder.write_line(line) {
        stats.log_failures += 1;
        warn!(
            error = %e,
            failures = stats.log_failures,
            "log write failed, measurement continues"
        );
    }
    for listener in listeners.iter_mut() {
        listener.on_record(record);
    }
    stats.ticks += 1;
}

pub(crate) fn notify_state<R>(listeners: &mut [Listener<R>], state: RunState, elapsed_s: f64) {
    let update = StatusUpdate {
        state,
        elapsed_total: elapsed_s,
    };
    for listener in listeners.iter_mut() {
        listener.on_state(update);
    }
}
