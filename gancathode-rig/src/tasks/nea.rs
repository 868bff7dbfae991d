//! NEA Activation run
//!
//! Measures photocurrent and quantum efficiency at a fixed cadence while
//! the cathode is being activated. Each tick takes a bright reading with
//! the laser on and a dark reading with it off; the difference across the
//! shunt is the photocurrent. Laser power and AMD current can be changed
//! mid-run through the [`ParameterQueue`], which is drained once per tick
//! after the readings.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use gancathode_core::calibration;
use gancathode_core::config::{NeaConfig, NeaSettings};
use gancathode_core::record::{Channel, NeaRecord};
use gancathode_core::scheduler::{Clock, MonotonicClock, StopFlag, TickScheduler};
use gancathode_core::state::{RunEvent, RunState, StopReason};
use gancathode_core::ConfigError;

use super::common::{self, Listener, RunStats};
use super::RunSummary;
use crate::channels::{ParameterQueue, ParameterUpdate, RecordListener};
use crate::error::RunError;
use crate::hardware::{Rig, ShutdownGuard};
use crate::recorder::LogRecorder;

/// Runs NEA Activation measurements on a rig
pub struct NeaRunner<C = MonotonicClock> {
    settings: NeaSettings,
    clock: C,
    stop: StopFlag,
    parameters: Arc<ParameterQueue>,
    listeners: Vec<Listener<NeaRecord>>,
}

impl NeaRunner {
    /// Runner on the monotonic system clock
    pub fn new(settings: NeaSettings) -> Self {
        Self {
            settings,
            clock: MonotonicClock::new(),
            stop: StopFlag::new(),
            parameters: Arc::new(ParameterQueue::new()),
            listeners: Vec::new(),
        }
    }

    /// Validate `config` and create a runner for it
    pub fn from_config(config: &NeaConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.validate()?))
    }
}

impl<C: Clock> NeaRunner<C> {
    /// Run on a different clock
    pub fn with_clock<D: Clock>(self, clock: D) -> NeaRunner<D> {
        NeaRunner {
            settings: self.settings,
            clock,
            stop: self.stop,
            parameters: self.parameters,
            listeners: self.listeners,
        }
    }

    pub fn settings(&self) -> &NeaSettings {
        &self.settings
    }

    /// Flag that ends the run at the next tick (or during the wait for it)
    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    /// Queue for mid-run setpoint changes
    pub fn parameters(&self) -> Arc<ParameterQueue> {
        Arc::clone(&self.parameters)
    }

    /// Register a listener for records and state changes
    pub fn add_listener(&mut self, listener: impl RecordListener<NeaRecord> + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Check that `rig` has every instrument the settings use
    pub fn check_rig(&self, rig: &Rig) -> Result<(), ConfigError> {
        if rig.laser.is_none() {
            return Err(ConfigError::MissingDevice("laser"));
        }
        if rig.logger.is_none() {
            return Err(ConfigError::MissingDevice("logger"));
        }
        if self.settings.amd.is_some() && !rig.has_supply(Channel::Amd) {
            return Err(ConfigError::MissingDevice("AMD supply"));
        }
        Ok(())
    }

    /// Measure until stopped, `duration_s` elapses or a fatal error
    ///
    /// The laser and the AMD output are switched off exactly once before
    /// this returns.
    pub fn run<W: Write>(self, rig: Rig, recorder: LogRecorder<W>) -> Result<RunSummary, RunError> {
        self.check_rig(&rig)?;

        let NeaRunner {
            settings,
            clock,
            stop,
            parameters,
            listeners,
        } = self;
        let scheduler = TickScheduler::new(settings.step_interval_s, clock)?;

        NeaSession {
            laser_power_mw: settings.laser_power_mw,
            amd_current_a: settings.amd.map_or(0.0, |l| l.max_current_a),
            settings,
            scheduler,
            stop,
            parameters,
            listeners,
            recorder,
            guard: ShutdownGuard::new(rig),
            state: RunState::Idle,
            stats: RunStats::default(),
            started: None,
        }
        .run()
    }
}

struct NeaSession<C, W: Write> {
    settings: NeaSettings,
    scheduler: TickScheduler<C>,
    stop: StopFlag,
    parameters: Arc<ParameterQueue>,
    listeners: Vec<Listener<NeaRecord>>,
    recorder: LogRecorder<W>,
    guard: ShutdownGuard,
    state: RunState,
    stats: RunStats,
    started: Option<Duration>,
    laser_power_mw: f64,
    amd_current_a: f64,
}

impl<C: Clock, W: Write> NeaSession<C, W> {
    fn run(mut self) -> Result<RunSummary, RunError> {
        info!(
            interval_s = self.settings.step_interval_s,
            duration_s = self.settings.duration_s,
            laser_mw = self.laser_power_mw,
            wavelength_nm = self.settings.wavelength_nm,
            "NEA activation starting"
        );
        self.apply(RunEvent::Start);

        let outcome = self.execute();
        self.apply(outcome.as_ref().map_or(RunEvent::Fault, |&r| r.into()));
        self.guard.shutdown();
        self.apply(RunEvent::CleanupComplete);

        match outcome {
            Ok(reason) => {
                info!(?reason, ticks = self.stats.ticks, "NEA activation finished");
                Ok(self.stats.summary(reason, self.elapsed()))
            }
            Err(e) => {
                error!(error = %e, ticks = self.stats.ticks, "NEA activation aborted");
                Err(e)
            }
        }
    }

    fn execute(&mut self) -> Result<StopReason, RunError> {
        self.power_up()?;
        self.write_header();
        self.started = Some(self.scheduler.start());

        let mut overrun = false;
        loop {
            if self.stop.is_requested() {
                info!("stop requested");
                return Ok(StopReason::StopRequested);
            }

            let elapsed = self.elapsed().as_secs_f64();
            if let Some(limit) = self.settings.duration_s {
                if elapsed >= limit {
                    return Ok(StopReason::Completed);
                }
            }

            if overrun {
                debug!(elapsed_s = elapsed, "tick started late");
            }
            self.tick(elapsed)?;
            self.apply_parameters()?;

            overrun = self.scheduler.wait_for_next_tick(&self.stop);
            if overrun {
                self.stats.overrun(self.scheduler.interval());
            }
        }
    }

    fn power_up(&mut self) -> Result<(), RunError> {
        let rig = &mut *self.guard;
        let laser = rig
            .laser
            .as_mut()
            .ok_or(ConfigError::MissingDevice("laser"))?;
        laser
            .set_power_mw(self.laser_power_mw)
            .map_err(|e| RunError::device("laser", e))?;

        if let Some(limits) = self.settings.amd {
            let amd = rig
                .amd
                .as_mut()
                .ok_or(ConfigError::MissingDevice("AMD supply"))?;
            common::power_up(amd, Channel::Amd, &limits, self.amd_current_a)?;
        }
        Ok(())
    }

    fn write_header(&mut self) {
        let s = &self.settings;
        let notes = vec![
            format!(
                "Laser: {} mW at {} nm, settle {} ms",
                self.laser_power_mw, s.wavelength_nm, s.laser_settle_ms
            ),
            format!(
                "Photocurrent: channel {}, shunt {} Ohm, {} samples every {} ms",
                s.photocurrent_channel, s.shunt_ohms, s.integration_count, s.integration_interval_ms
            ),
            format!("Interval: {} s", s.step_interval_s),
        ];
        let columns = NeaRecord::log_columns(s.amd.is_some());
        common::write_header(
            &mut self.recorder,
            &self.settings.comment,
            &notes,
            &columns,
            &mut self.stats,
        );
    }

    fn tick(&mut self, elapsed: f64) -> Result<(), RunError> {
        let channel = self.settings.photocurrent_channel;
        let count = self.settings.integration_count;
        let spacing = Duration::from_millis(self.settings.integration_interval_ms);
        let settle = Duration::from_millis(self.settings.laser_settle_ms);

        let rig = &mut *self.guard;
        let (Some(laser), Some(logger)) = (rig.laser.as_mut(), rig.logger.as_mut()) else {
            return Err(ConfigError::MissingDevice("laser and logger").into());
        };

        // A missed switch makes the paired reading meaningless
        let lit = self.stats.check("laser", laser.set_output(true))?.is_some();
        self.scheduler.clock().sleep(settle);
        let bright = if lit {
            common::read_integrated(logger, channel, count, spacing, &mut self.stats)?
        } else {
            None
        };

        let unlit = self.stats.check("laser", laser.set_output(false))?.is_some();
        self.scheduler.clock().sleep(settle);
        let dark = if unlit {
            common::read_integrated(logger, channel, count, spacing, &mut self.stats)?
        } else {
            None
        };

        let photocurrent = match (bright, dark) {
            (Some(b), Some(d)) => Some((b - d) / self.settings.shunt_ohms),
            _ => None,
        };
        let quantum_efficiency = photocurrent.and_then(|i| {
            calibration::quantum_efficiency(i, self.laser_power_mw, self.settings.wavelength_nm)
        });

        let (ext_pressure, sip_pressure) =
            common::read_pressures(logger, self.settings.pressure, &mut self.stats)?;

        let amd = match (self.settings.amd, rig.amd.as_mut()) {
            (Some(_), Some(supply)) => Some(common::read_supply(
                supply,
                Channel::Amd,
                self.amd_current_a,
                &mut self.stats,
            )?),
            _ => None,
        };

        let record = NeaRecord {
            elapsed_total: elapsed,
            bright_voltage: bright,
            dark_voltage: dark,
            photocurrent,
            laser_power_mw: self.laser_power_mw,
            quantum_efficiency,
            amd,
            ext_pressure,
            sip_pressure,
        };
        debug!(
            elapsed_s = elapsed,
            photocurrent_a = record.photocurrent,
            qe_percent = record.quantum_efficiency,
            "tick"
        );
        common::emit(
            &record,
            &record.to_log_line(),
            &mut self.recorder,
            &mut self.listeners,
            &mut self.stats,
        );
        Ok(())
    }

    /// Apply queued setpoint changes, each exactly once
    fn apply_parameters(&mut self) -> Result<(), RunError> {
        for update in self.parameters.drain() {
            let rig = &mut *self.guard;
            match update {
                ParameterUpdate::LaserPower(mw) => {
                    if !mw.is_finite() || mw < 0.0 {
                        warn!(mw, "ignoring invalid laser power");
                        continue;
                    }
                    let Some(laser) = rig.laser.as_mut() else {
                        continue;
                    };
                    if self.stats.check("laser", laser.set_power_mw(mw))?.is_some() {
                        info!(from = self.laser_power_mw, to = mw, "laser power changed");
                        self.laser_power_mw = mw;
                    }
                }
                ParameterUpdate::AmdCurrent(amps) => {
                    let (Some(limits), Some(supply)) = (self.settings.amd, rig.amd.as_mut())
                    else {
                        warn!(amps, "AMD is not enabled, ignoring current change");
                        continue;
                    };
                    if !amps.is_finite() || amps < 0.0 || amps > limits.ocp_a {
                        warn!(amps, ocp_a = limits.ocp_a, "ignoring invalid AMD current");
                        continue;
                    }
                    if self.stats.check("AMD", supply.set_current(amps))?.is_some() {
                        info!(from = self.amd_current_a, to = amps, "AMD current changed");
                        self.amd_current_a = amps;
                    }
                }
            }
        }
        Ok(())
    }

    fn apply(&mut self, event: RunEvent) {
        let next = self.state.transition(event);
        if next == self.state {
            return;
        }
        self.state = next;
        let elapsed = self.elapsed().as_secs_f64();
        common::notify_state(&mut self.listeners, next, elapsed);
    }

    fn elapsed(&self) -> Duration {
        match self.started {
            Some(start) => self.scheduler.now().saturating_sub(start),
            None => Duration::ZERO,
        }
    }
}
