//! Heat Cleaning run
//!
//! On every tick the runner:
//! - resolves the active step of the plan from the elapsed time
//! - writes each enabled supply's target current
//! - reads the supplies back, the pyrometer and both vacuum gauges
//! - logs the record and hands it to the listeners
//!
//! The first tick runs at elapsed 0. When the plan is exhausted one
//! closing record is taken at the end of the last step, so the log always
//! covers the whole plan. Outputs are switched off through a
//! [`ShutdownGuard`] on every exit path.

use std::io::Write;
use std::time::Duration;

use tracing::{debug, error, info};

use gancathode_core::config::{HeatCleaningConfig, HeatCleaningSettings};
use gancathode_core::record::{Channel, HeatCleaningRecord};
use gancathode_core::scheduler::{
    ActiveStep, Clock, MonotonicClock, Resolution, StopFlag, TickScheduler,
};
use gancathode_core::state::{RunEvent, RunState, StopReason};
use gancathode_core::ConfigError;

use super::common::{self, Listener, RunStats};
use super::RunSummary;
use crate::channels::RecordListener;
use crate::error::RunError;
use crate::hardware::{Rig, ShutdownGuard};
use crate::recorder::LogRecorder;

/// Runs one Heat Cleaning plan on a rig
pub struct HeatCleaningRunner<C = MonotonicClock> {
    settings: HeatCleaningSettings,
    clock: C,
    stop: StopFlag,
    listeners: Vec<Listener<HeatCleaningRecord>>,
}

impl HeatCleaningRunner {
    /// Runner on the monotonic system clock
    pub fn new(settings: HeatCleaningSettings) -> Self {
        Self {
            settings,
            clock: MonotonicClock::new(),
            stop: StopFlag::new(),
            listeners: Vec::new(),
        }
    }

    /// Validate `config` and create a runner for it
    pub fn from_config(config: &HeatCleaningConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.validate()?))
    }
}

impl<C: Clock> HeatCleaningRunner<C> {
    /// Run on a different clock
    pub fn with_clock<D: Clock>(self, clock: D) -> HeatCleaningRunner<D> {
        HeatCleaningRunner {
            settings: self.settings,
            clock,
            stop: self.stop,
            listeners: self.listeners,
        }
    }

    pub fn settings(&self) -> &HeatCleaningSettings {
        &self.settings
    }

    /// Flag that ends the run at the next tick (or during the wait for it)
    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    /// Register a listener for records and state changes
    pub fn add_listener(&mut self, listener: impl RecordListener<HeatCleaningRecord> + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Check that `rig` has every instrument the settings use
    pub fn check_rig(&self, rig: &Rig) -> Result<(), ConfigError> {
        if self.settings.heater.is_some() && !rig.has_supply(Channel::Heater) {
            return Err(ConfigError::MissingDevice("heater supply"));
        }
        if self.settings.amd.is_some() && !rig.has_supply(Channel::Amd) {
            return Err(ConfigError::MissingDevice("AMD supply"));
        }
        if self.settings.pyrometer && rig.pyrometer.is_none() {
            return Err(ConfigError::MissingDevice("pyrometer"));
        }
        if rig.logger.is_none() {
            return Err(ConfigError::MissingDevice("logger"));
        }
        Ok(())
    }

    /// Run the plan to completion, stop request or fatal error
    ///
    /// Configuration problems are reported before any instrument call.
    /// Once the rig is touched, every present output is switched off
    /// exactly once before this returns (or while a panic unwinds).
    pub fn run<W: Write>(
        self,
        rig: Rig,
        recorder: LogRecorder<W>,
    ) -> Result<RunSummary, RunError> {
        self.check_rig(&rig)?;

        let HeatCleaningRunner {
            settings,
            clock,
            stop,
            listeners,
        } = self;
        let scheduler = TickScheduler::new(settings.step_interval_s, clock)?;

        Session {
            settings,
            scheduler,
            stop,
            listeners,
            recorder,
            guard: ShutdownGuard::new(rig),
            state: RunState::Idle,
            stats: RunStats::default(),
            started: None,
            current_index: None,
        }
        .run()
    }
}

struct Session<C, W: Write> {
    settings: HeatCleaningSettings,
    scheduler: TickScheduler<C>,
    stop: StopFlag,
    listeners: Vec<Listener<HeatCleaningRecord>>,
    recorder: LogRecorder<W>,
    guard: ShutdownGuard,
    state: RunState,
    stats: RunStats,
    started: Option<Duration>,
    current_index: Option<usize>,
}

impl<C: Clock, W: Write> Session<C, W> {
    fn run(mut self) -> Result<RunSummary, RunError> {
        info!(
            steps = self.settings.plan.len(),
            repeat = self.settings.plan.repeat(),
            total_s = self.settings.plan.total_duration(),
            interval_s = self.settings.step_interval_s,
            "heat cleaning starting"
        );
        self.apply(RunEvent::Start);

        let outcome = self.execute();
        self.apply(outcome.as_ref().map_or(RunEvent::Fault, |&r| r.into()));
        self.guard.shutdown();
        self.apply(RunEvent::CleanupComplete);

        match outcome {
            Ok(reason) => {
                let summary = self.stats.summary(reason, self.elapsed());
                info!(
                    ?reason,
                    ticks = summary.ticks,
                    overruns = summary.overruns,
                    transient_faults = summary.transient_faults,
                    log_failures = summary.log_failures,
                    "heat cleaning finished"
                );
                Ok(summary)
            }
            Err(e) => {
                error!(error = %e, ticks = self.stats.ticks, "heat cleaning aborted");
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
            match self.settings.plan.resolve(elapsed) {
                Resolution::Active(active) => self.tick(elapsed, active, overrun)?,
                Resolution::Finished => {
                    let last = self.settings.plan.final_step();
                    self.tick(elapsed, last, overrun)?;
                    return Ok(StopReason::Completed);
                }
            }

            overrun = self.scheduler.wait_for_next_tick(&self.stop);
            if overrun {
                self.stats.overrun(self.scheduler.interval());
            }
        }
    }

    fn power_up(&mut self) -> Result<(), RunError> {
        for channel in [Channel::Heater, Channel::Amd] {
            let Some(limits) = self.settings.channel(channel) else {
                continue;
            };
            let supply = self
                .guard
                .supply_mut(channel)
                .ok_or(ConfigError::MissingDevice(channel.label()))?;
            common::power_up(supply, channel, limits, 0.0)?;
        }
        Ok(())
    }

    fn write_header(&mut self) {
        let plan = &self.settings.plan;
        let mut notes = vec![format!(
            "Plan: {} steps x{}, {} s, interval {} s",
            plan.len(),
            plan.repeat(),
            plan.total_duration(),
            self.settings.step_interval_s
        )];
        for (i, step) in plan.steps().iter().enumerate() {
            notes.push(format!(
                "Step {i}: {} {} s exponent {}",
                step.name(),
                step.duration_s(),
                step.exponent()
            ));
        }
        for channel in [Channel::Heater, Channel::Amd] {
            if let Some(limits) = self.settings.channel(channel) {
                notes.push(format!(
                    "{}: {} A, {} V limit, OVP {} V, OCP {} A",
                    channel.label(),
                    limits.max_current_a,
                    limits.voltage_limit_v,
                    limits.ovp_v,
                    limits.ocp_a
                ));
            }
        }

        let columns = HeatCleaningRecord::log_columns(self.settings.layout());
        common::write_header(
            &mut self.recorder,
            &self.settings.comment,
            &notes,
            &columns,
            &mut self.stats,
        );
    }

    fn tick(&mut self, elapsed: f64, active: ActiveStep, overrun: bool) -> Result<(), RunError> {
        if self.current_index != Some(active.index) {
            info!(
                step = active.step.name(),
                index = active.index,
                repetition = active.repetition,
                duration_s = active.step.duration_s(),
                "entering step"
            );
            self.current_index = Some(active.index);
        }

        let mut record = HeatCleaningRecord {
            elapsed_total: elapsed,
            elapsed_in_step: active.elapsed_in_step,
            sequence_index: active.index,
            sequence_name: active.step.name(),
            repetition: active.repetition,
            heater: None,
            amd: None,
            temperature: None,
            ext_pressure: None,
            sip_pressure: None,
            overrun,
        };

        for channel in [Channel::Heater, Channel::Amd] {
            let Some(limits) = self.settings.channel(channel) else {
                continue;
            };
            let target = active.current(limits.max_current_a);
            let supply = self
                .guard
                .supply_mut(channel)
                .ok_or(ConfigError::MissingDevice(channel.label()))?;
            let reading = common::drive_supply(supply, channel, target, &mut self.stats)?;
            match channel {
                Channel::Heater => record.heater = Some(reading),
                Channel::Amd => record.amd = Some(reading),
            }
        }

        let rig = &mut *self.guard;
        if self.settings.pyrometer {
            if let Some(pyrometer) = rig.pyrometer.as_mut() {
                record.temperature = self
                    .stats
                    .check("pyrometer", pyrometer.read_temperature())?;
            }
        }
        if let Some(logger) = rig.logger.as_mut() {
            let (ext, sip) =
                common::read_pressures(logger, self.settings.pressure, &mut self.stats)?;
            record.ext_pressure = ext;
            record.sip_pressure = sip;
        }

        debug!(
            elapsed_s = elapsed,
            step = record.sequence_name,
            heater_a = record.heater.map(|r| r.target_current),
            amd_a = record.amd.map(|r| r.target_current),
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

    fn apply(&mut self, event: RunEvent) {
        let next = self.state.transition(event);
        if next == self.state {
            return;
        }
        debug!(from = ?self.state, to = ?next, ?event, "run state");
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    use gancathode_core::record::{ColumnLayout, StatusUpdate};
    use gancathode_core::DeviceError;
    use gancathode_drivers::sim::{
        SimClock, SimLogger, SimPowerSupply, SimPyrometer, SupplyOp, SupplyProbe,
    };

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct DiskFull;

    impl Write for DiskFull {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::other("no space left on device"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Collects records and states; optionally stops or stalls the run
    #[derive(Clone, Default)]
    struct Collector {
        records: Arc<Mutex<Vec<HeatCleaningRecord>>>,
        states: Arc<Mutex<Vec<RunState>>>,
        stop_after: Option<(usize, StopFlag)>,
        stall: Option<(SimClock, Duration)>,
    }

    impl Collector {
        fn records(&self) -> Vec<HeatCleaningRecord> {
            self.records.lock().unwrap().clone()
        }

        fn states(&self) -> Vec<RunState> {
            self.states.lock().unwrap().clone()
        }
    }

    impl RecordListener<HeatCleaningRecord> for Collector {
        fn on_record(&mut self, record: &HeatCleaningRecord) {
            let mut records = self.records.lock().unwrap();
            records.push(record.clone());
            if let Some((n, stop)) = &self.stop_after {
                if records.len() >= *n {
                    stop.request();
                }
            }
            if let Some((clock, d)) = &self.stall {
                clock.advance(*d);
            }
        }

        fn on_state(&mut self, update: StatusUpdate) {
            self.states.lock().unwrap().push(update.state);
        }
    }

    fn scenario() -> HeatCleaningSettings {
        HeatCleaningConfig::builder()
            .rising(100.0, 1.0)
            .heat_cleaning(50.0)
            .decrease(100.0)
            .wait(50.0)
            .step_interval(10.0)
            .channel(Channel::Heater, 10.0, 20.0)
            .protection(Channel::Heater, 25.0, 12.0)
            .build()
            .unwrap()
    }

    fn with_amd(settings: HeatCleaningSettings) -> HeatCleaningSettings {
        let mut settings = settings;
        settings.amd = HeatCleaningConfig::builder()
            .rising(1.0, 1.0)
            .channel(Channel::Amd, 1.0, 5.0)
            .build()
            .unwrap()
            .amd;
        settings
    }

    struct Bench {
        rig: Rig,
        heater: SupplyProbe,
        amd: SupplyProbe,
        clock: SimClock,
    }

    fn bench() -> Bench {
        let heater = SimPowerSupply::new("HC", 1.0);
        let amd = SimPowerSupply::new("AMD", 2.0);
        let logger = SimLogger::new().with_channel(101, 3.0).with_channel(102, 0.0);
        Bench {
            heater: heater.probe(),
            amd: amd.probe(),
            rig: Rig::new()
                .with_heater(heater)
                .with_amd(amd)
                .with_logger(logger)
                .with_pyrometer(SimPyrometer::new(450.0)),
            clock: SimClock::new(),
        }
    }

    fn runner(settings: HeatCleaningSettings, clock: &SimClock) -> HeatCleaningRunner<SimClock> {
        HeatCleaningRunner::new(settings).with_clock(clock.clone())
    }

    #[test]
    fn test_scenario_targets() {
        let b = bench();
        let collector = Collector::default();
        let buf = SharedBuf::default();
        let mut runner = runner(scenario(), &b.clock);
        runner.add_listener(collector.clone());

        let summary = runner.run(b.rig, LogRecorder::new(buf.clone())).unwrap();

        assert_eq!(summary.reason, StopReason::Completed);
        assert_eq!(summary.ticks, 31);
        assert_eq!(summary.overruns, 0);
        assert_eq!(summary.elapsed, Duration::from_secs(300));

        let mut expected: Vec<f64> = (0..10).map(f64::from).collect();
        expected.extend([10.0; 5]);
        expected.extend((1..=10).rev().map(f64::from));
        expected.extend([0.0; 6]);

        let records = collector.records();
        assert_eq!(records.len(), expected.len());
        for (i, (record, want)) in records.iter().zip(&expected).enumerate() {
            assert_eq!(record.elapsed_total, 10.0 * i as f64);
            let got = record.heater.unwrap().target_current;
            assert!((got - want).abs() < 1e-9, "t={} got {got} want {want}", 10 * i);
            assert!(record.amd.is_none());
        }

        // Closing record sits at the end of the Wait step
        let last = records.last().unwrap();
        assert_eq!(last.sequence_name, "Wait");
        assert_eq!(last.elapsed_in_step, 50.0);
        assert_eq!(last.sequence_index, 3);

        // Zero setpoint at power-up, then one per record
        assert_eq!(b.heater.current_writes().len(), 32);
        assert_eq!(b.heater.output_on_count(), 1);
        assert_eq!(b.heater.output_off_count(), 1);
        assert_eq!(b.heater.voltage_setpoint(), 20.0);
        // Present but disabled supplies are still switched off
        assert_eq!(b.amd.output_off_count(), 1);
        assert_eq!(b.amd.call_count(SupplyOp::SetCurrent), 0);

        assert_eq!(
            collector.states(),
            vec![RunState::Running, RunState::Stopping, RunState::Idle]
        );
    }

    #[test]
    fn test_log_file_layout() {
        let b = bench();
        let buf = SharedBuf::default();
        let settings = scenario();
        let columns = HeatCleaningRecord::log_columns(settings.layout());

        runner(settings, &b.clock)
            .run(b.rig, LogRecorder::new(buf.clone()))
            .unwrap();

        let text = buf.text();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("# Start: "));
        let data: Vec<&str> = text.lines().filter(|l| !l.starts_with('#')).collect();
        assert_eq!(data[0], columns);
        assert_eq!(data.len(), 1 + 31);
        assert!(data[1].starts_with("0.0\t0.0\t0\tRising\t0.0000\t"));
        assert!(data[1].ends_with("\tNaN\t1.000e-7\t5.000e-7"));
        assert!(text.contains("# Step 2: Decrease 100 s"));
    }

    #[test]
    fn test_both_channels_and_pyrometer() {
        let b = bench();
        let collector = Collector::default();
        let mut settings = with_amd(scenario());
        settings.pyrometer = true;
        assert_eq!(
            settings.layout(),
            ColumnLayout {
                heater: true,
                amd: true
            }
        );

        let mut runner = runner(settings, &b.clock);
        runner.add_listener(collector.clone());
        runner.run(b.rig, LogRecorder::new(io::sink())).unwrap();

        let records = collector.records();
        let r = &records[5];
        assert_eq!(r.temperature, Some(450.0));
        let amd = r.amd.unwrap();
        assert!((amd.target_current - 0.5).abs() < 1e-9);
        assert!((amd.current.unwrap() - 0.5).abs() < 1e-9);
        assert!((amd.voltage.unwrap() - 1.0).abs() < 1e-9);
        assert_eq!(b.amd.output_on_count(), 1);
        assert_eq!(b.amd.output_off_count(), 1);
    }

    #[test]
    fn test_stop_request() {
        let b = bench();
        let mut runner = runner(scenario(), &b.clock);
        let collector = Collector {
            stop_after: Some((3, runner.stop_flag())),
            ..Collector::default()
        };
        runner.add_listener(collector.clone());

        let summary = runner.run(b.rig, LogRecorder::new(io::sink())).unwrap();

        assert_eq!(summary.reason, StopReason::StopRequested);
        assert_eq!(summary.ticks, 3);
        assert_eq!(b.heater.output_off_count(), 1);
        assert!(!b.heater.is_output_on());
        assert_eq!(
            collector.states(),
            vec![RunState::Running, RunState::Stopping, RunState::Idle]
        );
    }

    #[test]
    fn test_write_failure_shuts_down_once() {
        let b = bench();
        b.heater.inject_after(
            SupplyOp::SetCurrent,
            4,
            DeviceError::Connection("VISA session lost".into()),
        );
        let collector = Collector::default();
        let mut runner = runner(with_amd(scenario()), &b.clock);
        runner.add_listener(collector.clone());

        let result = runner.run(b.rig, LogRecorder::new(io::sink()));

        assert!(matches!(
            result,
            Err(RunError::Device {
                device: "HC",
                source: DeviceError::Connection(_)
            })
        ));
        assert_eq!(b.heater.output_off_count(), 1);
        assert_eq!(b.amd.output_off_count(), 1);
        assert_eq!(
            collector.states(),
            vec![RunState::Running, RunState::Stopping, RunState::Idle]
        );
    }

    #[test]
    fn test_read_failure_shuts_down_once() {
        let b = bench();
        b.amd.inject_after(
            SupplyOp::MeasureCurrent,
            2,
            DeviceError::Protocol("garbled reply".into()),
        );

        let result =
            runner(with_amd(scenario()), &b.clock).run(b.rig, LogRecorder::new(io::sink()));

        assert!(matches!(result, Err(RunError::Device { device: "AMD", .. })));
        assert_eq!(b.heater.output_off_count(), 1);
        assert_eq!(b.amd.output_off_count(), 1);
    }

    #[test]
    fn test_startup_failure_shuts_down_once() {
        let b = bench();
        b.heater.inject(
            SupplyOp::SetOutput,
            DeviceError::Connection("not responding".into()),
        );

        let result = runner(scenario(), &b.clock).run(b.rig, LogRecorder::new(io::sink()));

        assert!(result.is_err());
        assert_eq!(b.heater.output_on_count(), 1);
        assert_eq!(b.heater.output_off_count(), 1);
        assert_eq!(b.heater.call_count(SupplyOp::SetCurrent), 1);
    }

    #[test]
    fn test_log_failure_is_not_fatal() {
        let b = bench();
        let collector = Collector::default();
        let mut runner = runner(scenario(), &b.clock);
        runner.add_listener(collector.clone());

        let summary = runner.run(b.rig, LogRecorder::new(DiskFull)).unwrap();

        assert_eq!(summary.reason, StopReason::Completed);
        assert_eq!(summary.ticks, 31);
        // Header plus every data line
        assert_eq!(summary.log_failures, 32);
        assert_eq!(collector.records().len(), 31);
        assert_eq!(b.heater.output_off_count(), 1);
    }

    #[test]
    fn test_transient_timeout_recovers() {
        let b = bench();
        let collector = Collector::default();
        let logger = SimLogger::new().with_channel(101, 3.0).with_channel(102, 0.0);
        logger
            .probe()
            .inject_after(101, 2, DeviceError::timeout("read_voltage"));
        let rig = b.rig.with_logger(logger);

        let mut runner = runner(scenario(), &b.clock);
        runner.add_listener(collector.clone());
        let summary = runner.run(rig, LogRecorder::new(io::sink())).unwrap();

        assert_eq!(summary.reason, StopReason::Completed);
        assert_eq!(summary.transient_faults, 1);
        let records = collector.records();
        assert_eq!(records[2].ext_pressure, None);
        assert!(records[2].sip_pressure.is_some());
        assert!(records[3].ext_pressure.is_some());
        assert!(records[2].to_log_line().contains("\tNaN\t"));
    }

    #[test]
    fn test_missed_setpoint_is_skipped() {
        let b = bench();
        b.heater
            .inject_after(SupplyOp::SetCurrent, 1, DeviceError::timeout("set_current"));

        let summary = runner(scenario(), &b.clock)
            .run(b.rig, LogRecorder::new(io::sink()))
            .unwrap();

        assert_eq!(summary.transient_faults, 1);
        assert_eq!(b.heater.current_writes().len(), 31);
        assert_eq!(b.heater.output_off_count(), 1);
    }

    #[test]
    fn test_overrun_is_counted() {
        let b = bench();
        let collector = Collector {
            stall: Some((b.clock.clone(), Duration::from_secs(15))),
            ..Collector::default()
        };
        let mut runner = runner(scenario(), &b.clock);
        runner.add_listener(collector.clone());

        let summary = runner.run(b.rig, LogRecorder::new(io::sink())).unwrap();

        assert_eq!(summary.reason, StopReason::Completed);
        assert_eq!(summary.overruns, 20);
        let records = collector.records();
        assert_eq!(records.len(), 21);
        assert!(!records[0].overrun);
        assert!(records[1].overrun);
        assert_eq!(records[1].elapsed_total, 15.0);
    }

    #[test]
    fn test_missing_device_before_any_call() {
        let heater = SimPowerSupply::new("HC", 1.0);
        let probe = heater.probe();
        let rig = Rig::new()
            .with_heater(heater)
            .with_logger(SimLogger::new());
        let mut settings = scenario();
        settings.pyrometer = true;

        let result = HeatCleaningRunner::new(settings).run(rig, LogRecorder::new(io::sink()));

        assert!(matches!(
            result,
            Err(RunError::Config(ConfigError::MissingDevice("pyrometer")))
        ));
        assert_eq!(probe.call_count(SupplyOp::SetOvp), 0);
        assert_eq!(probe.call_count(SupplyOp::SetOutput), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = HeatCleaningConfig::builder()
            .rising(0.0, 1.0)
            .channel(Channel::Heater, 1.0, 5.0)
            .config()
            .clone();
        assert!(matches!(
            HeatCleaningRunner::from_config(&config),
            Err(ConfigError::InvalidDuration { index: 0, .. })
        ));
    }
}
