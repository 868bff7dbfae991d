//! Worker threads
//!
//! A run blocks on instrument I/O for up to hundreds of milliseconds per
//! call, so it never runs on the caller's (UI) thread. The worker owns the
//! rig and the recorder until the run ends; the caller keeps a
//! [`RunHandle`] to stop and join it.

use std::io::Write;
use std::thread::{self, JoinHandle};

use tracing::{error, info};

use gancathode_core::scheduler::{Clock, StopFlag};

use super::{HeatCleaningRunner, NeaRunner, RunSummary};
use crate::error::RunError;
use crate::hardware::Rig;
use crate::recorder::LogRecorder;

/// Handle to a run on its worker thread
#[derive(Debug)]
pub struct RunHandle {
    stop: StopFlag,
    thread: JoinHandle<Result<RunSummary, RunError>>,
}

impl RunHandle {
    /// Ask the run to stop
    ///
    /// Returns immediately; the worker notices within one poll interval.
    pub fn stop(&self) {
        info!("stop requested");
        self.stop.request();
    }

    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    /// Check if the worker has exited
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the run to end
    pub fn join(self) -> Result<RunSummary, RunError> {
        match self.thread.join() {
            Ok(result) => result,
            Err(_) => {
                error!("run worker panicked");
                Err(RunError::WorkerPanicked)
            }
        }
    }
}

/// Start a Heat Cleaning run on a new thread
pub fn spawn_heat_cleaning<C, W>(
    runner: HeatCleaningRunner<C>,
    rig: Rig,
    recorder: LogRecorder<W>,
) -> Result<RunHandle, RunError>
where
    C: Clock + Send + 'static,
    W: Write + Send + 'static,
{
    let stop = runner.stop_flag();
    let thread = thread::Builder::new()
        .name("heat-cleaning".into())
        .spawn(move || runner.run(rig, recorder))
        .map_err(RunError::Spawn)?;
    Ok(RunHandle { stop, thread })
}

/// Start an NEA Activation run on a new thread
pub fn spawn_nea<C, W>(
    runner: NeaRunner<C>,
    rig: Rig,
    recorder: LogRecorder<W>,
) -> Result<RunHandle, RunError>
where
    C: Clock + Send + 'static,
    W: Write + Send + 'static,
{
    let stop = runner.stop_flag();
    let thread = thread::Builder::new()
        .name("nea-activation".into())
        .spawn(move || runner.run(rig, recorder))
        .map_err(RunError::Spawn)?;
    Ok(RunHandle { stop, thread })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use gancathode_core::config::{HeatCleaningConfig, NeaConfig};
    use gancathode_core::record::{Channel, HeatCleaningRecord};
    use gancathode_core::state::{RunState, StopReason};
    use gancathode_drivers::sim::{SimClock, SimLaser, SimLogger, SimPowerSupply};

    use crate::channels::{RecordFeed, RecordListener};

    fn heat_cleaning(interval_s: f64) -> HeatCleaningRunner {
        HeatCleaningConfig::builder()
            .rising(600.0, 1.0)
            .heat_cleaning(600.0)
            .step_interval(interval_s)
            .channel(Channel::Heater, 2.0, 10.0)
            .build()
            .map(HeatCleaningRunner::new)
            .unwrap()
    }

    fn logger() -> SimLogger {
        SimLogger::new().with_channel(101, 3.0).with_channel(102, 0.0)
    }

    #[test]
    fn test_stop_is_prompt() {
        let heater = SimPowerSupply::new("HC", 1.0);
        let probe = heater.probe();
        let rig = Rig::new().with_heater(heater).with_logger(logger());

        // Ten-second interval: the stop must not wait for the next tick
        let handle =
            spawn_heat_cleaning(heat_cleaning(10.0), rig, LogRecorder::new(io::sink())).unwrap();
        thread::sleep(Duration::from_millis(150));
        let requested = Instant::now();
        handle.stop();
        let summary = handle.join().unwrap();

        assert!(requested.elapsed() < Duration::from_secs(1));
        assert_eq!(summary.reason, StopReason::StopRequested);
        assert_eq!(summary.ticks, 1);
        assert_eq!(probe.output_off_count(), 1);
    }

    #[test]
    fn test_feed_receives_records() {
        let clock = SimClock::new();
        let heater = SimPowerSupply::new("HC", 1.0);
        let rig = Rig::new().with_heater(heater).with_logger(logger());
        let feed = Arc::new(RecordFeed::<HeatCleaningRecord>::new());
        let mut runner = heat_cleaning(60.0).with_clock(clock);
        runner.add_listener(Arc::clone(&feed));

        let summary = spawn_heat_cleaning(runner, rig, LogRecorder::new(io::sink()))
            .unwrap()
            .join()
            .unwrap();

        // 1200 s plan at 60 s: 20 ticks plus the closing record
        assert_eq!(summary.ticks, 21);
        assert_eq!(feed.drain().count(), 21);
        assert_eq!(feed.dropped(), 0);
        assert_eq!(feed.take_status().map(|s| s.state), Some(RunState::Idle));
    }

    struct Exploding;

    impl RecordListener<HeatCleaningRecord> for Exploding {
        fn on_record(&mut self, record: &HeatCleaningRecord) {
            if record.sequence_index == 1 {
                panic!("listener bug");
            }
        }
    }

    #[test]
    fn test_panic_still_shuts_down() {
        let heater = SimPowerSupply::new("HC", 1.0);
        let probe = heater.probe();
        let rig = Rig::new().with_heater(heater).with_logger(logger());
        let mut runner = heat_cleaning(60.0).with_clock(SimClock::new());
        runner.add_listener(Exploding);

        let result = spawn_heat_cleaning(runner, rig, LogRecorder::new(io::sink()))
            .unwrap()
            .join();

        assert!(matches!(result, Err(RunError::WorkerPanicked)));
        assert_eq!(probe.output_off_count(), 1);
        assert!(!probe.is_output_on());
    }

    #[test]
    fn test_spawn_nea() {
        let clock = SimClock::new();
        let laser = SimLaser::new();
        let laser_probe = laser.probe();
        let rig = Rig::new()
            .with_logger(logger().with_photodiode(103, 0.0, 0.01, laser.probe()))
            .with_laser(laser);
        let config = NeaConfig {
            duration_s: Some(60.0),
            ..NeaConfig::default()
        };
        let runner = NeaRunner::from_config(&config).unwrap().with_clock(clock);

        let handle = spawn_nea(runner, rig, LogRecorder::new(io::sink())).unwrap();
        let summary = handle.join().unwrap();

        assert_eq!(summary.reason, StopReason::Completed);
        assert_eq!(summary.ticks, 12);
        assert!(!laser_probe.is_on());
    }
}
