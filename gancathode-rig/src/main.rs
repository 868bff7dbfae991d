//! Gancathode - GaN photocathode rig control
//!
//! Runs a Heat Cleaning plan (or, with `--nea`, an NEA Activation
//! measurement) from a TOML configuration on simulated instruments and
//! prints every record as it arrives. With `--fast` the run uses virtual
//! time, so hour-long plans finish in moments.
//!
//! ```text
//! gancathode-rig [--nea] [--fast] <config.toml> [log-file]
//! ```

use std::io::{self, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use gancathode_core::config::{
    load_file, HeatCleaningSettings, NeaSettings, PressureChannels, RigConfig,
};
use gancathode_core::record::{HeatCleaningRecord, NeaRecord};
use gancathode_core::scheduler::{Clock, MonotonicClock};
use gancathode_drivers::sim::{SimClock, SimLaser, SimLogger, SimPowerSupply, SimPyrometer};
use gancathode_rig::channels::RecordFeed;
use gancathode_rig::hardware::Rig;
use gancathode_rig::recorder::LogRecorder;
use gancathode_rig::tasks::{
    spawn_heat_cleaning, spawn_nea, HeatCleaningRunner, NeaRunner, RunHandle,
};

const USAGE: &str = "usage: gancathode-rig [--nea] [--fast] <config.toml> [log-file]";

/// Simulated heater filament
const HEATER_LOAD_OHMS: f64 = 1.5;
/// Simulated AMD load
const AMD_LOAD_OHMS: f64 = 2.0;
/// Gauge outputs: EXT 3 V is 1e-7 Pa, SIP 1 V is 1.6e-6 Pa
const EXT_GAUGE_V: f64 = 3.0;
const SIP_GAUGE_V: f64 = 1.0;
const SAMPLE_TEMP_C: f64 = 25.0;
/// Photodiode dark offset and response across the shunt
const DARK_V: f64 = 0.002;
const PHOTO_V_PER_MW: f64 = 0.05;

/// How often the feed is drained
const FEED_POLL: Duration = Duration::from_millis(200);

struct Args {
    nea: bool,
    fast: bool,
    config: String,
    log: Option<String>,
}

fn parse_args() -> Result<Args> {
    let mut nea = false;
    let mut fast = false;
    let mut positional = Vec::new();

    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--nea" => nea = true,
            "--fast" => fast = true,
            "-h" | "--help" => bail!(USAGE),
            s if s.starts_with("--") => bail!("unknown option {s}\n{USAGE}"),
            _ => positional.push(arg.clone()),
        }
    }

    let mut positional = positional.into_iter();
    let config = positional.next().context(USAGE)?;
    let log = positional.next();
    if positional.next().is_some() {
        bail!(USAGE);
    }

    Ok(Args {
        nea,
        fast,
        config,
        log,
    })
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = parse_args()?;
    let config = load_file(&args.config)?;

    match args.log.as_deref() {
        Some(path) => {
            let recorder = LogRecorder::create(path).with_context(|| format!("creating {path}"))?;
            dispatch(&args, config, recorder)
        }
        None => dispatch(&args, config, LogRecorder::new(io::sink())),
    }
}

fn dispatch<W: Write + Send + 'static>(
    args: &Args,
    config: RigConfig,
    recorder: LogRecorder<W>,
) -> Result<()> {
    if args.nea {
        let settings = config
            .nea
            .context("configuration has no [nea] section")?
            .validate()?;
        if args.fast && settings.duration_s.is_none() {
            bail!("--fast needs nea.duration_s, the run would never end");
        }
        if args.fast {
            let clock = SimClock::new();
            run_nea(settings, clock.clone(), Some(clock), recorder)
        } else {
            run_nea(settings, MonotonicClock::new(), None, recorder)
        }
    } else {
        let settings = config
            .heat_cleaning
            .context("configuration has no [heat_cleaning] section")?
            .validate()?;
        if args.fast {
            run_heat_cleaning(settings, SimClock::new(), recorder)
        } else {
            run_heat_cleaning(settings, MonotonicClock::new(), recorder)
        }
    }
}

fn gauges(channels: PressureChannels) -> SimLogger {
    SimLogger::new()
        .with_channel(channels.ext, EXT_GAUGE_V)
        .with_channel(channels.sip, SIP_GAUGE_V)
}

fn run_heat_cleaning<C, W>(
    settings: HeatCleaningSettings,
    clock: C,
    recorder: LogRecorder<W>,
) -> Result<()>
where
    C: Clock + Send + 'static,
    W: Write + Send + 'static,
{
    let rig = Rig::new()
        .with_heater(SimPowerSupply::new("HC", HEATER_LOAD_OHMS))
        .with_amd(SimPowerSupply::new("AMD", AMD_LOAD_OHMS))
        .with_pyrometer(SimPyrometer::new(SAMPLE_TEMP_C))
        .with_logger(gauges(settings.pressure));

    let columns = HeatCleaningRecord::log_columns(settings.layout());
    let feed = Arc::new(RecordFeed::new());
    let mut runner = HeatCleaningRunner::new(settings).with_clock(clock);
    runner.add_listener(Arc::clone(&feed));

    let handle = spawn_heat_cleaning(runner, rig, recorder)?;
    follow(handle, &feed, &columns, HeatCleaningRecord::to_log_line)
}

fn run_nea<C, W>(
    settings: NeaSettings,
    clock: C,
    sim_clock: Option<SimClock>,
    recorder: LogRecorder<W>,
) -> Result<()>
where
    C: Clock + Send + 'static,
    W: Write + Send + 'static,
{
    let laser = SimLaser::new();
    let mut logger = gauges(settings.pressure).with_photodiode(
        settings.photocurrent_channel,
        DARK_V,
        PHOTO_V_PER_MW,
        laser.probe(),
    );
    if let Some(clock) = sim_clock {
        logger = logger.with_clock(clock);
    }
    let rig = Rig::new()
        .with_laser(laser)
        .with_logger(logger)
        .with_amd(SimPowerSupply::new("AMD", AMD_LOAD_OHMS));

    let columns = NeaRecord::log_columns(settings.amd.is_some());
    let feed = Arc::new(RecordFeed::new());
    let mut runner = NeaRunner::new(settings).with_clock(clock);
    runner.add_listener(Arc::clone(&feed));

    let handle = spawn_nea(runner, rig, recorder)?;
    follow(handle, &feed, &columns, NeaRecord::to_log_line)
}

/// Print records until the worker exits, then report its outcome
fn follow<R>(
    handle: RunHandle,
    feed: &RecordFeed<R>,
    columns: &str,
    line: impl Fn(&R) -> String,
) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "{columns}")?;

    loop {
        let finished = handle.is_finished();
        for record in feed.drain() {
            writeln!(out, "{}", line(&record))?;
        }
        if let Some(status) = feed.take_status() {
            info!(state = ?status.state, elapsed_s = status.elapsed_total, "run state");
        }
        if finished {
            break;
        }
        thread::sleep(FEED_POLL);
    }

    let summary = handle.join()?;
    if feed.dropped() > 0 {
        warn!(
            dropped = feed.dropped(),
            "records dropped from the console feed, the log file is complete"
        );
    }
    info!(
        reason = ?summary.reason,
        ticks = summary.ticks,
        overruns = summary.overruns,
        transient_faults = summary.transient_faults,
        log_failures = summary.log_failures,
        elapsed_s = summary.elapsed.as_secs_f64(),
        "run complete"
    );
    Ok(())
}
