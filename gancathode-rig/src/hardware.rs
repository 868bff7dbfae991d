//! Instrument bundle and output shutdown
//!
//! A run takes ownership of a [`Rig`] for its whole duration. The
//! [`ShutdownGuard`] wrapping it switches every present output off when the
//! run ends, whatever the exit path: completion, stop, device error or a
//! panic unwinding through the worker.

use core::ops::{Deref, DerefMut};

use tracing::{error, info};

use gancathode_core::record::Channel;
use gancathode_core::traits::{DataLogger, Laser, PowerSupply, Pyrometer};

/// Boxed power supply owned by a run
pub type SupplyBox = Box<dyn PowerSupply + Send>;

/// Instruments available to a run
///
/// Any instrument may be absent; a run checks for the ones its settings
/// need before touching hardware.
#[derive(Default)]
pub struct Rig {
    /// Heater supply
    pub heater: Option<SupplyBox>,
    /// AMD supply
    pub amd: Option<SupplyBox>,
    /// Pyrometer
    pub pyrometer: Option<Box<dyn Pyrometer + Send>>,
    /// Voltage logger (gauges, photocurrent shunt)
    pub logger: Option<Box<dyn DataLogger + Send>>,
    /// Activation laser
    pub laser: Option<Box<dyn Laser + Send>>,
}

impl Rig {
    /// Empty rig
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_heater(mut self, supply: impl PowerSupply + Send + 'static) -> Self {
        self.heater = Some(Box::new(supply));
        self
    }

    pub fn with_amd(mut self, supply: impl PowerSupply + Send + 'static) -> Self {
        self.amd = Some(Box::new(supply));
        self
    }

    pub fn with_pyrometer(mut self, pyrometer: impl Pyrometer + Send + 'static) -> Self {
        self.pyrometer = Some(Box::new(pyrometer));
        self
    }

    pub fn with_logger(mut self, logger: impl DataLogger + Send + 'static) -> Self {
        self.logger = Some(Box::new(logger));
        self
    }

    pub fn with_laser(mut self, laser: impl Laser + Send + 'static) -> Self {
        self.laser = Some(Box::new(laser));
        self
    }

    /// Supply driving `channel`
    pub fn supply_mut(&mut self, channel: Channel) -> Option<&mut SupplyBox> {
        match channel {
            Channel::Heater => self.heater.as_mut(),
            Channel::Amd => self.amd.as_mut(),
        }
    }

    /// Check if the supply for `channel` is present
    pub fn has_supply(&self, channel: Channel) -> bool {
        match channel {
            Channel::Heater => self.heater.is_some(),
            Channel::Amd => self.amd.is_some(),
        }
    }
}

/// Owns a [`Rig`] and switches its outputs off exactly once
pub struct ShutdownGuard {
    rig: Rig,
    done: bool,
}

impl ShutdownGuard {
    /// Guard `rig` for the duration of a run
    pub fn new(rig: Rig) -> Self {
        Self { rig, done: false }
    }

    /// Switch every output off
    ///
    /// Each instrument is attempted independently; failures are logged and
    /// do not prevent the others from being switched off. Later calls (and
    /// the drop) do nothing.
    pub fn shutdown(&mut self) {
        if self.done {
            return;
        }
        self.done = true;

        let mut failures = 0u32;
        for channel in [Channel::Heater, Channel::Amd] {
            if let Some(supply) = self.rig.supply_mut(channel) {
                if let Err(e) = supply.set_output(false) {
                    error!(channel = channel.label(), error = %e, "failed to switch output off");
                    failures += 1;
                }
            }
        }
        if let Some(laser) = self.rig.laser.as_mut() {
            if let Err(e) = laser.set_output(false) {
                error!(error = %e, "failed to switch laser off");
                failures += 1;
            }
        }

        if failures == 0 {
            info!("outputs off");
        }
    }

    /// Check if shutdown already ran
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Shut down and hand the instruments back
    pub fn into_rig(mut self) -> Rig {
        self.shutdown();
        core::mem::take(&mut self.rig)
    }
}

impl Deref for ShutdownGuard {
    type Target = Rig;

    fn deref(&self) -> &Rig {
        &self.rig
    }
}

impl DerefMut for ShutdownGuard {
    fn deref_mut(&mut self) -> &mut Rig {
        &mut self.rig
    }
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.shutdown();
    }
}
