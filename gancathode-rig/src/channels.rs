//! Communication between a run worker and its observers
//!
//! The worker never blocks on an observer: records go through a bounded
//! embassy-sync channel with `try_send` and are dropped when the queue is
//! full, and the latest run state is held in a `Signal`. Parameter updates
//! travel the other way through a second bounded channel that the NEA
//! worker drains once per tick.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, TrySendError};
use embassy_sync::signal::Signal;
use heapless::Vec;
use tracing::debug;

use gancathode_core::record::StatusUpdate;

/// Records buffered for a slow observer before new ones are dropped
pub const RECORD_QUEUE_DEPTH: usize = 32;

/// Pending parameter updates
pub const PARAMETER_QUEUE_DEPTH: usize = 8;

/// Receiver of per-tick records and run state changes
///
/// Called on the worker thread; implementations must return quickly.
pub trait RecordListener<R>: Send {
    /// A tick produced `record`
    fn on_record(&mut self, record: &R);

    /// The run changed state
    fn on_state(&mut self, _update: StatusUpdate) {}
}

/// Bounded, non-blocking record handoff to an observer thread
pub struct RecordFeed<R> {
    records: Channel<CriticalSectionRawMutex, R, RECORD_QUEUE_DEPTH>,
    status: Signal<CriticalSectionRawMutex, StatusUpdate>,
    dropped: AtomicU32,
}

impl<R> RecordFeed<R> {
    /// Create an empty feed
    pub const fn new() -> Self {
        Self {
            records: Channel::new(),
            status: Signal::new(),
            dropped: AtomicU32::new(0),
        }
    }

    /// Queue `record`, dropping it if the queue is full
    ///
    /// Returns `false` when the record was dropped.
    pub fn publish(&self, record: R) -> bool {
        match self.records.try_send(record) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(dropped, "record feed full, record dropped");
                false
            }
        }
    }

    /// Take the oldest queued record
    pub fn try_recv(&self) -> Option<R> {
        self.records.try_receive().ok()
    }

    /// Take every queued record
    pub fn drain(&self) -> impl Iterator<Item = R> + '_ {
        core::iter::from_fn(|| self.try_recv())
    }

    /// Take the latest state change, if one arrived since the last call
    pub fn take_status(&self) -> Option<StatusUpdate> {
        self.status.try_take()
    }

    /// Records dropped so far
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<R> Default for RecordFeed<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Clone + Send> RecordListener<R> for Arc<RecordFeed<R>> {
    fn on_record(&mut self, record: &R) {
        self.publish(record.clone());
    }

    fn on_state(&mut self, update: StatusUpdate) {
        self.status.signal(update);
    }
}

/// Setpoint change requested while an NEA run is active
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterUpdate {
    /// New laser power in mW
    LaserPower(f64),
    /// New AMD current in A
    AmdCurrent(f64),
}

/// Bounded queue of parameter updates
pub struct ParameterQueue {
    updates: Channel<CriticalSectionRawMutex, ParameterUpdate, PARAMETER_QUEUE_DEPTH>,
}

impl ParameterQueue {
    /// Create an empty queue
    pub const fn new() -> Self {
        Self {
            updates: Channel::new(),
        }
    }

    /// Queue an update; gives it back if the queue is full
    pub fn submit(&self, update: ParameterUpdate) -> Result<(), ParameterUpdate> {
        self.updates.try_send(update).map_err(|e| match e {
            TrySendError::Full(u) => u,
        })
    }

    /// Take the pending updates, oldest first
    ///
    /// Takes at most one queue's worth, so updates submitted while draining
    /// are left for the next call.
    pub fn drain(&self) -> Vec<ParameterUpdate, PARAMETER_QUEUE_DEPTH> {
        let mut out = Vec::new();
        while !out.is_full() {
            match self.updates.try_receive() {
                Ok(update) => {
                    let _ = out.push(update);
                }
                Err(_) => break,
            }
        }
        out
    }
}

impl Default for ParameterQueue {
    fn default() -> Self {
        Self::new()
    }
}
