//! Heat Cleaning sequence scheduling
//!
//! Converts configured steps into a plan that is resolved against elapsed
//! run time, and drives the fixed-period control loop.

pub mod plan;
pub mod step;
pub mod tick;

pub use plan::{ActiveStep, Resolution, SequencePlan, MAX_STEPS};
pub use step::{SequenceStep, StepKind};
pub use tick::{tick_interval, Clock, MonotonicClock, StopFlag, TickScheduler, POLL_INTERVAL};
