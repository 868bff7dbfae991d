//! Heat Cleaning sequence plan
//!
//! An ordered list of steps, optionally repeated, resolved against the
//! elapsed time of a run. The plan is built once from configuration and
//! is never modified while a run holds it.

use heapless::Vec;
use serde::Serialize;

use super::step::{SequenceStep, StepKind};
use crate::error::ConfigError;

/// Maximum steps per plan (before repetition)
pub const MAX_STEPS: usize = 16;

/// Step active at a given point of the run
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ActiveStep {
    /// The step itself
    pub step: SequenceStep,
    /// Index in the repeated step list (0-based)
    pub index: usize,
    /// Repetition pass this step belongs to (0-based)
    pub repetition: u32,
    /// Seconds since the step started
    pub elapsed_in_step: f64,
}

impl ActiveStep {
    /// Target current for this point of the step
    pub fn current(&self, target_a: f64) -> f64 {
        self.step.current(target_a, self.elapsed_in_step)
    }
}

/// Result of resolving an elapsed time against the plan
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    /// A step is active
    Active(ActiveStep),
    /// Elapsed time is at or past the end of the plan
    Finished,
}

/// Ordered, possibly repeated, list of sequence steps
#[derive(Debug, Clone, PartialEq)]
pub struct SequencePlan {
    steps: Vec<SequenceStep, MAX_STEPS>,
    repeat: u32,
    /// Sum of one pass over `steps`
    pass_duration_s: f64,
}

impl SequencePlan {
    /// Build a plan from steps and a repeat count
    pub fn new(steps: &[SequenceStep], repeat: u32) -> Result<Self, ConfigError> {
        if steps.is_empty() {
            return Err(ConfigError::EmptyPlan);
        }
        if repeat == 0 {
            return Err(ConfigError::ZeroRepeat);
        }

        let steps: Vec<SequenceStep, MAX_STEPS> =
            Vec::from_slice(steps).map_err(|_| ConfigError::TooManySteps {
                count: steps.len(),
                max: MAX_STEPS,
            })?;
        let pass_duration_s = steps.iter().map(|s| s.duration_s()).sum();

        Ok(Self {
            steps,
            repeat,
            pass_duration_s,
        })
    }

    /// Build a plan from `(kind, duration, exponent)` triples
    ///
    /// Errors name the position of the offending step.
    pub fn from_parts(
        parts: impl IntoIterator<Item = (StepKind, f64, f64)>,
        repeat: u32,
    ) -> Result<Self, ConfigError> {
        let mut steps = std::vec::Vec::new();
        for (index, (kind, duration_s, exponent)) in parts.into_iter().enumerate() {
            steps.push(SequenceStep::validated(index, kind, duration_s, exponent)?);
        }
        Self::new(&steps, repeat)
    }

    /// Steps of a single pass
    pub fn steps(&self) -> &[SequenceStep] {
        &self.steps
    }

    /// Number of steps of a single pass
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Always false; an empty plan cannot be constructed
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Repeat count
    pub fn repeat(&self) -> u32 {
        self.repeat
    }

    /// Total planned duration in seconds, all repetitions included
    pub fn total_duration(&self) -> f64 {
        self.pass_duration_s * self.repeat as f64
    }

    /// Find the step active at `elapsed_s` since the start of the run
    ///
    /// Steps occupy half-open intervals `[start, end)`, so a time exactly
    /// on a boundary belongs to the following step. Negative times resolve
    /// to the beginning of the first step.
    pub fn resolve(&self, elapsed_s: f64) -> Resolution {
        if elapsed_s.is_nan() || elapsed_s >= self.total_duration() {
            return Resolution::Finished;
        }

        let elapsed_s = elapsed_s.max(0.0);
        let mut start = 0.0;

        for repetition in 0..self.repeat {
            for (i, step) in self.steps.iter().enumerate() {
                let end = start + step.duration_s();
                if elapsed_s < end {
                    return Resolution::Active(ActiveStep {
                        step: *step,
                        index: repetition as usize * self.steps.len() + i,
                        repetition,
                        elapsed_in_step: elapsed_s - start,
                    });
                }
                start = end;
            }
        }

        // Accumulated sum fell short of total_duration by rounding
        Resolution::Finished
    }

    /// Last step of the last repetition, positioned at its end
    ///
    /// Used for the closing record of a run so the plan end is always
    /// logged even when no tick lands exactly on it.
    pub fn final_step(&self) -> ActiveStep {
        let last = self.steps.len() - 1;
        let step = self.steps[last];

        ActiveStep {
            step,
            index: (self.repeat as usize - 1) * self.steps.len() + last,
            repetition: self.repeat - 1,
            elapsed_in_step: step.duration_s(),
        }
    }
}
