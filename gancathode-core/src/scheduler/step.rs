//! Sequence steps and their current profiles

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Kind of a Heat Cleaning step
///
/// Each kind maps elapsed time within the step to a fraction of the
/// channel's target current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Power-law ramp from zero to target: `(t / T) ^ p`
    Rising,
    /// Plateau at target
    HeatCleaning,
    /// Linear fall from target to zero: `(T - t) / T`
    Decrease,
    /// Outputs held at zero
    Wait,
}

impl StepKind {
    /// All kinds, in the order they usually appear in a plan
    pub const ALL: [StepKind; 4] = [
        StepKind::Rising,
        StepKind::HeatCleaning,
        StepKind::Decrease,
        StepKind::Wait,
    ];

    /// Name written to the log file
    pub const fn name(self) -> &'static str {
        match self {
            StepKind::Rising => "Rising",
            StepKind::HeatCleaning => "HeatCleaning",
            StepKind::Decrease => "Decrease",
            StepKind::Wait => "Wait",
        }
    }

    /// Profile fraction at `elapsed_s` into a step of `duration_s`
    ///
    /// Always within `[0, 1]`, also for `elapsed_s` outside the step.
    pub fn fraction(self, duration_s: f64, exponent: f64, elapsed_s: f64) -> f64 {
        let f = match self {
            // powf of a negative base with a fractional exponent is NaN,
            // and 0^0 is 1
            StepKind::Rising if elapsed_s <= 0.0 => 0.0,
            StepKind::Rising => (elapsed_s / duration_s).powf(exponent),
            StepKind::HeatCleaning => 1.0,
            StepKind::Decrease => (duration_s - elapsed_s) / duration_s,
            StepKind::Wait => 0.0,
        };

        if f.is_nan() {
            0.0
        } else {
            f.clamp(0.0, 1.0)
        }
    }
}

/// One phase of a Heat Cleaning plan
///
/// Steps are immutable and hold no run state, so one plan may be read
/// from any thread.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SequenceStep {
    kind: StepKind,
    duration_s: f64,
    exponent: f64,
}

impl SequenceStep {
    /// Create a step, rejecting degenerate durations and exponents
    pub fn new(kind: StepKind, duration_s: f64, exponent: f64) -> Result<Self, ConfigError> {
        Self::validated(0, kind, duration_s, exponent)
    }

    /// Same as [`SequenceStep::new`], reporting `index` in errors
    pub(crate) fn validated(
        index: usize,
        kind: StepKind,
        duration_s: f64,
        exponent: f64,
    ) -> Result<Self, ConfigError> {
        if !duration_s.is_finite() || duration_s <= 0.0 {
            return Err(ConfigError::InvalidDuration { index, duration_s });
        }
        let positive = match kind {
            StepKind::Rising => exponent > 0.0,
            _ => exponent >= 0.0,
        };
        if !exponent.is_finite() || !positive {
            return Err(ConfigError::InvalidExponent { index, exponent });
        }

        Ok(Self {
            kind,
            duration_s,
            exponent,
        })
    }

    /// Rising step with exponent `exponent`
    pub fn rising(duration_s: f64, exponent: f64) -> Result<Self, ConfigError> {
        Self::new(StepKind::Rising, duration_s, exponent)
    }

    /// Plateau step
    pub fn heat_cleaning(duration_s: f64) -> Result<Self, ConfigError> {
        Self::new(StepKind::HeatCleaning, duration_s, 1.0)
    }

    /// Linear decrease step
    pub fn decrease(duration_s: f64) -> Result<Self, ConfigError> {
        Self::new(StepKind::Decrease, duration_s, 1.0)
    }

    /// Zero-output step
    pub fn wait(duration_s: f64) -> Result<Self, ConfigError> {
        Self::new(StepKind::Wait, duration_s, 1.0)
    }

    /// Step kind
    pub fn kind(&self) -> StepKind {
        self.kind
    }

    /// Step duration in seconds
    pub fn duration_s(&self) -> f64 {
        self.duration_s
    }

    /// Exponent (only used by Rising)
    pub fn exponent(&self) -> f64 {
        self.exponent
    }

    /// Name written to the log file
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Target current at `elapsed_s` into this step
    ///
    /// The result is always within `[0, target_a]`; a negative target is
    /// treated as zero.
    pub fn current(&self, target_a: f64, elapsed_s: f64) -> f64 {
        let target = target_a.max(0.0);
        target * self.kind.fraction(self.duration_s, self.exponent, elapsed_s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn step(kind: StepKind, duration_s: f64) -> SequenceStep {
        SequenceStep::new(kind, duration_s, 1.0).unwrap()
    }

    #[test]
    fn test_endpoints() {
        let target = 10.0;
        let cases = [
            (StepKind::Rising, 0.0, 10.0),
            (StepKind::HeatCleaning, 10.0, 10.0),
            (StepKind::Decrease, 10.0, 0.0),
            (StepKind::Wait, 0.0, 0.0),
        ];

        for (kind, at_start, at_end) in cases {
            let s = step(kind, 100.0);
            assert_eq!(s.current(target, 0.0), at_start, "{kind:?} at 0");
            assert_eq!(s.current(target, 100.0), at_end, "{kind:?} at T");
        }
    }

    #[test]
    fn test_rising_linear() {
        let s = SequenceStep::rising(100.0, 1.0).unwrap();
        for i in 0..=10 {
            let t = i as f64 * 10.0;
            assert!((s.current(10.0, t) - i as f64).abs() < 1e-9);
        }
    }

    #[test]
    fn test_rising_power_law() {
        let s = SequenceStep::rising(100.0, 2.0).unwrap();
        assert!((s.current(10.0, 50.0) - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_rising_rejects_zero_exponent() {
        assert!(matches!(
            SequenceStep::rising(100.0, 0.0),
            Err(ConfigError::InvalidExponent { index: 0, .. })
        ));
        assert_eq!(StepKind::Rising.fraction(100.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn test_out_of_range_elapsed() {
        let rising = SequenceStep::rising(60.0, 1.5).unwrap();
        assert_eq!(rising.current(3.0, -0.5), 0.0);
        assert_eq!(rising.current(3.0, 61.0), 3.0);

        let decrease = step(StepKind::Decrease, 60.0);
        assert_eq!(decrease.current(3.0, -1.0), 3.0);
        assert_eq!(decrease.current(3.0, 61.0), 0.0);
    }

    #[test]
    fn test_negative_target_is_zero() {
        let s = step(StepKind::HeatCleaning, 10.0);
        assert_eq!(s.current(-1.0, 5.0), 0.0);
    }

    #[test]
    fn test_rejects_degenerate_steps() {
        assert!(matches!(
            SequenceStep::rising(0.0, 1.0),
            Err(ConfigError::InvalidDuration { .. })
        ));
        assert!(SequenceStep::wait(-5.0).is_err());
        assert!(SequenceStep::wait(f64::NAN).is_err());
        assert!(matches!(
            SequenceStep::rising(10.0, -1.0),
            Err(ConfigError::InvalidExponent { .. })
        ));
    }

    #[test]
    fn test_names() {
        assert_eq!(step(StepKind::HeatCleaning, 1.0).name(), "HeatCleaning");
        assert_eq!(StepKind::Wait.name(), "Wait");
    }

    fn any_kind() -> impl Strategy<Value = StepKind> {
        prop::sample::select(StepKind::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_current_within_bounds(
            kind in any_kind(),
            duration in 0.1f64..10_000.0,
            exponent in 0.001f64..5.0,
            target in 0.0f64..50.0,
            frac in -0.1f64..1.1,
        ) {
            let s = SequenceStep::new(kind, duration, exponent).unwrap();
            let i = s.current(target, frac * duration);
            prop_assert!(i >= 0.0);
            prop_assert!(i <= target);
        }

        #[test]
        fn prop_monotonic(
            duration in 0.1f64..10_000.0,
            exponent in 0.001f64..5.0,
            a in 0.0f64..1.0,
            b in 0.0f64..1.0,
        ) {
            let (t1, t2) = if a <= b {
                (a * duration, b * duration)
            } else {
                (b * duration, a * duration)
            };

            let rising = SequenceStep::rising(duration, exponent).unwrap();
            prop_assert!(rising.current(10.0, t1) <= rising.current(10.0, t2));

            let decrease = SequenceStep::decrease(duration).unwrap();
            prop_assert!(decrease.current(10.0, t1) >= decrease.current(10.0, t2));
        }

        #[test]
        fn prop_rising_endpoints(
            duration in 0.1f64..10_000.0,
            exponent in 0.001f64..50.0,
            target in 0.0f64..50.0,
        ) {
            let s = SequenceStep::rising(duration, exponent).unwrap();
            prop_assert_eq!(s.current(target, 0.0), 0.0);
            prop_assert!((s.current(target, duration) - target).abs() < 1e-9);
        }
    }
}
