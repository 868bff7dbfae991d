//! Events that trigger run state transitions

use serde::Serialize;

/// Why a run left the Running state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    /// Plan exhausted (or NEA duration elapsed)
    Completed,
    /// Stop flag set by the operator
    StopRequested,
    /// Unrecoverable instrument error
    Fault,
}

/// Events that can trigger run state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEvent {
    /// Operator started a run
    Start,
    /// Operator asked the run to stop
    StopRequested,
    /// Elapsed time reached the end of the plan
    PlanExhausted,
    /// Fatal instrument error
    Fault,
    /// Outputs forced off and instruments released
    CleanupComplete,
}

impl From<StopReason> for RunEvent {
    /// Event that leaves the Running state for `reason`
    fn from(reason: StopReason) -> Self {
        match reason {
            StopReason::Completed => RunEvent::PlanExhausted,
            StopReason::StopRequested => RunEvent::StopRequested,
            StopReason::Fault => RunEvent::Fault,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_reasons() {
        assert_eq!(
            RunEvent::from(StopReason::Completed),
            RunEvent::PlanExhausted
        );
        assert_eq!(
            RunEvent::from(StopReason::StopRequested),
            RunEvent::StopRequested
        );
        assert_eq!(RunEvent::from(StopReason::Fault), RunEvent::Fault);
    }
}
