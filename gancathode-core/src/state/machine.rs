//! State machine definition
//!
//! Completion, operator stop and faults all funnel through Stopping, where
//! outputs are forced off, before the run is Idle again.

use serde::Serialize;

use super::events::RunEvent;

/// Run states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum RunState {
    /// No run active; instruments not held
    #[default]
    Idle,
    /// Tick loop active
    Running,
    /// Loop left; emergency shutdown in progress
    Stopping,
}

impl RunState {
    /// Process an event and return the next state
    pub fn transition(self, event: RunEvent) -> Self {
        use RunEvent::*;
        use RunState::*;

        match (self, event) {
            (Idle, Start) => Running,

            (Running, StopRequested) => Stopping,
            (Running, PlanExhausted) => Stopping,
            (Running, Fault) => Stopping,

            // A fault during cleanup does not restart cleanup
            (Stopping, CleanupComplete) => Idle,

            // Default: stay in current state
            _ => self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start() {
        assert_eq!(RunState::Idle.transition(RunEvent::Start), RunState::Running);
    }

    #[test]
    fn test_all_exits_go_through_stopping() {
        for event in [RunEvent::StopRequested, RunEvent::PlanExhausted, RunEvent::Fault] {
            let stopping = RunState::Running.transition(event);
            assert_eq!(stopping, RunState::Stopping);
            assert_eq!(
                stopping.transition(RunEvent::CleanupComplete),
                RunState::Idle
            );
        }
    }

    #[test]
    fn test_ignored_events() {
        assert_eq!(RunState::Idle.transition(RunEvent::Fault), RunState::Idle);
        assert_eq!(
            RunState::Running.transition(RunEvent::Start),
            RunState::Running
        );
        assert_eq!(
            RunState::Stopping.transition(RunEvent::Fault),
            RunState::Stopping
        );
        assert_eq!(
            RunState::Running.transition(RunEvent::CleanupComplete),
            RunState::Running
        );
    }
}
