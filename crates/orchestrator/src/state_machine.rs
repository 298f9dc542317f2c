use pipes_core::RunStatus;

use crate::error::{EngineError, Result};

/// Run status transitions. Status only ever moves forward.
pub struct RunStateMachine;

impl RunStateMachine {
    pub fn validate_transition(from: RunStatus, to: RunStatus) -> Result<()> {
        if Self::allowed_transitions(from).contains(&to) {
            Ok(())
        } else {
            Err(EngineError::InvalidTransition { from, to })
        }
    }

    fn allowed_transitions(from: RunStatus) -> &'static [RunStatus] {
        match from {
            // A run rejected at admission is finalised without ever running
            RunStatus::NotStarted => &[RunStatus::Running, RunStatus::Error],
            RunStatus::Running => &[RunStatus::Finished, RunStatus::Error, RunStatus::Stopped],
            RunStatus::Finished | RunStatus::Error | RunStatus::Stopped => &[],
        }
    }

    pub fn can_transition(from: RunStatus, to: RunStatus) -> bool {
        Self::validate_transition(from, to).is_ok()
    }

    /// Terminal status `done` moves a run to.
    pub fn terminal_status(failed: bool) -> RunStatus {
        if failed {
            RunStatus::Error
        } else {
            RunStatus::Finished
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        assert!(RunStateMachine::can_transition(
            RunStatus::NotStarted,
            RunStatus::Running
        ));
        assert!(RunStateMachine::can_transition(
            RunStatus::Running,
            RunStatus::Finished
        ));
        assert!(RunStateMachine::can_transition(
            RunStatus::Running,
            RunStatus::Error
        ));
        assert!(RunStateMachine::can_transition(
            RunStatus::Running,
            RunStatus::Stopped
        ));
    }

    #[test]
    fn test_admission_failure_transition() {
        assert!(RunStateMachine::can_transition(
            RunStatus::NotStarted,
            RunStatus::Error
        ));
        assert!(!RunStateMachine::can_transition(
            RunStatus::NotStarted,
            RunStatus::Finished
        ));
    }

    #[test]
    fn test_terminal_states_never_rerun() {
        for status in [RunStatus::Finished, RunStatus::Error, RunStatus::Stopped] {
            assert!(!RunStateMachine::can_transition(status, RunStatus::Running));
            assert!(!RunStateMachine::can_transition(status, RunStatus::NotStarted));
        }
    }

    #[test]
    fn test_invalid_transition_error() {
        let err = RunStateMachine::validate_transition(RunStatus::Finished, RunStatus::Running)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid run status transition from FINISHED to RUNNING"
        );
    }
}
