//! Migration phases and their linear transitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a migration run is.
///
/// Work phases run strictly in declaration order. `Done` and `Failed` are
/// terminal; any work phase can jump straight to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    CheckingConnectivity,
    CleaningDestination,
    ResettingDumpDir,
    DumpingSchema,
    RestoringSchema,
    DisablingConstraints,
    DumpingData,
    RestoringData,
    EnablingConstraints,
    Done,
    Failed,
}

impl Phase {
    /// Work phases in execution order.
    pub const STEPS: [Phase; 9] = [
        Phase::CheckingConnectivity,
        Phase::CleaningDestination,
        Phase::ResettingDumpDir,
        Phase::DumpingSchema,
        Phase::RestoringSchema,
        Phase::DisablingConstraints,
        Phase::DumpingData,
        Phase::RestoringData,
        Phase::EnablingConstraints,
    ];

    /// Successor on success. Terminal phases have none.
    pub fn next(self) -> Option<Phase> {
        match self {
            Phase::Idle => Some(Phase::CheckingConnectivity),
            Phase::CheckingConnectivity => Some(Phase::CleaningDestination),
            Phase::CleaningDestination => Some(Phase::ResettingDumpDir),
            Phase::ResettingDumpDir => Some(Phase::DumpingSchema),
            Phase::DumpingSchema => Some(Phase::RestoringSchema),
            Phase::RestoringSchema => Some(Phase::DisablingConstraints),
            Phase::DisablingConstraints => Some(Phase::DumpingData),
            Phase::DumpingData => Some(Phase::RestoringData),
            Phase::RestoringData => Some(Phase::EnablingConstraints),
            Phase::EnablingConstraints => Some(Phase::Done),
            Phase::Done | Phase::Failed => None,
        }
    }

    /// Successor on failure. Terminal phases stay where they are.
    pub fn fail(self) -> Phase {
        if self.is_terminal() {
            self
        } else {
            Phase::Failed
        }
    }

    /// Whether the run has finished in this phase.
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::Failed)
    }

    /// 1-based step number for work phases.
    pub fn step_number(self) -> Option<usize> {
        Self::STEPS.iter().position(|p| *p == self).map(|i| i + 1)
    }

    /// Human-readable step name.
    pub fn label(self) -> &'static str {
        match self {
            Phase::Idle => "Idle",
            Phase::CheckingConnectivity => "Connectivity check",
            Phase::CleaningDestination => "Destination cleanup",
            Phase::ResettingDumpDir => "Dump directory reset",
            Phase::DumpingSchema => "Schema dump",
            Phase::RestoringSchema => "Schema restore",
            Phase::DisablingConstraints => "Disable constraints",
            Phase::DumpingData => "Data dump",
            Phase::RestoringData => "Data restore",
            Phase::EnablingConstraints => "Re-enable constraints",
            Phase::Done => "Done",
            Phase::Failed => "Failed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_walk_all_steps_in_order() {
        let mut walked = Vec::new();
        let mut phase = Phase::Idle;
        while let Some(next) = phase.next() {
            phase = next;
            if !phase.is_terminal() {
                walked.push(phase);
            }
        }
        assert_eq!(phase, Phase::Done);
        assert_eq!(walked, Phase::STEPS.to_vec());
    }

    #[test]
    fn test_terminal_phases() {
        assert!(Phase::Done.is_terminal());
        assert!(Phase::Failed.is_terminal());
        assert_eq!(Phase::Done.next(), None);
        assert_eq!(Phase::Failed.next(), None);
        assert!(!Phase::RestoringData.is_terminal());
    }

    #[test]
    fn test_any_work_phase_fails_directly() {
        for phase in Phase::STEPS {
            assert_eq!(phase.fail(), Phase::Failed);
        }
        assert_eq!(Phase::Idle.fail(), Phase::Failed);
        assert_eq!(Phase::Done.fail(), Phase::Done);
        assert_eq!(Phase::Failed.fail(), Phase::Failed);
    }

    #[test]
    fn test_step_numbers() {
        assert_eq!(Phase::CheckingConnectivity.step_number(), Some(1));
        assert_eq!(Phase::EnablingConstraints.step_number(), Some(9));
        assert_eq!(Phase::Idle.step_number(), None);
    }

    #[test]
    fn test_serializes_snake_case() {
        let json = serde_json::to_string(&Phase::RestoringSchema).unwrap();
        assert_eq!(json, "\"restoring_schema\"");
    }
}
