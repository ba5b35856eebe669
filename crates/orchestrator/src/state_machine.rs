use poolshift_core::PhaseState;

use crate::error::{OrchestratorError, Result};

pub struct PhaseStateMachine;

impl PhaseStateMachine {
    pub fn validate_transition(from: &PhaseState, to: &PhaseState) -> Result<()> {
        let allowed = Self::allowed_transitions(from);

        if allowed.contains(to) {
            Ok(())
        } else {
            Err(OrchestratorError::InvalidTransition {
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
            })
        }
    }

    fn allowed_transitions(from: &PhaseState) -> Vec<PhaseState> {
        match from {
            PhaseState::PreMigrate => vec![PhaseState::ReadyWait, PhaseState::Error],
            PhaseState::ReadyWait => vec![PhaseState::Cordon, PhaseState::Error],
            PhaseState::Cordon => vec![PhaseState::Evacuate, PhaseState::Error],
            PhaseState::Evacuate => vec![PhaseState::PostMigrate, PhaseState::Error],
            PhaseState::PostMigrate => vec![PhaseState::Finalize, PhaseState::Error],
            PhaseState::Finalize | PhaseState::Error => vec![],
        }
    }

    pub fn can_transition(from: &PhaseState, to: &PhaseState) -> bool {
        Self::validate_transition(from, to).is_ok()
    }

    pub fn next_phase(current: &PhaseState) -> Option<PhaseState> {
        match current {
            PhaseState::PreMigrate => Some(PhaseState::ReadyWait),
            PhaseState::ReadyWait => Some(PhaseState::Cordon),
            PhaseState::Cordon => Some(PhaseState::Evacuate),
            PhaseState::Evacuate => Some(PhaseState::PostMigrate),
            PhaseState::PostMigrate => Some(PhaseState::Finalize),
            PhaseState::Finalize | PhaseState::Error => None,
        }
    }
}
