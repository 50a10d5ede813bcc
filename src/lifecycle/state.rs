//! Allowed plan transitions.

use strum::Display;

use crate::domain::PlanState;

/// What moves a plan from one state to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Transition {
    Approve,
    Reject,
    Dispatch,
    Expire,
    Complete,
}

impl Transition {
    /// The single state this transition may leave from.
    pub fn source(self) -> PlanState {
        match self {
            Transition::Approve | Transition::Reject | Transition::Expire => PlanState::Proposed,
            Transition::Dispatch => PlanState::Approved,
            Transition::Complete => PlanState::Dispatched,
        }
    }

    pub fn target(self) -> PlanState {
        match self {
            Transition::Approve => PlanState::Approved,
            Transition::Reject => PlanState::Rejected,
            Transition::Dispatch => PlanState::Dispatched,
            Transition::Expire => PlanState::Expired,
            Transition::Complete => PlanState::Completed,
        }
    }

    /// Next state if `from` permits this transition.
    pub fn apply(self, from: PlanState) -> Option<PlanState> {
        (from == self.source()).then(|| self.target())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const ALL_STATES: [PlanState; 6] = [
        PlanState::Proposed,
        PlanState::Approved,
        PlanState::Rejected,
        PlanState::Dispatched,
        PlanState::Completed,
        PlanState::Expired,
    ];

    #[rstest]
    #[case(Transition::Approve, PlanState::Proposed, PlanState::Approved)]
    #[case(Transition::Reject, PlanState::Proposed, PlanState::Rejected)]
    #[case(Transition::Expire, PlanState::Proposed, PlanState::Expired)]
    #[case(Transition::Dispatch, PlanState::Approved, PlanState::Dispatched)]
    #[case(Transition::Complete, PlanState::Dispatched, PlanState::Completed)]
    fn test_only_defined_edges(#[case] t: Transition, #[case] from: PlanState, #[case] to: PlanState) {
        for state in ALL_STATES {
            let expected = if state == from { Some(to) } else { None };
            assert_eq!(t.apply(state), expected, "{t} from {state}");
        }
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        let transitions = [
            Transition::Approve,
            Transition::Reject,
            Transition::Dispatch,
            Transition::Expire,
            Transition::Complete,
        ];
        for state in ALL_STATES.into_iter().filter(PlanState::is_terminal) {
            assert!(transitions.iter().all(|t| t.apply(state).is_none()));
        }
    }
}
