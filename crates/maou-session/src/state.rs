// state.rs — Session phases and the transitions between them.
//
//   Idle → Thinking → PlanProposed → AutoApplied → Applied → Idle
//                                  → AwaitingApproval → Applied → Idle
//                                                     → Rejected → Idle
//
// Failure edges return to Idle: Thinking (parse/model error or cancel),
// PlanProposed (preparation failed), AutoApplied / AwaitingApproval (apply
// failed). AwaitingApproval → Thinking is the supersede edge taken when a new
// request replaces the pending plan.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Thinking,
    PlanProposed,
    AutoApplied,
    AwaitingApproval,
    Applied,
    Rejected,
}

impl SessionPhase {
    pub fn can_transition_to(&self, next: &SessionPhase) -> bool {
        use SessionPhase::*;
        matches!(
            (self, next),
            (Idle, Thinking)
                | (Thinking, PlanProposed)
                | (Thinking, Idle)
                | (PlanProposed, AutoApplied)
                | (PlanProposed, AwaitingApproval)
                | (PlanProposed, Idle)
                | (AutoApplied, Applied)
                | (AutoApplied, Idle)
                | (AwaitingApproval, Applied)
                | (AwaitingApproval, Rejected)
                | (AwaitingApproval, Thinking)
                | (AwaitingApproval, Idle)
                | (Applied, Idle)
                | (Rejected, Idle)
        )
    }

    /// A pending plan exists only in these phases.
    pub fn holds_plan(&self) -> bool {
        matches!(
            self,
            SessionPhase::PlanProposed | SessionPhase::AutoApplied | SessionPhase::AwaitingApproval
        )
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Thinking => "thinking",
            SessionPhase::PlanProposed => "plan_proposed",
            SessionPhase::AutoApplied => "auto_applied",
            SessionPhase::AwaitingApproval => "awaiting_approval",
            SessionPhase::Applied => "applied",
            SessionPhase::Rejected => "rejected",
        };
        write!(f, "{}", name)
    }
}
