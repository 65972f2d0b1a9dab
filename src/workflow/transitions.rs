// Transition table: what entering each step does

use crate::workflow::types::{StepAction, WorkflowStep};

/// One row of the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub action: StepAction,
    /// Step the workflow enters once the controller confirms the action
    pub target: WorkflowStep,
    /// Forget the last observed state on acknowledgement. Set for commands
    /// that may leave the controller in the state it was already in.
    pub rearm_on_ack: bool,
}

/// The row for `step`, or `None` when entering `step` does nothing
pub fn next(step: WorkflowStep) -> Option<Transition> {
    let transition = match step {
        WorkflowStep::Starting => Transition {
            action: StepAction::KillAlarm,
            target: WorkflowStep::KillingAlarm,
            rearm_on_ack: true,
        },
        WorkflowStep::KillingAlarm => Transition {
            action: StepAction::Home,
            target: WorkflowStep::Homing,
            rearm_on_ack: false,
        },
        WorkflowStep::Homing => Transition {
            action: StepAction::MoveToOrigin,
            target: WorkflowStep::MoveToOrigin,
            rearm_on_ack: true,
        },
        WorkflowStep::MoveToOrigin => Transition {
            action: StepAction::SendFile,
            target: WorkflowStep::Sending,
            rearm_on_ack: false,
        },
        WorkflowStep::Sending => Transition {
            action: StepAction::Eject,
            target: WorkflowStep::Ejecting,
            rearm_on_ack: true,
        },
        WorkflowStep::Ejecting => Transition {
            action: StepAction::Complete,
            target: WorkflowStep::Finished,
            rearm_on_ack: false,
        },
        WorkflowStep::Finished
        | WorkflowStep::Aborted
        | WorkflowStep::Working
        | WorkflowStep::Faulted => return None,
    };
    Some(transition)
}
