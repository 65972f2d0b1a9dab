// Job workflow: the step table, the pure session core, and the state machine
// task that drives it against real collaborators.

pub mod controller;
pub mod session;
pub mod state_machine;
pub mod transitions;
pub mod types;

pub use controller::WorkflowController;
pub use session::{CommandPhase, WorkflowSession};
pub use state_machine::{Collaborators, WorkflowError, WorkflowStateMachine};
pub use transitions::Transition;
pub use types::{
    CommandTicket, Effect, StartOutcome, StepAction, StepRecord, WorkflowSnapshot, WorkflowStep,
};
