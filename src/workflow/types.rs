// Core types for the fabrication workflow

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::machine::status::MachineState;

/// Steps of a fabrication job, in forward order.
///
/// `Working` is the busy marker held while a step's command is outstanding or
/// waiting for the controller to confirm it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStep {
    #[default]
    Finished,
    Starting,
    KillingAlarm,
    Homing,
    MoveToOrigin,
    Sending,
    Ejecting,
    Aborted,
    Working,
    /// A step never saw its confirmation within the configured bound
    Faulted,
}

impl WorkflowStep {
    /// Finished and Aborted are the only resting states
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowStep::Finished | WorkflowStep::Aborted)
    }

    /// Position in the forward sequence; `None` for markers and Aborted
    pub fn ordinal(&self) -> Option<u8> {
        match self {
            WorkflowStep::Starting => Some(0),
            WorkflowStep::KillingAlarm => Some(1),
            WorkflowStep::Homing => Some(2),
            WorkflowStep::MoveToOrigin => Some(3),
            WorkflowStep::Sending => Some(4),
            WorkflowStep::Ejecting => Some(5),
            WorkflowStep::Finished => Some(6),
            WorkflowStep::Aborted | WorkflowStep::Working | WorkflowStep::Faulted => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStep::Finished => "FINISHED",
            WorkflowStep::Starting => "STARTING",
            WorkflowStep::KillingAlarm => "KILLING_ALARM",
            WorkflowStep::Homing => "HOMING",
            WorkflowStep::MoveToOrigin => "MOVE_TO_ORIGIN",
            WorkflowStep::Sending => "SENDING",
            WorkflowStep::Ejecting => "EJECTING",
            WorkflowStep::Aborted => "ABORTED",
            WorkflowStep::Working => "WORKING",
            WorkflowStep::Faulted => "FAULTED",
        }
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What entering a step makes the workflow do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepAction {
    KillAlarm,
    Home,
    MoveToOrigin,
    /// Open the target file, then start streaming it
    SendFile,
    Eject,
    /// Record the processed file and finish; no outbound command
    Complete,
}

impl StepAction {
    pub fn issues_command(&self) -> bool {
        !matches!(self, StepAction::Complete)
    }
}

/// Identifies one outbound command so late results can be told apart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandTicket {
    pub session: Uuid,
    pub sequence: u64,
}

impl fmt::Display for CommandTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.session, self.sequence)
    }
}

/// Side effects requested by the session; executed by the state machine driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Issue { ticket: CommandTicket, action: StepAction },
    /// Forget the last observed machine state
    Rearm,
    /// Start the confirmation timer for an acknowledged command
    ArmTimeout { ticket: CommandTicket },
    RecordProcessed { file: String },
    /// The session reached Finished; release the status subscription
    Completed,
}

/// Audit record of an entered step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: WorkflowStep,
    pub entered_at: DateTime<Utc>,
}

/// Read-only view of the workflow, published after every processed event
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    pub session_id: Option<Uuid>,
    pub target_file: Option<String>,
    pub step: WorkflowStep,
    /// The physical action in progress: the acknowledged target while
    /// Working, otherwise `step`
    pub active_step: WorkflowStep,
    pub last_observed: MachineState,
    pub history: Vec<StepRecord>,
    pub fault: Option<String>,
}

impl WorkflowSnapshot {
    pub fn is_running(&self) -> bool {
        !self.step.is_terminal()
    }

    pub fn entered_steps(&self) -> Vec<WorkflowStep> {
        self.history.iter().map(|record| record.step).collect()
    }
}

/// Result of asking the workflow to start
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started { session_id: Uuid },
    /// A session is already running; nothing changed
    AlreadyRunning { session_id: Option<Uuid> },
}

impl StartOutcome {
    pub fn is_started(&self) -> bool {
        matches!(self, StartOutcome::Started { .. })
    }
}
