// fabflow - automated job workflow for networked CNC controllers
// This exposes the core components for the CLI, tests and embedding

pub mod cli;
pub mod config;
pub mod history;
pub mod machine;
pub mod telemetry;
pub mod watcher;
pub mod workflow;

// Re-export key types for easy access
pub use config::{FabflowConfig, MachineConfig, ObservabilityConfig, WorkflowConfig};
pub use history::{MemoryHistory, ProcessedFile};
pub use machine::{
    CommandError, ControllerError, FileTransfer, HistoryStore, MachineController, MachineState,
    MachineStatus, SimulatedMachine, SimulatorSettings, StatusChange, TransferError,
};
pub use telemetry::{create_workflow_span, generate_session_id, init_telemetry};
pub use watcher::{StatusWatcher, Subscription};
pub use workflow::{
    Collaborators, StartOutcome, WorkflowController, WorkflowError, WorkflowSnapshot,
    WorkflowStateMachine, WorkflowStep,
};
