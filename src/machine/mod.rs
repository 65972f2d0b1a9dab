// Machine controller boundary
//
// Everything the workflow knows about the physical machine goes through the
// collaborator traits defined here.

pub mod errors;
pub mod simulator;
pub mod status;
pub mod traits;

pub use errors::{CommandError, ControllerError, TransferError};
pub use simulator::{SimulatedCommand, SimulatedMachine, SimulatorSettings};
pub use status::{MachineState, MachineStatus, StatusChange};
pub use traits::{FileTransfer, HistoryStore, MachineController};

#[cfg(any(test, feature = "testing"))]
pub use traits::{MockFileTransfer, MockHistoryStore, MockMachineController};
