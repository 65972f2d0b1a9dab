// Collaborator traits - separating the workflow from transport for testability

use async_trait::async_trait;
use futures::stream::BoxStream;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use crate::machine::errors::{ControllerError, TransferError};
use crate::machine::status::MachineStatus;

/// Remote machine controller.
///
/// A successful return means the controller accepted the command, not that
/// the machine finished executing it. Completion is only visible through
/// `status_feed`.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait MachineController: Send + Sync {
    /// Clear an alarm lock ($X)
    async fn kill_alarm(&self) -> Result<(), ControllerError>;

    /// Soft reset the controller (Ctrl-X)
    async fn soft_reset(&self) -> Result<(), ControllerError>;

    /// Run the homing cycle. Fails with `ControllerError::NotEnabled` on
    /// machines without homing switches.
    async fn home_machine(&self) -> Result<(), ControllerError>;

    /// Send a raw newline-separated command sequence
    async fn send_commands(&self, commands: &str) -> Result<(), ControllerError>;

    /// Long-lived feed of status readings. Reconnecting is the implementor's job.
    fn status_feed(&self) -> BoxStream<'static, MachineStatus>;
}

/// Job file selection and streaming
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait FileTransfer: Send + Sync {
    async fn open_workspace_file(&self, name: &str) -> Result<(), TransferError>;

    async fn send(&self) -> Result<(), TransferError>;

    async fn cancel(&self) -> Result<(), TransferError>;
}

/// Record of processed job files. Fire-and-forget.
#[cfg_attr(any(test, feature = "testing"), automock)]
pub trait HistoryStore: Send + Sync {
    fn add_processed_file(&self, name: &str);
}
