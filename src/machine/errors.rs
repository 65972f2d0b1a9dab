// Error types for the controller and file transfer collaborators

use thiserror::Error;

/// Failure reported by the machine controller for a single command
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ControllerError {
    /// The controller does not support the requested feature (e.g. homing on
    /// a machine without limit switches).
    #[error("Controller feature not enabled: {feature}")]
    NotEnabled { feature: String },
    #[error("Controller rejected command: {message}")]
    Rejected { message: String },
    #[error("Controller unreachable: {message}")]
    Unreachable { message: String },
}

impl ControllerError {
    pub fn is_not_enabled(&self) -> bool {
        matches!(self, ControllerError::NotEnabled { .. })
    }
}

/// Failure reported by the file transfer collaborator
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("Could not open workspace file {file}: {message}")]
    OpenFailed { file: String, message: String },
    #[error("Could not send file: {message}")]
    SendFailed { message: String },
    #[error("Could not cancel transfer: {message}")]
    CancelFailed { message: String },
}

/// Outcome of a workflow step command that did not acknowledge
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Command rejected: {0}")]
    CommandRejected(#[from] ControllerError),
    #[error("Transfer failed: {0}")]
    TransferFailed(#[from] TransferError),
}

impl CommandError {
    /// True only for the controller's "feature not enabled" refusal
    pub fn is_not_enabled(&self) -> bool {
        match self {
            CommandError::CommandRejected(err) => err.is_not_enabled(),
            CommandError::TransferFailed(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_enabled_detection() {
        let err: CommandError = ControllerError::NotEnabled {
            feature: "homing".to_string(),
        }
        .into();
        assert!(err.is_not_enabled());

        let err: CommandError = ControllerError::Rejected {
            message: "error:9".to_string(),
        }
        .into();
        assert!(!err.is_not_enabled());

        let err: CommandError = TransferError::SendFailed {
            message: "busy".to_string(),
        }
        .into();
        assert!(!err.is_not_enabled());
    }

    #[test]
    fn test_error_messages() {
        let err = CommandError::from(TransferError::OpenFailed {
            file: "part.nc".to_string(),
            message: "missing".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "Transfer failed: Could not open workspace file part.nc: missing"
        );
    }
}
