// Workflow controller - the public face of the job workflow
//
// Thin wrapper over the state machine handle that answers the UI questions
// ("is it homing?") from the latest published snapshot.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use crate::config::{MachineConfig, WorkflowConfig};
use crate::machine::traits::{FileTransfer, HistoryStore, MachineController};
use crate::workflow::state_machine::{Collaborators, WorkflowError, WorkflowStateMachine};
use crate::workflow::types::{StartOutcome, WorkflowSnapshot, WorkflowStep};

#[derive(Debug)]
pub struct WorkflowController {
    machine: WorkflowStateMachine,
}

impl WorkflowController {
    pub fn new(
        controller: Arc<dyn MachineController>,
        transfer: Arc<dyn FileTransfer>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        Self::with_config(
            Collaborators::new(controller, transfer, history),
            MachineConfig::default(),
            WorkflowConfig::default(),
        )
    }

    pub fn with_config(
        collaborators: Collaborators,
        machine: MachineConfig,
        workflow: WorkflowConfig,
    ) -> Self {
        Self {
            machine: WorkflowStateMachine::spawn(collaborators, machine, workflow),
        }
    }

    /// Start processing `file`. Returns `AlreadyRunning` without touching the
    /// current job when one is in progress.
    pub async fn start(&self, file: &str) -> Result<StartOutcome, WorkflowError> {
        if let Some(session_id) = self.running_session() {
            info!(session = %session_id, "Workflow already running");
            return Ok(StartOutcome::AlreadyRunning {
                session_id: Some(session_id),
            });
        }
        self.machine.start(file).await
    }

    /// Abort the current job and cancel any file transfer
    pub async fn stop(&self) -> Result<(), WorkflowError> {
        self.machine.stop().await
    }

    pub fn is_running(&self) -> bool {
        self.machine.is_running()
    }

    pub fn is_killing_alarm(&self) -> bool {
        self.is_active(WorkflowStep::KillingAlarm)
    }

    pub fn is_homing(&self) -> bool {
        self.is_active(WorkflowStep::Homing)
    }

    pub fn is_moving_to_origin(&self) -> bool {
        self.is_active(WorkflowStep::MoveToOrigin)
    }

    pub fn is_sending(&self) -> bool {
        self.is_active(WorkflowStep::Sending)
    }

    pub fn is_ejecting(&self) -> bool {
        self.is_active(WorkflowStep::Ejecting)
    }

    /// True when the controller never confirmed a step in time
    pub fn is_faulted(&self) -> bool {
        self.machine.step() == WorkflowStep::Faulted
    }

    pub fn step(&self) -> WorkflowStep {
        self.machine.step()
    }

    pub fn target_file(&self) -> Option<String> {
        self.machine.snapshot().target_file
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        self.machine.snapshot()
    }

    pub fn watch(&self) -> watch::Receiver<WorkflowSnapshot> {
        self.machine.watch()
    }

    fn is_active(&self, step: WorkflowStep) -> bool {
        self.machine.active_step() == step
    }

    fn running_session(&self) -> Option<uuid::Uuid> {
        let snapshot = self.machine.snapshot();
        if snapshot.is_running() {
            snapshot.session_id
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryHistory;
    use crate::machine::errors::ControllerError;
    use crate::machine::status::{MachineState, MachineStatus};
    use crate::machine::traits::{MockFileTransfer, MockMachineController};
    use futures::stream::{self, StreamExt};
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Controller whose status feed is driven by the returned sender
    fn scripted_controller(
        configure: impl FnOnce(&mut MockMachineController),
    ) -> (MockMachineController, mpsc::UnboundedSender<MachineState>) {
        let (tx, rx) = mpsc::unbounded_channel::<MachineState>();
        let rx = std::sync::Mutex::new(Some(rx));
        let mut controller = MockMachineController::new();
        configure(&mut controller);
        controller.expect_status_feed().returning(move || {
            match rx.lock().unwrap().take() {
                Some(rx) => stream::unfold(rx, |mut rx| async move {
                    rx.recv().await.map(|state| (MachineStatus::new(state), rx))
                })
                .boxed(),
                None => stream::pending().boxed(),
            }
        });
        (controller, tx)
    }

    async fn wait_until(controller: &WorkflowController, predicate: impl Fn(&WorkflowSnapshot) -> bool) {
        let mut watch = controller.watch();
        tokio::time::timeout(Duration::from_secs(5), watch.wait_for(|s| predicate(s)))
            .await
            .expect("timed out waiting for workflow")
            .expect("workflow state machine exited");
    }

    #[tokio::test]
    async fn test_queries_follow_active_step() {
        let (controller, feed) = scripted_controller(|controller| {
            controller.expect_kill_alarm().returning(|| Ok(()));
            controller.expect_home_machine().returning(|| Ok(()));
        });
        let workflow = WorkflowController::new(
            Arc::new(controller),
            Arc::new(MockFileTransfer::new()),
            Arc::new(MemoryHistory::new()),
        );

        workflow.start("part.nc").await.unwrap();
        wait_until(&workflow, |s| s.active_step == WorkflowStep::KillingAlarm).await;
        assert!(workflow.is_killing_alarm());
        assert!(!workflow.is_homing());

        feed.send(MachineState::Idle).unwrap();
        wait_until(&workflow, |s| s.active_step == WorkflowStep::Homing).await;
        assert!(workflow.is_homing());
        assert!(!workflow.is_killing_alarm());
        assert!(workflow.is_running());
        assert_eq!(workflow.target_file().as_deref(), Some("part.nc"));
    }

    #[tokio::test]
    async fn test_start_while_running_keeps_current_job() {
        let (controller, _feed) = scripted_controller(|controller| {
            controller.expect_kill_alarm().times(1).returning(|| Ok(()));
        });
        let workflow = WorkflowController::new(
            Arc::new(controller),
            Arc::new(MockFileTransfer::new()),
            Arc::new(MemoryHistory::new()),
        );

        assert!(workflow.start("part.nc").await.unwrap().is_started());
        let second = workflow.start("other.nc").await.unwrap();

        assert!(!second.is_started());
        assert_eq!(workflow.target_file().as_deref(), Some("part.nc"));
    }

    #[tokio::test]
    async fn test_failed_homing_is_not_running_a_step() {
        let (controller, feed) = scripted_controller(|controller| {
            controller.expect_kill_alarm().returning(|| Ok(()));
            controller.expect_home_machine().returning(|| {
                Err(ControllerError::Rejected {
                    message: "limit switch".to_string(),
                })
            });
        });
        let mut transfer = MockFileTransfer::new();
        transfer.expect_cancel().returning(|| Ok(()));
        let workflow = WorkflowController::new(
            Arc::new(controller),
            Arc::new(transfer),
            Arc::new(MemoryHistory::new()),
        );

        workflow.start("part.nc").await.unwrap();
        wait_until(&workflow, |s| s.active_step == WorkflowStep::KillingAlarm).await;
        feed.send(MachineState::Idle).unwrap();
        wait_until(&workflow, |s| s.fault.is_some()).await;

        assert_eq!(workflow.step(), WorkflowStep::Working);
        assert!(workflow.is_running());
        assert!(!workflow.is_homing());

        workflow.stop().await.unwrap();
        assert_eq!(workflow.step(), WorkflowStep::Aborted);
        assert!(!workflow.is_running());
    }
}
