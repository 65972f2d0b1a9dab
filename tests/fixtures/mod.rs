//! Shared fixtures for workflow integration tests
//!
//! `ScriptedMachine` plays both the machine controller and the file
//! transfer. Every call is recorded, results can be scripted per command,
//! and status readings are pushed by the test instead of polled.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use fabflow::machine::{
    ControllerError, FileTransfer, MachineController, MachineState, MachineStatus, TransferError,
};
use fabflow::{
    Collaborators, MachineConfig, MemoryHistory, WorkflowConfig, WorkflowController,
    WorkflowSnapshot, WorkflowStep,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    KillAlarm,
    SoftReset,
    Home,
    SendCommands(String),
    Open(String),
    Send,
    Cancel,
}

#[derive(Default)]
struct Script {
    home: Option<ControllerError>,
    open: Option<TransferError>,
    open_delay: Option<Duration>,
    cancel: Option<TransferError>,
}

#[derive(Default)]
pub struct ScriptedMachine {
    calls: Mutex<Vec<Call>>,
    feeds: Mutex<Vec<mpsc::UnboundedSender<MachineState>>>,
    script: Mutex<Script>,
}

impl ScriptedMachine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_home(&self, error: ControllerError) {
        self.script.lock().unwrap().home = Some(error);
    }

    pub fn fail_open(&self, error: TransferError) {
        self.script.lock().unwrap().open = Some(error);
    }

    /// Make opening a file take `delay` before it answers
    pub fn delay_open(&self, delay: Duration) {
        self.script.lock().unwrap().open_delay = Some(delay);
    }

    pub fn fail_cancel(&self, error: TransferError) {
        self.script.lock().unwrap().cancel = Some(error);
    }

    /// Deliver a reading to every open status feed
    pub fn push(&self, state: MachineState) {
        self.feeds
            .lock()
            .unwrap()
            .retain(|feed| feed.send(state).is_ok());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl MachineController for ScriptedMachine {
    async fn kill_alarm(&self) -> Result<(), ControllerError> {
        self.record(Call::KillAlarm);
        Ok(())
    }

    async fn soft_reset(&self) -> Result<(), ControllerError> {
        self.record(Call::SoftReset);
        Ok(())
    }

    async fn home_machine(&self) -> Result<(), ControllerError> {
        self.record(Call::Home);
        match self.script.lock().unwrap().home.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn send_commands(&self, commands: &str) -> Result<(), ControllerError> {
        self.record(Call::SendCommands(commands.to_string()));
        Ok(())
    }

    fn status_feed(&self) -> BoxStream<'static, MachineStatus> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.feeds.lock().unwrap().push(tx);
        stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|state| (MachineStatus::new(state), rx))
        })
        .boxed()
    }
}

#[async_trait]
impl FileTransfer for ScriptedMachine {
    async fn open_workspace_file(&self, name: &str) -> Result<(), TransferError> {
        self.record(Call::Open(name.to_string()));
        let delay = self.script.lock().unwrap().open_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.script.lock().unwrap().open.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn send(&self) -> Result<(), TransferError> {
        self.record(Call::Send);
        Ok(())
    }

    async fn cancel(&self) -> Result<(), TransferError> {
        self.record(Call::Cancel);
        match self.script.lock().unwrap().cancel.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

pub struct Rig {
    pub machine: Arc<ScriptedMachine>,
    pub history: Arc<MemoryHistory>,
    pub workflow: WorkflowController,
}

impl Rig {
    pub fn new() -> Self {
        Self::with_workflow_config(WorkflowConfig::default())
    }

    pub fn with_workflow_config(workflow: WorkflowConfig) -> Self {
        let machine = ScriptedMachine::new();
        let history = Arc::new(MemoryHistory::new());
        let collaborators = Collaborators::new(machine.clone(), machine.clone(), history.clone());
        let workflow = WorkflowController::with_config(collaborators, MachineConfig::default(), workflow);
        Self {
            machine,
            history,
            workflow,
        }
    }

    /// Wait until the published snapshot satisfies `predicate`
    pub async fn wait_for(&self, predicate: impl Fn(&WorkflowSnapshot) -> bool) -> WorkflowSnapshot {
        let mut updates = self.workflow.watch();
        let snapshot = tokio::time::timeout(Duration::from_secs(60), updates.wait_for(|s| predicate(s)))
            .await
            .expect("timed out waiting for workflow")
            .expect("workflow state machine exited")
            .clone();
        snapshot
    }

    pub async fn wait_for_active(&self, step: WorkflowStep) -> WorkflowSnapshot {
        self.wait_for(|s| s.active_step == step).await
    }

    /// Report the machine busy and then idle, and wait for the workflow to
    /// move on to `next`
    pub async fn complete_motion(&self, next: WorkflowStep) -> WorkflowSnapshot {
        self.machine.push(MachineState::Run);
        self.machine.push(MachineState::Idle);
        self.wait_for_active(next).await
    }

    /// Wait until the machine has seen `call`
    pub async fn wait_for_call(&self, call: Call) {
        tokio::time::timeout(Duration::from_secs(60), async {
            while self.machine.count(&call) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for machine call");
    }

    /// Give spawned tasks a chance to run
    pub async fn settle(&self) {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
