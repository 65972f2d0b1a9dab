// Workflow state machine - a single task owning the session
//
// Start, stop, status changes, command results and timers all arrive through
// one mailbox, so only one of them touches the session at a time. Commands run
// on their own tasks and report back through the same mailbox.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument, Span};
use uuid::Uuid;

use crate::config::{MachineConfig, WorkflowConfig};
use crate::machine::errors::CommandError;
use crate::machine::status::StatusChange;
use crate::machine::traits::{FileTransfer, HistoryStore, MachineController};
use crate::telemetry::{create_workflow_span, generate_session_id};
use crate::watcher::{StatusWatcher, Subscription};
use crate::workflow::session::WorkflowSession;
use crate::workflow::types::{
    CommandTicket, Effect, StartOutcome, StepAction, WorkflowSnapshot, WorkflowStep,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("Workflow state machine is no longer running")]
    Stopped,
}

/// The external services a workflow drives
#[derive(Clone)]
pub struct Collaborators {
    pub controller: Arc<dyn MachineController>,
    pub transfer: Arc<dyn FileTransfer>,
    pub history: Arc<dyn HistoryStore>,
}

impl Collaborators {
    pub fn new(
        controller: Arc<dyn MachineController>,
        transfer: Arc<dyn FileTransfer>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        Self {
            controller,
            transfer,
            history,
        }
    }
}

enum Message {
    Start {
        file: String,
        reply: oneshot::Sender<StartOutcome>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    Status {
        session: Uuid,
        /// Watcher epoch the change was recorded under
        epoch: u64,
        change: StatusChange,
    },
    CommandResult {
        ticket: CommandTicket,
        result: Result<(), CommandError>,
    },
    StepTimeout {
        ticket: CommandTicket,
    },
}

/// Handle on a running workflow state machine.
///
/// Each handle owns its own actor task; dropping the handle ends it and
/// releases any status subscription.
#[derive(Debug)]
pub struct WorkflowStateMachine {
    mailbox: mpsc::UnboundedSender<Message>,
    snapshot: watch::Receiver<WorkflowSnapshot>,
}

impl WorkflowStateMachine {
    /// Spawn the state machine task on the current tokio runtime
    pub fn spawn(collaborators: Collaborators, machine: MachineConfig, workflow: WorkflowConfig) -> Self {
        let (mailbox, inbox) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot) = watch::channel(WorkflowSnapshot::default());

        let driver = Driver {
            collaborators,
            machine,
            step_timeout: workflow.step_timeout(),
            mailbox: mailbox.downgrade(),
            snapshot: snapshot_tx,
            session: None,
            resting: WorkflowStep::Finished,
            watcher: StatusWatcher::new(),
            subscription: None,
            command: None,
            span: Span::none(),
        };
        tokio::spawn(driver.run(inbox));

        Self { mailbox, snapshot }
    }

    /// Begin a job. A no-op while another session is running.
    pub async fn start(&self, file: &str) -> Result<StartOutcome, WorkflowError> {
        let (reply, answer) = oneshot::channel();
        self.mailbox
            .send(Message::Start {
                file: file.to_string(),
                reply,
            })
            .map_err(|_| WorkflowError::Stopped)?;
        answer.await.map_err(|_| WorkflowError::Stopped)
    }

    /// Abort the current job. Resolves once the file transfer was told to cancel.
    pub async fn stop(&self) -> Result<(), WorkflowError> {
        let (reply, answer) = oneshot::channel();
        self.mailbox
            .send(Message::Stop { reply })
            .map_err(|_| WorkflowError::Stopped)?;
        answer.await.map_err(|_| WorkflowError::Stopped)
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that is notified on every published change
    pub fn watch(&self) -> watch::Receiver<WorkflowSnapshot> {
        self.snapshot.clone()
    }

    pub fn step(&self) -> WorkflowStep {
        self.snapshot.borrow().step
    }

    pub fn active_step(&self) -> WorkflowStep {
        self.snapshot.borrow().active_step
    }

    pub fn is_running(&self) -> bool {
        self.snapshot.borrow().is_running()
    }
}

struct Driver {
    collaborators: Collaborators,
    machine: MachineConfig,
    step_timeout: Option<Duration>,
    mailbox: mpsc::WeakUnboundedSender<Message>,
    snapshot: watch::Sender<WorkflowSnapshot>,
    session: Option<WorkflowSession>,
    /// Step reported when there is no session
    resting: WorkflowStep,
    watcher: StatusWatcher,
    subscription: Option<Subscription>,
    /// Task carrying out the most recently issued command
    command: Option<(CommandTicket, JoinHandle<()>)>,
    span: Span,
}

impl Driver {
    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Message>) {
        while let Some(message) = inbox.recv().await {
            self.handle(message).await;
            self.publish();
        }
        debug!("Workflow mailbox closed, state machine exiting");
    }

    async fn handle(&mut self, message: Message) {
        match message {
            Message::Start { file, reply } => {
                let outcome = self.start(file);
                // Callers may query right after the reply, so publish first
                self.publish();
                let _ = reply.send(outcome);
            }
            Message::Stop { reply } => {
                self.stop().await;
                let _ = reply.send(());
            }
            Message::Status {
                session,
                epoch,
                change,
            } => {
                let span = self.span.clone();
                let current_epoch = self.watcher.epoch();
                let effects = match self.session.as_mut() {
                    Some(_) if epoch != current_epoch => {
                        debug!(
                            session = %session,
                            epoch,
                            current_epoch,
                            "Discarding status change recorded before rearm"
                        );
                        Vec::new()
                    }
                    Some(current) if current.id() == session => {
                        span.in_scope(|| current.on_status_change(change))
                    }
                    _ => {
                        debug!(session = %session, "Discarding status change for stale session");
                        Vec::new()
                    }
                };
                self.execute(effects);
            }
            Message::CommandResult { ticket, result } => {
                if matches!(&self.command, Some((running, _)) if *running == ticket) {
                    self.command = None;
                }
                let span = self.span.clone();
                let effects = match self.session.as_mut() {
                    Some(current) if current.id() == ticket.session => {
                        span.in_scope(|| current.on_command_result(ticket, result))
                    }
                    _ => {
                        debug!(ticket = %ticket, "Discarding command result for stale session");
                        Vec::new()
                    }
                };
                self.execute(effects);
            }
            Message::StepTimeout { ticket } => {
                let span = self.span.clone();
                let effects = match self.session.as_mut() {
                    Some(current) if current.id() == ticket.session => {
                        span.in_scope(|| current.on_step_timeout(ticket))
                    }
                    _ => Vec::new(),
                };
                self.execute(effects);
            }
        }
    }

    fn start(&mut self, file: String) -> StartOutcome {
        if let Some(current) = self.session.as_ref().filter(|s| s.is_running()) {
            info!(
                session = %current.id(),
                requested = %file,
                "Workflow already running, start ignored"
            );
            return StartOutcome::AlreadyRunning {
                session_id: Some(current.id()),
            };
        }

        let session_id = generate_session_id();
        self.span = create_workflow_span(&file, session_id);

        // Fresh watcher per session so nothing observed earlier leaks in
        self.watcher = StatusWatcher::new();
        let mailbox = self.mailbox.clone();
        self.subscription = Some(self.watcher.observe(
            self.collaborators.controller.status_feed(),
            move |change, epoch| {
                if let Some(mailbox) = mailbox.upgrade() {
                    let _ = mailbox.send(Message::Status {
                        session: session_id,
                        epoch,
                        change,
                    });
                }
            },
        ));

        let span = self.span.clone();
        let arm_timeouts = self.step_timeout.is_some();
        let (session, effects) =
            span.in_scope(|| WorkflowSession::start(session_id, file, arm_timeouts));
        self.session = Some(session);
        self.execute(effects);

        StartOutcome::Started { session_id }
    }

    async fn stop(&mut self) {
        // Release the feed first so nothing new arrives for the old session
        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        self.watcher.reset();

        // The command task must not touch the machine once cancel goes out
        if let Some((ticket, task)) = self.command.take() {
            task.abort();
            match task.await {
                Ok(()) => debug!(ticket = %ticket, "Command finished before stop"),
                Err(err) if err.is_cancelled() => {
                    info!(ticket = %ticket, "Command in flight cancelled by stop")
                }
                Err(err) => warn!(ticket = %ticket, error = %err, "Command task failed"),
            }
        }

        match self.session.as_mut() {
            Some(session) if session.step() != WorkflowStep::Aborted => {
                self.span.in_scope(|| session.abort())
            }
            Some(_) => debug!("Workflow already aborted"),
            None => {
                info!("Stop requested with no session");
                self.resting = WorkflowStep::Aborted;
            }
        }
        self.publish();

        if let Err(err) = self
            .collaborators
            .transfer
            .cancel()
            .instrument(self.span.clone())
            .await
        {
            warn!(error = %err, "File transfer cancel failed; workflow is aborted regardless");
        }
    }

    fn execute(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Issue { ticket, action } => self.issue(ticket, action),
                Effect::Rearm => self.watcher.reset(),
                Effect::ArmTimeout { ticket } => self.arm_timeout(ticket),
                Effect::RecordProcessed { file } => {
                    self.collaborators.history.add_processed_file(&file);
                }
                Effect::Completed => {
                    if let Some(mut subscription) = self.subscription.take() {
                        subscription.unsubscribe();
                    }
                }
            }
        }
    }

    fn issue(&mut self, ticket: CommandTicket, action: StepAction) {
        let collaborators = self.collaborators.clone();
        let file = self
            .session
            .as_ref()
            .map(|session| session.target_file().to_string())
            .unwrap_or_default();
        let commands = match action {
            StepAction::MoveToOrigin => self.machine.move_to_origin_command.clone(),
            StepAction::Eject => self.machine.eject_command.clone(),
            _ => String::new(),
        };
        let mailbox = self.mailbox.clone();

        info!(ticket = %ticket, action = ?action, "Issuing workflow command");
        let task = tokio::spawn(
            async move {
                let result = perform(&collaborators, action, &file, &commands).await;
                if let Some(mailbox) = mailbox.upgrade() {
                    let _ = mailbox.send(Message::CommandResult { ticket, result });
                }
            }
            .instrument(self.span.clone()),
        );
        self.command = Some((ticket, task));
    }

    fn arm_timeout(&self, ticket: CommandTicket) {
        let Some(timeout) = self.step_timeout else {
            return;
        };
        let mailbox = self.mailbox.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(mailbox) = mailbox.upgrade() {
                let _ = mailbox.send(Message::StepTimeout { ticket });
            }
        });
    }

    fn current_snapshot(&self) -> WorkflowSnapshot {
        match &self.session {
            Some(session) => session.snapshot(),
            None => WorkflowSnapshot {
                step: self.resting,
                active_step: self.resting,
                ..WorkflowSnapshot::default()
            },
        }
    }

    fn publish(&self) {
        let next = self.current_snapshot();
        self.snapshot.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

/// Carry out one step command against the collaborators
async fn perform(
    collaborators: &Collaborators,
    action: StepAction,
    file: &str,
    commands: &str,
) -> Result<(), CommandError> {
    match action {
        StepAction::KillAlarm => collaborators.controller.kill_alarm().await?,
        StepAction::Home => collaborators.controller.home_machine().await?,
        StepAction::MoveToOrigin | StepAction::Eject => {
            collaborators.controller.send_commands(commands).await?
        }
        StepAction::SendFile => {
            collaborators.transfer.open_workspace_file(file).await?;
            collaborators.transfer.send().await?;
        }
        StepAction::Complete => {}
    }
    Ok(())
}
