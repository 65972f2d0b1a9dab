// Workflow session - the I/O-free transition core
//
// A session owns one job from `start` to a terminal step. Every input returns
// the side effects the driver must carry out; the session itself never talks
// to a collaborator, so it can be exercised without a runtime.

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::machine::errors::CommandError;
use crate::machine::status::{MachineState, StatusChange};
use crate::workflow::transitions::{self, Transition};
use crate::workflow::types::{
    CommandTicket, Effect, StepAction, StepRecord, WorkflowSnapshot, WorkflowStep,
};

/// Where the command of the current transition stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandPhase {
    /// Issued, no answer yet
    Outstanding,
    /// Acknowledged; waiting for the controller to report Idle or Alarm
    Confirmed,
    /// Refused. The session stays Working until stopped.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct InFlight {
    ticket: CommandTicket,
    transition: Transition,
    phase: CommandPhase,
}

#[derive(Debug, Clone)]
pub struct WorkflowSession {
    id: Uuid,
    target_file: String,
    step: WorkflowStep,
    last_observed: MachineState,
    in_flight: Option<InFlight>,
    next_sequence: u64,
    history: Vec<StepRecord>,
    fault: Option<String>,
    arm_timeouts: bool,
}

impl WorkflowSession {
    /// Create a session and enter Starting. The returned effects contain the
    /// kill-alarm command.
    pub fn start(id: Uuid, target_file: impl Into<String>, arm_timeouts: bool) -> (Self, Vec<Effect>) {
        let mut session = Self {
            id,
            target_file: target_file.into(),
            step: WorkflowStep::Starting,
            last_observed: MachineState::Unknown,
            in_flight: None,
            next_sequence: 0,
            history: Vec::new(),
            fault: None,
            arm_timeouts,
        };
        info!(session = %session.id, file = %session.target_file, "Workflow session started");
        let effects = session.enter(WorkflowStep::Starting);
        (session, effects)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn target_file(&self) -> &str {
        &self.target_file
    }

    pub fn step(&self) -> WorkflowStep {
        self.step
    }

    pub fn last_observed(&self) -> MachineState {
        self.last_observed
    }

    pub fn history(&self) -> &[StepRecord] {
        &self.history
    }

    pub fn fault(&self) -> Option<&str> {
        self.fault.as_deref()
    }

    pub fn is_running(&self) -> bool {
        !self.step.is_terminal()
    }

    /// Phase of the command currently out, if any
    pub fn command_phase(&self) -> Option<&CommandPhase> {
        self.in_flight.as_ref().map(|in_flight| &in_flight.phase)
    }

    /// Ticket of the command currently out, if any
    pub fn outstanding_ticket(&self) -> Option<CommandTicket> {
        self.in_flight.as_ref().map(|in_flight| in_flight.ticket)
    }

    /// The step whose physical action is in progress.
    ///
    /// While Working with an acknowledged command this is the command's
    /// target; otherwise the current step.
    pub fn active_step(&self) -> WorkflowStep {
        match (&self.step, &self.in_flight) {
            (
                WorkflowStep::Working,
                Some(InFlight {
                    transition,
                    phase: CommandPhase::Confirmed,
                    ..
                }),
            ) => transition.target,
            _ => self.step,
        }
    }

    /// Feed one de-duplicated status change. Advances only on a change into
    /// Idle or Alarm while an acknowledged command waits for confirmation.
    pub fn on_status_change(&mut self, change: StatusChange) -> Vec<Effect> {
        self.last_observed = change.current;

        if !change.is_qualifying() {
            return Vec::new();
        }

        if self.step != WorkflowStep::Working {
            debug!(session = %self.id, step = %self.step, state = %change.current, "Qualifying change ignored outside Working");
            return Vec::new();
        }

        let target = match &self.in_flight {
            Some(InFlight {
                transition,
                phase: CommandPhase::Confirmed,
                ..
            }) => transition.target,
            Some(in_flight) => {
                debug!(
                    session = %self.id,
                    ticket = %in_flight.ticket,
                    phase = ?in_flight.phase,
                    "Qualifying change ignored, command not acknowledged"
                );
                return Vec::new();
            }
            None => return Vec::new(),
        };

        self.in_flight = None;
        self.enter(target)
    }

    /// Feed the result of an issued command
    pub fn on_command_result(
        &mut self,
        ticket: CommandTicket,
        result: Result<(), CommandError>,
    ) -> Vec<Effect> {
        let Some(in_flight) = self.in_flight.as_mut() else {
            debug!(session = %self.id, ticket = %ticket, "Discarding stale command result");
            return Vec::new();
        };
        if in_flight.ticket != ticket
            || in_flight.phase != CommandPhase::Outstanding
            || self.step != WorkflowStep::Working
        {
            debug!(session = %self.id, ticket = %ticket, "Discarding stale command result");
            return Vec::new();
        }

        let transition = in_flight.transition;
        match result {
            Ok(()) => {
                info!(
                    session = %self.id,
                    action = ?transition.action,
                    target = %transition.target,
                    "Command acknowledged, waiting for controller"
                );
                self.confirm(transition.rearm_on_ack)
            }
            Err(err) if err.is_not_enabled() && transition.action == StepAction::Home => {
                warn!(session = %self.id, error = %err, "Homing is not enabled on the controller, continuing");
                self.confirm(true)
            }
            Err(err) => {
                error!(
                    session = %self.id,
                    action = ?transition.action,
                    error = %err,
                    "Command failed; workflow halted until stopped"
                );
                in_flight.phase = CommandPhase::Failed(err.to_string());
                self.fault = Some(err.to_string());
                Vec::new()
            }
        }
    }

    /// The confirmation timer for `ticket` fired
    pub fn on_step_timeout(&mut self, ticket: CommandTicket) -> Vec<Effect> {
        let waiting = matches!(
            &self.in_flight,
            Some(in_flight) if in_flight.ticket == ticket && in_flight.phase == CommandPhase::Confirmed
        );
        if !waiting || self.step != WorkflowStep::Working {
            return Vec::new();
        }

        let target = self.active_step();
        error!(session = %self.id, waiting_for = %target, "Controller never confirmed step");
        self.fault = Some(format!("Timed out waiting for controller to confirm {}", target));
        self.in_flight = None;
        self.record(WorkflowStep::Faulted);
        Vec::new()
    }

    /// Stop unconditionally. Late events for this session become no-ops.
    pub fn abort(&mut self) {
        info!(session = %self.id, step = %self.step, "Workflow aborted");
        self.in_flight = None;
        self.last_observed = MachineState::Unknown;
        self.record(WorkflowStep::Aborted);
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        WorkflowSnapshot {
            session_id: Some(self.id),
            target_file: Some(self.target_file.clone()),
            step: self.step,
            active_step: self.active_step(),
            last_observed: self.last_observed,
            history: self.history.clone(),
            fault: self.fault.clone(),
        }
    }

    fn confirm(&mut self, rearm: bool) -> Vec<Effect> {
        let mut effects = Vec::new();
        let Some(in_flight) = self.in_flight.as_mut() else {
            return effects;
        };
        in_flight.phase = CommandPhase::Confirmed;

        if rearm {
            self.last_observed = MachineState::Unknown;
            effects.push(Effect::Rearm);
        }
        if self.arm_timeouts {
            effects.push(Effect::ArmTimeout {
                ticket: in_flight.ticket,
            });
        }
        effects
    }

    fn enter(&mut self, step: WorkflowStep) -> Vec<Effect> {
        self.record(step);

        let Some(transition) = transitions::next(step) else {
            return Vec::new();
        };

        if !transition.action.issues_command() {
            self.record(transition.target);
            info!(session = %self.id, file = %self.target_file, "Workflow finished");
            return vec![
                Effect::RecordProcessed {
                    file: self.target_file.clone(),
                },
                Effect::Completed,
            ];
        }

        // Busy marker goes in before the command leaves
        self.step = WorkflowStep::Working;
        let ticket = CommandTicket {
            session: self.id,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        self.in_flight = Some(InFlight {
            ticket,
            transition,
            phase: CommandPhase::Outstanding,
        });

        vec![Effect::Issue {
            ticket,
            action: transition.action,
        }]
    }

    fn record(&mut self, step: WorkflowStep) {
        info!(session = %self.id, from = %self.step, to = %step, "Workflow step entered");
        self.step = step;
        self.history.push(StepRecord {
            step,
            entered_at: Utc::now(),
        });
    }
}
