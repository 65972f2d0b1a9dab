use anyhow::{bail, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::FabflowConfig;
use crate::history::MemoryHistory;
use crate::machine::SimulatedMachine;
use crate::workflow::{Collaborators, StartOutcome, WorkflowController, WorkflowSnapshot, WorkflowStep};

pub struct RunCommand {
    pub file: String,
    pub config: FabflowConfig,
}

impl RunCommand {
    pub fn new(file: impl Into<String>, config: FabflowConfig) -> Self {
        Self {
            file: file.into(),
            config,
        }
    }

    /// Simulate a controller without homing switches
    pub fn without_homing(mut self, no_homing: bool) -> Self {
        if no_homing {
            self.config.simulator.homing_enabled = false;
            self.config.simulator.boot_in_alarm = false;
        }
        self
    }

    pub fn with_motion_millis(mut self, motion_ms: Option<u64>) -> Self {
        if let Some(millis) = motion_ms {
            self.config.simulator.motion_millis = millis;
        }
        self
    }

    pub async fn execute(&self) -> Result<()> {
        println!("🛠️  Running job workflow for {}", self.file);
        println!();

        let machine = SimulatedMachine::new(self.config.simulator.clone());
        let history = Arc::new(MemoryHistory::new());
        let collaborators = Collaborators::new(
            Arc::new(machine.clone()),
            Arc::new(machine.clone()),
            history.clone(),
        );
        let workflow = WorkflowController::with_config(
            collaborators,
            self.config.machine.clone(),
            self.config.workflow.clone(),
        );

        let mut updates = workflow.watch();
        match workflow.start(&self.file).await? {
            StartOutcome::Started { session_id } => {
                info!(session = %session_id, file = %self.file, "Workflow started");
            }
            StartOutcome::AlreadyRunning { .. } => bail!("A workflow is already running"),
        }

        let interrupt = tokio::signal::ctrl_c();
        tokio::pin!(interrupt);
        let mut interrupted = false;

        let mut shown = WorkflowStep::Finished;
        let mut fault_reported = false;
        loop {
            let snapshot = updates.borrow_and_update().clone();
            if snapshot.active_step != shown {
                shown = snapshot.active_step;
                print_step(&snapshot);
            }
            if let Some(fault) = snapshot.fault.as_deref().filter(|_| !fault_reported) {
                fault_reported = true;
                println!("❌ {}", fault);
                println!("   → Press Ctrl-C to abort the job");
            }
            if !snapshot.is_running() {
                break;
            }

            tokio::select! {
                changed = updates.changed() => {
                    if changed.is_err() {
                        bail!("Workflow state machine exited unexpectedly");
                    }
                }
                _ = &mut interrupt, if !interrupted => {
                    interrupted = true;
                    warn!("Interrupted, stopping workflow");
                    println!();
                    println!("🛑 Stopping...");
                    workflow.stop().await?;
                }
            }
        }

        let snapshot = workflow.snapshot();
        println!();
        match snapshot.step {
            WorkflowStep::Finished => {
                println!("✅ {} processed", self.file);
                for entry in history.entries() {
                    println!("   📋 {} at {}", entry.name, entry.processed_at.to_rfc3339());
                }
            }
            WorkflowStep::Aborted => println!("⚠️  Workflow aborted"),
            other => println!("⚠️  Workflow ended in {}", other),
        }
        Ok(())
    }
}

fn print_step(snapshot: &WorkflowSnapshot) {
    let label = match snapshot.active_step {
        WorkflowStep::Starting => "🚀 Starting",
        WorkflowStep::KillingAlarm => "🔓 Clearing alarm",
        WorkflowStep::Homing => "🏠 Homing",
        WorkflowStep::MoveToOrigin => "🎯 Moving to origin",
        WorkflowStep::Sending => "📤 Sending file",
        WorkflowStep::Ejecting => "⏏️  Ejecting",
        WorkflowStep::Working => "⏳ Waiting for controller",
        WorkflowStep::Faulted => "❌ Controller did not confirm step",
        WorkflowStep::Finished => "🏁 Finished",
        WorkflowStep::Aborted => "🛑 Aborted",
    };
    println!("{} (machine: {})", label, snapshot.last_observed);
}
