// In-process machine controller for the CLI and end-to-end tests
//
// Behaves like a polled GRBL-class controller: commands are accepted
// immediately, the machine reports a busy state for the configured motion
// time, then falls back to Idle. Readings are produced by polling on an
// interval, so consecutive readings repeat the same state. Every state change
// is also pushed to open feeds right away, so a motion shorter than the poll
// interval is still seen.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::machine::errors::{ControllerError, TransferError};
use crate::machine::status::{MachineState, MachineStatus};
use crate::machine::traits::{FileTransfer, MachineController};

/// Knobs for the simulated controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorSettings {
    /// How long every motion (homing, moves, file streaming) keeps the machine busy
    pub motion_millis: u64,
    /// Interval between status polls
    pub poll_millis: u64,
    /// When false, homing fails with `ControllerError::NotEnabled`
    pub homing_enabled: bool,
    /// A controller with homing switches boots locked in Alarm
    pub boot_in_alarm: bool,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            motion_millis: 1500,
            poll_millis: 250,
            homing_enabled: true,
            boot_in_alarm: true,
        }
    }
}

const TRANSITION_BUFFER: usize = 64;

/// Every command the simulator accepted, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulatedCommand {
    KillAlarm,
    SoftReset,
    Home,
    SendCommands(String),
    OpenFile(String),
    SendFile,
    Cancel,
}

struct Inner {
    settings: SimulatorSettings,
    state: watch::Sender<MachineState>,
    transitions: broadcast::Sender<MachineState>,
    motion_generation: AtomicU64,
    selected_file: Mutex<Option<String>>,
    missing_files: Mutex<Vec<String>>,
    log: Mutex<Vec<SimulatedCommand>>,
}

impl Inner {
    fn publish(&self, state: MachineState) {
        self.state.send_replace(state);
        // No open feed is fine
        let _ = self.transitions.send(state);
    }
}

struct FeedState {
    interval: Option<Interval>,
    state: watch::Receiver<MachineState>,
    transitions: Option<broadcast::Receiver<MachineState>>,
}

/// Clonable handle over one simulated machine
#[derive(Clone)]
pub struct SimulatedMachine {
    inner: Arc<Inner>,
}

impl SimulatedMachine {
    pub fn new(settings: SimulatorSettings) -> Self {
        let initial = if settings.boot_in_alarm && settings.homing_enabled {
            MachineState::Alarm
        } else {
            MachineState::Idle
        };
        let (state, _) = watch::channel(initial);
        let (transitions, _) = broadcast::channel(TRANSITION_BUFFER);

        Self {
            inner: Arc::new(Inner {
                settings,
                state,
                transitions,
                motion_generation: AtomicU64::new(0),
                selected_file: Mutex::new(None),
                missing_files: Mutex::new(Vec::new()),
                log: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn settings(&self) -> &SimulatorSettings {
        &self.inner.settings
    }

    pub fn state(&self) -> MachineState {
        *self.inner.state.borrow()
    }

    /// Force a state, as if the operator touched the machine
    pub fn set_state(&self, state: MachineState) {
        self.inner.motion_generation.fetch_add(1, Ordering::SeqCst);
        self.inner.publish(state);
    }

    /// Make `open_workspace_file` fail for this name
    pub fn mark_missing(&self, name: &str) {
        self.inner
            .missing_files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(name.to_string());
    }

    pub fn selected_file(&self) -> Option<String> {
        self.inner
            .selected_file
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn command_log(&self) -> Vec<SimulatedCommand> {
        self.inner
            .log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, command: SimulatedCommand) {
        debug!(command = ?command, "Simulator accepted command");
        self.inner
            .log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command);
    }

    fn ensure_not_moving(&self) -> Result<(), ControllerError> {
        match self.state() {
            MachineState::Run | MachineState::Home | MachineState::Jog => {
                Err(ControllerError::Rejected {
                    message: format!("machine is busy ({})", self.state()),
                })
            }
            MachineState::Alarm => Err(ControllerError::Rejected {
                message: "machine is locked in alarm".to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Put the machine in `busy` for the motion time, then back to Idle unless
    /// something else happened in between.
    fn begin_motion(&self, busy: MachineState, duration: Duration) {
        let generation = self.inner.motion_generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.publish(busy);

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if inner.motion_generation.load(Ordering::SeqCst) == generation {
                inner.publish(MachineState::Idle);
            }
        });
    }

    fn motion_time(&self) -> Duration {
        Duration::from_millis(self.inner.settings.motion_millis)
    }
}

#[async_trait]
impl MachineController for SimulatedMachine {
    async fn kill_alarm(&self) -> Result<(), ControllerError> {
        self.record(SimulatedCommand::KillAlarm);
        if self.state() == MachineState::Alarm {
            self.set_state(MachineState::Idle);
        }
        Ok(())
    }

    async fn soft_reset(&self) -> Result<(), ControllerError> {
        self.record(SimulatedCommand::SoftReset);
        let state = if self.inner.settings.homing_enabled {
            MachineState::Alarm
        } else {
            MachineState::Idle
        };
        self.set_state(state);
        info!(state = %state, "Simulated controller reset");
        Ok(())
    }

    async fn home_machine(&self) -> Result<(), ControllerError> {
        if !self.inner.settings.homing_enabled {
            return Err(ControllerError::NotEnabled {
                feature: "homing".to_string(),
            });
        }
        if matches!(self.state(), MachineState::Run | MachineState::Home) {
            return Err(ControllerError::Rejected {
                message: "machine is busy".to_string(),
            });
        }
        self.record(SimulatedCommand::Home);
        self.begin_motion(MachineState::Home, self.motion_time());
        Ok(())
    }

    async fn send_commands(&self, commands: &str) -> Result<(), ControllerError> {
        self.ensure_not_moving()?;
        self.record(SimulatedCommand::SendCommands(commands.to_string()));
        self.begin_motion(MachineState::Run, self.motion_time());
        Ok(())
    }

    fn status_feed(&self) -> BoxStream<'static, MachineStatus> {
        let poll = Duration::from_millis(self.inner.settings.poll_millis.max(1));
        let feed = FeedState {
            interval: None,
            state: self.inner.state.subscribe(),
            transitions: Some(self.inner.transitions.subscribe()),
        };

        stream::unfold(feed, move |mut feed| async move {
            // Timers need a runtime, so the interval is built on first poll
            let interval = feed.interval.get_or_insert_with(|| {
                let mut interval = tokio::time::interval(poll);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                interval
            });

            let pushed = match feed.transitions.as_mut() {
                Some(transitions) => tokio::select! {
                    biased;
                    pushed = transitions.recv() => Some(pushed),
                    _ = interval.tick() => None,
                },
                None => {
                    interval.tick().await;
                    None
                }
            };

            let current = match pushed {
                Some(Ok(state)) => state,
                Some(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    debug!(skipped, "Simulated feed fell behind, reporting current state");
                    *feed.state.borrow()
                }
                Some(Err(broadcast::error::RecvError::Closed)) => {
                    feed.transitions = None;
                    *feed.state.borrow()
                }
                None => *feed.state.borrow(),
            };

            let reading = MachineStatus::new(current).with_telemetry("source", "simulator");
            Some((reading, feed))
        })
        .boxed()
    }
}

#[async_trait]
impl FileTransfer for SimulatedMachine {
    async fn open_workspace_file(&self, name: &str) -> Result<(), TransferError> {
        let missing = self
            .inner
            .missing_files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|f| f == name);
        if name.is_empty() || missing {
            return Err(TransferError::OpenFailed {
                file: name.to_string(),
                message: "no such workspace file".to_string(),
            });
        }
        self.record(SimulatedCommand::OpenFile(name.to_string()));
        *self
            .inner
            .selected_file
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(name.to_string());
        Ok(())
    }

    async fn send(&self) -> Result<(), TransferError> {
        if self.selected_file().is_none() {
            return Err(TransferError::SendFailed {
                message: "no file selected".to_string(),
            });
        }
        self.ensure_not_moving().map_err(|e| TransferError::SendFailed {
            message: e.to_string(),
        })?;
        self.record(SimulatedCommand::SendFile);
        self.begin_motion(MachineState::Run, self.motion_time() * 2);
        Ok(())
    }

    async fn cancel(&self) -> Result<(), TransferError> {
        self.record(SimulatedCommand::Cancel);
        if self.state() == MachineState::Run {
            self.set_state(MachineState::Idle);
        }
        Ok(())
    }
}
