// Controller status readings

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// State reported by the machine controller.
///
/// Mirrors the state names of GRBL-class controllers. Anything the controller
/// reports that is not recognised parses as `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MachineState {
    #[default]
    Unknown,
    Idle,
    Alarm,
    Run,
    Hold,
    Jog,
    Home,
    Door,
    Check,
    Sleep,
}

impl MachineState {
    /// Idle and Alarm are the only states that confirm a physical action ended
    pub fn is_idle_or_alarm(&self) -> bool {
        matches!(self, MachineState::Idle | MachineState::Alarm)
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, MachineState::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MachineState::Unknown => "UNKNOWN",
            MachineState::Idle => "IDLE",
            MachineState::Alarm => "ALARM",
            MachineState::Run => "RUN",
            MachineState::Hold => "HOLD",
            MachineState::Jog => "JOG",
            MachineState::Home => "HOME",
            MachineState::Door => "DOOR",
            MachineState::Check => "CHECK",
            MachineState::Sleep => "SLEEP",
        }
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MachineState {
    type Err = std::convert::Infallible;

    /// Controllers append sub-states after a colon ("Hold:0", "Door:1"); only
    /// the leading name matters here.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.split(':').next().unwrap_or_default().trim();
        let state = match name.to_ascii_lowercase().as_str() {
            "idle" => MachineState::Idle,
            "alarm" => MachineState::Alarm,
            "run" | "running" => MachineState::Run,
            "hold" => MachineState::Hold,
            "jog" => MachineState::Jog,
            "home" | "homing" => MachineState::Home,
            "door" => MachineState::Door,
            "check" => MachineState::Check,
            "sleep" => MachineState::Sleep,
            _ => MachineState::Unknown,
        };
        Ok(state)
    }
}

/// One immutable status reading from the controller
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MachineStatus {
    pub state: MachineState,
    /// Free-form telemetry (positions, feed rate, buffer levels). Opaque to the workflow.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub telemetry: serde_json::Map<String, serde_json::Value>,
}

impl MachineStatus {
    pub fn new(state: MachineState) -> Self {
        Self {
            state,
            telemetry: serde_json::Map::new(),
        }
    }

    pub fn with_telemetry(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.telemetry.insert(key.to_string(), value.into());
        self
    }
}

impl From<MachineState> for MachineStatus {
    fn from(state: MachineState) -> Self {
        MachineStatus::new(state)
    }
}

/// Edge between two consecutive, differing readings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub previous: MachineState,
    pub current: MachineState,
}

impl StatusChange {
    /// A change into Idle or Alarm confirms that the controller finished
    /// whatever it was doing.
    pub fn is_qualifying(&self) -> bool {
        self.current.is_idle_or_alarm()
    }
}
