use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::machine::simulator::SimulatorSettings;

/// Main configuration structure for fabflow
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct FabflowConfig {
    /// Command sequences sent to the controller
    pub machine: MachineConfig,
    /// Workflow behaviour
    pub workflow: WorkflowConfig,
    /// Simulated controller used by the CLI
    pub simulator: SimulatorSettings,
    /// Logging settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MachineConfig {
    /// Sent after homing, positions the tool over the job origin
    pub move_to_origin_command: String,
    /// Sent after the job, moves the tool clear so the part can be removed
    pub eject_command: String,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            move_to_origin_command: "G21\nG90\nG0 Z10 F1000\nG0 X0 Y0 F1000".to_string(),
            eject_command: "G21\nG90\nG0 Z50 F1000\nG0 X0 Y200 F1000".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Upper bound on waiting for the controller to confirm a step.
    /// Unset means wait forever.
    pub step_timeout_secs: Option<u64>,
}

impl WorkflowConfig {
    pub fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default log level when RUST_LOG is not set
    pub log_level: String,
    /// Emit JSON lines instead of human-readable logs
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}

impl FabflowConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (fabflow.toml, .fabflow-rc, or `path`)
    /// 3. Environment variables (prefixed with FABFLOW_, `__` between sections)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        match path {
            Some(path) => {
                builder = builder.add_source(File::from(path));
            }
            None => {
                if Path::new("fabflow.toml").exists() {
                    builder = builder.add_source(File::with_name("fabflow"));
                }
                if Path::new(".fabflow-rc").exists() {
                    builder = builder.add_source(
                        File::new(".fabflow-rc", config::FileFormat::Toml),
                    );
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("FABFLOW")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}
