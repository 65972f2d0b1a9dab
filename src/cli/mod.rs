use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

#[derive(Parser)]
#[command(name = "fabflow")]
#[command(about = "Automated job workflow for networked CNC controllers")]
#[command(long_about = "fabflow takes a machine from power-on to a finished part: it clears the alarm lock, \
                       homes, moves to the job origin, streams the job file and moves the tool clear so the \
                       part can be removed. Get started with 'fabflow run <FILE>'.")]
pub struct Cli {
    /// Configuration file (defaults to fabflow.toml or .fabflow-rc)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full job workflow for a file against the simulated controller
    Run {
        /// Job file to stream once the machine is at its origin
        file: String,
        /// Simulate a controller without homing switches
        #[arg(long, help = "Simulate a controller that rejects homing as not enabled")]
        no_homing: bool,
        /// Override how long each simulated motion takes
        #[arg(long, value_name = "MILLIS", help = "Duration of every simulated motion in milliseconds")]
        motion_ms: Option<u64>,
    },
    /// Soft reset the controller
    Reset,
    /// Print the effective configuration as TOML
    Config {
        /// Also write the effective configuration to this path
        #[arg(long, value_name = "PATH")]
        save: Option<PathBuf>,
    },
}
