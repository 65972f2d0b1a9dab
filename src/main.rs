use anyhow::Result;
use clap::Parser;

use fabflow::cli::commands::{ConfigCommand, ResetCommand, RunCommand};
use fabflow::cli::{Cli, Commands};
use fabflow::config::FabflowConfig;
use fabflow::telemetry::init_telemetry;

fn main() -> Result<()> {
    let cli = Cli::parse();

    FabflowConfig::load_env_file()?;
    let mut config = FabflowConfig::load(cli.config.as_deref())?;
    if cli.json_logs {
        config.observability.json = true;
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        init_telemetry(&config.observability)?;

        match cli.command {
            Commands::Run {
                file,
                no_homing,
                motion_ms,
            } => {
                RunCommand::new(file, config)
                    .without_homing(no_homing)
                    .with_motion_millis(motion_ms)
                    .execute()
                    .await
            }
            Commands::Reset => ResetCommand::new(config.simulator).execute().await,
            Commands::Config { save } => ConfigCommand::new(config).with_save(save).execute().await,
        }
    })
}
