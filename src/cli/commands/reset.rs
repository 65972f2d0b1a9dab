use anyhow::Result;
use tracing::info;

use crate::machine::{MachineController, MachineState, SimulatedMachine, SimulatorSettings};

pub struct ResetCommand {
    pub settings: SimulatorSettings,
}

impl ResetCommand {
    pub fn new(settings: SimulatorSettings) -> Self {
        Self { settings }
    }

    pub async fn execute(&self) -> Result<()> {
        println!("🔄 Soft resetting controller");

        let machine = SimulatedMachine::new(self.settings.clone());
        machine.soft_reset().await?;
        info!(state = %machine.state(), "Controller reset");

        println!("✅ Controller reset, state is now {}", machine.state());
        if machine.state() == MachineState::Alarm {
            println!("   → Machine is locked; 'fabflow run' clears the alarm before homing");
        }
        Ok(())
    }
}
