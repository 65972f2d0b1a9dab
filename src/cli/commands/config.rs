use anyhow::Result;
use std::path::PathBuf;

use crate::config::FabflowConfig;

pub struct ConfigCommand {
    pub config: FabflowConfig,
    pub save: Option<PathBuf>,
}

impl ConfigCommand {
    pub fn new(config: FabflowConfig) -> Self {
        Self { config, save: None }
    }

    pub fn with_save(mut self, save: Option<PathBuf>) -> Self {
        self.save = save;
        self
    }

    pub async fn execute(&self) -> Result<()> {
        print!("{}", self.config.to_toml()?);

        if let Some(path) = &self.save {
            self.config.save_to_file(path)?;
            println!();
            println!("💾 Configuration written to {}", path.display());
        }
        Ok(())
    }
}
