pub mod config;
pub mod reset;
pub mod run;

pub use config::ConfigCommand;
pub use reset::ResetCommand;
pub use run::RunCommand;
