pub mod runner_config;
pub mod validators;

pub use runner_config::{RunnerConfigOptions, RunnerConfigurator};
