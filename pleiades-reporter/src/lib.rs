pub mod assemble;
pub mod cli;
pub mod interactive;
pub mod load_config;
pub mod logging;

pub use cli::{run, Cli, Commands};
