pub mod cli;
pub mod load_config;
pub mod token;

pub use cli::{run, Cli, Commands};
