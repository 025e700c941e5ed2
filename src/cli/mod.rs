pub mod commands;
pub mod progress;
pub mod prompt;
pub mod scan;
pub mod validate;

pub use commands::{Cli, Commands};
