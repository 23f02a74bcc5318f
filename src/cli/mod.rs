pub mod args;
pub mod commands;

pub use args::{Cli, Commands, PathArgs};
pub use commands::run;
