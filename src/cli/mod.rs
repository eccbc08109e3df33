//! Command-line interface module.

mod args;
pub mod console;
pub mod serve;

pub use args::{Cli, Commands, ServeArgs};
