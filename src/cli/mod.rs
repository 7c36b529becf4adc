//! Command-line host for the controller

pub mod args;
pub mod commands;

pub use args::{Cli, Commands};
