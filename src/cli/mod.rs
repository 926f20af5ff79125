//! Command-line interface

pub mod args;
pub mod commands;

pub use args::{Args, SubCommand};
pub use commands::{dispatch, Settings};
