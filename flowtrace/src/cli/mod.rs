//! Command-line argument parsing and configuration

mod args;

pub use args::Args;
