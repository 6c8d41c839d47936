//! Core domain types and errors.

pub mod errors;

pub use errors::{ExportError, ReplayError, SpecError};
