//! Structured error types for flowtrace
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! Everything here is fatal: the replay either stays synchronized with the
//! program model or the whole analysis run aborts. Tolerated trace
//! artifacts (missing watchpoint addresses, empty blocks, unexecuted
//! loops) never surface as errors, only as warnings or `[0,0]` bounds.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("duplicate watchpoint at address {address:#x}: {incoming} clashes with {existing}")]
    WatchpointCollision { address: u64, existing: String, incoming: String },

    #[error("trace entry function '{0}' has no address")]
    EntryWithoutAddress(String),

    #[error("call at {site} resolved {actual} instructions after the call, expected {expected} (delay-slot mismatch)")]
    CallOffsetMismatch { site: String, expected: u64, actual: u64 },

    #[error("function entry to '{function}' without a pending call, but trace entry is '{entry}'")]
    UnexpectedEntry { function: String, entry: String },

    #[error("call stack empty at return from {site}")]
    CallStackUnderflow { site: String },

    #[error("block {block} does not belong to current function '{current}'")]
    FunctionBlockMismatch { block: String, current: String },

    #[error("call instruction {site} does not belong to current function '{current}'")]
    CallSiteMismatch { site: String, current: String },

    #[error("empty block {block} has {count} successors, cannot replay its chain")]
    EmptyBlockFanout { block: String, count: usize },

    #[error("malformed trace line '{0}'")]
    MalformedTrace(String),

    #[error("cannot run trace source command '{command}': {source}")]
    TraceSourceSpawn { command: String, source: std::io::Error },

    #[error("recorder '{0}' stopped without a running record")]
    StopWithoutStart(String),

    #[error("relation graph for '{function}' anchors at node {node}, but trace visits block {block}")]
    ProgressEntryMismatch { function: String, node: usize, block: String },

    #[error("no unique relation-graph successor of node {node} matching block {block} ({count} matches)")]
    ProgressAmbiguous { node: usize, block: String, count: usize },

    #[error(transparent)]
    Model(#[from] flowtrace_model::ModelError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum SpecError {
    #[error("bad recorder specification '{0}': expected <scope>[/<ctx>]:<entities>[/<ctx>][:<ctx>]")]
    BadItem(String),

    #[error("bad recorder specification '{fragment}': unknown entity type '{entity}'")]
    UnknownEntity { fragment: String, entity: char },

    #[error("bad recorder specification '{fragment}': unknown scope '{scope}'")]
    UnknownScope { fragment: String, scope: String },

    #[error("bad recorder specification '{fragment}': '{value}' is not a number")]
    BadInteger { fragment: String, value: String },
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
