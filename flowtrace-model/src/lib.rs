//! # Shared Program Model (static side of the trace analysis)
//!
//! This crate holds the immutable machine-code program model the trace
//! analysis runs against: functions, basic blocks and instructions with
//! their control-flow metadata (successors, loop nesting, call/return
//! classification), architecture timing constants (delay slots), plus the
//! small value types shared between the replay engine and the fact
//! exporter (bounded call strings, `[min,max]` intervals, relation graphs).
//!
//! The model is an arena: every entity is addressed by a stable integer
//! handle ([`FunctionId`], [`BlockId`], [`InsnId`]). Back-references
//! (block → function, instruction → in-block successor) are handle lookups
//! on [`Program`], so the graph is built exactly once and never duplicated.
//!
//! ## Key Types
//!
//! - [`Program`] - the arena plus query methods
//! - [`ProgramBuilder`] - programmatic construction (tests, document loader)
//! - [`CallString`] - bounded call-stack suffix used as a context key
//! - [`Interval`] - monotonically widening `[min,max]` bound
//! - [`RelationGraph`] - source↔machine correlation graph per function

pub mod builder;
pub mod context;
pub mod doc;
pub mod interval;
pub mod program;
pub mod relation;

pub use builder::ProgramBuilder;
pub use context::CallString;
pub use interval::Interval;
pub use program::{
    Address, Arch, Block, BlockId, Function, FunctionId, Insn, InsnId, Program, ANY_CALLEE,
};
pub use relation::{RelationGraph, RelationNode, RelationNodeKind};

use thiserror::Error;

/// Errors raised while building or loading a program model.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("unknown block '{block}' referenced in function '{function}'")]
    UnknownBlock { function: String, block: String },

    #[error("unknown function '{0}' referenced by a relation graph")]
    UnknownFunction(String),

    #[error("duplicate function label '{0}'")]
    DuplicateLabel(String),

    #[error("function '{0}' has no blocks")]
    EmptyFunction(String),

    #[error("relation graph for '{0}' does not start with an entry node")]
    BadRelationEntry(String),

    #[error("unknown relation node type '{0}'")]
    UnknownNodeKind(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
