//! # flowtrace - Flow Facts from Machine Execution Traces
//!
//! flowtrace reconstructs structured execution behavior (function calls and
//! returns, loop iterations, basic-block visits) from the flat instruction
//! trace of an embedded processor, and derives quantitative flow facts
//! (block execution-count intervals, loop iteration bounds, observed
//! indirect-call targets) for downstream worst-case-execution-time (WCET)
//! analysis.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────┐      ┌──────────────────────────────────────────┐
//! │  Simulator/File  │      │            Program Model (JSON)          │
//! │  (pc, cycles)*   │      │  functions / blocks / loops / callees    │
//! └────────┬─────────┘      └──────────────────┬───────────────────────┘
//!          │                                   │
//!          ▼                                   ▼
//! ┌──────────────────┐   lookup   ┌──────────────────────┐
//! │   ReplayEngine   │◀──────────▶│   WatchpointTable    │
//! │ (call/loop state)│            │  addr → role, once   │
//! └────────┬─────────┘            └──────────────────────┘
//!          │ function / block / ret / loop{enter,cont,exit} / eof
//!          ▼
//! ┌─────────────────────────────────────────────────────┐
//! │              EventObserver fan-out                  │
//! │  VerboseObserver │ RecorderScheduler │ Progress     │
//! │                  │   └─ ScopeRecorders             │
//! │                  │        └─ FrequencyStats        │
//! └──────────────────┴──────────┬──────────────────────┘
//!                               ▼
//!                     ┌──────────────────┐
//!                     │   Fact Export    │
//!                     │  (facts.json)    │
//!                     └──────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`watchpoints`]: one-time derivation of the address → event-role table
//!   from the program model (block starts, call and return instructions,
//!   empty-block chains)
//!
//! - [`replay`]: the trace-driven state machine. Consumes `(pc, cycles)`
//!   records, keeps call/loop stacks and pending call/return bookkeeping in
//!   sync with the static control-flow graph, and publishes typed events to
//!   subscribed observers in a fixed, documented order
//!
//! - [`trace_source`]: lazy, single-pass trace record sources - a trace
//!   file or the pipe of an external cycle-accurate simulator
//!
//! - [`recorders`]: the recording side - declarative recorder
//!   specifications, the scheduler that lazily activates context-scoped
//!   recorders, the per-scope recorders with their virtual-inlining call
//!   depth limit, and the interval statistics they accumulate
//!
//! - [`progress`]: walks source↔machine relation graphs in lockstep with
//!   block events, for trace/source alignment
//!
//! - [`export`]: turns accumulated statistics into the flow-fact JSON
//!   document consumed by the WCET analysis
//!
//! - [`cli`], [`domain`]: argument parsing and structured error types
//!
//! ## Replay at a Glance
//!
//! The engine ignores records until the trace-entry address is seen, then
//! counts every record (the executed-instruction counter measures
//! delay-slot offsets). Only watchpoint addresses - or records while a
//! return is pending - are processed further; per record the order is
//! pending-return resolution, block start (with function entry, loop
//! transitions and empty-block replay), call stash, return stash. That
//! order is a contract observers rely on: a `function` event always
//! precedes the callee's first `block` event.

pub mod cli;
pub mod domain;
pub mod export;
pub mod progress;
pub mod recorders;
pub mod replay;
pub mod trace_source;
pub mod watchpoints;
