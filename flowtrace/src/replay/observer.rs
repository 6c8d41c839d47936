//! Event observer capability interface.
//!
//! The replay engine fans every event out to all registered observers,
//! synchronously and in registration order. Observers implement only the
//! handlers they care about; the rest default to no-ops. Handlers are
//! fallible so an observer that detects an unrecoverable condition aborts
//! the whole replay.

use flowtrace_model::{BlockId, FunctionId, InsnId, Program};

use crate::domain::ReplayError;

/// One method per replay event, all defaulting to "ignore".
///
/// Within one trace record the emission order is fixed: a pending return
/// resolves first, then (at a block start) `enter_function`, loop exits,
/// loop enter/continue, empty-block `visit_block`s, and the block's own
/// `visit_block`. `end_of_trace` is always the final event.
#[allow(unused_variables)]
pub trait EventObserver {
    /// Control entered `callee`; `callsite` is the calling instruction,
    /// absent for the program entry.
    fn enter_function(
        &mut self,
        program: &Program,
        callee: FunctionId,
        callsite: Option<InsnId>,
        cycles: u64,
    ) -> Result<(), ReplayError> {
        Ok(())
    }

    /// A basic block was visited.
    fn visit_block(
        &mut self,
        program: &Program,
        block: BlockId,
        cycles: u64,
    ) -> Result<(), ReplayError> {
        Ok(())
    }

    /// The return instruction `site` committed; `callsite` is the still
    /// unpopped call site being returned to, absent when leaving the
    /// program entry.
    fn leave_function(
        &mut self,
        program: &Program,
        site: InsnId,
        callsite: Option<InsnId>,
        cycles: u64,
    ) -> Result<(), ReplayError> {
        Ok(())
    }

    /// Execution entered the loop headed by `header`.
    fn loop_enter(
        &mut self,
        program: &Program,
        header: BlockId,
        cycles: u64,
    ) -> Result<(), ReplayError> {
        Ok(())
    }

    /// The loop headed by `header` started another iteration.
    fn loop_continue(
        &mut self,
        program: &Program,
        header: BlockId,
        cycles: u64,
    ) -> Result<(), ReplayError> {
        Ok(())
    }

    /// Execution left the loop headed by `header`.
    fn loop_exit(
        &mut self,
        program: &Program,
        header: BlockId,
        cycles: u64,
    ) -> Result<(), ReplayError> {
        Ok(())
    }

    /// The trace ended; emitted exactly once, regardless of stack state.
    fn end_of_trace(&mut self, program: &Program) -> Result<(), ReplayError> {
        Ok(())
    }
}
