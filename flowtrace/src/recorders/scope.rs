//! Per-scope recorder with virtual inlining.
//!
//! A scope recorder runs from a `start` at its scope function's entry to
//! the matching return, attributing everything executed in between to the
//! scope. Its own call stack tracks the depth below the scope entry; the
//! call limit caps how deep calls are still attributed (virtual inlining),
//! and the entity context length picks the call-string suffix that keys
//! recorded points.

use std::io::{self, Write};

use flowtrace_model::{BlockId, CallString, FunctionId, InsnId, Program};

use crate::domain::ReplayError;
use crate::recorders::freq::FrequencyStats;
use crate::recorders::spec::{EntityType, RecorderSpec};

/// Whether the recorder is still inside its scope after a return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderStatus {
    Active,
    Stopped,
}

pub struct ScopeRecorder {
    function: FunctionId,
    context: Option<CallString>,
    spec: RecorderSpec,
    /// Call sites below the scope entry; depth 0 is the scope itself.
    callstack: Vec<InsnId>,
    stats: FrequencyStats,
}

impl ScopeRecorder {
    pub fn new(
        rid: usize,
        function: FunctionId,
        context: Option<CallString>,
        spec: &RecorderSpec,
        program: &Program,
    ) -> Self {
        let name = match &context {
            None => format!("recorder {rid} ({}, global)", program.function_name(function)),
            Some(ctx) if ctx.is_empty() => {
                format!("recorder {rid} ({})", program.function_name(function))
            }
            Some(ctx) => format!(
                "recorder {rid} ({} in [{}])",
                program.function_name(function),
                ctx.render(program).join(", ")
            ),
        };
        Self {
            function,
            context,
            spec: spec.clone(),
            callstack: Vec::new(),
            stats: FrequencyStats::new(name),
        }
    }

    /// Within the virtual-inlining depth?
    fn attributing(&self) -> bool {
        self.spec.call_limit.is_none_or(|limit| self.callstack.len() <= limit)
    }

    /// Infeasible-block facts are derived from zero-count block tallies,
    /// so either entity selection needs the counts.
    fn records_blocks(&self) -> bool {
        self.spec.records(EntityType::BlockFrequencies)
            || self.spec.records(EntityType::InfeasibleBlocks)
    }

    fn in_context<T>(&self, entity: T) -> (T, CallString) {
        (entity, CallString::suffix(&self.callstack, self.spec.entity_context))
    }

    /// Scope entry: open a run and seed the scope function's blocks.
    pub fn start(&mut self, program: &Program, cycles: u64) {
        self.callstack.clear();
        self.stats.start(cycles);
        if self.records_blocks() {
            for &block in program.function(self.function).blocks() {
                let point = self.in_context(block);
                self.stats.init_block(point);
            }
        }
    }

    pub fn enter_function(
        &mut self,
        program: &Program,
        callee: FunctionId,
        callsite: Option<InsnId>,
        _cycles: u64,
    ) {
        if self.attributing() && self.spec.records(EntityType::CallTargets) {
            if let Some(site) = callsite {
                let point = self.in_context(site);
                self.stats.record_call(point, callee);
            }
        }
        if let Some(site) = callsite {
            self.callstack.push(site);
        }
        // Seed the callee's blocks if it is still within the inlining depth.
        if self.attributing() && self.records_blocks() {
            for &block in program.function(callee).blocks() {
                let point = self.in_context(block);
                self.stats.init_block(point);
            }
        }
    }

    pub fn visit_block(&mut self, block: BlockId) {
        if self.attributing() && self.records_blocks() {
            let point = self.in_context(block);
            self.stats.increment_block(point);
        }
    }

    pub fn loop_enter(&mut self, header: BlockId) {
        if self.attributing() && self.spec.records(EntityType::LoopBounds) {
            let point = self.in_context(header);
            self.stats.start_loop(point);
        }
    }

    pub fn loop_continue(&mut self, header: BlockId) {
        if self.attributing() && self.spec.records(EntityType::LoopBounds) {
            let point = self.in_context(header);
            self.stats.increment_loop(point);
        }
    }

    pub fn loop_exit(&mut self, header: BlockId) {
        if self.attributing() && self.spec.records(EntityType::LoopBounds) {
            let point = self.in_context(header);
            self.stats.stop_loop(point);
        }
    }

    /// A return committed. At depth 0 the scope itself returned: close the
    /// run and report `Stopped` so the scheduler deactivates the recorder.
    pub fn leave_function(&mut self, cycles: u64) -> Result<RecorderStatus, ReplayError> {
        if self.callstack.pop().is_some() {
            Ok(RecorderStatus::Active)
        } else {
            self.stats.stop(cycles)?;
            Ok(RecorderStatus::Stopped)
        }
    }

    pub fn function(&self) -> FunctionId {
        self.function
    }

    /// Scope context, `None` for the global recorder.
    pub fn context(&self) -> Option<&CallString> {
        self.context.as_ref()
    }

    pub fn spec(&self) -> &RecorderSpec {
        &self.spec
    }

    pub fn stats(&self) -> &FrequencyStats {
        &self.stats
    }

    pub fn dump(&self, out: &mut dyn Write, program: &Program) -> io::Result<()> {
        self.stats.dump(out, program)
    }
}
