//! Trace replay engine.
//!
//! Consumes the flat `(pc, cycles)` record stream and reconstructs
//! structured execution against the static program model: function entries
//! and returns (bridging delay slots via pending call/return bookkeeping),
//! loop enter/continue/exit transitions, and basic-block visits, all
//! published to the registered [`EventObserver`]s.
//!
//! The loop body runs once per trace record; records whose address carries
//! no watchpoint (and with no return pending) take the early-continue fast
//! path without allocating.

pub mod observer;
pub mod policy;

pub use observer::EventObserver;
pub use policy::{FallthroughHeuristic, ReturnDisposition, ReturnPolicy};

use log::debug;

use flowtrace_model::{Address, BlockId, FunctionId, InsnId, Program};

use crate::domain::ReplayError;
use crate::trace_source::TraceRecord;
use crate::watchpoints::{Watchpoint, WatchpointTable};

/// A call or return opcode observed in the trace, waiting for its effect
/// to become visible after the architecture's delay slots.
#[derive(Debug, Clone, Copy)]
struct Pending {
    insn: InsnId,
    /// Executed-instruction counter value when the opcode was observed.
    at: u64,
}

/// Counters of a finished replay, mainly for tests and diagnostics.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplaySummary {
    /// Records processed after start gating.
    pub executed_instructions: u64,
}

macro_rules! publish {
    ($observers:expr, $method:ident($($arg:expr),*)) => {
        for obs in $observers.iter_mut() {
            obs.$method($($arg),*)?;
        }
    };
}

/// The trace-driven state machine.
///
/// Built once per analysis (watchpoint construction validates the model);
/// [`ReplayEngine::run`] owns all mutable replay state, so an engine can
/// replay several traces.
pub struct ReplayEngine<'p> {
    program: &'p Program,
    entry: FunctionId,
    start: Address,
    watchpoints: WatchpointTable,
    policy: Box<dyn ReturnPolicy>,
}

impl<'p> ReplayEngine<'p> {
    /// Create an engine replaying traces that enter at `trace_entry`.
    pub fn new(program: &'p Program, trace_entry: FunctionId) -> Result<Self, ReplayError> {
        let start = program.function(trace_entry).address.ok_or_else(|| {
            ReplayError::EntryWithoutAddress(program.function_name(trace_entry).to_owned())
        })?;
        Ok(Self {
            program,
            entry: trace_entry,
            start,
            watchpoints: WatchpointTable::build(program)?,
            policy: Box::new(FallthroughHeuristic),
        })
    }

    /// Replace the predicated-return heuristic.
    #[must_use]
    pub fn with_return_policy(mut self, policy: Box<dyn ReturnPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Replay one trace, publishing events to `observers` in order.
    ///
    /// Records before the first sighting of the entry address are ignored.
    /// Returning from the entry function ends the replay; `end_of_trace`
    /// is published in every case.
    pub fn run<T>(
        &self,
        trace: T,
        observers: &mut [&mut dyn EventObserver],
    ) -> Result<ReplaySummary, ReplayError>
    where
        T: IntoIterator<Item = Result<TraceRecord, ReplayError>>,
    {
        let program = self.program;
        let arch = *program.arch();

        let mut started = false;
        let mut executed: u64 = 0;
        let mut callstack: Vec<InsnId> = Vec::new();
        let mut loopstack: Vec<BlockId> = Vec::new();
        let mut current_function: Option<FunctionId> = None;
        let mut last_block: Option<BlockId> = None;
        let mut pending_call: Option<Pending> = None;
        let mut pending_return: Option<Pending> = None;

        'trace: for record in trace {
            let TraceRecord { pc, cycles } = record?;

            if pc == self.start {
                started = true;
            }
            if !started {
                continue;
            }
            executed += 1;

            let wp = self.watchpoints.lookup(pc);
            if wp.is_none() && pending_return.is_none() {
                continue;
            }

            // Resolve a pending return once its delay-slot window elapsed.
            if let Some(pending) = pending_return {
                if pending.at + u64::from(arch.return_delay_slots) + 1 == executed {
                    pending_return = None;
                    match self.policy.classify(program, pending.insn, pc) {
                        ReturnDisposition::Predicated => {
                            debug!("predicated return at {}", program.insn_name(pending.insn));
                        }
                        ReturnDisposition::Commit => {
                            while let Some(header) = loopstack.pop() {
                                publish!(observers, loop_exit(program, header, cycles));
                            }
                            let callsite = callstack.last().copied();
                            publish!(
                                observers,
                                leave_function(program, pending.insn, callsite, cycles)
                            );
                            if program.insn_function(pending.insn) == self.entry {
                                // Leaving the traced program; stop replaying.
                                break 'trace;
                            }
                            let site = callstack.pop().ok_or_else(|| {
                                ReplayError::CallStackUnderflow {
                                    site: program.insn_name(pending.insn),
                                }
                            })?;
                            let site_block = program.insn(site).block;
                            last_block = Some(site_block);
                            loopstack =
                                program.block(site_block).loops().iter().rev().copied().collect();
                            current_function = Some(program.block(site_block).function);
                            debug!("return to {}", program.insn_name(site));
                        }
                    }
                }
            }

            match wp {
                Some(Watchpoint::BlockStart(bid)) => {
                    self.visit_block_start(
                        bid,
                        cycles,
                        executed,
                        observers,
                        &mut callstack,
                        &mut loopstack,
                        &mut current_function,
                        &mut last_block,
                        &mut pending_call,
                    )?;
                }
                Some(Watchpoint::CallInsn(site)) => {
                    if current_function != Some(program.insn_function(site)) {
                        return Err(ReplayError::CallSiteMismatch {
                            site: program.insn_name(site),
                            current: current_name(program, current_function),
                        });
                    }
                    pending_call = Some(Pending { insn: site, at: executed });
                }
                Some(Watchpoint::ReturnInsn(site)) => {
                    pending_return = Some(Pending { insn: site, at: executed });
                }
                None => {}
            }
        }

        publish!(observers, end_of_trace(program));
        Ok(ReplaySummary { executed_instructions: executed })
    }

    /// Block-start processing: function entry, loop transitions,
    /// empty-block chain replay, and finally the block event itself.
    #[allow(clippy::too_many_arguments)]
    fn visit_block_start(
        &self,
        bid: BlockId,
        cycles: u64,
        executed: u64,
        observers: &mut [&mut dyn EventObserver],
        callstack: &mut Vec<InsnId>,
        loopstack: &mut Vec<BlockId>,
        current_function: &mut Option<FunctionId>,
        last_block: &mut Option<BlockId>,
        pending_call: &mut Option<Pending>,
    ) -> Result<(), ReplayError> {
        let program = self.program;
        let arch = *program.arch();
        let block = program.block(bid);
        let func = block.function;

        // Function entry: the block's address is its function's address.
        if block.address == program.function(func).address {
            if let Some(call) = pending_call.take() {
                let expected = call.at + 1 + u64::from(arch.call_delay_slots);
                if expected != executed {
                    return Err(ReplayError::CallOffsetMismatch {
                        site: program.insn_name(call.insn),
                        expected: expected - call.at,
                        actual: executed - call.at,
                    });
                }
                callstack.push(call.insn);
            } else if func != self.entry {
                return Err(ReplayError::UnexpectedEntry {
                    function: program.function_name(func).to_owned(),
                    entry: program.function_name(self.entry).to_owned(),
                });
            }
            *current_function = Some(func);
            loopstack.clear();
            debug!("entering {}", program.function_name(func));
            publish!(observers, enter_function(program, func, callstack.last().copied(), cycles));
        }

        // Exit loops down to this block's nesting depth.
        let nest = block.loopnest as usize;
        while loopstack.len() > nest {
            let Some(header) = loopstack.pop() else { break };
            publish!(observers, loop_exit(program, header, cycles));
        }

        // Loop header: same depth + same identity continues the loop; same
        // depth + different header swaps loops at this level; otherwise a
        // fresh enter.
        if block.loopheader {
            if loopstack.len() == nest && loopstack.last() != Some(&bid) {
                if let Some(header) = loopstack.pop() {
                    publish!(observers, loop_exit(program, header, cycles));
                }
            }
            if loopstack.len() == nest {
                publish!(observers, loop_continue(program, bid, cycles));
            } else {
                loopstack.push(bid);
                publish!(observers, loop_enter(program, bid, cycles));
            }
        }

        if *current_function != Some(func) {
            return Err(ReplayError::FunctionBlockMismatch {
                block: program.block_name(bid),
                current: current_name(program, *current_function),
            });
        }

        // Empty blocks share this block's address and cannot be observed
        // directly; publish the chain that is a successor of the last
        // visited block before the block itself.
        if let Some(chain_starts) =
            block.address.and_then(|addr| self.watchpoints.empty_blocks_at(addr))
        {
            for &start in chain_starts {
                let reachable =
                    last_block.map_or(true, |lb| program.block(lb).successors().contains(&start));
                if !reachable {
                    continue;
                }
                let mut cur = start;
                while program.block(cur).is_empty() {
                    debug!("replaying empty block {}", program.block_name(cur));
                    publish!(observers, visit_block(program, cur, cycles));
                    let succs = program.block(cur).successors();
                    if succs.len() != 1 {
                        return Err(ReplayError::EmptyBlockFanout {
                            block: program.block_name(cur),
                            count: succs.len(),
                        });
                    }
                    *last_block = Some(cur);
                    cur = succs[0];
                }
                break;
            }
        }

        publish!(observers, visit_block(program, bid, cycles));
        *last_block = Some(bid);
        Ok(())
    }
}

fn current_name(program: &Program, current: Option<FunctionId>) -> String {
    current.map_or_else(|| "<none>".to_owned(), |f| program.function_name(f).to_owned())
}
