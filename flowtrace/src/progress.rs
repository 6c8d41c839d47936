//! Progress-node correlation.
//!
//! Walks each function's relation graph in lockstep with the machine block
//! visits of the replay, recording the sequence of progress nodes reached
//! together with the intermediate nodes crossed since the previous one.
//! Functions without a relation graph are skipped transparently; their
//! frames still participate in the save/restore across calls.

use log::debug;

use flowtrace_model::{BlockId, FunctionId, InsnId, Program, RelationNodeKind};

use crate::domain::ReplayError;
use crate::replay::EventObserver;

/// A relation-graph node, qualified by its function.
pub type ProgressNode = (FunctionId, usize);

pub struct ProgressCorrelator {
    /// Function whose relation graph is being walked; `None` when the
    /// current function has no graph.
    graph: Option<FunctionId>,
    /// Current node, `None` before the entry block anchors the walk.
    node: Option<usize>,
    /// Saved node positions of the calling frames.
    frames: Vec<Option<usize>>,
    trace: Vec<ProgressNode>,
    /// Intermediate nodes crossed before each progress node.
    internal: Vec<Vec<ProgressNode>>,
    pending_internal: Vec<ProgressNode>,
}

impl ProgressCorrelator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            graph: None,
            node: None,
            frames: Vec::new(),
            trace: Vec::new(),
            internal: Vec::new(),
            pending_internal: Vec::new(),
        }
    }

    /// Progress nodes in visit order.
    #[must_use]
    pub fn trace(&self) -> &[ProgressNode] {
        &self.trace
    }

    /// For each progress node, the non-progress nodes crossed since the
    /// previous one.
    #[must_use]
    pub fn internal_predecessors(&self) -> &[Vec<ProgressNode>] {
        &self.internal
    }
}

impl Default for ProgressCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

impl EventObserver for ProgressCorrelator {
    fn enter_function(
        &mut self,
        program: &Program,
        callee: FunctionId,
        _callsite: Option<InsnId>,
        _cycles: u64,
    ) -> Result<(), ReplayError> {
        self.frames.push(self.node.take());
        self.graph = program.relation_graph(callee).map(|_| callee);
        if self.graph.is_none() {
            debug!("no relation graph for {}", program.function_name(callee));
        }
        Ok(())
    }

    fn visit_block(
        &mut self,
        program: &Program,
        block: BlockId,
        _cycles: u64,
    ) -> Result<(), ReplayError> {
        let Some(function) = self.graph else { return Ok(()) };
        let Some(graph) = program.relation_graph(function) else { return Ok(()) };

        let Some(node) = self.node else {
            // First block of the function anchors the walk at the entry
            // node, which must map to exactly this block.
            let entry = graph.entry();
            if graph.node(entry).dst_block != Some(block) {
                return Err(ReplayError::ProgressEntryMismatch {
                    function: program.function_name(function).to_owned(),
                    node: entry,
                    block: program.block_name(block),
                });
            }
            self.node = Some(entry);
            return Ok(());
        };

        let matching = graph.successors_matching(node, block);
        let [succ] = matching.as_slice() else {
            return Err(ReplayError::ProgressAmbiguous {
                node,
                block: program.block_name(block),
                count: matching.len(),
            });
        };
        if graph.node(*succ).kind == RelationNodeKind::Progress {
            self.trace.push((function, *succ));
            self.internal.push(std::mem::take(&mut self.pending_internal));
        } else {
            self.pending_internal.push((function, *succ));
        }
        self.node = Some(*succ);
        Ok(())
    }

    fn leave_function(
        &mut self,
        program: &Program,
        _site: InsnId,
        callsite: Option<InsnId>,
        _cycles: u64,
    ) -> Result<(), ReplayError> {
        let Some(site) = callsite else { return Ok(()) };
        let caller = program.insn_function(site);
        self.graph = program.relation_graph(caller).map(|_| caller);
        self.node = self.frames.pop().flatten();
        Ok(())
    }
}
