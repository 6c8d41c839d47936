//! Source↔machine relation graphs.
//!
//! A relation graph ties the control flow of a function's source-level
//! form to its machine-level form. Progress nodes mark points where both
//! levels are known to correspond; the correlator walks the graph in
//! lockstep with machine block visits. Only the machine side is resolved
//! to block handles here; source blocks stay opaque names.

use crate::program::{BlockId, FunctionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationNodeKind {
    Entry,
    Exit,
    /// Both levels are synchronized at this node.
    Progress,
    /// Source-only intermediate node.
    Src,
    /// Machine-only intermediate node.
    Dst,
}

#[derive(Debug)]
pub struct RelationNode {
    pub kind: RelationNodeKind,
    /// Source-level block name, if the node has a source side.
    pub src_block: Option<String>,
    /// Machine-level block, if the node has a machine side.
    pub dst_block: Option<BlockId>,
    /// Indices into the owning graph's node list.
    pub successors: Vec<usize>,
}

#[derive(Debug)]
pub struct RelationGraph {
    pub function: FunctionId,
    /// Node 0 is the entry node (validated at construction).
    pub nodes: Vec<RelationNode>,
}

impl RelationGraph {
    #[must_use]
    pub fn entry(&self) -> usize {
        0
    }

    #[must_use]
    pub fn node(&self, ix: usize) -> &RelationNode {
        &self.nodes[ix]
    }

    /// Successors of `node` whose machine-level block is `block`.
    #[must_use]
    pub fn successors_matching(&self, node: usize, block: BlockId) -> Vec<usize> {
        self.nodes[node]
            .successors
            .iter()
            .copied()
            .filter(|s| self.nodes[*s].dst_block == Some(block))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> RelationGraph {
        RelationGraph {
            function: FunctionId(0),
            nodes: vec![
                RelationNode {
                    kind: RelationNodeKind::Entry,
                    src_block: Some("entry".into()),
                    dst_block: Some(BlockId(0)),
                    successors: vec![1, 2],
                },
                RelationNode {
                    kind: RelationNodeKind::Progress,
                    src_block: Some("loop".into()),
                    dst_block: Some(BlockId(1)),
                    successors: vec![],
                },
                RelationNode {
                    kind: RelationNodeKind::Dst,
                    src_block: None,
                    dst_block: Some(BlockId(2)),
                    successors: vec![],
                },
            ],
        }
    }

    #[test]
    fn matching_is_by_machine_block() {
        let g = graph();
        assert_eq!(g.successors_matching(0, BlockId(1)), vec![1]);
        assert_eq!(g.successors_matching(0, BlockId(2)), vec![2]);
        assert!(g.successors_matching(0, BlockId(9)).is_empty());
    }
}
