//! Programmatic construction of the program arena.
//!
//! Used by the JSON document loader and directly by tests. The builder
//! owns the growing vectors and hands out ids immediately; `finish`
//! derives block/function addresses and the label index.

use std::collections::HashMap;

use crate::program::{Address, Arch, Block, BlockId, Function, FunctionId, Insn, InsnId, Program};
use crate::relation::{RelationGraph, RelationNode, RelationNodeKind};
use crate::ModelError;

pub struct ProgramBuilder {
    arch: Arch,
    functions: Vec<Function>,
    blocks: Vec<Block>,
    insns: Vec<Insn>,
    relation_graphs: Vec<RelationGraph>,
}

impl ProgramBuilder {
    #[must_use]
    pub fn new(arch: Arch) -> Self {
        Self {
            arch,
            functions: Vec::new(),
            blocks: Vec::new(),
            insns: Vec::new(),
            relation_graphs: Vec::new(),
        }
    }

    pub fn add_function(&mut self, name: &str) -> FunctionId {
        let id = FunctionId(self.functions.len() as u32);
        self.functions.push(Function {
            name: name.to_owned(),
            label: None,
            address: None,
            blocks: Vec::new(),
        });
        id
    }

    pub fn set_label(&mut self, function: FunctionId, label: &str) {
        self.functions[function.0 as usize].label = Some(label.to_owned());
    }

    pub fn add_block(&mut self, function: FunctionId, name: &str) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block {
            name: name.to_owned(),
            function,
            address: None,
            loopnest: 0,
            loopheader: false,
            successors: Vec::new(),
            loops: Vec::new(),
            insns: Vec::new(),
        });
        self.functions[function.0 as usize].blocks.push(id);
        id
    }

    /// Explicit block address; only needed for empty blocks, non-empty
    /// blocks default to their first instruction's address.
    pub fn block_address(&mut self, block: BlockId, address: Address) {
        self.blocks[block.0 as usize].address = Some(address);
    }

    pub fn block_loop_info(&mut self, block: BlockId, loopnest: u32, loopheader: bool) {
        let b = &mut self.blocks[block.0 as usize];
        b.loopnest = loopnest;
        b.loopheader = loopheader;
    }

    pub fn block_successors(&mut self, block: BlockId, successors: &[BlockId]) {
        self.blocks[block.0 as usize].successors = successors.to_vec();
    }

    /// Enclosing loop headers, innermost first.
    pub fn block_loops(&mut self, block: BlockId, loops: &[BlockId]) {
        self.blocks[block.0 as usize].loops = loops.to_vec();
    }

    pub fn add_insn(&mut self, block: BlockId, address: Option<Address>) -> InsnId {
        let id = InsnId(self.insns.len() as u32);
        let b = &mut self.blocks[block.0 as usize];
        let index = b.insns.len() as u32;
        b.insns.push(id);
        self.insns.push(Insn { block, index, address, returns: false, callees: Vec::new() });
        id
    }

    pub fn insn_returns(&mut self, insn: InsnId) {
        self.insns[insn.0 as usize].returns = true;
    }

    pub fn insn_callees(&mut self, insn: InsnId, callees: &[&str]) {
        self.insns[insn.0 as usize].callees = callees.iter().map(|&c| c.to_owned()).collect();
    }

    /// Attach a relation graph; the first node must be the entry node.
    pub fn add_relation_graph(
        &mut self,
        function: FunctionId,
        nodes: Vec<RelationNode>,
    ) -> Result<(), ModelError> {
        match nodes.first() {
            Some(n) if n.kind == RelationNodeKind::Entry => {}
            _ => {
                return Err(ModelError::BadRelationEntry(
                    self.functions[function.0 as usize].name.clone(),
                ))
            }
        }
        self.relation_graphs.push(RelationGraph { function, nodes });
        Ok(())
    }

    pub fn finish(mut self) -> Result<Program, ModelError> {
        // Non-empty blocks inherit their first instruction's address.
        for block in &mut self.blocks {
            if block.address.is_none() {
                if let Some(first) = block.insns.first() {
                    block.address = self.insns[first.0 as usize].address;
                }
            }
        }
        // A function's address is its entry block's address.
        for function in &mut self.functions {
            let entry = function
                .blocks
                .first()
                .ok_or_else(|| ModelError::EmptyFunction(function.name.clone()))?;
            function.address = self.blocks[entry.0 as usize].address;
        }

        let mut labels = HashMap::new();
        for (ix, function) in self.functions.iter().enumerate() {
            let label = function.label().to_owned();
            if labels.insert(label.clone(), FunctionId(ix as u32)).is_some() {
                return Err(ModelError::DuplicateLabel(label));
            }
        }

        let relation_graphs =
            self.relation_graphs.into_iter().map(|rg| (rg.function, rg)).collect();

        Ok(Program {
            arch: self.arch,
            functions: self.functions,
            blocks: self.blocks,
            insns: self.insns,
            labels,
            relation_graphs,
        })
    }
}
