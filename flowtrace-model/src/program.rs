//! Arena-based program model.
//!
//! Entities live in flat vectors owned by [`Program`]; the id newtypes are
//! indices into those vectors. All cross-references (block successors,
//! enclosing loops, call-site blocks) are ids, never owning pointers.

use std::collections::HashMap;

use crate::relation::RelationGraph;

/// An instruction address as it appears in the trace. Opaque beyond
/// equality and ordering.
pub type Address = u64;

/// Handle of a [`Function`] in the program arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(pub u32);

/// Handle of a [`Block`] in the program arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

/// Handle of an [`Insn`] in the program arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InsnId(pub u32);

/// Architecture timing constants consumed by the replay engine.
///
/// Delay slots are the fixed number of instructions executed after a
/// control-transfer instruction before its effect shows up in the trace.
#[derive(Debug, Clone, Copy)]
pub struct Arch {
    pub call_delay_slots: u32,
    pub return_delay_slots: u32,
}

/// A machine function: ordered blocks, the first one being the entry.
#[derive(Debug)]
pub struct Function {
    pub name: String,
    /// External (linker) label, when it differs from the internal name.
    pub label: Option<String>,
    /// Address of the entry block. Absent only for degenerate inputs.
    pub address: Option<Address>,
    pub(crate) blocks: Vec<BlockId>,
}

impl Function {
    /// Ordered blocks; index 0 is the entry block.
    #[must_use]
    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    /// Label used for lookup by external tools, falling back to the name.
    #[must_use]
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }
}

/// A basic block.
#[derive(Debug)]
pub struct Block {
    pub name: String,
    pub function: FunctionId,
    /// First instruction's address. Empty blocks carry the label address
    /// of the non-empty block they precede.
    pub address: Option<Address>,
    /// Number of enclosing loops.
    pub loopnest: u32,
    /// Whether this block is the header of a natural loop.
    pub loopheader: bool,
    pub(crate) successors: Vec<BlockId>,
    /// Enclosing loop headers, innermost first.
    pub(crate) loops: Vec<BlockId>,
    pub(crate) insns: Vec<InsnId>,
}

impl Block {
    #[must_use]
    pub fn successors(&self) -> &[BlockId] {
        &self.successors
    }

    /// Enclosing loop headers, innermost first.
    #[must_use]
    pub fn loops(&self) -> &[BlockId] {
        &self.loops
    }

    #[must_use]
    pub fn insns(&self) -> &[InsnId] {
        &self.insns
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.insns.is_empty()
    }
}

/// Static callee label marking an indirect call in the model document.
pub const ANY_CALLEE: &str = "__any__";

/// A machine instruction.
#[derive(Debug)]
pub struct Insn {
    pub block: BlockId,
    /// Position within the owning block.
    pub index: u32,
    pub address: Option<Address>,
    /// Classified as a return instruction.
    pub returns: bool,
    /// Static callee labels; [`ANY_CALLEE`] marks an indirect call.
    pub callees: Vec<String>,
}

impl Insn {
    #[must_use]
    pub fn is_call(&self) -> bool {
        !self.callees.is_empty()
    }

    #[must_use]
    pub fn is_indirect_call(&self) -> bool {
        self.callees.iter().any(|c| c == ANY_CALLEE)
    }
}

/// The immutable program arena. Built once via [`crate::ProgramBuilder`]
/// or the JSON document loader, then only queried.
#[derive(Debug)]
pub struct Program {
    pub(crate) arch: Arch,
    pub(crate) functions: Vec<Function>,
    pub(crate) blocks: Vec<Block>,
    pub(crate) insns: Vec<Insn>,
    pub(crate) labels: HashMap<String, FunctionId>,
    pub(crate) relation_graphs: HashMap<FunctionId, RelationGraph>,
}

impl Program {
    #[must_use]
    pub fn arch(&self) -> &Arch {
        &self.arch
    }

    pub fn functions(&self) -> impl Iterator<Item = FunctionId> {
        (0..self.functions.len()).map(|ix| FunctionId(ix as u32))
    }

    #[must_use]
    pub fn function(&self, id: FunctionId) -> &Function {
        &self.functions[id.0 as usize]
    }

    #[must_use]
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0 as usize]
    }

    #[must_use]
    pub fn insn(&self, id: InsnId) -> &Insn {
        &self.insns[id.0 as usize]
    }

    /// Look up a function by its external label (or name).
    #[must_use]
    pub fn function_by_label(&self, label: &str) -> Option<FunctionId> {
        self.labels.get(label).copied()
    }

    /// The in-block successor of an instruction, if any.
    #[must_use]
    pub fn next_insn(&self, id: InsnId) -> Option<InsnId> {
        let insn = self.insn(id);
        let block = self.block(insn.block);
        block.insns.get(insn.index as usize + 1).copied()
    }

    /// Function owning the given instruction.
    #[must_use]
    pub fn insn_function(&self, id: InsnId) -> FunctionId {
        self.block(self.insn(id).block).function
    }

    /// Loop headers of a function, in block order.
    pub fn loop_headers(&self, id: FunctionId) -> impl Iterator<Item = BlockId> + '_ {
        self.function(id).blocks.iter().copied().filter(|b| self.block(*b).loopheader)
    }

    /// Machine-level relation graph for a function, if the document
    /// provided one.
    #[must_use]
    pub fn relation_graph(&self, id: FunctionId) -> Option<&RelationGraph> {
        self.relation_graphs.get(&id)
    }

    // Qualified names for diagnostics and exported facts.

    #[must_use]
    pub fn function_name(&self, id: FunctionId) -> &str {
        &self.function(id).name
    }

    #[must_use]
    pub fn block_name(&self, id: BlockId) -> String {
        let block = self.block(id);
        format!("{}/{}", self.function(block.function).name, block.name)
    }

    #[must_use]
    pub fn insn_name(&self, id: InsnId) -> String {
        let insn = self.insn(id);
        format!("{}/{}", self.block_name(insn.block), insn.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProgramBuilder;

    fn two_block_program() -> Program {
        let mut pb = ProgramBuilder::new(Arch { call_delay_slots: 0, return_delay_slots: 0 });
        let f = pb.add_function("main");
        let b0 = pb.add_block(f, "entry");
        let b1 = pb.add_block(f, "exit");
        pb.add_insn(b0, Some(0x100));
        pb.add_insn(b0, Some(0x104));
        let r = pb.add_insn(b1, Some(0x108));
        pb.insn_returns(r);
        pb.block_successors(b0, &[b1]);
        pb.finish().expect("valid program")
    }

    #[test]
    fn function_address_is_entry_block_address() {
        let p = two_block_program();
        let f = p.function_by_label("main").unwrap();
        assert_eq!(p.function(f).address, Some(0x100));
    }

    #[test]
    fn next_insn_stays_within_block() {
        let p = two_block_program();
        let f = p.function_by_label("main").unwrap();
        let entry = p.function(f).blocks()[0];
        let first = p.block(entry).insns()[0];
        let second = p.next_insn(first).unwrap();
        assert_eq!(p.insn(second).address, Some(0x104));
        // Last instruction of the block has no in-block successor.
        assert_eq!(p.next_insn(second), None);
    }

    #[test]
    fn qualified_names() {
        let p = two_block_program();
        let f = p.function_by_label("main").unwrap();
        let entry = p.function(f).blocks()[0];
        assert_eq!(p.block_name(entry), "main/entry");
        assert_eq!(p.insn_name(p.block(entry).insns()[1]), "main/entry/1");
    }
}
