//! Watchpoint table: address → semantic role.
//!
//! Built once from the program model before any trace record is read,
//! immutable afterwards. An address carries at most one role; two
//! different roles for the same address would make trace reconstruction
//! ambiguous, so construction fails instead of guessing.

use std::collections::HashMap;

use log::warn;

use flowtrace_model::{Address, BlockId, InsnId, Program};

use crate::domain::ReplayError;

/// The semantic role of a traced address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Watchpoint {
    /// First instruction of a (non-empty) basic block.
    BlockStart(BlockId),
    /// Instruction with static call targets.
    CallInsn(InsnId),
    /// Instruction classified as a return.
    ReturnInsn(InsnId),
}

/// Address → role table plus the empty-block chains keyed by the address
/// of the non-empty block they precede.
#[derive(Debug)]
pub struct WatchpointTable {
    points: HashMap<Address, Watchpoint>,
    empty_blocks: HashMap<Address, Vec<BlockId>>,
}

impl WatchpointTable {
    /// Derive the table from the program model.
    ///
    /// Empty blocks (label-only, seen with unoptimized inputs) get no
    /// watchpoint; they are registered under their label address so the
    /// replay can publish them when the following non-empty block is
    /// visited. Instructions without an address are skipped with a
    /// warning.
    pub fn build(program: &Program) -> Result<Self, ReplayError> {
        let mut table =
            Self { points: HashMap::new(), empty_blocks: HashMap::new() };

        for f in program.functions() {
            for &bid in program.function(f).blocks() {
                let block = program.block(bid);
                if block.is_empty() {
                    match block.address {
                        Some(addr) => table.empty_blocks.entry(addr).or_default().push(bid),
                        None => warn!("no address for empty block {}", program.block_name(bid)),
                    }
                    continue;
                }
                table.add(program, block.address, Watchpoint::BlockStart(bid))?;
                for &iid in block.insns() {
                    let insn = program.insn(iid);
                    if insn.returns {
                        table.add(program, insn.address, Watchpoint::ReturnInsn(iid))?;
                    }
                    if insn.is_call() {
                        table.add(program, insn.address, Watchpoint::CallInsn(iid))?;
                    }
                }
            }
        }
        Ok(table)
    }

    /// Role of an address, if any. This is the replay hot path.
    #[must_use]
    pub fn lookup(&self, addr: Address) -> Option<Watchpoint> {
        self.points.get(&addr).copied()
    }

    /// Empty blocks registered at the given (non-empty block) address.
    #[must_use]
    pub fn empty_blocks_at(&self, addr: Address) -> Option<&[BlockId]> {
        self.empty_blocks.get(&addr).map(Vec::as_slice)
    }

    fn add(
        &mut self,
        program: &Program,
        addr: Option<Address>,
        wp: Watchpoint,
    ) -> Result<(), ReplayError> {
        let Some(addr) = addr else {
            warn!("no address for {}", describe(program, wp));
            return Ok(());
        };
        if let Some(existing) = self.points.get(&addr) {
            return Err(ReplayError::WatchpointCollision {
                address: addr,
                existing: describe(program, *existing),
                incoming: describe(program, wp),
            });
        }
        self.points.insert(addr, wp);
        Ok(())
    }
}

fn describe(program: &Program, wp: Watchpoint) -> String {
    match wp {
        Watchpoint::BlockStart(b) => format!("block-start {}", program.block_name(b)),
        Watchpoint::CallInsn(i) => format!("call {}", program.insn_name(i)),
        Watchpoint::ReturnInsn(i) => format!("return {}", program.insn_name(i)),
    }
}
