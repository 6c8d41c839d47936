//! Predicated-return classification.
//!
//! On architectures with predicated instructions, a return opcode in the
//! trace may not have been taken. The trace alone cannot tell; the engine
//! delegates the decision to a [`ReturnPolicy`] so a simulator that emits
//! explicit return markers can replace the heuristic without touching the
//! replay loop.

use flowtrace_model::{Address, InsnId, Program};

/// What to do with a pending return once its delay-slot window elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnDisposition {
    /// The return was taken: emit the event and pop call/loop state.
    Commit,
    /// The return was predicated away: no event, state unchanged.
    Predicated,
}

pub trait ReturnPolicy {
    /// Classify the pending return at `ret` given the pc observed
    /// `return_delay_slots + 1` executed instructions later.
    fn classify(&self, program: &Program, ret: InsnId, pc: Address) -> ReturnDisposition;
}

/// Default heuristic: if control flow did not change since the return
/// instruction - the observed pc equals the in-block fallthrough address
/// `return_delay_slots + 1` instructions past the return - the return was
/// predicated and not taken.
///
/// Known imprecision: a recursive function returning to the instruction
/// immediately following its own call site is misclassified as predicated.
/// Unlikely, but possible; accepted.
pub struct FallthroughHeuristic;

impl ReturnPolicy for FallthroughHeuristic {
    fn classify(&self, program: &Program, ret: InsnId, pc: Address) -> ReturnDisposition {
        let mut fallthrough = Some(ret);
        for _ in 0..=program.arch().return_delay_slots {
            fallthrough = fallthrough.and_then(|i| program.next_insn(i));
            if fallthrough.is_none() {
                break;
            }
        }
        match fallthrough {
            Some(insn) if program.insn(insn).address == Some(pc) => ReturnDisposition::Predicated,
            _ => ReturnDisposition::Commit,
        }
    }
}
