//! Bounded calling contexts.
//!
//! A [`CallString`] is the suffix of a dynamic call stack, truncated to a
//! configured length. Two program points recorded under equal suffixes are
//! merged; the suffix length trades context sensitivity for table size.

use crate::program::{InsnId, Program};

/// A bounded suffix of a call-site stack, outermost first.
///
/// Used as (part of) a hash key for context-sensitive recorders, so
/// equality and hashing are structural over the retained sites.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallString(Vec<InsnId>);

impl CallString {
    /// The empty (context-insensitive) call string.
    #[must_use]
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Take the last `length` call sites of `stack`.
    #[must_use]
    pub fn suffix(stack: &[InsnId], length: usize) -> Self {
        let skip = stack.len().saturating_sub(length);
        Self(stack[skip..].to_vec())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn sites(&self) -> &[InsnId] {
        &self.0
    }

    /// Qualified call-site names, for diagnostics and exported facts.
    #[must_use]
    pub fn render(&self, program: &Program) -> Vec<String> {
        self.0.iter().map(|site| program.insn_name(*site)).collect()
    }
}
