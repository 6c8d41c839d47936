//! `[min,max]` interval bounds for observed execution counts.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A closed interval over observed counts. Bounds only ever widen:
/// [`Interval::merge`] and [`Interval::union`] never shrink either side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub min: u64,
    pub max: u64,
}

impl Interval {
    /// The degenerate interval `[n,n]`.
    #[must_use]
    pub fn point(n: u64) -> Self {
        Self { min: n, max: n }
    }

    /// Widen to include the observation `n`.
    #[must_use]
    pub fn merge(self, n: u64) -> Self {
        Self { min: self.min.min(n), max: self.max.max(n) }
    }

    /// Widen to include all of `other`.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self { min: self.min.min(other.min), max: self.max.max(other.max) }
    }

    /// True for `[0,0]`, i.e. a point never observed executing.
    #[must_use]
    pub fn is_zero(self) -> bool {
        self.max == 0
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.min, self.max)
    }
}
