//! Recording side of the analysis.
//!
//! A declarative specification string selects what to record and in which
//! scopes; the scheduler lazily creates and activates context-scoped
//! recorders as execution enters and leaves those scopes; each recorder
//! feeds a frequency-statistics accumulator whose interval bounds widen
//! monotonically across runs.

pub mod freq;
pub mod scheduler;
pub mod scope;
pub mod spec;
pub mod verbose;

pub use freq::FrequencyStats;
pub use scheduler::{RecorderKey, RecorderScheduler};
pub use scope::{RecorderStatus, ScopeRecorder};
pub use spec::{parse_specs, EntityType, RecorderSpec, ScopeKind, ScopedSpec};
pub use verbose::VerboseObserver;
