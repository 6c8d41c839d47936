//! Flow-fact document export.
//!
//! Serializes the accumulated recorder statistics into a JSON document of
//! timing and flow facts. All facts carry the `trace` origin marker: they
//! are observations of one concrete execution, so frequency bounds are
//! valid lower bounds for a worst case, not guarantees.
//!
//! Call-target facts are only exported for indirect call sites; direct
//! call targets are already static knowledge. Loop headers of executed
//! functions that never ran are exported as `[0,0]` bounds with a warning,
//! since a missing bound would otherwise look like an unbounded loop.

use std::collections::BTreeSet;
use std::io::Write;

use log::warn;
use serde::Serialize;

use flowtrace_model::{Interval, Program};

use crate::domain::ExportError;
use crate::recorders::{EntityType, RecorderScheduler, ScopeKind};

pub const ORIGIN: &str = "trace";
pub const LEVEL: &str = "machinecode";

/// The scope a fact is valid in.
#[derive(Debug, Clone, Serialize)]
pub struct ScopeRef {
    pub function: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
    #[serde(rename = "loop", skip_serializing_if = "Option::is_none")]
    pub loop_header: Option<String>,
}

/// A program point within a fact, with its own calling context.
#[derive(Debug, Clone, Serialize)]
pub struct ProgramPoint {
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
}

/// Observed worst-case cycles of one scope.
#[derive(Debug, Serialize)]
pub struct TimingFact {
    pub origin: &'static str,
    pub level: &'static str,
    pub scope: ScopeRef,
    pub cycles: u64,
}

#[derive(Debug, Serialize)]
pub struct FlowFact {
    pub origin: &'static str,
    pub level: &'static str,
    pub variant: String,
    pub scope: ScopeRef,
    pub programpoint: ProgramPoint,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<Interval>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callees: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct FactDocument {
    pub timing: Vec<TimingFact>,
    pub flowfacts: Vec<FlowFact>,
}

impl FactDocument {
    pub fn write(&self, out: impl Write) -> Result<(), ExportError> {
        serde_json::to_writer_pretty(out, self)?;
        Ok(())
    }
}

/// Fold every recorder's statistics into one fact document.
#[must_use]
pub fn collect_facts(program: &Program, scheduler: &RecorderScheduler) -> FactDocument {
    let mut timing = Vec::new();
    let mut flowfacts = Vec::new();
    let mut loops_recorded = false;
    // Several global recorders observe the same scope; one timing fact
    // per scope is enough.
    let mut timed_scopes = BTreeSet::new();

    for (key, recorder) in scheduler.recorders() {
        let suffix = match key.scope {
            ScopeKind::Global => "global",
            ScopeKind::Function => "local",
        };
        let scope = ScopeRef {
            function: program.function_name(key.function).to_owned(),
            context: key.context.as_ref().map_or_else(Vec::new, |ctx| ctx.render(program)),
            loop_header: None,
        };
        let stats = recorder.stats();
        let spec = recorder.spec();

        if key.scope == ScopeKind::Global {
            if let Some(cycles) = stats.cycles() {
                if timed_scopes.insert(key.function) {
                    timing.push(TimingFact {
                        origin: ORIGIN,
                        level: LEVEL,
                        scope: scope.clone(),
                        cycles: cycles.max,
                    });
                }
            }
        }

        if let Some(freqs) = stats.blockfreqs() {
            let mut entries: Vec<_> = freqs.iter().collect();
            entries.sort_by_key(|(pp, _)| *pp);
            for ((block, ctx), freq) in entries {
                let point = ProgramPoint {
                    name: program.block_name(*block),
                    context: ctx.render(program),
                };
                if freq.is_zero() {
                    if spec.records(EntityType::InfeasibleBlocks) {
                        flowfacts.push(FlowFact {
                            origin: ORIGIN,
                            level: LEVEL,
                            variant: format!("infeasible-{suffix}"),
                            scope: scope.clone(),
                            programpoint: point,
                            frequency: Some(*freq),
                            callees: None,
                        });
                    }
                } else if spec.records(EntityType::BlockFrequencies) {
                    flowfacts.push(FlowFact {
                        origin: ORIGIN,
                        level: LEVEL,
                        variant: format!("block-{suffix}"),
                        scope: scope.clone(),
                        programpoint: point,
                        frequency: Some(*freq),
                        callees: None,
                    });
                }
            }
        }

        if spec.records(EntityType::LoopBounds) {
            loops_recorded = true;
            let mut entries: Vec<_> = stats.loopbounds().iter().collect();
            entries.sort_by_key(|(pp, _)| *pp);
            for ((header, ctx), bound) in entries {
                let name = program.block_name(*header);
                flowfacts.push(FlowFact {
                    origin: ORIGIN,
                    level: LEVEL,
                    variant: format!("loop-{suffix}"),
                    scope: ScopeRef { loop_header: Some(name.clone()), ..scope.clone() },
                    programpoint: ProgramPoint { name, context: ctx.render(program) },
                    frequency: Some(*bound),
                    callees: None,
                });
            }
        }

        if spec.records(EntityType::CallTargets) {
            let mut entries: Vec<_> = stats.calltargets().iter().collect();
            entries.sort_by_key(|(pp, _)| *pp);
            for ((site, ctx), callees) in entries {
                if !program.insn(*site).is_indirect_call() {
                    continue;
                }
                flowfacts.push(FlowFact {
                    origin: ORIGIN,
                    level: LEVEL,
                    variant: format!("calltargets-{suffix}"),
                    scope: scope.clone(),
                    programpoint: ProgramPoint {
                        name: program.insn_name(*site),
                        context: ctx.render(program),
                    },
                    frequency: None,
                    callees: Some(
                        callees.iter().map(|f| program.function_name(*f).to_owned()).collect(),
                    ),
                });
            }
        }
    }

    // Loops the trace never entered have no observed bound; pin them to
    // [0,0] so downstream analyses do not treat them as unbounded.
    if loops_recorded {
        for (function, covered) in scheduler.executed_blocks() {
            for header in program.loop_headers(*function) {
                if covered.contains(&header) {
                    continue;
                }
                let name = program.block_name(header);
                warn!("loop {name} not executed by trace, exporting [0,0] bound");
                flowfacts.push(FlowFact {
                    origin: ORIGIN,
                    level: LEVEL,
                    variant: "loop-local".to_owned(),
                    scope: ScopeRef {
                        function: program.function_name(*function).to_owned(),
                        context: Vec::new(),
                        loop_header: Some(name.clone()),
                    },
                    programpoint: ProgramPoint { name, context: Vec::new() },
                    frequency: Some(Interval::point(0)),
                    callees: None,
                });
            }
        }
    }

    FactDocument { timing, flowfacts }
}
