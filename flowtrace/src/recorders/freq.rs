//! Frequency statistics accumulated over repeated scope runs.
//!
//! A run is opened by `start`, fed with per-point counters, and closed by
//! `stop`, which folds the run's exact counts into `[min, max]` intervals.
//! The fold is widening-only: points absent from a run contribute a zero,
//! so across runs an interval can only grow. Loop bounds are folded per
//! loop execution instead, by `stop_loop`.

use std::collections::{BTreeSet, HashMap};
use std::io::{self, Write};

use flowtrace_model::{BlockId, CallString, FunctionId, InsnId, Interval, Program};

use crate::domain::ReplayError;

/// A block (or loop header) in a bounded calling context.
pub type BlockPoint = (BlockId, CallString);
/// A call site in a bounded calling context.
pub type CallPoint = (InsnId, CallString);

/// Exact counters of the run in progress.
#[derive(Debug, Default)]
struct RunTally {
    start_cycles: u64,
    blocks: HashMap<BlockPoint, u64>,
    loops: HashMap<BlockPoint, u64>,
}

/// Interval statistics for one recorder, widened run by run.
#[derive(Debug)]
pub struct FrequencyStats {
    name: String,
    runs: u64,
    cycles: Option<Interval>,
    blockfreqs: Option<HashMap<BlockPoint, Interval>>,
    calltargets: HashMap<CallPoint, BTreeSet<FunctionId>>,
    loopbounds: HashMap<BlockPoint, Interval>,
    current: Option<RunTally>,
}

impl FrequencyStats {
    pub fn new(name: String) -> Self {
        Self {
            name,
            runs: 0,
            cycles: None,
            blockfreqs: None,
            calltargets: HashMap::new(),
            loopbounds: HashMap::new(),
            current: None,
        }
    }

    /// Open a run. An unfinished previous run is discarded; restarting a
    /// scope before it returned means the earlier activation never
    /// completed.
    pub fn start(&mut self, cycles: u64) {
        self.runs += 1;
        self.current = Some(RunTally { start_cycles: cycles, ..RunTally::default() });
    }

    pub fn is_running(&self) -> bool {
        self.current.is_some()
    }

    /// Make `point` part of this run with an (initial) count of zero, so
    /// an unexecuted block still widens its interval at `stop`.
    pub fn init_block(&mut self, point: BlockPoint) {
        if let Some(tally) = &mut self.current {
            tally.blocks.entry(point).or_insert(0);
        }
    }

    pub fn increment_block(&mut self, point: BlockPoint) {
        if let Some(tally) = &mut self.current {
            *tally.blocks.entry(point).or_insert(0) += 1;
        }
    }

    pub fn record_call(&mut self, site: CallPoint, callee: FunctionId) {
        if self.current.is_some() {
            self.calltargets.entry(site).or_default().insert(callee);
        }
    }

    pub fn start_loop(&mut self, header: BlockPoint) {
        if let Some(tally) = &mut self.current {
            tally.loops.insert(header, 1);
        }
    }

    pub fn increment_loop(&mut self, header: BlockPoint) {
        if let Some(tally) = &mut self.current {
            *tally.loops.entry(header).or_insert(0) += 1;
        }
    }

    /// Fold the finished loop execution into the header's bound interval.
    pub fn stop_loop(&mut self, header: BlockPoint) {
        let Some(tally) = &mut self.current else { return };
        let Some(count) = tally.loops.remove(&header) else { return };
        let bound = self
            .loopbounds
            .get(&header)
            .map_or_else(|| Interval::point(count), |iv| iv.merge(count));
        self.loopbounds.insert(header, bound);
    }

    /// Close the run: fold cycle delta and block counts into the
    /// accumulated intervals.
    pub fn stop(&mut self, cycles: u64) -> Result<(), ReplayError> {
        let tally = self
            .current
            .take()
            .ok_or_else(|| ReplayError::StopWithoutStart(self.name.clone()))?;

        let delta = cycles.saturating_sub(tally.start_cycles);
        self.cycles = Some(self.cycles.map_or_else(|| Interval::point(delta), |iv| iv.merge(delta)));

        match &mut self.blockfreqs {
            None => {
                self.blockfreqs = Some(
                    tally.blocks.into_iter().map(|(pp, c)| (pp, Interval::point(c))).collect(),
                );
            }
            Some(freqs) => {
                for (pp, count) in &tally.blocks {
                    match freqs.get_mut(pp) {
                        Some(iv) => *iv = iv.merge(*count),
                        // First sighting of this point: earlier runs count
                        // as zero executions.
                        None => {
                            freqs.insert(pp.clone(), Interval { min: 0, max: *count });
                        }
                    }
                }
                for (pp, iv) in freqs.iter_mut() {
                    if !tally.blocks.contains_key(pp) {
                        *iv = iv.merge(0);
                    }
                }
            }
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn runs(&self) -> u64 {
        self.runs
    }

    /// Cycle interval over completed runs, `None` before the first one.
    pub fn cycles(&self) -> Option<Interval> {
        self.cycles
    }

    pub fn blockfreqs(&self) -> Option<&HashMap<BlockPoint, Interval>> {
        self.blockfreqs.as_ref()
    }

    pub fn calltargets(&self) -> &HashMap<CallPoint, BTreeSet<FunctionId>> {
        &self.calltargets
    }

    pub fn loopbounds(&self) -> &HashMap<BlockPoint, Interval> {
        &self.loopbounds
    }

    /// Human-readable dump, sorted for stable output.
    pub fn dump(&self, out: &mut dyn Write, program: &Program) -> io::Result<()> {
        writeln!(out, "---")?;
        writeln!(out, "{} ({} runs)", self.name, self.runs)?;
        if let Some(cycles) = self.cycles {
            writeln!(out, " cycles: {cycles}")?;
        }
        if let Some(freqs) = &self.blockfreqs {
            writeln!(out, " block frequencies:")?;
            for (pp, iv) in sorted(freqs) {
                writeln!(out, "  {}: {iv}", point_name(program, pp))?;
            }
        }
        if !self.calltargets.is_empty() {
            writeln!(out, " call targets:")?;
            for ((site, ctx), callees) in sorted(&self.calltargets) {
                let names: Vec<_> =
                    callees.iter().map(|f| program.function_name(*f).to_owned()).collect();
                let site = if ctx.is_empty() {
                    program.insn_name(*site)
                } else {
                    format!("{} [{}]", program.insn_name(*site), ctx.render(program).join(", "))
                };
                writeln!(out, "  {site}: {}", names.join(", "))?;
            }
        }
        if !self.loopbounds.is_empty() {
            writeln!(out, " loop bounds:")?;
            for (pp, iv) in sorted(&self.loopbounds) {
                writeln!(out, "  {}: {iv}", point_name(program, pp))?;
            }
        }
        Ok(())
    }
}

fn sorted<K: Ord, V>(map: &HashMap<K, V>) -> Vec<(&K, &V)> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by_key(|(k, _)| *k);
    entries
}

fn point_name(program: &Program, (block, ctx): &BlockPoint) -> String {
    if ctx.is_empty() {
        program.block_name(*block)
    } else {
        format!("{} [{}]", program.block_name(*block), ctx.render(program).join(", "))
    }
}
