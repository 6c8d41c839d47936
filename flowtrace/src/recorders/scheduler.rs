//! Recorder scheduling.
//!
//! The scheduler is the event observer that owns all recorders. It is idle
//! until the analysis entry is entered, then forwards events to the active
//! recorders and lazily creates/activates scope recorders as their scopes
//! are entered. Recorders are identified by a composite key so re-entering
//! a scope in the same context resumes the same accumulator; recorders are
//! never removed, only deactivated, since their statistics feed the final
//! fact export.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::trace;

use flowtrace_model::{BlockId, CallString, FunctionId, InsnId, Program};

use crate::domain::ReplayError;
use crate::recorders::scope::{RecorderStatus, ScopeRecorder};
use crate::recorders::spec::{RecorderSpec, ScopeKind, ScopedSpec};
use crate::replay::EventObserver;

/// Identity of one recorder instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecorderKey {
    pub scope: ScopeKind,
    /// Index of the specification item that created this recorder.
    pub spec_index: usize,
    pub function: FunctionId,
    /// Scope context; `None` for global recorders.
    pub context: Option<CallString>,
}

pub struct RecorderScheduler {
    entry: FunctionId,
    global_specs: Vec<RecorderSpec>,
    function_specs: Vec<(usize, RecorderSpec)>,
    running: bool,
    runs: u64,
    /// Call sites between the analysis entry and the current function.
    callstack: Vec<InsnId>,
    recorders: Vec<ScopeRecorder>,
    keys: Vec<RecorderKey>,
    recorder_map: HashMap<RecorderKey, usize>,
    /// Recorder ids receiving events, in activation order.
    active: Vec<usize>,
    /// Blocks seen executing per function, for unexecuted-loop reporting.
    executed_blocks: BTreeMap<FunctionId, BTreeSet<BlockId>>,
}

impl RecorderScheduler {
    #[must_use]
    pub fn new(specs: &[ScopedSpec], analysis_entry: FunctionId) -> Self {
        let mut global_specs = Vec::new();
        let mut function_specs = Vec::new();
        for item in specs {
            match item.scope {
                ScopeKind::Global => global_specs.push(item.spec.clone()),
                ScopeKind::Function => function_specs.push((item.scope_context, item.spec.clone())),
            }
        }
        Self {
            entry: analysis_entry,
            global_specs,
            function_specs,
            running: false,
            runs: 0,
            callstack: Vec::new(),
            recorders: Vec::new(),
            keys: Vec::new(),
            recorder_map: HashMap::new(),
            active: Vec::new(),
            executed_blocks: BTreeMap::new(),
        }
    }

    /// Completed (or started) entries into the analysis scope.
    #[must_use]
    pub fn runs(&self) -> u64 {
        self.runs
    }

    #[must_use]
    pub fn executed_blocks(&self) -> &BTreeMap<FunctionId, BTreeSet<BlockId>> {
        &self.executed_blocks
    }

    /// All recorders ever created, in creation order.
    pub fn recorders(&self) -> impl Iterator<Item = (&RecorderKey, &ScopeRecorder)> {
        self.keys.iter().zip(self.recorders.iter())
    }

    /// True while a recorder records anything at all (used by tests).
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    fn activate(&mut self, program: &Program, key: RecorderKey, spec: &RecorderSpec, cycles: u64) {
        let rid = match self.recorder_map.get(&key) {
            Some(&rid) => rid,
            None => {
                let rid = self.recorders.len();
                trace!("creating recorder {rid} for {}", program.function_name(key.function));
                self.recorders.push(ScopeRecorder::new(
                    rid,
                    key.function,
                    key.context.clone(),
                    spec,
                    program,
                ));
                self.keys.push(key.clone());
                self.recorder_map.insert(key, rid);
                rid
            }
        };
        if !self.active.contains(&rid) {
            self.active.push(rid);
        }
        self.recorders[rid].start(program, cycles);
    }
}

impl EventObserver for RecorderScheduler {
    fn enter_function(
        &mut self,
        program: &Program,
        callee: FunctionId,
        callsite: Option<InsnId>,
        cycles: u64,
    ) -> Result<(), ReplayError> {
        // Forward to recorders already running before activating new ones:
        // the entered scope's own recorder must not see its entry event.
        if self.running {
            if let Some(site) = callsite {
                self.callstack.push(site);
            }
            for ix in 0..self.active.len() {
                let rid = self.active[ix];
                self.recorders[rid].enter_function(program, callee, callsite, cycles);
            }
        }

        if callee == self.entry {
            self.running = true;
            self.runs += 1;
            self.callstack.clear();
            self.active.clear();
            for ix in 0..self.global_specs.len() {
                let spec = self.global_specs[ix].clone();
                let key = RecorderKey {
                    scope: ScopeKind::Global,
                    spec_index: ix,
                    function: callee,
                    context: None,
                };
                self.activate(program, key, &spec, cycles);
            }
        }

        if self.running {
            for ix in 0..self.function_specs.len() {
                let (scope_context, spec) = self.function_specs[ix].clone();
                let key = RecorderKey {
                    scope: ScopeKind::Function,
                    spec_index: ix,
                    function: callee,
                    context: Some(CallString::suffix(&self.callstack, scope_context)),
                };
                self.activate(program, key, &spec, cycles);
            }
        }
        Ok(())
    }

    fn visit_block(
        &mut self,
        program: &Program,
        block: BlockId,
        _cycles: u64,
    ) -> Result<(), ReplayError> {
        if !self.running {
            return Ok(());
        }
        self.executed_blocks.entry(program.block(block).function).or_default().insert(block);
        for ix in 0..self.active.len() {
            let rid = self.active[ix];
            self.recorders[rid].visit_block(block);
        }
        Ok(())
    }

    fn leave_function(
        &mut self,
        _program: &Program,
        _site: InsnId,
        _callsite: Option<InsnId>,
        cycles: u64,
    ) -> Result<(), ReplayError> {
        if !self.running {
            return Ok(());
        }
        let mut stopped = Vec::new();
        for ix in 0..self.active.len() {
            let rid = self.active[ix];
            if self.recorders[rid].leave_function(cycles)? == RecorderStatus::Stopped {
                stopped.push(rid);
            }
        }
        self.active.retain(|rid| !stopped.contains(rid));
        if self.callstack.pop().is_none() {
            // The analysis entry itself returned.
            self.running = false;
        }
        Ok(())
    }

    fn loop_enter(
        &mut self,
        _program: &Program,
        header: BlockId,
        _cycles: u64,
    ) -> Result<(), ReplayError> {
        if self.running {
            for ix in 0..self.active.len() {
                let rid = self.active[ix];
                self.recorders[rid].loop_enter(header);
            }
        }
        Ok(())
    }

    fn loop_continue(
        &mut self,
        _program: &Program,
        header: BlockId,
        _cycles: u64,
    ) -> Result<(), ReplayError> {
        if self.running {
            for ix in 0..self.active.len() {
                let rid = self.active[ix];
                self.recorders[rid].loop_continue(header);
            }
        }
        Ok(())
    }

    fn loop_exit(
        &mut self,
        _program: &Program,
        header: BlockId,
        _cycles: u64,
    ) -> Result<(), ReplayError> {
        if self.running {
            for ix in 0..self.active.len() {
                let rid = self.active[ix];
                self.recorders[rid].loop_exit(header);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowtrace_model::{Arch, Interval, ProgramBuilder};

    use crate::recorders::spec::parse_specs;

    fn call_program() -> Program {
        let mut pb = ProgramBuilder::new(Arch { call_delay_slots: 0, return_delay_slots: 0 });
        let main = pb.add_function("main");
        let m0 = pb.add_block(main, "m0");
        let call = pb.add_insn(m0, Some(0x100));
        pb.insn_callees(call, &["leaf"]);
        let ret = pb.add_insn(m0, Some(0x104));
        pb.insn_returns(ret);
        let leaf = pb.add_function("leaf");
        let l0 = pb.add_block(leaf, "l0");
        let lret = pb.add_insn(l0, Some(0x200));
        pb.insn_returns(lret);
        pb.finish().unwrap()
    }

    fn drive_one_run(scheduler: &mut RecorderScheduler, p: &Program) {
        let main = p.function_by_label("main").unwrap();
        let leaf = p.function_by_label("leaf").unwrap();
        let m0 = p.function(main).blocks()[0];
        let l0 = p.function(leaf).blocks()[0];
        let call = p.block(m0).insns()[0];
        let mret = p.block(m0).insns()[1];
        let lret = p.block(l0).insns()[0];

        scheduler.enter_function(p, main, None, 0).unwrap();
        scheduler.visit_block(p, m0, 1).unwrap();
        scheduler.enter_function(p, leaf, Some(call), 2).unwrap();
        scheduler.visit_block(p, l0, 3).unwrap();
        scheduler.leave_function(p, lret, Some(call), 4).unwrap();
        scheduler.leave_function(p, mret, None, 6).unwrap();
    }

    #[test]
    fn idle_until_analysis_entry() {
        let p = call_program();
        let leaf = p.function_by_label("leaf").unwrap();
        let specs = parse_specs("g:b", 0).unwrap();
        // Analyze leaf: events for main are ignored.
        let mut scheduler = RecorderScheduler::new(&specs, leaf);
        let main = p.function_by_label("main").unwrap();
        let m0 = p.function(main).blocks()[0];

        scheduler.enter_function(&p, main, None, 0).unwrap();
        scheduler.visit_block(&p, m0, 1).unwrap();
        assert!(!scheduler.is_running());
        assert_eq!(scheduler.recorders().count(), 0);
        assert!(scheduler.executed_blocks().is_empty());
    }

    #[test]
    fn global_recorder_covers_whole_run() {
        let p = call_program();
        let main = p.function_by_label("main").unwrap();
        let leaf = p.function_by_label("leaf").unwrap();
        let specs = parse_specs("g:b", 0).unwrap();
        let mut scheduler = RecorderScheduler::new(&specs, main);
        drive_one_run(&mut scheduler, &p);

        assert!(!scheduler.is_running());
        assert_eq!(scheduler.runs(), 1);
        let (_, rec) = scheduler.recorders().next().unwrap();
        let freqs = rec.stats().blockfreqs().unwrap();
        let ctx = CallString::empty();
        assert_eq!(freqs[&(p.function(main).blocks()[0], ctx.clone())], Interval::point(1));
        assert_eq!(freqs[&(p.function(leaf).blocks()[0], ctx)], Interval::point(1));
    }

    #[test]
    fn function_recorders_created_per_scope() {
        let p = call_program();
        let main = p.function_by_label("main").unwrap();
        let leaf = p.function_by_label("leaf").unwrap();
        let specs = parse_specs("f:b:0", 0).unwrap();
        let mut scheduler = RecorderScheduler::new(&specs, main);
        drive_one_run(&mut scheduler, &p);

        let functions: Vec<_> = scheduler.recorders().map(|(k, _)| k.function).collect();
        assert_eq!(functions, vec![main, leaf]);
        for (_, rec) in scheduler.recorders() {
            assert!(!rec.stats().is_running());
            assert_eq!(rec.stats().runs(), 1);
        }
    }

    #[test]
    fn repeated_runs_resume_the_same_recorder() {
        let p = call_program();
        let main = p.function_by_label("main").unwrap();
        let specs = parse_specs("f:b:0", 0).unwrap();
        let mut scheduler = RecorderScheduler::new(&specs, main);
        drive_one_run(&mut scheduler, &p);
        drive_one_run(&mut scheduler, &p);

        assert_eq!(scheduler.runs(), 2);
        assert_eq!(scheduler.recorders().count(), 2);
        let (_, rec) = scheduler.recorders().next().unwrap();
        assert_eq!(rec.stats().runs(), 2);
    }
}
