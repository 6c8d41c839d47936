//! Plain-text event dump for debugging a replay.

use std::io::Write;

use flowtrace_model::{BlockId, FunctionId, InsnId, Program};

use crate::domain::ReplayError;
use crate::replay::EventObserver;

/// Writes one `EVENT <kind> ...` line per replay event.
pub struct VerboseObserver<W: Write> {
    out: W,
}

impl<W: Write> VerboseObserver<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

fn site_name(program: &Program, site: Option<InsnId>) -> String {
    site.map_or_else(|| "-".to_owned(), |s| program.insn_name(s))
}

impl<W: Write> EventObserver for VerboseObserver<W> {
    fn enter_function(
        &mut self,
        program: &Program,
        callee: FunctionId,
        callsite: Option<InsnId>,
        cycles: u64,
    ) -> Result<(), ReplayError> {
        writeln!(
            self.out,
            "EVENT function      {} from {} @{cycles}",
            program.function_name(callee),
            site_name(program, callsite)
        )?;
        Ok(())
    }

    fn visit_block(
        &mut self,
        program: &Program,
        block: BlockId,
        cycles: u64,
    ) -> Result<(), ReplayError> {
        writeln!(self.out, "EVENT block         {} @{cycles}", program.block_name(block))?;
        Ok(())
    }

    fn leave_function(
        &mut self,
        program: &Program,
        site: InsnId,
        callsite: Option<InsnId>,
        cycles: u64,
    ) -> Result<(), ReplayError> {
        writeln!(
            self.out,
            "EVENT ret           {} to {} @{cycles}",
            program.insn_name(site),
            site_name(program, callsite)
        )?;
        Ok(())
    }

    fn loop_enter(
        &mut self,
        program: &Program,
        header: BlockId,
        cycles: u64,
    ) -> Result<(), ReplayError> {
        writeln!(self.out, "EVENT loopenter     {} @{cycles}", program.block_name(header))?;
        Ok(())
    }

    fn loop_continue(
        &mut self,
        program: &Program,
        header: BlockId,
        cycles: u64,
    ) -> Result<(), ReplayError> {
        writeln!(self.out, "EVENT loopcont      {} @{cycles}", program.block_name(header))?;
        Ok(())
    }

    fn loop_exit(
        &mut self,
        program: &Program,
        header: BlockId,
        cycles: u64,
    ) -> Result<(), ReplayError> {
        writeln!(self.out, "EVENT loopexit      {} @{cycles}", program.block_name(header))?;
        Ok(())
    }

    fn end_of_trace(&mut self, _program: &Program) -> Result<(), ReplayError> {
        writeln!(self.out, "EVENT eof")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowtrace_model::{Arch, ProgramBuilder};

    #[test]
    fn formats_one_line_per_event() {
        let mut pb = ProgramBuilder::new(Arch { call_delay_slots: 0, return_delay_slots: 0 });
        let f = pb.add_function("main");
        let b = pb.add_block(f, "b0");
        pb.add_insn(b, Some(0x100));
        let p = pb.finish().unwrap();
        let f = p.function_by_label("main").unwrap();
        let b = p.function(f).blocks()[0];

        let mut buf = Vec::new();
        {
            let mut obs = VerboseObserver::new(&mut buf);
            obs.enter_function(&p, f, None, 0).unwrap();
            obs.visit_block(&p, b, 1).unwrap();
            obs.end_of_trace(&p).unwrap();
        }
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("EVENT function      main from - @0"));
        assert!(text.contains("EVENT block         main/b0 @1"));
        assert!(text.contains("EVENT eof"));
    }
}
