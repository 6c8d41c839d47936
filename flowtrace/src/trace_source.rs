//! Trace record sources.
//!
//! A trace is a lazy, unbounded, single-pass sequence of `(pc, cycles)`
//! records. Sources yield `Result`s so a malformed line or a broken pipe
//! aborts the replay instead of silently truncating it.
//!
//! The textual format is the simulator's debug trace: one record per line,
//! hexadecimal program counter, then the cycle counter.

use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Lines, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};

use flowtrace_model::Address;

use crate::domain::ReplayError;

/// One trace record: program counter plus a monotonically non-decreasing
/// cycle counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceRecord {
    pub pc: Address,
    pub cycles: u64,
}

/// Parse one `HEXPC CYCLES` trace line.
fn parse_line(line: &str) -> Result<TraceRecord, ReplayError> {
    let malformed = || ReplayError::MalformedTrace(line.to_owned());
    let mut parts = line.split_whitespace();
    let pc = parts.next().ok_or_else(malformed)?;
    let cycles = parts.next().ok_or_else(malformed)?;
    let pc = Address::from_str_radix(pc.trim_start_matches("0x"), 16).map_err(|_| malformed())?;
    let cycles = cycles.parse().map_err(|_| malformed())?;
    Ok(TraceRecord { pc, cycles })
}

/// Line-oriented trace read from any reader (file, pipe). Blank lines are
/// skipped.
pub struct LineTrace<R> {
    lines: Lines<BufReader<R>>,
}

impl<R: Read> LineTrace<R> {
    pub fn new(reader: R) -> Self {
        Self { lines: BufReader::new(reader).lines() }
    }
}

impl<R: Read> Iterator for LineTrace<R> {
    type Item = Result<TraceRecord, ReplayError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.lines.next()? {
                Ok(line) if line.trim().is_empty() => {}
                Ok(line) => return Some(parse_line(&line)),
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}

/// Trace stored in a file.
pub struct FileTrace;

impl FileTrace {
    pub fn open(path: impl AsRef<Path>) -> Result<LineTrace<File>, ReplayError> {
        Ok(LineTrace::new(File::open(path)?))
    }
}

/// Trace streamed from an external cycle-accurate simulator process.
///
/// The command's stdout is consumed line by line; the child is reaped when
/// the source is dropped.
pub struct SimulatorTrace {
    child: Child,
    lines: LineTrace<std::process::ChildStdout>,
}

impl SimulatorTrace {
    /// Spawn `command` (program plus arguments) and stream its trace.
    /// A missing executable is a fatal configuration error.
    pub fn spawn(command: &[String]) -> Result<Self, ReplayError> {
        let (program, args) = command.split_first().ok_or_else(|| {
            ReplayError::TraceSourceSpawn {
                command: String::new(),
                source: ErrorKind::NotFound.into(),
            }
        })?;
        let mut child = Command::new(program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| ReplayError::TraceSourceSpawn {
                command: command.join(" "),
                source,
            })?;
        let stdout = child.stdout.take().ok_or_else(|| ReplayError::TraceSourceSpawn {
            command: command.join(" "),
            source: ErrorKind::BrokenPipe.into(),
        })?;
        Ok(Self { child, lines: LineTrace::new(stdout) })
    }
}

impl Iterator for SimulatorTrace {
    type Item = Result<TraceRecord, ReplayError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.lines.next()
    }
}

impl Drop for SimulatorTrace {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_hex_pc_and_decimal_cycles() {
        assert_eq!(parse_line("1f0 42").unwrap(), TraceRecord { pc: 0x1f0, cycles: 42 });
        assert_eq!(parse_line("0x1f0 42").unwrap(), TraceRecord { pc: 0x1f0, cycles: 42 });
    }

    #[test]
    fn malformed_line_is_fatal() {
        assert!(matches!(parse_line("zzz 42"), Err(ReplayError::MalformedTrace(_))));
        assert!(matches!(parse_line("1f0"), Err(ReplayError::MalformedTrace(_))));
    }

    #[test]
    fn reads_lines_skipping_blanks() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "100 1").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "104 2").unwrap();
        let records: Result<Vec<_>, _> = FileTrace::open(file.path()).unwrap().collect();
        let records = records.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1], TraceRecord { pc: 0x104, cycles: 2 });
    }

    #[test]
    fn missing_simulator_is_fatal() {
        let cmd = vec!["/nonexistent/simulator".to_string(), "-q".to_string()];
        match SimulatorTrace::spawn(&cmd) {
            Err(ReplayError::TraceSourceSpawn { command, .. }) => {
                assert!(command.contains("/nonexistent/simulator"));
            }
            other => panic!("expected spawn failure, got {:?}", other.map(|_| ())),
        }
    }
}
