//! # flowtrace - Main Entry Point
//!
//! Loads the program model, replays the trace (from a file or a simulator
//! pipe) through the recorder scheduler, and writes the resulting flow-fact
//! document to stdout or a file.

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use thiserror::Error;
use std::fs::File;
use std::io::{self, BufWriter, Write};

use flowtrace::cli::Args;
use flowtrace::export;
use flowtrace::progress::ProgressCorrelator;
use flowtrace::recorders::{parse_specs, RecorderScheduler, VerboseObserver};
use flowtrace::replay::{EventObserver, ReplayEngine};
use flowtrace::trace_source::{FileTrace, SimulatorTrace};
use flowtrace_model::Program;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;

/// Invalid argument combination, distinguished from analysis failures so
/// it can map to its own exit code.
#[derive(Debug, Error)]
#[error("{0}")]
struct UsageError(String);

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.is::<UsageError>() {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    let program = Program::from_json_file(&args.model)
        .with_context(|| format!("failed to load model {}", args.model.display()))?;
    let trace_entry = program
        .function_by_label(&args.trace_entry)
        .with_context(|| format!("trace entry '{}' not found in model", args.trace_entry))?;
    let analysis_entry = program
        .function_by_label(&args.analysis_entry)
        .with_context(|| format!("analysis entry '{}' not found in model", args.analysis_entry))?;
    let specs = parse_specs(&args.recorders, args.callstring_length)?;
    if specs.is_empty() {
        return Err(UsageError(
            "missing required argument: --recorders must name at least one recorder".to_owned(),
        )
        .into());
    }

    let engine = ReplayEngine::new(&program, trace_entry)?;
    let mut scheduler = RecorderScheduler::new(&specs, analysis_entry);
    let mut verbose = args.verbose.then(|| VerboseObserver::new(io::stderr()));
    let mut correlator = args.progress.then(ProgressCorrelator::new);

    let summary = {
        let mut observers: Vec<&mut dyn EventObserver> = Vec::new();
        if let Some(v) = verbose.as_mut() {
            observers.push(v);
        }
        observers.push(&mut scheduler);
        if let Some(c) = correlator.as_mut() {
            observers.push(c);
        }

        if let Some(path) = &args.trace {
            let trace = FileTrace::open(path)
                .with_context(|| format!("failed to open trace {}", path.display()))?;
            engine.run(trace, &mut observers)?
        } else if let Some(sim) = &args.sim {
            let command: Vec<String> = sim.split_whitespace().map(str::to_owned).collect();
            engine.run(SimulatorTrace::spawn(&command)?, &mut observers)?
        } else {
            return Err(UsageError(
                "missing required argument: --trace or --sim\n\n\
                 Usage:\n  \
                 flowtrace model.json --trace run.trc     Replay a trace file\n  \
                 flowtrace model.json --sim '<command>'   Stream from a simulator\n\n\
                 Run 'flowtrace --help' for more options"
                    .to_owned(),
            )
            .into());
        }
    };
    info!(
        "replayed {} instructions, {} entries into '{}'",
        summary.executed_instructions,
        scheduler.runs(),
        args.analysis_entry
    );
    if scheduler.runs() == 0 {
        bail!("analysis entry '{}' was never entered by the trace", args.analysis_entry);
    }

    if args.verbose {
        let mut err = io::stderr().lock();
        for (_, recorder) in scheduler.recorders() {
            recorder.dump(&mut err, &program)?;
        }
    }
    if let Some(correlator) = &correlator {
        let mut out = io::stdout().lock();
        for (function, node) in correlator.trace() {
            writeln!(out, "PROGRESS {} node {node}", program.function_name(*function))?;
        }
    }

    let doc = export::collect_facts(&program, &scheduler);
    match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            doc.write(BufWriter::new(file))?;
            info!("saved: {}", path.display());
        }
        None => doc.write(io::stdout().lock())?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_errors_get_their_own_exit_code() {
        let usage = anyhow::Error::new(UsageError("missing required argument".to_owned()));
        assert_eq!(exit_code_for(&usage), EXIT_USAGE);
        // Context wrapping must not hide the classification.
        let wrapped = usage.context("while parsing arguments");
        assert_eq!(exit_code_for(&wrapped), EXIT_USAGE);
        assert_eq!(exit_code_for(&anyhow::anyhow!("replay failed")), EXIT_ERROR);
    }
}
