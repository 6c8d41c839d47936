//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "flowtrace",
    about = "Extract flow facts from machine execution traces",
    after_help = "\
EXAMPLES:
    flowtrace model.json --trace run.trc                  Global block frequencies
    flowtrace model.json --sim 'pasim -q a.elf'           Stream trace from a simulator
    flowtrace model.json --trace run.trc -r g:b,f:lc/1    Add per-function loop/call recorders

RECORDER SPECIFICATION:
    Comma-separated items <scope>[/<ctx>]:<entities>[/<ctx>][:<ctx>]
    scope    g (whole analysis scope) or f (per executed function)
    entities b block frequencies, i infeasible blocks, l loop bounds, c call targets
    /<n>     call-string length; after the scope it keys scope instances, after
             the entities (or as trailing :<n>) it keys recorded program points
             and, for f scopes, caps the virtual-inlining depth"
)]
pub struct Args {
    /// Program model document (JSON)
    #[arg(value_name = "MODEL")]
    pub model: PathBuf,

    /// Read the trace from a file
    #[arg(long, value_name = "FILE", conflicts_with = "sim")]
    pub trace: Option<PathBuf>,

    /// Run a simulator command and read the trace from its stdout
    #[arg(long, value_name = "CMD")]
    pub sim: Option<String>,

    /// Label of the function the trace enters first
    #[arg(long, default_value = "main", value_name = "LABEL")]
    pub trace_entry: String,

    /// Label of the function to analyze
    #[arg(short = 'e', long, default_value = "main", value_name = "LABEL")]
    pub analysis_entry: String,

    /// Recorder specification (see --help)
    #[arg(short, long, default_value = "g:b,f:b/0,f:l", value_name = "SPEC")]
    pub recorders: String,

    /// Default call-string length for contexts
    #[arg(long, default_value = "0", value_name = "N")]
    pub callstring_length: usize,

    /// Write the flow-fact document to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Correlate the trace against relation graphs and print progress nodes
    #[arg(long)]
    pub progress: bool,

    /// Dump every replay event and all recorder statistics to stderr
    #[arg(short, long)]
    pub verbose: bool,
}
