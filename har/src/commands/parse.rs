//! `har parse` - lift a source file into the graph envelope.

use super::{read_file, write_output, StageError};
use clap::Args;
use har_core::{graph_to_json_string, Graph};
use har_parsers::{detect_format, ParseOptions, SourceFormat};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Args)]
pub struct ParseArgs {
    /// Source file to parse
    pub file: PathBuf,

    /// Source format (auto-detected when omitted)
    #[arg(long)]
    pub format: Option<String>,

    /// Write the envelope here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Print a graph summary to stderr
    #[arg(long)]
    pub inspect: bool,
}

pub fn run(args: &ParseArgs) -> Result<(), StageError> {
    let content = read_file(&args.file)?;
    let format = resolve_format(args.format.as_deref(), &args.file, &content)?;

    let graph = har_parsers::parse(format, &content, &ParseOptions::default())
        .map_err(|err| StageError::new("parse", err))?;

    report_degradations(&graph);
    if args.inspect {
        eprintln!("{}", summarize(&graph, format));
    }
    write_output(args.output.as_ref(), &graph_to_json_string(&graph))
}

pub(crate) fn resolve_format(
    requested: Option<&str>,
    path: &std::path::Path,
    content: &str,
) -> Result<SourceFormat, StageError> {
    match requested {
        Some(name) => name
            .parse::<SourceFormat>()
            .map_err(|err| StageError::new("parse", err)),
        None => detect_format(Some(path), content).ok_or_else(|| {
            StageError::new(
                "parse",
                format!("could not detect format of {}; pass --format", path.display()),
            )
        }),
    }
}

/// Non-fatal degradations print a warning; the invocation still exits 0.
fn report_degradations(graph: &Graph) {
    let passthrough = graph
        .operations()
        .iter()
        .filter(|op| op.op_type.is_passthrough())
        .count();
    if passthrough > 0 {
        eprintln!("warning: {passthrough} operation(s) degraded to passthrough");
    }
    if let Err(err) = graph.validate() {
        eprintln!("warning: graph validation: {err}");
    }
}

pub(crate) fn summarize(graph: &Graph, format: SourceFormat) -> String {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for op in graph.operations() {
        *counts.entry(op.op_type.to_string()).or_default() += 1;
    }
    let mut out = format!(
        "{format}: {} operation(s), {} dependency(ies)\n",
        graph.operation_count(),
        graph.dependency_count()
    );
    for (op_type, count) in counts {
        out.push_str(&format!("  {count:>4}  {op_type}\n"));
    }
    out.trim_end().to_string()
}
