//! Hybrid Automation Router - command-line interface.
//!
//! The thin outer shell over the translation core: parse a source file into
//! the graph envelope, transform an envelope into a target dialect, convert
//! end-to-end, or route a graph through the control plane.

#![forbid(unsafe_code)]

mod commands;

use clap::{Parser, Subcommand};
use har_core::HarConfig;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "har")]
#[command(author, version, about = "Hybrid Automation Router - cross-tool IaC translation")]
struct Cli {
    /// Path to the HAR config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a source file and write the graph envelope as JSON
    Parse(commands::parse::ParseArgs),
    /// Read a graph envelope and emit target dialect text
    Transform(commands::transform::TransformArgs),
    /// Parse and transform in one step
    Convert(commands::convert::ConvertArgs),
    /// Route a graph envelope through the control plane
    Route(commands::route::RouteArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = HarConfig::load_or_default(cli.config.as_deref());

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.general.log_level.clone()))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let result = match cli.command {
        Command::Parse(args) => commands::parse::run(&args),
        Command::Transform(args) => commands::transform::run(&args),
        Command::Convert(args) => commands::convert::run(&args),
        Command::Route(args) => commands::route::run(&args, &config).await,
    };

    if let Err(err) = result {
        eprintln!("{err}");
        std::process::exit(1);
    }
}
