//! Kiln CLI: compiles shader program variants through the module cache.
//!
//! Provides `kiln compile` for compiling one variant of a program against a
//! pipeline layout (optionally racing several threads on it, or persisting
//! results in a blob directory), and `kiln inspect` for validating and
//! summarizing a compiled binary.

#![warn(missing_docs)]

mod compile;
mod inspect;
mod pipeline;

use std::fmt;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use kiln_ir::ShaderStage;
use tracing_subscriber::EnvFilter;

/// Environment variable holding a `tracing` filter directive.
pub const LOG_ENV: &str = "KILN_LOG";

/// Kiln, a shader variant compiler with a concurrent module cache.
#[derive(Parser, Debug)]
#[command(name = "kiln", version, about = "Kiln shader variant compiler")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Control colored output.
    #[arg(long, global = true, value_enum, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// Path to a custom `kiln.toml` configuration file.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile one variant of a program.
    Compile(CompileArgs),
    /// Validate a compiled binary and print a summary.
    Inspect(InspectArgs),
}

/// Arguments for the `kiln compile` subcommand.
#[derive(Parser, Debug)]
pub struct CompileArgs {
    /// Program file (JSON).
    pub program: PathBuf,

    /// Pipeline layout file (JSON array of bind groups).
    pub layout: PathBuf,

    /// Entry point to compile.
    #[arg(short, long, default_value = "main")]
    pub entry: String,

    /// Pipeline stage the entry point is used for.
    #[arg(short, long, value_enum)]
    pub stage: StageArg,

    /// Override constant as NAME=VALUE; NAME may be an override name or id.
    #[arg(
        short = 'D',
        long = "constant",
        value_name = "NAME=VALUE",
        value_parser = pipeline::parse_constant
    )]
    pub constants: Vec<(String, f64)>,

    /// Directory for persisted compilation results (overrides `cache.blob_dir`).
    #[arg(long)]
    pub blob_dir: Option<PathBuf>,

    /// Request the same variant from this many threads at once.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    pub threads: u16,

    /// Make vertex shaders write point size.
    #[arg(long)]
    pub emit_point_size: bool,

    /// Clamp fragment depth writes.
    #[arg(long)]
    pub clamp_frag_depth: bool,

    /// Require full subgroups of at most this size (compute only).
    #[arg(long, value_name = "SIZE")]
    pub full_subgroups: Option<u32>,

    /// Write the binary to this path.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the `kiln inspect` subcommand.
#[derive(Parser, Debug)]
pub struct InspectArgs {
    /// Compiled binary.
    pub binary: PathBuf,

    /// Output format for the summary.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// Pipeline stage selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StageArg {
    /// Vertex shading.
    Vertex,
    /// Fragment shading.
    Fragment,
    /// Compute dispatch.
    Compute,
}

impl From<StageArg> for ShaderStage {
    fn from(stage: StageArg) -> Self {
        match stage {
            StageArg::Vertex => ShaderStage::Vertex,
            StageArg::Fragment => ShaderStage::Fragment,
            StageArg::Compute => ShaderStage::Compute,
        }
    }
}

impl fmt::Display for StageArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&ShaderStage::from(*self), f)
    }
}

/// Controls whether colored output is produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ColorChoice {
    /// Detect from terminal capabilities.
    Auto,
    /// Always produce colored output.
    Always,
    /// Never produce colored output.
    Never,
}

/// Summary output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable terminal output.
    Text,
    /// Machine-readable JSON output.
    Json,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose/debug information.
    pub verbose: bool,
    /// Whether to use colored output.
    pub color: bool,
    /// Optional path to a custom config file.
    pub config: Option<String>,
}

/// Default filter directive when `KILN_LOG` is unset.
fn default_log_filter(quiet: bool, verbose: bool) -> &'static str {
    if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    }
}

fn init_tracing(global: &GlobalArgs) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_log_filter(global.quiet, global.verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(global.color)
        .init();
}

fn main() {
    let cli = Cli::parse();

    let color = match cli.color {
        ColorChoice::Auto => std::io::stderr().is_terminal(),
        ColorChoice::Always => true,
        ColorChoice::Never => false,
    };

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        color,
        config: cli.config,
    };
    init_tracing(&global);

    let result = match cli.command {
        Command::Compile(ref args) => compile::run(args, &global),
        Command::Inspect(ref args) => inspect::run(args, &global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}
