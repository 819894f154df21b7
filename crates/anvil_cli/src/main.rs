//! Anvil CLI: compile through a shared daemon, or in-process when none is available.
//!
//! Provides `anvil compile` to run a compile through the orchestrator,
//! `anvil daemon` to serve compiles for one compiler (normally started by the
//! client itself), and `anvil identity` to print the fingerprint a compiler is
//! keyed by.

#![warn(missing_docs)]

mod compile;
mod daemon;
mod identity;
mod logging;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use anvil_protocol::TargetPlatform;
use clap::{Parser, Subcommand, ValueEnum};

/// Anvil: a compile client with a shared compile daemon.
#[derive(Parser, Debug)]
#[command(name = "anvil", version, about = "Anvil compile client and daemon")]
pub struct Cli {
    /// Report every message category and enable debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Control colored output.
    #[arg(long, global = true, value_enum, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// Directory holding `anvil.toml` (defaults to the current directory).
    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile, through the daemon when possible.
    Compile(CompileArgs),
    /// Serve compiles for one compiler.
    Daemon(DaemonArgs),
    /// Print the identity of a compiler.
    Identity(CompilerArgs),
}

/// Which compiler to use; falls back to `[compiler]` in `anvil.toml`.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct CompilerArgs {
    /// Path to the compiler executable.
    #[arg(long)]
    pub compiler: Option<PathBuf>,

    /// Compiler version string.
    #[arg(long)]
    pub compiler_version: Option<String>,
}

/// Arguments for the `anvil compile` subcommand.
#[derive(Parser, Debug)]
pub struct CompileArgs {
    /// The compiler to drive.
    #[command(flatten)]
    pub compiler: CompilerArgs,

    /// Always compile in-process.
    #[arg(long)]
    pub no_daemon: bool,

    /// Fall back after the first connection failure instead of retrying once.
    #[arg(long)]
    pub no_retry: bool,

    /// Output kind.
    #[arg(long, value_enum, default_value_t = Target::Bytecode)]
    pub target: Target,

    /// Compile incrementally, keeping caches in `--working-dir`.
    #[arg(long)]
    pub incremental: bool,

    /// Directory for incremental caches (defaults to the project directory).
    #[arg(long)]
    pub working_dir: Option<PathBuf>,

    /// Sources changed since the last build; implies the changes are known.
    #[arg(long, num_args = 1..)]
    pub modified: Vec<PathBuf>,

    /// Sources deleted since the last build; implies the changes are known.
    #[arg(long, num_args = 1..)]
    pub deleted: Vec<PathBuf>,

    /// Cache version file name, relative to the working directory.
    #[arg(long, default_value = "cache-version.txt")]
    pub cache_version_file: String,

    /// Cache version; a different stored version forces a full rebuild.
    #[arg(long, default_value_t = 1)]
    pub cache_version: i32,

    /// Arguments passed to the compiler.
    #[arg(last = true)]
    pub args: Vec<String>,
}

/// Arguments for the `anvil daemon` subcommand.
#[derive(Parser, Debug)]
pub struct DaemonArgs {
    /// The compiler to serve.
    #[command(flatten)]
    pub compiler: CompilerArgs,

    /// Directory for the port file (overrides `daemon.run_dir`).
    #[arg(long)]
    pub run_dir: Option<PathBuf>,
}

/// Output kind selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Target {
    /// Virtual machine bytecode.
    Bytecode,
    /// Script output.
    Script,
    /// Metadata only.
    Metadata,
}

impl From<Target> for TargetPlatform {
    fn from(target: Target) -> Self {
        match target {
            Target::Bytecode => TargetPlatform::Bytecode,
            Target::Script => TargetPlatform::Script,
            Target::Metadata => TargetPlatform::Metadata,
        }
    }
}

/// Controls whether colored output is produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ColorChoice {
    /// Color when stderr is a terminal.
    Auto,
    /// Always produce colored output.
    Always,
    /// Never produce colored output.
    Never,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to report every message category.
    pub verbose: bool,
    /// Whether to use colored output.
    pub color: bool,
    /// Explicit project directory, if given.
    pub project_dir: Option<PathBuf>,
}

impl GlobalArgs {
    /// The directory `anvil.toml` is read from.
    pub fn project_dir(&self) -> std::io::Result<PathBuf> {
        match &self.project_dir {
            Some(dir) => Ok(dir.clone()),
            None => std::env::current_dir(),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let color = match cli.color {
        ColorChoice::Auto => std::io::stderr().is_terminal(),
        ColorChoice::Always => true,
        ColorChoice::Never => false,
    };
    let global = GlobalArgs {
        verbose: cli.verbose,
        color,
        project_dir: cli.project_dir,
    };

    let result = match cli.command {
        Command::Compile(ref args) => compile::run(args, &global),
        Command::Daemon(ref args) => daemon::run(args, &global),
        Command::Identity(ref args) => identity::run(args, &global),
    };

    // Returning (rather than exiting) lets the liveness marker be removed.
    match result {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(2)
        }
    }
}
