use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "jar-sentry")]
#[command(about = "Scan Java class files and jars for known malicious bytecode signatures")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Mismatches tolerated per signature (env: JAR_SENTRY_MAX_DISTANCE).
    #[arg(long, global = true, value_name = "N")]
    pub max_distance: Option<usize>,

    /// Instructions skipped while looking for one pattern opcode, 0 for no
    /// limit (env: JAR_SENTRY_MAX_SKIP).
    #[arg(long, global = true, value_name = "N")]
    pub max_skip: Option<usize>,

    /// Worker threads (env: JAR_SENTRY_THREADS).
    #[arg(long, global = true, value_name = "N")]
    pub threads: Option<usize>,

    #[arg(short = 'f', long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    #[arg(short = 'o', long, global = true, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Scan files and directories.
    Scan {
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<PathBuf>,
    },
    /// List the built-in signatures.
    Signatures,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}
