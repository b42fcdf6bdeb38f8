//! CLI command definitions for `pinf`.
//!
//! Program selection flags live on [`Cli`] and apply to every subcommand.

use crate::config::{LoaderOptions, ProgramOptions};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;

/// Output format for resolved values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON (default)
    #[default]
    Json,
    /// YAML
    Yaml,
}

impl OutputFormat {
    pub fn render<T: Serialize>(&self, value: &T) -> anyhow::Result<String> {
        Ok(match self {
            OutputFormat::Json => serde_json::to_string_pretty(value)?,
            OutputFormat::Yaml => serde_yaml::to_string(value)?,
        })
    }
}

/// Resolve PINF program and package configuration
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to program.json (overrides PINF_PROGRAM)
    #[arg(long, global = true)]
    pub program: Option<PathBuf>,

    /// Path to package.json (overrides PINF_PACKAGE)
    #[arg(long, global = true)]
    pub package: Option<PathBuf>,

    /// Mode selecting program.<mode>.json (overrides PINF_MODE)
    #[arg(long, global = true)]
    pub mode: Option<String>,

    /// Leave unset $NAME tokens in place instead of failing
    #[arg(long, global = true)]
    pub non_strict: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Json, global = true)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Program options from `PINF_*`, overridden by flags.
    pub fn program_options(&self) -> ProgramOptions {
        ProgramOptions::discover().with_overrides(
            self.program.clone(),
            self.package.clone(),
            self.mode.clone(),
        )
    }

    pub fn loader_options(&self) -> LoaderOptions {
        let options = LoaderOptions::discover();
        if self.non_strict {
            options.non_strict()
        } else {
            options
        }
    }
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the effective config of a module, with its `pinf` block
    Config(ModuleArgs),

    /// Print the effective env of a module
    Env(ModuleArgs),

    /// Print the identity and directories of a module
    Paths(ModuleArgs),

    /// Find the nearest descriptor at or above a path
    Locate(LocateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ModuleArgs {
    /// Package directory (default: directory of the package descriptor)
    pub path: Option<PathBuf>,

    /// Namespace to extract
    #[arg(long)]
    pub ns: Option<String>,

    /// Module uid (default: the package's declared uid)
    #[arg(long)]
    pub uid: Option<String>,

    /// Instance id
    #[arg(long)]
    pub iid: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct LocateArgs {
    /// Directory to start searching from
    pub start: PathBuf,

    /// Descriptor filename
    #[arg(long, default_value = "package.json")]
    pub file: String,
}
