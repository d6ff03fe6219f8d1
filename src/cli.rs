// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `emk`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "emk",
    version,
    about = "Build targets from pattern-keyed task and output trees.",
    long_about = None
)]
pub struct CliArgs {
    /// Targets to build, e.g. `all`, `build/**` or `deploy:{"env":"prod"}`.
    ///
    /// Default: `[config].default_target` from the Emkfile.
    #[arg(value_name = "TARGET")]
    pub targets: Vec<String>,

    /// Path to the Emkfile (TOML), relative to the working directory.
    #[arg(short = 'f', long = "file", value_name = "PATH", default_value = "Emkfile.toml")]
    pub file: PathBuf,

    /// Keep running and rebuild when source files change.
    #[arg(short, long)]
    pub watch: bool,

    /// Rebuild every target regardless of timestamps.
    #[arg(short = 'B', long)]
    pub force: bool,

    /// Plan and print the stages, but don't run any recipe.
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Run as if started in this directory.
    #[arg(short = 'C', long, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `EMK_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_and_targets_parse() {
        let args = CliArgs::try_parse_from([
            "emk", "-B", "-w", "-C", "proj", "-f", "other.toml", "all", "build/**",
        ])
        .unwrap();
        assert!(args.force);
        assert!(args.watch);
        assert!(!args.dry_run);
        assert_eq!(args.directory, Some(PathBuf::from("proj")));
        assert_eq!(args.file, PathBuf::from("other.toml"));
        assert_eq!(args.targets, vec!["all", "build/**"]);
    }

    #[test]
    fn defaults() {
        let args = CliArgs::try_parse_from(["emk"]).unwrap();
        assert!(args.targets.is_empty());
        assert_eq!(args.file, PathBuf::from("Emkfile.toml"));
        assert!(args.log_level.is_none());
    }
}
