// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `scanflow`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "scanflow",
    version,
    about = "Drive scan tasks through their lifecycle and recover stuck work.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Scanflow.toml` in the current working directory. A missing
    /// default file means built-in defaults.
    #[arg(long, value_name = "PATH", default_value = "Scanflow.toml")]
    pub config: String,

    /// JSON snapshot of tasks and sub-tasks to seed the store with.
    #[arg(long, value_name = "PATH")]
    pub state: Option<String>,

    /// Run every sweep once, print the resulting records as JSON and exit.
    #[arg(long)]
    pub once: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SCANFLOW_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the configuration and both transition tables,
    /// but don't reconcile anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
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
    fn defaults() {
        let args = CliArgs::try_parse_from(["scanflow"]).unwrap();
        assert_eq!(args.config, "Scanflow.toml");
        assert!(args.state.is_none());
        assert!(!args.once && !args.dry_run);
    }

    #[test]
    fn flags_parse() {
        let args = CliArgs::try_parse_from([
            "scanflow",
            "--config",
            "conf/prod.toml",
            "--state",
            "state.json",
            "--once",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(args.config, "conf/prod.toml");
        assert_eq!(args.state.as_deref(), Some("state.json"));
        assert!(args.once);
        assert_eq!(args.log_level, Some(LogLevel::Debug));
    }
}
