//! Command-line interface definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Incrementally sync analytics reports into typed records
#[derive(Parser, Debug)]
#[command(name = "reportsync")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Poll the report until interrupted with Ctrl+C or SIGTERM
    Run {
        #[command(flatten)]
        output: OutputArgs,

        /// Count records instead of writing them
        #[arg(long)]
        dry_run: bool,
    },

    /// Run a single poll cycle and print its outcome
    Once {
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Fetch the first backfill page and print the derived schemas
    Schema,
}

/// Where records and offsets go
#[derive(Args, Debug, Clone, Default)]
pub struct OutputArgs {
    /// Append records as JSON lines to this file instead of stdout
    #[arg(short, long, env = "REPORTSYNC_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Commit offsets to this file after every page and resume from it
    #[arg(long, env = "REPORTSYNC_OFFSET_FILE")]
    pub offset_file: Option<PathBuf>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_dry_run() {
        let cli = Cli::try_parse_from(["reportsync", "run", "--dry-run", "-v"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Command::Run { dry_run: true, .. }));
    }

    #[test]
    fn test_parse_once_with_offsets() {
        let cli = Cli::try_parse_from([
            "reportsync",
            "once",
            "--output",
            "records.jsonl",
            "--offset-file",
            "offsets.json",
        ])
        .unwrap();

        let Command::Once { output } = cli.command else {
            panic!("expected once");
        };
        assert_eq!(output.output, Some(PathBuf::from("records.jsonl")));
        assert_eq!(output.offset_file, Some(PathBuf::from("offsets.json")));
    }
}
