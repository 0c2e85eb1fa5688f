//! Build automation tasks for reportsync
//!
//! Currently generates the CLI reference from the clap definitions.

use clap::Parser;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation tasks for reportsync", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Generate the CLI reference in Markdown
    GenerateCliDocs {
        /// Output directory for generated documentation
        #[arg(short, long, default_value = "docs")]
        output_dir: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenerateCliDocs { output_dir } => generate_cli_docs(&output_dir)?,
    }

    Ok(())
}

fn generate_cli_docs(output_dir: &str) -> anyhow::Result<()> {
    println!("Generating CLI documentation...");

    let markdown = clap_markdown::help_markdown::<reportsync_ingest::cli::Cli>();

    let content = format!(
        r#"# reportsync CLI Reference

This documentation is generated from the CLI source code. Last updated: {}.

## Overview

`reportsync` pulls a paginated analytics report window by window and writes
each row as a typed key/value record. A wide backfill window runs first; after
it completes, a narrow incremental window is fetched at most once per
`REPORTSYNC_MIN_FETCH_INTERVAL_SECS`.

## Quick Start

```bash
export REPORTSYNC_VIEW_ID=123456
export REPORTSYNC_CREDENTIALS_FILE=service-account.json

# Inspect the schemas the report produces
reportsync schema

# Fetch one window into a file, committing offsets after each page
reportsync once --output records.jsonl --offset-file offsets.json

# Keep polling until Ctrl+C
reportsync run --output records.jsonl --offset-file offsets.json
```

## Commands

{}

## Environment Variables

| Variable | Default |
|---|---|
| `REPORTSYNC_VIEW_ID` | required |
| `REPORTSYNC_CREDENTIALS_FILE` | service-account key file; one credential source is required |
| `REPORTSYNC_ACCESS_TOKEN` | static bearer token instead of a key file |
| `REPORTSYNC_DIMENSIONS` | `pagePath,dateHourMinute` |
| `REPORTSYNC_MEASURES` | `pageviews` |
| `REPORTSYNC_TOPIC` | `analytics-reports` |
| `REPORTSYNC_BACKFILL_START` | `30DaysAgo` |
| `REPORTSYNC_INCREMENTAL_START` | `1DaysAgo` |
| `REPORTSYNC_END_DATE` | `yesterday` |
| `REPORTSYNC_POLL_INTERVAL_SECS` | `60` |
| `REPORTSYNC_MIN_FETCH_INTERVAL_SECS` | `86400` |
| `REPORTSYNC_API_URL` | `https://analyticsreporting.googleapis.com` |
| `REPORTSYNC_PAGE_SIZE` | `10000` |
| `REPORTSYNC_REQUEST_TIMEOUT_SECS` | `60` |
| `LOG_LEVEL`, `LOG_FORMAT`, `LOG_OUTPUT`, `LOG_DIR`, `LOG_FILTER` | see `reportsync_common::logging` |

A `.env` file in the working directory is read on startup.

---

*To update, run `cargo xtask generate-cli-docs`.*
"#,
        chrono::Utc::now().format("%Y-%m-%d"),
        markdown
    );

    let output_path = PathBuf::from(output_dir);
    fs::create_dir_all(&output_path)?;

    let file_path = output_path.join("cli-reference.md");
    fs::write(&file_path, content)?;

    println!("Generated CLI documentation at: {}", file_path.display());

    Ok(())
}
