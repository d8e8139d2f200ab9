//! Command-line surface
//!
//! ```bash
//! # Upload with configuration from MINIO_* environment variables
//! s3pub screenshot.png photo.jpg
//!
//! # Prefix object keys and override the bucket
//! s3pub --prefix xiaohongshu/2026-02-19 --bucket screens shot.png
//!
//! # Use a profile from a YAML config file
//! s3pub --config s3pub.yaml --profile nas shot.png
//! ```
//!
//! Standard output carries exactly one JSON array, one element per input
//! file. Logs go to standard error.

pub mod args;

use anyhow::{Context, Result};
use std::io::Write;
use tracing::debug;

use crate::config;
use crate::core::Core;
use crate::upload::BatchReport;
pub use args::Cli;

/// Run one upload batch and print the JSON report to stdout
///
/// Configuration problems abort before any request is sent. Per-file
/// failures are part of the report and do not fail the run.
pub async fn run(cli: Cli) -> Result<()> {
    debug!("CLI arguments: {:?}", cli);

    let config = config::load_config(cli.config.as_deref(), cli.profile.as_deref())
        .context("Failed to load configuration")?;

    // load_config already made the requested profile the default
    let core = Core::new(config, None, cli.bucket.as_deref())?;

    let report = core.runner(cli.prefix.clone()).run(&cli.files).await;

    let stdout = std::io::stdout();
    write_report(&mut stdout.lock(), &report, cli.pretty)?;

    Ok(())
}

/// Serialize the report as a single JSON array followed by a newline
pub fn write_report<W: Write>(out: &mut W, report: &BatchReport, pretty: bool) -> Result<()> {
    if pretty {
        serde_json::to_writer_pretty(&mut *out, report)?;
    } else {
        serde_json::to_writer(&mut *out, report)?;
    }
    writeln!(out)?;
    out.flush()?;
    Ok(())
}
