//! Main entry point for the unzipdir CLI application.
//!
//! Parses `<src> <dest>` and extracts the archive. Nothing is printed on
//! success; failures are reported on stderr with a non-zero exit status.

use anyhow::{Context, Result};
use clap::Parser;

use unzipdir::Cli;

/// Application entry point.
///
/// Argument errors are reported by clap before any file is touched.
/// Extraction runs on a single thread, one entry at a time.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .init();

    let summary = unzipdir::extract(&cli.src, &cli.dest)
        .await
        .with_context(|| {
            format!(
                "failed to extract '{}' into '{}'",
                cli.src.display(),
                cli.dest.display()
            )
        })?;

    log::info!(
        "extracted {} files and {} directories into {}",
        summary.files,
        summary.directories,
        cli.dest.display()
    );
    if summary.skipped > 0 {
        log::warn!("{} entries skipped", summary.skipped);
    }

    Ok(())
}
