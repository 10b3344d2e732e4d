//! Main entry point for the manhuagui CLI application.
//!
//! This binary downloads a book from manhuagui.com, or decodes a volume page
//! saved on disk and prints its page URLs.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use manhuagui::site::{BookDownloader, BookEntry, IMAGE_HOST, Site};
use manhuagui::{Cli, Fetch, HttpFetcher, decode};

/// Application entry point.
///
/// Parses command-line arguments and dispatches on whether the argument is
/// a book URL or a local file.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    if !cli.is_http_url() {
        return decode_local(Path::new(&cli.url)).await;
    }

    let entry = BookEntry::parse(&cli.url)?;

    let fetcher = Arc::new(HttpFetcher::new(cli.http_config())?);
    if let Some(proxy) = &cli.proxy {
        info!("Using proxy {}", proxy);
    }
    let site = Site::new(fetcher.clone());

    if cli.list {
        return list_book(&site, &entry).await;
    }

    let output_dir = cli.output_dir();
    prepare_output_dir(&output_dir).await?;

    let downloader = BookDownloader::new(site);
    let summary = downloader.download_book(&entry, &output_dir).await?;

    info!(
        "{} volume(s) complete, {} page(s) downloaded, {} page(s) already present",
        summary.volumes, summary.pages_written, summary.pages_skipped
    );
    if !summary.failed_volumes.is_empty() {
        info!("Failed volume(s): {}", summary.failed_volumes.join(", "));
    }
    info!(
        "Total bytes transferred: {}",
        format_size(fetcher.transferred_bytes())
    );
    info!("All done.");

    Ok(())
}

/// Install the stderr log subscriber. `RUST_LOG` takes precedence over `-d`.
fn init_tracing(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Create the output directory, refusing a path that is a regular file.
async fn prepare_output_dir(dir: &Path) -> Result<()> {
    if tokio::fs::try_exists(dir).await? {
        if !tokio::fs::metadata(dir).await?.is_dir() {
            bail!("Output path \"{}\" is not a directory", dir.display());
        }
        debug!("Output path \"{}\" already exists", dir.display());
    } else {
        tokio::fs::create_dir_all(dir).await?;
        debug!("Path \"{}\" created", dir.display());
    }
    Ok(())
}

/// Decode a saved volume page and print one page URL per line.
async fn decode_local(path: &Path) -> Result<()> {
    let html = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let manifest = decode::decode_page(&html)
        .with_context(|| format!("Failed to decode {}", path.display()))?;

    for page in decode::page_urls(&manifest, IMAGE_HOST) {
        println!("{}", page);
    }
    Ok(())
}

/// Print every volume of a book followed by its page URLs.
async fn list_book<F: Fetch>(site: &Site<F>, entry: &BookEntry) -> Result<()> {
    let book = site.fetch_book(entry).await?;
    println!("{} ({} volume(s))", book.name, book.volumes.len());

    for volume in &book.volumes {
        println!("[{}] {}", volume.section, volume.title);
        for page in site.fetch_volume(volume).await? {
            println!("  {:>4}  {}", page.number, page.url);
        }
    }
    Ok(())
}

/// Format a byte size into a human-readable string.
///
/// Automatically selects the appropriate unit (bytes, KB, MB, GB)
/// based on the size magnitude.
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
