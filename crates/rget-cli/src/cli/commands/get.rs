//! `rget get <urls...>` – fetch an object from candidate endpoints to disk,
//! streaming bytes to the file as they are reassembled.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use rget_core::config::FetchConfig;
use rget_core::progress::ProgressReader;
use rget_core::transfer;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::parse_endpoints;

pub async fn run_get(
    cfg: &FetchConfig,
    urls: &[String],
    output: Option<PathBuf>,
    quiet: bool,
) -> Result<()> {
    let endpoints = parse_endpoints(urls)?;
    let dest = output.unwrap_or_else(|| derive_filename(&endpoints[0]));

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received; canceling transfer");
                cancel.cancel();
            }
        });
    }

    let stream = transfer::get_file(&endpoints, cfg, cancel)
        .await
        .context("transfer could not be started")?;
    let total = stream.total_size();
    if !quiet {
        eprintln!("fetching {} bytes to {}", total, dest.display());
    }

    let read_so_far = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&read_so_far);
    let mut reader = ProgressReader::new(stream, move |n| {
        let read = counter.fetch_add(n, Ordering::Relaxed) + n;
        if !quiet {
            eprint!("\r{:>3}% ({} / {} bytes)", read * 100 / total.max(1), read, total);
        }
    });

    let mut file = tokio::fs::File::create(&dest)
        .await
        .with_context(|| format!("cannot create {}", dest.display()))?;
    tokio::io::copy(&mut reader, &mut file)
        .await
        .context("transfer failed")?;
    file.sync_all().await.context("sync failed")?;

    if !quiet {
        eprintln!();
    }
    println!("saved {} ({} bytes)", dest.display(), total);
    Ok(())
}

/// Output name from the last non-empty path segment of the first URL.
fn derive_filename(url: &Url) -> PathBuf {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("download.bin"))
}
