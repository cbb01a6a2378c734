//! Endpoint liveness probing and size discovery.
//!
//! Candidate URLs are probed concurrently with a lightweight HEAD request
//! under a short per-endpoint timeout; endpoints that answer become the
//! transfer's worker pool. The target's total size is then discovered with a
//! 2-byte range GET, parsing the `Content-Range` total.

use std::time::Duration;

use reqwest::header::{CONTENT_RANGE, RANGE};
use reqwest::{Client, StatusCode};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::error::TransferError;
use crate::pool::{Worker, WorkerPool};

/// Probe all candidates concurrently and collect the live ones into a pool.
///
/// Endpoint order in the pool is arrival order of the probe responses; the
/// engine guarantees nothing about it. Fails with `NoWorkersAvailable` when
/// zero candidates pass.
pub async fn probe_endpoints(
    client: &Client,
    endpoints: &[Url],
    probe_timeout: Duration,
) -> Result<WorkerPool, TransferError> {
    let mut probes = JoinSet::new();
    for url in endpoints {
        let client = client.clone();
        let url = url.clone();
        probes.spawn(async move {
            match tokio::time::timeout(probe_timeout, client.head(url.clone()).send()).await {
                Ok(Ok(resp)) if endpoint_alive(resp.status()) => {
                    debug!(endpoint = %url, status = %resp.status(), "probe ok");
                    Some(Worker { url })
                }
                Ok(Ok(resp)) => {
                    warn!(endpoint = %url, status = %resp.status(), "probe rejected");
                    None
                }
                Ok(Err(e)) => {
                    warn!(endpoint = %url, error = %e, "probe failed");
                    None
                }
                Err(_) => {
                    warn!(endpoint = %url, timeout_ms = probe_timeout.as_millis() as u64, "probe timed out");
                    None
                }
            }
        });
    }

    let mut workers = Vec::new();
    while let Some(joined) = probes.join_next().await {
        if let Ok(Some(worker)) = joined {
            workers.push(worker);
        }
    }

    if workers.is_empty() {
        return Err(TransferError::NoWorkersAvailable);
    }
    Ok(WorkerPool::new(workers))
}

/// A liveness probe passes on any success status, and on 405 for servers
/// that serve ranges but block HEAD.
fn endpoint_alive(status: StatusCode) -> bool {
    status.is_success() || status == StatusCode::METHOD_NOT_ALLOWED
}

/// Discover the object's total size via a 2-byte range GET.
///
/// Each worker is tried at most once; the first parseable `Content-Range`
/// total wins. Size discovery failure is fatal to the transfer, so this
/// does not retry a worker that already failed to report a total.
pub async fn discover_size(
    client: &Client,
    pool: &WorkerPool,
    cancel: &CancellationToken,
) -> Result<u64, TransferError> {
    // Releases rejoin the FIFO tail, so `capacity` acquisitions visit each
    // worker exactly once.
    for _ in 0..pool.capacity() {
        let worker = tokio::select! {
            _ = cancel.cancelled() => return Err(TransferError::Canceled),
            w = pool.acquire() => w,
        };

        let res = range_total(client, &worker).await;
        if let Err(e) = pool.release(worker) {
            warn!(error = %e, "worker release failed during size discovery");
        }

        match res {
            Ok(total) => return Ok(total),
            Err(e) => warn!(error = %e, "size discovery attempt failed"),
        }
    }

    Err(TransferError::SizeDiscovery(
        "no endpoint reported a parseable Content-Range total".to_string(),
    ))
}

/// One size-discovery request against one worker.
async fn range_total(client: &Client, worker: &Worker) -> Result<u64, TransferError> {
    let resp = client
        .get(worker.url.clone())
        .header(RANGE, "bytes=0-1")
        .send()
        .await
        .map_err(|e| TransferError::SizeDiscovery(e.to_string()))?;

    let header = resp
        .headers()
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            TransferError::SizeDiscovery(format!(
                "{}: no Content-Range header (status {})",
                worker.url,
                resp.status()
            ))
        })?;

    parse_content_range_total(header).ok_or_else(|| {
        TransferError::SizeDiscovery(format!("{}: invalid Content-Range: {}", worker.url, header))
    })
}

/// Extract the total from a `Content-Range: bytes <a>-<b>/<total>` value.
/// Returns `None` for a malformed header or an unknown (`*`) total.
pub fn parse_content_range_total(value: &str) -> Option<u64> {
    let (_, total) = value.split_once('/')?;
    total.trim().parse::<u64>().ok()
}
