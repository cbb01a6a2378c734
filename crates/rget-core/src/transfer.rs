//! Transfer entry point: probe candidates, discover the size, start the
//! dispatcher, and hand the caller a streaming reader immediately.

use std::io;

use reqwest::Client;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::info;
use url::Url;

use crate::config::FetchConfig;
use crate::dispatcher::Dispatcher;
use crate::error::TransferError;
use crate::probe;
use crate::sink::{self, ByteStream};

/// Fetch one object from a set of candidate endpoints.
///
/// Returns a sequential reader over the object's bytes as soon as the
/// endpoint pool and total size are known; the range fetches proceed in the
/// background and the reader streams bytes as they are reassembled. The
/// reader surfaces a terminal error if the transfer is canceled or gives up.
pub async fn get_file(
    endpoints: &[Url],
    cfg: &FetchConfig,
    cancel: CancellationToken,
) -> Result<ByteStream, TransferError> {
    if endpoints.is_empty() {
        return Err(TransferError::NoWorkersAvailable);
    }

    let client = build_client(cfg)?;
    let pool = probe::probe_endpoints(&client, endpoints, cfg.probe_timeout()).await?;
    let file_size = probe::discover_size(&client, &pool, &cancel).await?;
    info!(
        file_size,
        workers = pool.capacity(),
        candidates = endpoints.len(),
        "starting ranged transfer"
    );

    let (writer, stream) = sink::pipe(file_size);
    let dispatcher = Dispatcher::new(
        file_size,
        cfg.range_size,
        pool,
        client,
        cfg.backoff(),
        cfg.max_attempts,
        writer,
    );
    tokio::spawn(dispatcher.run(cancel));

    Ok(stream)
}

/// Convenience: run a transfer to completion and collect the whole object.
pub async fn fetch_to_vec(
    endpoints: &[Url],
    cfg: &FetchConfig,
    cancel: CancellationToken,
) -> io::Result<Vec<u8>> {
    let mut stream = get_file(endpoints, cfg, cancel)
        .await
        .map_err(TransferError::into_io)?;
    let mut out = Vec::with_capacity(stream.total_size() as usize);
    stream.read_to_end(&mut out).await?;
    Ok(out)
}

/// HTTP client shared by the probe and every range fetch of one transfer.
pub fn build_client(cfg: &FetchConfig) -> Result<Client, TransferError> {
    Client::builder()
        .timeout(cfg.request_timeout())
        .danger_accept_invalid_certs(cfg.accept_invalid_certs)
        .build()
        .map_err(|e| TransferError::Client(e.to_string()))
}
