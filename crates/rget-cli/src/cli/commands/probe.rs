//! `rget probe <urls...>` – liveness-check candidate endpoints.

use anyhow::{bail, Result};
use rget_core::config::FetchConfig;
use rget_core::error::TransferError;
use rget_core::probe;
use rget_core::transfer;

use super::parse_endpoints;

pub async fn run_probe(cfg: &FetchConfig, urls: &[String]) -> Result<()> {
    let endpoints = parse_endpoints(urls)?;
    let client = transfer::build_client(cfg)?;

    let pool = match probe::probe_endpoints(&client, &endpoints, cfg.probe_timeout()).await {
        Ok(pool) => pool,
        Err(TransferError::NoWorkersAvailable) => {
            bail!("none of the {} candidate endpoints passed the probe", endpoints.len())
        }
        Err(e) => return Err(e.into()),
    };

    println!("{} of {} endpoints usable:", pool.capacity(), endpoints.len());
    for _ in 0..pool.capacity() {
        let worker = pool.acquire().await;
        println!("  {}", worker.url);
        // Not returned to the pool: it is discarded when this command ends.
    }
    Ok(())
}
