//! The fetch engine: pulls jobs, pairs them with pool workers, runs HTTP
//! range GETs, requeues failures with backoff, and forwards completed
//! chunks to the sink.
//!
//! Per job the states are Pending -> InFlight -> Completed, or back to
//! Pending (requeued at the head) on failure. The transfer itself ends when
//! cumulative delivered bytes reach the file size, or on cancellation.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use reqwest::header::RANGE;
use reqwest::{Client, StatusCode};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backoff::Backoff;
use crate::error::{FetchError, TransferError};
use crate::pool::{Worker, WorkerPool};
use crate::queue::JobQueue;
use crate::range::{plan_jobs, Job};
use crate::sink::SinkWriter;

/// A completed chunk on its way to the sink. Offset is absolute in the file.
struct Chunk {
    offset: u64,
    data: Bytes,
}

/// What a fetch task reports back to the dispatch loop.
enum FetchEvent {
    /// Chunk fetched and handed to the writer; payload is the range length.
    Completed(u64),
    /// Fetch failed; the job went back to the queue head.
    Requeued,
    /// A job burned through the configured attempt cap.
    Exhausted { index: usize, attempts: u32 },
}

pub(crate) struct Dispatcher {
    file_size: u64,
    range_size: u64,
    todos: Arc<JobQueue>,
    pool: Arc<WorkerPool>,
    client: Client,
    backoff: Backoff,
    max_attempts: Option<u32>,
    writer: SinkWriter,
}

impl Dispatcher {
    pub(crate) fn new(
        file_size: u64,
        range_size: u64,
        pool: WorkerPool,
        client: Client,
        backoff: Backoff,
        max_attempts: Option<u32>,
        writer: SinkWriter,
    ) -> Self {
        Self {
            file_size,
            range_size: range_size.max(1),
            todos: Arc::new(JobQueue::new()),
            pool: Arc::new(pool),
            client,
            backoff,
            max_attempts,
            writer,
        }
    }

    /// Generate all range jobs and run the fetch loop until every byte is
    /// delivered or the transfer is canceled. Terminal failures are pushed
    /// into the sink for the reader to observe.
    pub(crate) async fn run(self, cancel: CancellationToken) {
        for job in plan_jobs(self.file_size, self.range_size) {
            self.todos.push(job);
        }
        info!(
            file_size = self.file_size,
            range_size = self.range_size,
            jobs = self.todos.len(),
            workers = self.pool.capacity(),
            "transfer started"
        );

        let cap = self.pool.capacity().max(1);
        // Bounded to the worker count: at most `cap` fetches are in flight,
        // each contributing one chunk, so sends cannot back up behind the
        // writer for long.
        let (chunk_tx, chunk_rx) = mpsc::channel::<Chunk>(cap);
        let (event_tx, mut event_rx) = mpsc::channel::<FetchEvent>(cap);
        let writer_task = tokio::spawn(write_chunks(
            self.writer.clone(),
            chunk_rx,
            self.file_size,
        ));

        // Child token so a terminal dispatch error also stops in-flight
        // fetches, not just caller-initiated cancellation.
        let fetch_cancel = cancel.child_token();

        let started = Instant::now();
        let mut bytes_done: u64 = 0;
        let result = loop {
            if bytes_done >= self.file_size {
                break Ok(());
            }
            tokio::select! {
                _ = cancel.cancelled() => break Err(TransferError::Canceled),
                Some(event) = event_rx.recv() => match event {
                    FetchEvent::Completed(n) => bytes_done += n,
                    FetchEvent::Requeued => {}
                    FetchEvent::Exhausted { index, attempts } => {
                        break Err(TransferError::RetriesExhausted { index, attempts })
                    }
                },
                worker = self.pool.acquire(), if !self.todos.is_empty() => {
                    match self.todos.pop() {
                        Some(job) => self.spawn_fetch(
                            job,
                            worker,
                            chunk_tx.clone(),
                            event_tx.clone(),
                            fetch_cancel.clone(),
                        ),
                        // Only this loop pops, so the queue cannot have
                        // shrunk since the guard; hand the worker back anyway.
                        None => {
                            if let Err(e) = self.pool.release(worker) {
                                warn!(error = %e, "worker release failed");
                            }
                        }
                    }
                }
            }
        };

        match &result {
            Ok(()) => info!(
                bytes = bytes_done,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "transfer complete"
            ),
            Err(e) => {
                warn!(error = %e, bytes = bytes_done, "transfer aborted");
                fetch_cancel.cancel();
                self.writer.fail(e.clone());
            }
        }

        // Let the writer drain chunks that already arrived; it exits once
        // every sender is gone or the final byte is committed.
        drop(chunk_tx);
        let _ = writer_task.await;
    }

    fn spawn_fetch(
        &self,
        job: Job,
        worker: Worker,
        chunk_tx: mpsc::Sender<Chunk>,
        event_tx: mpsc::Sender<FetchEvent>,
        cancel: CancellationToken,
    ) {
        let client = self.client.clone();
        let todos = Arc::clone(&self.todos);
        let pool = Arc::clone(&self.pool);
        let backoff = self.backoff;
        let max_attempts = self.max_attempts;

        tokio::spawn(async move {
            let fetched = tokio::select! {
                _ = cancel.cancelled() => None,
                res = fetch_range(&client, &worker, &job) => Some(res),
            };
            let Some(res) = fetched else {
                release(&pool, worker);
                return;
            };

            match res {
                Ok(data) => {
                    release(&pool, worker);
                    let len = data.len() as u64;
                    let offset = job.start;
                    if chunk_tx.send(Chunk { offset, data }).await.is_err() {
                        warn!(index = job.index, "writer gone; chunk dropped");
                    }
                    let _ = event_tx.send(FetchEvent::Completed(len)).await;
                }
                Err(e) => {
                    let mut job = job;
                    warn!(
                        index = job.index,
                        retries = job.retry,
                        endpoint = %worker.url,
                        error = %e,
                        "range fetch failed"
                    );
                    // No delay on a job's first failure; afterwards back off
                    // while still holding the worker, which naturally slows
                    // a misbehaving endpoint down.
                    if job.retry > 0 {
                        let delay = backoff.next(job.retry as i32);
                        tokio::select! {
                            _ = cancel.cancelled() => {
                                release(&pool, worker);
                                return;
                            }
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                    job.retry += 1;

                    if let Some(cap) = max_attempts {
                        if job.retry >= cap {
                            error!(index = job.index, attempts = job.retry, "retry budget exhausted");
                            release(&pool, worker);
                            let _ = event_tx
                                .send(FetchEvent::Exhausted { index: job.index, attempts: job.retry })
                                .await;
                            return;
                        }
                    }

                    // Retried jobs jump the line so a stuck range cannot
                    // starve behind untouched ones.
                    todos.push_front(job);
                    release(&pool, worker);
                    let _ = event_tx.send(FetchEvent::Requeued).await;
                }
            }
        });
    }
}

/// Failed fetches never evict the worker: endpoint failures are assumed
/// transient (congestion, timeout), so it always goes back in the pool.
fn release(pool: &WorkerPool, worker: Worker) {
    if let Err(e) = pool.release(worker) {
        warn!(error = %e, "worker release failed");
    }
}

/// One HTTP range GET against one worker.
///
/// Success requires a 200 or 206 and a body covering the requested range;
/// an undersized body is a failure, not a partial success. Oversized bodies
/// are sliced down: a 206 to the range length, a 200 (server ignored the
/// Range header and sent the whole object) at the job's absolute offsets.
async fn fetch_range(client: &Client, worker: &Worker, job: &Job) -> Result<Bytes, FetchError> {
    let started = Instant::now();

    let resp = client
        .get(worker.url.clone())
        .header(RANGE, job.range_header_value())
        .send()
        .await
        .map_err(FetchError::Request)?;

    let status = resp.status();
    if status != StatusCode::OK && status != StatusCode::PARTIAL_CONTENT {
        return Err(FetchError::Http(status.as_u16()));
    }

    let body = resp.bytes().await.map_err(FetchError::Request)?;

    let data = if status == StatusCode::OK && job.start > 0 {
        if (body.len() as u64) < job.end {
            return Err(FetchError::ShortBody {
                expected: job.end,
                received: body.len() as u64,
            });
        }
        body.slice(job.start as usize..job.end as usize)
    } else {
        if (body.len() as u64) < job.len() {
            return Err(FetchError::ShortBody {
                expected: job.len(),
                received: body.len() as u64,
            });
        }
        body.slice(0..job.len() as usize)
    };

    debug!(
        index = job.index,
        offset = job.start,
        len = data.len(),
        endpoint = %worker.url,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "chunk fetched"
    );
    Ok(data)
}

/// Drains fetched chunks into the sink. A failed write is logged and the
/// chunk dropped: the destination, not the source, is at fault, so there is
/// nothing useful to retry.
async fn write_chunks(writer: SinkWriter, mut rx: mpsc::Receiver<Chunk>, file_size: u64) {
    let mut written: u64 = 0;
    while let Some(Chunk { offset, data }) = rx.recv().await {
        let len = data.len() as u64;
        if let Err(e) = writer.write_at(offset, data) {
            warn!(offset, error = %e, "sink write failed; chunk dropped");
            continue;
        }
        written += len;
        if written >= file_size {
            return;
        }
    }
}
