//! Random-access sink with a sequential streaming reader.
//!
//! The fetch engine commits chunks out of order with `SinkWriter::write_at`;
//! `ByteStream` exposes them to the consumer as a strictly in-order byte
//! stream. A write at offset `o` becomes readable only once every byte
//! before `o` is readable. End-of-stream fires exactly when the declared
//! total has been read; an early writer shutdown or an explicit failure
//! surfaces an error to the reader instead of a silent truncation.

use std::collections::BTreeMap;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use bytes::Bytes;
use tokio::io::{AsyncRead, ReadBuf};

use crate::error::TransferError;

#[derive(Debug)]
struct Inner {
    /// Committed chunks keyed by absolute offset. Chunks never overlap;
    /// fully consumed ones are dropped to bound memory by read lag.
    chunks: BTreeMap<u64, Bytes>,
    /// Next byte the reader will observe.
    read_pos: u64,
    /// Declared object size.
    total: u64,
    /// Cumulative committed bytes; the stream is complete once this reaches
    /// `total`, after which `fail` becomes a no-op.
    committed: u64,
    /// Terminal error, shown to the reader once buffered progress runs out.
    error: Option<TransferError>,
    /// All writer handles dropped.
    writers: usize,
    /// Reader side dropped; writes become errors.
    reader_gone: bool,
    waker: Option<Waker>,
}

impl Inner {
    fn wake(&mut self) {
        if let Some(w) = self.waker.take() {
            w.wake();
        }
    }
}

/// Create a sink for an object of `total` bytes. Returns the writer handle
/// for the fetch engine and the streaming reader for the consumer.
pub fn pipe(total: u64) -> (SinkWriter, ByteStream) {
    let shared = Arc::new(Mutex::new(Inner {
        chunks: BTreeMap::new(),
        read_pos: 0,
        total,
        committed: 0,
        error: None,
        writers: 1,
        reader_gone: false,
        waker: None,
    }));
    (
        SinkWriter { shared: Arc::clone(&shared) },
        ByteStream { shared, total },
    )
}

/// Writer half: offset-addressed, clonable, usable from any task.
#[derive(Debug)]
pub struct SinkWriter {
    shared: Arc<Mutex<Inner>>,
}

impl SinkWriter {
    /// Commit `data` at absolute `offset`. Returns an error when the reader
    /// is gone or the sink already failed; the caller logs and drops the
    /// chunk (the destination, not the source, is at fault).
    pub fn write_at(&self, offset: u64, data: Bytes) -> io::Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let mut inner = self.shared.lock().unwrap();
        if inner.reader_gone {
            return Err(io::Error::other("sink reader dropped"));
        }
        if let Some(err) = &inner.error {
            return Err(err.clone().into_io());
        }
        let len = data.len() as u64;
        if offset + len > inner.total {
            return Err(io::Error::other(format!(
                "write past declared size: {}..{} > {}",
                offset,
                offset + len,
                inner.total
            )));
        }
        inner.chunks.insert(offset, data);
        inner.committed += len;
        inner.wake();
        Ok(())
    }

    /// Poison the stream: subsequent reads surface `err` once buffered
    /// in-order bytes run out. Ignored after every byte has been committed.
    pub fn fail(&self, err: TransferError) {
        let mut inner = self.shared.lock().unwrap();
        if inner.committed >= inner.total || inner.error.is_some() {
            return;
        }
        inner.error = Some(err);
        inner.wake();
    }
}

impl Clone for SinkWriter {
    fn clone(&self) -> Self {
        self.shared.lock().unwrap().writers += 1;
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl Drop for SinkWriter {
    fn drop(&mut self) {
        let mut inner = self.shared.lock().unwrap();
        inner.writers -= 1;
        if inner.writers == 0 {
            inner.wake();
        }
    }
}

/// Reader half: a sequential `AsyncRead` over the reassembled object,
/// usable before the transfer completes.
#[derive(Debug)]
pub struct ByteStream {
    shared: Arc<Mutex<Inner>>,
    total: u64,
}

impl ByteStream {
    /// Declared size of the object being streamed.
    pub fn total_size(&self) -> u64 {
        self.total
    }
}

impl AsyncRead for ByteStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut inner = self.shared.lock().unwrap();

        // Error wins over buffered data: a canceled transfer must terminate
        // the reader promptly, not after it drains what already arrived.
        if let Some(err) = &inner.error {
            return Poll::Ready(Err(err.clone().into_io()));
        }

        if inner.read_pos >= inner.total {
            return Poll::Ready(Ok(()));
        }

        // Serve from the chunk covering read_pos, if it has arrived.
        let read_pos = inner.read_pos;
        let mut served = None;
        if let Some((&off, data)) = inner.chunks.range(..=read_pos).next_back() {
            let chunk_end = off + data.len() as u64;
            if chunk_end > read_pos {
                let skip = (read_pos - off) as usize;
                let n = buf.remaining().min(data.len() - skip);
                buf.put_slice(&data[skip..skip + n]);
                served = Some((off, n as u64, read_pos + n as u64 >= chunk_end));
            }
        }
        if let Some((off, n, consumed)) = served {
            inner.read_pos += n;
            if consumed {
                inner.chunks.remove(&off);
            }
            return Poll::Ready(Ok(()));
        }

        if inner.writers == 0 {
            return Poll::Ready(Err(TransferError::ClosedEarly.into_io()));
        }

        inner.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl Drop for ByteStream {
    fn drop(&mut self) {
        self.shared.lock().unwrap().reader_gone = true;
    }
}
