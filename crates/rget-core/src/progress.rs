//! Reader adapter reporting transfer progress as data is consumed.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};

/// Wraps an `AsyncRead` and invokes a callback with the byte count of each
/// successful read. Lets a consumer track how far a streaming transfer has
/// advanced without owning the read loop.
pub struct ProgressReader<R, F> {
    inner: R,
    report: F,
}

impl<R, F> ProgressReader<R, F>
where
    R: AsyncRead + Unpin,
    F: FnMut(u64) + Unpin,
{
    pub fn new(inner: R, report: F) -> Self {
        Self { inner, report }
    }

    /// Consume the adapter, returning the underlying reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R, F> AsyncRead for ProgressReader<R, F>
where
    R: AsyncRead + Unpin,
    F: FnMut(u64) + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let n = buf.filled().len() - before;
                if n > 0 {
                    (this.report)(n as u64);
                }
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}
