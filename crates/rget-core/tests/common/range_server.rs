//! Minimal HTTP/1.1 server with HEAD and Range GET support for integration
//! tests, plus failure injection: probe rejection, short range bodies,
//! missing Content-Range, and per-request delays.
//!
//! Serves a single static body. Every response carries `Connection: close`
//! so the client never tries to reuse a half-closed socket.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RangeServerOptions {
    /// If false, HEAD returns 405 (alive, but HEAD-averse).
    pub head_allowed: bool,
    /// If true, HEAD returns 500 so the liveness probe rejects this endpoint.
    pub probe_fail: bool,
    /// If true, GET responses omit Content-Range (breaks size discovery).
    pub omit_content_range: bool,
    /// The first N range GETs serve only half the requested bytes while
    /// still claiming the full range in Content-Range.
    pub short_responses: usize,
    /// Sleep before answering each GET.
    pub response_delay_ms: u64,
}

impl Default for RangeServerOptions {
    fn default() -> Self {
        Self {
            head_allowed: true,
            probe_fail: false,
            omit_content_range: false,
            short_responses: 0,
            response_delay_ms: 0,
        }
    }
}

/// A running test server.
pub struct RangeServer {
    /// Base URL, e.g. "http://127.0.0.1:12345/".
    pub url: String,
    /// Count of GET requests handled (range and full alike).
    pub get_requests: Arc<AtomicUsize>,
}

/// Starts a server in a background thread serving `body` with default
/// options. The server runs until the process exits.
pub fn start(body: Vec<u8>) -> RangeServer {
    start_with_options(body, RangeServerOptions::default())
}

/// Like `start` but with failure injection.
pub fn start_with_options(body: Vec<u8>, opts: RangeServerOptions) -> RangeServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    let get_requests = Arc::new(AtomicUsize::new(0));
    let short_budget = Arc::new(AtomicUsize::new(opts.short_responses));

    let gets = Arc::clone(&get_requests);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let body = Arc::clone(&body);
            let gets = Arc::clone(&gets);
            let budget = Arc::clone(&short_budget);
            thread::spawn(move || handle(stream, &body, opts, &gets, &budget));
        }
    });

    RangeServer {
        url: format!("http://127.0.0.1:{}/", port),
        get_requests,
    }
}

fn handle(
    mut stream: std::net::TcpStream,
    body: &[u8],
    opts: RangeServerOptions,
    gets: &AtomicUsize,
    short_budget: &AtomicUsize,
) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) => return,
        Ok(n) => n,
        Err(_) => return,
    };
    let request = match std::str::from_utf8(&buf[..n]) {
        Ok(s) => s,
        Err(_) => return,
    };
    let (method, range) = parse_request(request);
    let total = body.len() as u64;

    if method.eq_ignore_ascii_case("HEAD") {
        if opts.probe_fail {
            let _ = stream.write_all(
                b"HTTP/1.1 500 Internal Server Error\r\nConnection: close\r\n\r\n",
            );
            return;
        }
        if !opts.head_allowed {
            let _ = stream.write_all(
                b"HTTP/1.1 405 Method Not Allowed\r\nConnection: close\r\n\r\n",
            );
            return;
        }
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nAccept-Ranges: bytes\r\nConnection: close\r\n\r\n",
            total
        );
        let _ = stream.write_all(response.as_bytes());
        return;
    }

    if method.eq_ignore_ascii_case("GET") {
        gets.fetch_add(1, Ordering::SeqCst);
        if opts.response_delay_ms > 0 {
            thread::sleep(Duration::from_millis(opts.response_delay_ms));
        }

        let (status, range_header, mut slice) = match range {
            Some((start, end_incl)) => {
                let start = start.min(total);
                let end_incl = end_incl.min(total.saturating_sub(1));
                if start > end_incl {
                    (
                        "416 Range Not Satisfiable",
                        format!("bytes */{}", total),
                        &body[0..0],
                    )
                } else {
                    let start = start as usize;
                    let end_excl = (end_incl + 1).min(total) as usize;
                    (
                        "206 Partial Content",
                        format!("bytes {}-{}/{}", start, end_excl.saturating_sub(1), total),
                        &body[start..end_excl],
                    )
                }
            }
            None => (
                "200 OK",
                format!("bytes 0-{}/{}", total.saturating_sub(1), total),
                body,
            ),
        };

        // Undersized body: claim the full range, deliver half of it.
        if range.is_some()
            && slice.len() > 1
            && short_budget
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1))
                .is_ok()
        {
            slice = &slice[..slice.len() / 2];
        }

        let content_range = if opts.omit_content_range {
            String::new()
        } else {
            format!("Content-Range: {}\r\n", range_header)
        };
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n",
            status,
            slice.len(),
            content_range
        );
        let _ = stream.write_all(response.as_bytes());
        let _ = stream.write_all(slice);
        return;
    }

    let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nConnection: close\r\n\r\n");
}

/// Returns (method, optional (start, end_inclusive) for Range: bytes=X-Y).
fn parse_request(request: &str) -> (&str, Option<(u64, u64)>) {
    let mut method = "";
    let mut range = None;
    for line in request.lines() {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if method.is_empty() {
            method = line.split_whitespace().next().unwrap_or("");
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("range") {
                let value = value.trim();
                if let Some(part) = value.to_lowercase().strip_prefix("bytes=") {
                    if let Some((a, b)) = part.trim().split_once('-') {
                        let start = a.trim().parse::<u64>().unwrap_or(0);
                        let end = b.trim();
                        let end_incl = if end.is_empty() {
                            u64::MAX
                        } else {
                            end.parse::<u64>().unwrap_or(0)
                        };
                        range = Some((start, end_incl));
                    }
                }
            }
        }
    }
    (method, range)
}
