// src/core/http/writer.rs

//! The response-writer contract the cache-read pipeline emits into. The
//! production implementation sits on the connection; the buffered one here
//! backs internal requests and tests.

use async_trait::async_trait;
use http::{HeaderMap, StatusCode};

/// Where a response is written. Headers are buffered until `write_head`;
/// body bytes stream through `write_body`.
#[async_trait]
pub trait ResponseWriter: Send {
    fn headers(&self) -> &HeaderMap;

    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Commits the status line and headers. Later calls are ignored.
    fn write_head(&mut self, status: StatusCode);

    /// Writes one chunk of body bytes.
    async fn write_body(&mut self, chunk: &[u8]) -> std::io::Result<()>;

    /// The committed status, if any.
    fn status(&self) -> Option<StatusCode>;

    /// Body bytes successfully written so far.
    fn sent_body_bytes(&self) -> u64;

    /// Header-blob size accounted against the response, for access logs.
    fn set_sent_header_bytes(&mut self, _n: u64) {}
}

/// A writer that collects the response in memory.
#[derive(Debug, Default)]
pub struct BufferedResponseWriter {
    headers: HeaderMap,
    status: Option<StatusCode>,
    body: Vec<u8>,
    sent_header_bytes: u64,
}

impl BufferedResponseWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn sent_header_bytes(&self) -> u64 {
        self.sent_header_bytes
    }
}

#[async_trait]
impl ResponseWriter for BufferedResponseWriter {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_head(&mut self, status: StatusCode) {
        if self.status.is_none() {
            self.status = Some(status);
        }
    }

    async fn write_body(&mut self, chunk: &[u8]) -> std::io::Result<()> {
        self.body.extend_from_slice(chunk);
        Ok(())
    }

    fn status(&self) -> Option<StatusCode> {
        self.status
    }

    fn sent_body_bytes(&self) -> u64 {
        self.body.len() as u64
    }

    fn set_sent_header_bytes(&mut self, n: u64) {
        self.sent_header_bytes = n;
    }
}
