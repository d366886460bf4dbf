// src/core/caches/memory.rs

//! The in-memory storage backend. It holds whole entries and partial
//! (range-only) entries, and is also the reference implementation the
//! pipeline tests run against.

use super::{ChunkSink, PartialRanges, Reader, Storage};
use crate::core::errors::EdgeError;
use crate::core::utils::ranges::ByteRange;
use crate::core::utils::time::unix_time;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;

/// A whole cached response: header blob (one `name:value\n` line per
/// header) plus the full body.
#[derive(Debug, Clone)]
pub struct MemoryEntry {
    pub header: Bytes,
    pub body: Bytes,
    pub status: u16,
    pub last_modified: i64,
    pub expires_at: i64,
}

/// A partial cached response. `data` is a sparse full-length buffer; only
/// the `covered` ranges hold valid bytes. `total_size` is 0 while the full
/// length is still unknown.
#[derive(Debug, Clone)]
pub struct PartialEntry {
    pub header: Bytes,
    pub data: Bytes,
    pub covered: Vec<ByteRange>,
    pub total_size: u64,
    pub status: u16,
    pub last_modified: i64,
    pub expires_at: i64,
}

#[derive(Clone)]
enum StoredEntry {
    Whole(Arc<MemoryEntry>),
    Partial(Arc<PartialEntry>),
}

#[derive(Default)]
pub struct MemoryStorage {
    entries: DashMap<String, StoredEntry>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_whole(&self, key: impl Into<String>, entry: MemoryEntry) {
        self.entries
            .insert(key.into(), StoredEntry::Whole(Arc::new(entry)));
    }

    pub fn put_partial(&self, key: impl Into<String>, entry: PartialEntry) {
        self.entries
            .insert(key.into(), StoredEntry::Partial(Arc::new(entry)));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn open_reader(
        &self,
        key: &str,
        use_stale: bool,
        allow_partial: bool,
    ) -> Result<Box<dyn Reader>, EdgeError> {
        let entry = self
            .entries
            .get(key)
            .map(|e| e.value().clone())
            .ok_or(EdgeError::CacheNotFound)?;
        match entry {
            StoredEntry::Whole(whole) => {
                if !use_stale && whole.expires_at > 0 && whole.expires_at <= unix_time() {
                    return Err(EdgeError::CacheNotFound);
                }
                Ok(Box::new(MemoryReader { entry: whole }))
            }
            StoredEntry::Partial(partial) => {
                if !allow_partial {
                    return Err(EdgeError::CacheNotFound);
                }
                if !use_stale && partial.expires_at > 0 && partial.expires_at <= unix_time() {
                    return Err(EdgeError::CacheNotFound);
                }
                Ok(Box::new(PartialMemoryReader { entry: partial }))
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<(), EdgeError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Streams `data` through `sink` in `buf`-sized chunks.
async fn stream_chunks(
    data: &[u8],
    buf: &mut [u8],
    sink: &mut dyn ChunkSink,
) -> Result<(), EdgeError> {
    if buf.is_empty() {
        return Err(EdgeError::Internal("empty chunk buffer".into()));
    }
    for chunk in data.chunks(buf.len()) {
        let n = chunk.len();
        buf[..n].copy_from_slice(chunk);
        if !sink.on_chunk(&buf[..n]).await? {
            return Ok(());
        }
    }
    Ok(())
}

struct MemoryReader {
    entry: Arc<MemoryEntry>,
}

#[async_trait]
impl Reader for MemoryReader {
    fn header_size(&self) -> u64 {
        self.entry.header.len() as u64
    }

    fn body_size(&self) -> u64 {
        self.entry.body.len() as u64
    }

    fn last_modified(&self) -> i64 {
        self.entry.last_modified
    }

    fn expires_at(&self) -> i64 {
        self.entry.expires_at
    }

    fn status(&self) -> u16 {
        self.entry.status
    }

    fn type_name(&self) -> &'static str {
        "memory"
    }

    async fn read_header(
        &mut self,
        buf: &mut [u8],
        sink: &mut dyn ChunkSink,
    ) -> Result<(), EdgeError> {
        let header = self.entry.header.clone();
        stream_chunks(&header, buf, sink).await
    }

    async fn read_body_range(
        &mut self,
        buf: &mut [u8],
        start: u64,
        end: u64,
        sink: &mut dyn ChunkSink,
    ) -> Result<(), EdgeError> {
        let body = self.entry.body.clone();
        if start > end || end > body.len() as u64 {
            return Err(EdgeError::InvalidRange);
        }
        stream_chunks(&body[start as usize..end as usize], buf, sink).await
    }
}

struct PartialMemoryReader {
    entry: Arc<PartialEntry>,
}

#[async_trait]
impl Reader for PartialMemoryReader {
    fn header_size(&self) -> u64 {
        self.entry.header.len() as u64
    }

    fn body_size(&self) -> u64 {
        self.entry.total_size
    }

    fn last_modified(&self) -> i64 {
        self.entry.last_modified
    }

    fn expires_at(&self) -> i64 {
        self.entry.expires_at
    }

    fn status(&self) -> u16 {
        self.entry.status
    }

    fn type_name(&self) -> &'static str {
        "memory"
    }

    fn partial(&self) -> Option<&dyn PartialRanges> {
        Some(self)
    }

    async fn read_header(
        &mut self,
        buf: &mut [u8],
        sink: &mut dyn ChunkSink,
    ) -> Result<(), EdgeError> {
        let header = self.entry.header.clone();
        stream_chunks(&header, buf, sink).await
    }

    async fn read_body_range(
        &mut self,
        buf: &mut [u8],
        start: u64,
        end: u64,
        sink: &mut dyn ChunkSink,
    ) -> Result<(), EdgeError> {
        if self.contains_range(ByteRange::new(start, end)).is_none() {
            return Err(EdgeError::InvalidRange);
        }
        let data = self.entry.data.clone();
        if end > data.len() as u64 {
            return Err(EdgeError::InvalidRange);
        }
        stream_chunks(&data[start as usize..end as usize], buf, sink).await
    }
}

impl PartialRanges for PartialMemoryReader {
    fn max_length(&self) -> u64 {
        self.entry.covered.iter().map(|r| r.end).max().unwrap_or(0)
    }

    fn contains_range(&self, r: ByteRange) -> Option<ByteRange> {
        self.entry
            .covered
            .iter()
            .find(|c| c.start <= r.start && r.end <= c.end)
            .map(|_| r)
    }
}
