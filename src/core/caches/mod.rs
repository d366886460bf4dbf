// src/core/caches/mod.rs

//! Contracts consumed by the cache-read pipeline: the storage engine, its
//! streaming readers, and the key-suffix namespace shared with the write
//! path.
//!
//! The suffix family namespaces stored variants of one logical resource:
//! `|method|<METHOD>` for non-GET responses, `|webp` for the image variant,
//! `|compress|<encoding>` (always last) for compressed variants, and
//! `|partial` for range-only entries. `partial` never combines with
//! compression suffixes.

mod manager;
mod memory;

pub use manager::StorageManager;
pub use memory::{MemoryEntry, MemoryStorage, PartialEntry};

use crate::core::compressions;
use crate::core::errors::EdgeError;
use crate::core::utils::ranges::ByteRange;
use async_trait::async_trait;

pub const SUFFIX_METHOD: &str = "|method|";
pub const SUFFIX_WEBP: &str = "|webp";
pub const SUFFIX_PARTIAL: &str = "|partial";
pub const SUFFIX_COMPRESSION: &str = "|compress|";

/// The sibling keys a purge of `key` sweeps: the base entry, the HEAD
/// variant, the WebP variant, the partial cache, and every compressed
/// variant of the base and WebP entries.
pub fn purge_sibling_keys(key: &str) -> Vec<String> {
    let mut keys = vec![
        key.to_string(),
        format!("{key}{SUFFIX_METHOD}HEAD"),
        format!("{key}{SUFFIX_WEBP}"),
        format!("{key}{SUFFIX_PARTIAL}"),
    ];
    for encoding in compressions::all_encodings() {
        keys.push(format!("{key}{SUFFIX_COMPRESSION}{encoding}"));
        keys.push(format!("{key}{SUFFIX_WEBP}{SUFFIX_COMPRESSION}{encoding}"));
    }
    keys
}

/// Receives body or header chunks from a [`Reader`]. Returning `Ok(false)`
/// stops the read without error; returning an error aborts it.
#[async_trait]
pub trait ChunkSink: Send {
    async fn on_chunk(&mut self, chunk: &[u8]) -> Result<bool, EdgeError>;
}

/// A scoped handle over one stored cache entry.
#[async_trait]
pub trait Reader: Send {
    /// Size in bytes of the stored header blob.
    fn header_size(&self) -> u64;

    /// Size in bytes of the stored body. Partial caches report their known
    /// full length here, or 0 when the full length is unknown.
    fn body_size(&self) -> u64;

    /// Unix seconds of the entry's last modification.
    fn last_modified(&self) -> i64;

    /// Unix seconds at which the entry expires.
    fn expires_at(&self) -> i64;

    /// The stored HTTP status code.
    fn status(&self) -> u16;

    /// Storage backend label surfaced in `X-Cache`, e.g. "memory" or "file".
    fn type_name(&self) -> &'static str;

    /// Range bookkeeping for partial caches; `None` for whole entries.
    fn partial(&self) -> Option<&dyn PartialRanges> {
        None
    }

    /// Streams the stored header blob through `sink` using `buf` as the
    /// chunking buffer.
    async fn read_header(
        &mut self,
        buf: &mut [u8],
        sink: &mut dyn ChunkSink,
    ) -> Result<(), EdgeError>;

    /// Streams body bytes of the half-open range `[start, end)` through
    /// `sink`.
    async fn read_body_range(
        &mut self,
        buf: &mut [u8],
        start: u64,
        end: u64,
        sink: &mut dyn ChunkSink,
    ) -> Result<(), EdgeError>;
}

/// Extra surface exposed by readers over partial caches.
pub trait PartialRanges {
    /// The largest byte offset known to be covered.
    fn max_length(&self) -> u64;

    /// Clips `r` to a stored range, or `None` when the cache does not hold
    /// all of `r`.
    fn contains_range(&self, r: ByteRange) -> Option<ByteRange>;
}

/// The storage engine contract consumed by the read path. Write-path and
/// eviction concerns live with the engine.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Opens a reader for `key`. `use_stale` permits returning an expired
    /// entry; `allow_partial` permits returning a partial-cache reader.
    /// Returns [`EdgeError::CacheNotFound`] when no usable entry exists.
    async fn open_reader(
        &self,
        key: &str,
        use_stale: bool,
        allow_partial: bool,
    ) -> Result<Box<dyn Reader>, EdgeError>;

    /// Deletes the entry under `key`. Deleting a missing key is not an
    /// error.
    async fn delete(&self, key: &str) -> Result<(), EdgeError>;
}
