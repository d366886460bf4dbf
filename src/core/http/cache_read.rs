// src/core/http/cache_read.rs

//! The cache-read decision pipeline: given an in-flight request, decide
//! whether a stored response can satisfy it, pick the best stored variant,
//! and emit a conformant response honoring conditional and range semantics.
//!
//! The pipeline is linear with explicit early exits. Its return value
//! answers one question for the outer handler: has the response been taken
//! over (stop further processing)?

use super::context::RequestContext;
use super::writer::ResponseWriter;
use crate::config::{CachePolicy, CacheRef, WebCacheConfig};
use crate::core::caches::{
    ChunkSink, Reader, SUFFIX_COMPRESSION, SUFFIX_METHOD, SUFFIX_PARTIAL, SUFFIX_WEBP, Storage,
    purge_sibling_keys,
};
use crate::core::errors::EdgeError;
use crate::core::metrics;
use crate::core::utils::bytepool::BufferPool;
use crate::core::utils::ranges::{ByteRange, parse_range_header};
use crate::core::utils::time::{format_gmt, unix_time};
use async_trait::async_trait;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

impl<W: ResponseWriter> RequestContext<W> {
    /// Attempts to serve the request from cache. Returns `true` when a
    /// response has been fully taken over (or is in progress) and the outer
    /// handler must stop; `false` lets the handler continue toward the
    /// origin. With `use_stale`, expired entries are acceptable; the outer
    /// handler runs that second pass when the origin is unreachable and
    /// [`RequestContext::cache_can_try_stale`] was set by the first pass.
    pub async fn read_cache(&mut self, use_stale: bool) -> bool {
        self.cache_can_try_stale = false;

        let Some(policy) = self.policy.clone() else {
            return false;
        };
        if !policy.is_on {
            return false;
        }
        let web = self.web.clone();
        let Some(web_cache) = web.cache.as_ref() else {
            return false;
        };
        if !web_cache.is_on {
            return false;
        }
        if policy.cache_refs.is_empty() && web_cache.cache_refs.is_empty() {
            return false;
        }

        // Internal preheat requests must never be answered from cache.
        if (self.remote_addr.starts_with("127.") || self.remote_addr.starts_with("[::1]"))
            && self.request_header("x-cache-action") == "preheat"
        {
            return false;
        }

        let stop = self.do_read_cache(&policy, web_cache, use_stale).await;

        // HIT and STALE annotate inline with the ref and storage type; every
        // other outcome surfaces as the bare status.
        if web_cache.add_status_header {
            let status = self
                .var_mapping
                .get("cache.status")
                .cloned()
                .unwrap_or_default();
            if status != "HIT"
                && status != "STALE"
                && let Ok(value) = HeaderValue::from_str(&status)
            {
                self.writer
                    .headers_mut()
                    .insert(HeaderName::from_static("x-cache"), value);
            }
        }

        stop
    }

    async fn do_read_cache(
        &mut self,
        policy: &Arc<CachePolicy>,
        web_cache: &WebCacheConfig,
        use_stale: bool,
    ) -> bool {
        let web = self.web.clone();

        // Per-site refs take precedence over the policy defaults.
        let mut ref_type = "server";
        let mut chosen: Option<Arc<CacheRef>> = None;
        for cache_ref in &web_cache.cache_refs {
            if !cache_ref.is_on {
                continue;
            }
            let Some(conds) = cache_ref.conds.as_ref() else {
                continue;
            };
            if !conds.has_request_conds() {
                continue;
            }
            if self.match_cond_group(conds) {
                if cache_ref.is_reverse {
                    return false;
                }
                chosen = Some(cache_ref.clone());
                break;
            }
        }
        if chosen.is_none() && !web_cache.disable_policy_refs {
            for cache_ref in &policy.cache_refs {
                if !cache_ref.is_on {
                    continue;
                }
                let Some(conds) = cache_ref.conds.as_ref() else {
                    continue;
                };
                if !conds.has_request_conds() {
                    continue;
                }
                if self.match_cond_group(conds) {
                    if cache_ref.is_reverse {
                        return false;
                    }
                    chosen = Some(cache_ref.clone());
                    ref_type = "policy";
                    break;
                }
            }
        }
        let Some(cache_ref) = chosen else {
            return false;
        };

        // Re-validate the ref against the full request.
        if !cache_ref.match_request(&self.method, &self.headers) {
            self.cache_ref = None;
            return false;
        }
        self.cache_ref = Some(cache_ref.clone());

        self.var_mapping
            .insert("cache.policy.name".to_string(), policy.name.clone());
        self.var_mapping
            .insert("cache.policy.id".to_string(), policy.id.to_string());
        self.var_mapping
            .insert("cache.policy.type".to_string(), policy.policy_type.clone());

        if cache_ref.enable_request_cache_pragma
            && (self.request_header("cache-control") == "no-cache"
                || self.request_header("pragma") == "no-cache")
        {
            self.cache_ref = None;
            return false;
        }

        let base_key = self.format(&cache_ref.key);
        if base_key.is_empty() {
            self.cache_ref = None;
            return false;
        }

        // Variant tags feed the ETag: method first, then webp, then encoding.
        let mut tags: Vec<String> = Vec::new();
        let mut key = base_key.clone();
        if self.method != Method::GET {
            key.push_str(SUFFIX_METHOD);
            key.push_str(self.method.as_str());
            tags.push(self.method.as_str().to_ascii_lowercase());
        }
        self.cache_key = Some(key.clone());
        self.var_mapping.insert("cache.key".to_string(), key.clone());

        let Some(storage) = self.storages.find_storage_with_policy(policy.id) else {
            self.cache_ref = None;
            return false;
        };

        if web_cache.purge_is_on
            && self.method.as_str().eq_ignore_ascii_case("PURGE")
            && self.request_header("x-edge-purge-key") == web_cache.purge_key
        {
            self.var_mapping
                .insert("cache.status".to_string(), "PURGE".to_string());
            metrics::CACHE_PURGES_TOTAL.inc();

            for sub_key in purge_sibling_keys(&base_key) {
                if let Err(e) = storage.delete(&sub_key).await {
                    error!("purge failed: {e}");
                }
            }

            // Peer nodes purge through the control plane, off the request
            // path.
            if let Some(purger) = &self.purger {
                purger.enqueue(self.host.clone(), base_key.clone());
            }

            return true;
        }

        let range_header = self.request_header("range").to_string();
        let is_partial_request = !range_header.is_empty();
        let is_head = self.method == Method::HEAD;

        let webp_enabled = !is_partial_request
            && !is_head
            && web.webp.as_ref().is_some_and(|rule| {
                rule.is_on
                    && rule.match_path(self.path())
                    && rule.match_accept(self.request_header("accept"))
            });

        let encoding = if !is_partial_request && !is_head {
            web.compression
                .as_ref()
                .filter(|c| c.is_on)
                .and_then(|c| c.match_accept_encoding(self.request_header("accept-encoding")))
        } else {
            None
        };

        // The variant funnel, most specific first. The first key that opens
        // wins; only the base key's failure is carried forward.
        let mut candidates: Vec<(String, Vec<String>)> = Vec::new();
        if let Some(enc) = &encoding {
            if webp_enabled {
                candidates.push((
                    format!("{key}{SUFFIX_WEBP}{SUFFIX_COMPRESSION}{enc}"),
                    vec!["webp".to_string(), enc.clone()],
                ));
            }
            candidates.push((format!("{key}{SUFFIX_COMPRESSION}{enc}"), vec![enc.clone()]));
        }
        if webp_enabled {
            candidates.push((format!("{key}{SUFFIX_WEBP}"), vec!["webp".to_string()]));
        }
        candidates.push((key.clone(), Vec::new()));

        let mut reader: Option<Box<dyn Reader>> = None;
        let mut open_err: Option<EdgeError> = None;
        let last = candidates.len() - 1;
        for (index, (candidate_key, candidate_tags)) in candidates.into_iter().enumerate() {
            match storage.open_reader(&candidate_key, use_stale, false).await {
                Ok(r) => {
                    tags.extend(candidate_tags);
                    reader = Some(r);
                    break;
                }
                Err(e) => {
                    if index == last {
                        open_err = Some(e);
                    }
                }
            }
        }

        // Fall back to a partial cache when the whole entry is absent.
        let mut partial_ranges: Vec<ByteRange> = Vec::new();
        let mut is_partial_cache = false;
        if reader.is_none()
            && cache_ref.allow_partial_content
            && let Some((partial_reader, ranges)) = self
                .try_partial_reader(storage.as_ref(), &key, use_stale, &range_header)
                .await
        {
            reader = Some(partial_reader);
            partial_ranges = ranges;
            is_partial_cache = true;
        }

        let mut reader = match reader {
            Some(r) => r,
            None => {
                match open_err.unwrap_or(EdgeError::CacheNotFound) {
                    EdgeError::CacheNotFound => {
                        self.var_mapping
                            .insert("cache.status".to_string(), "MISS".to_string());
                        metrics::CACHE_READ_MISSES_TOTAL.inc();
                        if !use_stale && web_cache.stale.as_ref().is_some_and(|s| s.is_on) {
                            self.cache_can_try_stale = true;
                        }
                    }
                    e => {
                        if !e.can_ignore() {
                            warn!(
                                "{}: read from cache failed: open cache failed: {e}",
                                self.url()
                            );
                        }
                    }
                }
                return false;
            }
        };

        let status_label = if use_stale { "STALE" } else { "HIT" };
        self.var_mapping
            .insert("cache.status".to_string(), status_label.to_string());
        self.log_attrs
            .insert("cache.status".to_string(), status_label.to_string());
        metrics::CACHE_READ_HITS_TOTAL
            .with_label_values(&[status_label])
            .inc();

        let mut file_size = reader.body_size();
        let mut total_size_string = file_size.to_string();
        if is_partial_cache {
            if let Some(partial) = reader.partial() {
                file_size = partial.max_length();
            }
            if total_size_string == "0" {
                total_size_string = "*".to_string();
            }
        }

        let pool = BufferPool::shared();
        let mut buf = pool.get(file_size as usize);

        // Replay the stored header blob onto the response.
        self.writer.set_sent_header_bytes(reader.header_size());
        let header_result = {
            let mut sink = HeaderLineSink::new(self.writer.headers_mut());
            reader.read_header(&mut buf, &mut sink).await
        };
        if let Err(e) = header_result {
            if !e.can_ignore() {
                warn!(
                    "{}: read from cache failed: read header failed: {e}",
                    self.url()
                );
            }
            return false;
        }

        let last_modified = reader.last_modified();
        let age = unix_time() - last_modified;
        self.var_mapping
            .insert("cache.age".to_string(), age.to_string());

        if web_cache.add_status_header {
            let value = format!("{status_label}, {ref_type}, {}", reader.type_name());
            if let Ok(value) = HeaderValue::from_str(&value) {
                self.writer
                    .headers_mut()
                    .insert(HeaderName::from_static("x-cache"), value);
            }
        } else {
            self.writer.headers_mut().remove("x-cache");
        }
        if web_cache.add_age_header
            && let Ok(value) = HeaderValue::from_str(&age.to_string())
        {
            self.writer.headers_mut().insert(header::AGE, value);
        }

        // Validators are always ours, never the origin's; an origin ETag or
        // Last-Modified would let the origin answer 304 to a body the cache
        // no longer holds. Partial caches carry neither.
        let mut etag = String::new();
        let mut modified_time = String::new();
        if last_modified > 0 {
            etag = if tags.is_empty() {
                format!("\"{last_modified}\"")
            } else {
                format!("\"{}_{}\"", last_modified, tags.join("_"))
            };
            self.writer.headers_mut().remove(header::ETAG);
            if !is_partial_cache && let Ok(value) = HeaderValue::from_str(&etag) {
                self.writer.headers_mut().insert(header::ETAG, value);
            }

            modified_time = format_gmt(last_modified);
            if !is_partial_cache && let Ok(value) = HeaderValue::from_str(&modified_time) {
                self.writer.headers_mut().insert(header::LAST_MODIFIED, value);
            }
        }

        // Conditional revalidation resolves before any body I/O.
        if !is_partial_cache && !etag.is_empty() && self.request_header("if-none-match") == etag {
            self.process_response_headers(StatusCode::NOT_MODIFIED);
            self.writer.write_head(StatusCode::NOT_MODIFIED);
            self.is_cached = true;
            self.cache_ref = None;
            return true;
        }
        if !is_partial_cache
            && !modified_time.is_empty()
            && self.request_header("if-modified-since") == modified_time
        {
            self.process_response_headers(StatusCode::NOT_MODIFIED);
            self.writer.write_head(StatusCode::NOT_MODIFIED);
            self.is_cached = true;
            self.cache_ref = None;
            return true;
        }

        let stored_status = StatusCode::from_u16(reader.status()).unwrap_or(StatusCode::OK);
        self.process_response_headers(stored_status);
        self.add_expires_header(&cache_ref, reader.expires_at());

        if self.method == Method::HEAD {
            self.writer.write_head(stored_status);
        } else {
            // Ranges are honored only if If-Range matches our validators.
            let if_range_values: Vec<String> = self
                .headers
                .get_all(header::IF_RANGE)
                .iter()
                .filter_map(|v| v.to_str().ok().map(str::to_string))
                .collect();
            let support_range = if if_range_values.is_empty() {
                true
            } else {
                let current_etag = if is_partial_cache { "" } else { etag.as_str() };
                let current_modified = if is_partial_cache {
                    ""
                } else {
                    modified_time.as_str()
                };
                if_range_values.iter().any(|v| {
                    (!current_etag.is_empty() && v == current_etag)
                        || (!current_modified.is_empty() && v == current_modified)
                })
            };

            let mut ranges = partial_ranges;
            if support_range && !range_header.is_empty() {
                if file_size == 0 {
                    return self.respond_range_not_satisfiable();
                }
                if ranges.is_empty() {
                    let Some(specs) = parse_range_header(&range_header) else {
                        return self.respond_range_not_satisfiable();
                    };
                    for spec in specs {
                        match spec.convert(file_size) {
                            Some(r) => ranges.push(r),
                            None => return self.respond_range_not_satisfiable(),
                        }
                    }
                }
            }

            if ranges.len() == 1 {
                let r = ranges[0];
                {
                    let headers = self.writer.headers_mut();
                    if let Ok(value) =
                        HeaderValue::from_str(&r.compose_content_range(&total_size_string))
                    {
                        headers.insert(header::CONTENT_RANGE, value);
                    }
                    if let Ok(value) = HeaderValue::from_str(itoa::Buffer::new().format(r.len())) {
                        headers.insert(header::CONTENT_LENGTH, value);
                    }
                }
                self.writer.write_head(StatusCode::PARTIAL_CONTENT);
                metrics::CACHE_RANGE_RESPONSES_TOTAL.inc();

                let result = {
                    let mut sink = ClientSink {
                        writer: &mut self.writer,
                    };
                    reader
                        .read_body_range(&mut buf, r.start, r.end, &mut sink)
                        .await
                };
                if let Err(e) = result {
                    self.var_mapping
                        .insert("cache.status".to_string(), "MISS".to_string());
                    if matches!(e, EdgeError::InvalidRange) {
                        return self.respond_range_not_satisfiable();
                    }
                    if !e.can_ignore() {
                        warn!("{}: read from cache failed: {e}", self.url());
                    }
                    return self.writer.sent_body_bytes() > 0;
                }
            } else if ranges.len() > 1 {
                let boundary = gen_boundary();
                // The inner media type must be captured before the multipart
                // type replaces it.
                let part_content_type = self
                    .writer
                    .headers()
                    .get(header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                {
                    let headers = self.writer.headers_mut();
                    if let Ok(value) = HeaderValue::from_str(&format!(
                        "multipart/byteranges; boundary={boundary}"
                    )) {
                        headers.insert(header::CONTENT_TYPE, value);
                    }
                    headers.remove(header::CONTENT_LENGTH);
                }
                self.writer.write_head(StatusCode::PARTIAL_CONTENT);
                metrics::CACHE_RANGE_RESPONSES_TOTAL.inc();

                for (index, r) in ranges.iter().enumerate() {
                    let mut part_head = String::new();
                    if index > 0 {
                        part_head.push_str("\r\n");
                    }
                    part_head.push_str("--");
                    part_head.push_str(&boundary);
                    part_head.push_str("\r\n");
                    part_head.push_str("Content-Range: ");
                    part_head.push_str(&r.compose_content_range(&total_size_string));
                    part_head.push_str("\r\n");
                    if part_content_type.is_empty() {
                        part_head.push_str("\r\n");
                    } else {
                        part_head.push_str("Content-Type: ");
                        part_head.push_str(&part_content_type);
                        part_head.push_str("\r\n\r\n");
                    }

                    // Client write failures are not logged; the peer is gone.
                    if self.writer.write_body(part_head.as_bytes()).await.is_err() {
                        return true;
                    }

                    let result = {
                        let mut sink = ClientSink {
                            writer: &mut self.writer,
                        };
                        reader
                            .read_body_range(&mut buf, r.start, r.end, &mut sink)
                            .await
                    };
                    if let Err(e) = result {
                        if !matches!(e, EdgeError::WritingToClient) && !e.can_ignore() {
                            warn!("{}: read from cache failed: {e}", self.url());
                        }
                        return true;
                    }
                }

                if self
                    .writer
                    .write_body(format!("\r\n--{boundary}--\r\n").as_bytes())
                    .await
                    .is_err()
                {
                    self.var_mapping
                        .insert("cache.status".to_string(), "MISS".to_string());
                    return true;
                }
            } else {
                {
                    let headers = self.writer.headers_mut();
                    if let Ok(value) = HeaderValue::from_str(itoa::Buffer::new().format(file_size))
                    {
                        headers.insert(header::CONTENT_LENGTH, value);
                    }
                }
                self.writer.write_head(stored_status);

                let body_size = reader.body_size();
                let result = {
                    let mut sink = ClientSink {
                        writer: &mut self.writer,
                    };
                    reader.read_body_range(&mut buf, 0, body_size, &mut sink).await
                };
                if let Err(e) = result {
                    // Downgrade for accurate accounting; the response was not
                    // served from cache after all.
                    self.var_mapping
                        .insert("cache.status".to_string(), "MISS".to_string());
                    if !e.can_ignore() {
                        warn!(
                            "{}: read from cache failed: read body failed: {e}",
                            self.url()
                        );
                    }
                    return self.writer.sent_body_bytes() > 0;
                }
            }
        }

        self.is_cached = true;
        self.cache_ref = None;

        true
    }

    /// Opens the partial cache for `key` and pre-clips the requested ranges
    /// to what it actually holds. Any gap disqualifies the partial cache.
    async fn try_partial_reader(
        &self,
        storage: &dyn Storage,
        key: &str,
        use_stale: bool,
        range_header: &str,
    ) -> Option<(Box<dyn Reader>, Vec<ByteRange>)> {
        if range_header.is_empty() {
            return None;
        }
        let specs = parse_range_header(range_header)?;

        let reader = storage
            .open_reader(&format!("{key}{SUFFIX_PARTIAL}"), use_stale, true)
            .await
            .ok()?;
        let ranges = {
            let partial = reader.partial()?;
            let max_length = partial.max_length();
            let mut out = Vec::with_capacity(specs.len());
            for spec in specs {
                let converted = spec.convert(max_length)?;
                out.push(partial.contains_range(converted)?);
            }
            out
        };
        Some((reader, ranges))
    }

    fn respond_range_not_satisfiable(&mut self) -> bool {
        self.process_response_headers(StatusCode::RANGE_NOT_SATISFIABLE);
        self.writer.write_head(StatusCode::RANGE_NOT_SATISFIABLE);
        true
    }

    fn add_expires_header(&mut self, cache_ref: &CacheRef, expires_at: i64) {
        let Some(expires) = cache_ref.expires_time.as_ref() else {
            return;
        };
        if !expires.is_on || !expires.is_prior {
            return;
        }
        if !expires.overwrite && self.writer.headers().contains_key(header::EXPIRES) {
            return;
        }
        if expires.auto_calculate {
            if let Ok(value) = HeaderValue::from_str(&format_gmt(expires_at)) {
                self.writer.headers_mut().insert(header::EXPIRES, value);
            }
        } else if let Some(duration) = expires.duration
            && duration > Duration::ZERO
            && let Ok(value) =
                HeaderValue::from_str(&format_gmt(unix_time() + duration.as_secs() as i64))
        {
            self.writer.headers_mut().insert(header::EXPIRES, value);
        }
    }
}

/// Splits the stored header blob into `name:value` lines and replays them
/// onto the response headers. A line without a colon fails the read. A
/// trailing fragment without a newline is ignored, matching the blob
/// writer's line-terminated format.
struct HeaderLineSink<'a> {
    headers: &'a mut HeaderMap,
    pending: Vec<u8>,
}

impl<'a> HeaderLineSink<'a> {
    fn new(headers: &'a mut HeaderMap) -> Self {
        Self {
            headers,
            pending: Vec::new(),
        }
    }

    fn push_line(&mut self, line: &[u8]) -> Result<(), EdgeError> {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let colon = line
            .iter()
            .position(|&b| b == b':')
            .filter(|&i| i > 0)
            .ok_or_else(|| invalid_header_line(line))?;
        let name =
            HeaderName::from_bytes(&line[..colon]).map_err(|_| invalid_header_line(line))?;
        let mut value = &line[colon + 1..];
        while value.first() == Some(&b' ') {
            value = &value[1..];
        }
        let value = HeaderValue::from_bytes(value).map_err(|_| invalid_header_line(line))?;
        self.headers.insert(name, value);
        Ok(())
    }
}

#[async_trait]
impl ChunkSink for HeaderLineSink<'_> {
    async fn on_chunk(&mut self, chunk: &[u8]) -> Result<bool, EdgeError> {
        self.pending.extend_from_slice(chunk);
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.push_line(&line[..line.len() - 1])?;
        }
        Ok(true)
    }
}

/// Streams body chunks to the client, collapsing write failures into
/// [`EdgeError::WritingToClient`] so callers can tell them apart from
/// storage failures.
struct ClientSink<'a, W: ResponseWriter> {
    writer: &'a mut W,
}

#[async_trait]
impl<W: ResponseWriter> ChunkSink for ClientSink<'_, W> {
    async fn on_chunk(&mut self, chunk: &[u8]) -> Result<bool, EdgeError> {
        self.writer
            .write_body(chunk)
            .await
            .map_err(|_| EdgeError::WritingToClient)?;
        Ok(true)
    }
}

fn invalid_header_line(line: &[u8]) -> EdgeError {
    EdgeError::InvalidHeaderLine(String::from_utf8_lossy(line).into_owned())
}

/// A fresh opaque multipart boundary per response.
fn gen_boundary() -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = SmallRng::from_entropy();
    (0..30)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}
