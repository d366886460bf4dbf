// src/core/http/context.rs

//! Per-request state: raw request parts, the response writer, the per-site
//! configuration, and the variable mapping that accumulates `cache.*`
//! values for logging and key templates.

use super::writer::ResponseWriter;
use crate::config::{CachePolicy, CacheRef, RequestCondGroup, WebConfig};
use crate::core::caches::StorageManager;
use crate::core::tasks::CrossNodePurger;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use std::collections::HashMap;
use std::sync::Arc;

/// The raw request surface the pipeline consumes.
#[derive(Debug, Clone)]
pub struct RequestParts {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub remote_addr: String,
    pub host: String,
    pub scheme: String,
}

/// Per-request context, created on ingress and destroyed on completion.
pub struct RequestContext<W: ResponseWriter> {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub remote_addr: String,
    pub host: String,
    pub scheme: String,

    pub writer: W,

    pub web: Arc<WebConfig>,
    pub policy: Option<Arc<CachePolicy>>,
    pub storages: Arc<StorageManager>,
    pub purger: Option<Arc<CrossNodePurger>>,

    pub var_mapping: HashMap<String, String>,
    pub log_attrs: HashMap<String, String>,

    pub(crate) cache_ref: Option<Arc<CacheRef>>,
    pub cache_key: Option<String>,
    pub cache_can_try_stale: bool,
    pub is_cached: bool,
}

impl<W: ResponseWriter> RequestContext<W> {
    pub fn new(
        parts: RequestParts,
        writer: W,
        web: Arc<WebConfig>,
        policy: Option<Arc<CachePolicy>>,
        storages: Arc<StorageManager>,
    ) -> Self {
        let request_uri = parts
            .uri
            .path_and_query()
            .map(|pq| pq.to_string())
            .unwrap_or_else(|| parts.uri.path().to_string());
        let mut var_mapping = HashMap::new();
        var_mapping.insert("cache.status".to_string(), "BYPASS".to_string());
        var_mapping.insert("scheme".to_string(), parts.scheme.clone());
        var_mapping.insert("host".to_string(), parts.host.clone());
        var_mapping.insert("requestURI".to_string(), request_uri);
        var_mapping.insert("requestPath".to_string(), parts.uri.path().to_string());
        var_mapping.insert("requestMethod".to_string(), parts.method.to_string());
        var_mapping.insert("remoteAddr".to_string(), parts.remote_addr.clone());

        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            remote_addr: parts.remote_addr,
            host: parts.host,
            scheme: parts.scheme,
            writer,
            web,
            policy,
            storages,
            purger: None,
            var_mapping,
            log_attrs: HashMap::new(),
            cache_ref: None,
            cache_key: None,
            cache_can_try_stale: false,
            is_cached: false,
        }
    }

    pub fn with_purger(mut self, purger: Arc<CrossNodePurger>) -> Self {
        self.purger = Some(purger);
        self
    }

    /// Interpolates `${var}` references from the variable mapping. Unknown
    /// variables resolve to the empty string.
    pub fn format(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            match rest[start + 2..].find('}') {
                Some(end) => {
                    let name = &rest[start + 2..start + 2 + end];
                    if let Some(value) = self.var_mapping.get(name) {
                        out.push_str(value);
                    }
                    rest = &rest[start + 2 + end + 1..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }

    /// A request header value as a string; missing or non-UTF-8 values read
    /// as empty.
    pub fn request_header(&self, name: &str) -> &str {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// The full request URL, for condition matching and log lines.
    pub fn url(&self) -> String {
        let request_uri = self
            .var_mapping
            .get("requestURI")
            .cloned()
            .unwrap_or_default();
        format!("{}://{}{}", self.scheme, self.host, request_uri)
    }

    pub(crate) fn match_cond_group(&self, group: &RequestCondGroup) -> bool {
        group.match_request(&self.url(), self.path(), &self.headers)
    }

    /// Applies the site's response-header policy before a status is
    /// committed.
    pub fn process_response_headers(&mut self, _status: StatusCode) {
        let Some(policy) = self.web.response_headers.clone() else {
            return;
        };
        let headers = self.writer.headers_mut();
        for pair in &policy.set {
            if let (Ok(name), Ok(value)) = (
                HeaderName::try_from(pair.name.as_str()),
                HeaderValue::from_str(&pair.value),
            ) {
                headers.insert(name, value);
            }
        }
        for name in &policy.delete {
            if let Ok(name) = HeaderName::try_from(name.as_str()) {
                headers.remove(name);
            }
        }
    }
}
