// src/config.rs

//! Configuration model for the cache-read path: cache policies and refs,
//! per-site web settings, and node identity. Loaded from TOML; the control
//! plane that produces these documents is out of scope here.

use crate::core::compressions;
use crate::core::utils::text;
use anyhow::{Context, Result};
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use wildmatch::WildMatch;

/// Node-level identity and tuning.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NodeConfig {
    /// Region id attached to uploaded bandwidth records.
    #[serde(default)]
    pub region_id: i64,

    /// Duplicate cross-node purge jobs within this window are coalesced.
    #[serde(with = "humantime_serde", default = "default_purge_coalesce_window")]
    pub purge_coalesce_window: Duration,

    /// Capacity of the cross-node purge queue.
    #[serde(default = "default_purge_queue_size")]
    pub purge_queue_size: usize,

    /// Number of cross-node purge workers.
    #[serde(default = "default_purge_workers")]
    pub purge_workers: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            region_id: 0,
            purge_coalesce_window: default_purge_coalesce_window(),
            purge_queue_size: default_purge_queue_size(),
            purge_workers: default_purge_workers(),
        }
    }
}

fn default_purge_coalesce_window() -> Duration {
    Duration::from_secs(5)
}
fn default_purge_queue_size() -> usize {
    1024
}
fn default_purge_workers() -> usize {
    2
}

/// A caching policy: identity plus default cache refs, supplied read-only
/// to the request path.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct CachePolicy {
    pub id: i64,
    pub name: String,
    /// Storage type tag, e.g. "memory" or "file".
    #[serde(rename = "type", default)]
    pub policy_type: String,
    #[serde(default = "default_true")]
    pub is_on: bool,
    #[serde(default)]
    pub cache_refs: Vec<Arc<CacheRef>>,
}

/// The rule binding a request to caching behavior.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct CacheRef {
    #[serde(default = "default_true")]
    pub is_on: bool,

    /// Request predicates; a ref without request conditions never matches.
    #[serde(default)]
    pub conds: Option<RequestCondGroup>,

    /// Matched requests are explicitly not cached.
    #[serde(default)]
    pub is_reverse: bool,

    /// Cache-key template with `${var}` interpolation.
    #[serde(default)]
    pub key: String,

    /// Methods the ref applies to; empty allows any.
    #[serde(default)]
    pub methods: Vec<String>,

    #[serde(default)]
    pub allow_partial_content: bool,

    /// Honor `Cache-Control: no-cache` / `Pragma: no-cache` on requests.
    #[serde(default)]
    pub enable_request_cache_pragma: bool,

    #[serde(default)]
    pub expires_time: Option<ExpiresTimeConfig>,
}

impl CacheRef {
    /// Re-validates the chosen ref against the raw request.
    pub fn match_request(&self, method: &http::Method, _headers: &HeaderMap) -> bool {
        self.methods.is_empty()
            || self
                .methods
                .iter()
                .any(|m| m.eq_ignore_ascii_case(method.as_str()))
    }
}

/// Controls emission of the `Expires` response header on hits.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ExpiresTimeConfig {
    #[serde(default)]
    pub is_on: bool,
    /// Takes precedence over an origin-supplied rule.
    #[serde(default)]
    pub is_prior: bool,
    /// Replace an existing `Expires` header instead of keeping it.
    #[serde(default)]
    pub overwrite: bool,
    /// Derive `Expires` from the entry's own expiration timestamp.
    #[serde(default)]
    pub auto_calculate: bool,
    #[serde(with = "humantime_serde", default)]
    pub duration: Option<Duration>,
}

/// How a group of request conditions combines.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CondConnector {
    #[default]
    And,
    Or,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct RequestCondGroup {
    #[serde(default)]
    pub connector: CondConnector,
    #[serde(default)]
    pub conds: Vec<RequestCond>,
}

impl RequestCondGroup {
    pub fn has_request_conds(&self) -> bool {
        !self.conds.is_empty()
    }

    pub fn match_request(&self, url: &str, path: &str, headers: &HeaderMap) -> bool {
        if self.conds.is_empty() {
            return false;
        }
        match self.connector {
            CondConnector::And => self.conds.iter().all(|c| c.matches(url, path, headers)),
            CondConnector::Or => self.conds.iter().any(|c| c.matches(url, path, headers)),
        }
    }
}

/// One request predicate.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RequestCond {
    /// Wildcard match over the full request URL.
    UrlWildcard { pattern: String },
    /// Path extension membership, extensions listed with their dot.
    UrlExtension { extensions: Vec<String> },
    /// A header value contains any of the listed words on word boundaries.
    HeaderWords {
        name: String,
        words: Vec<String>,
        #[serde(default)]
        case_insensitive: bool,
    },
}

impl RequestCond {
    pub fn matches(&self, url: &str, path: &str, headers: &HeaderMap) -> bool {
        match self {
            RequestCond::UrlWildcard { pattern } => WildMatch::new(pattern).matches(url),
            RequestCond::UrlExtension { extensions } => {
                let ext = match path.rfind('.') {
                    Some(i) => path[i..].to_ascii_lowercase(),
                    None => return false,
                };
                extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext))
            }
            RequestCond::HeaderWords {
                name,
                words,
                case_insensitive,
            } => {
                let value = headers
                    .get(name.as_str())
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("");
                text::contains_any_word(value, words, *case_insensitive)
            }
        }
    }
}

/// Per-site web settings consulted by the cache-read path.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct WebConfig {
    #[serde(default)]
    pub cache: Option<WebCacheConfig>,
    #[serde(default)]
    pub webp: Option<WebPRule>,
    #[serde(default)]
    pub compression: Option<CompressionConfig>,
    #[serde(default)]
    pub response_headers: Option<HeaderPolicyConfig>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct WebCacheConfig {
    #[serde(default = "default_true")]
    pub is_on: bool,
    #[serde(default)]
    pub cache_refs: Vec<Arc<CacheRef>>,
    /// Skip the policy's default refs entirely.
    #[serde(default)]
    pub disable_policy_refs: bool,
    #[serde(default = "default_true")]
    pub add_status_header: bool,
    #[serde(default)]
    pub add_age_header: bool,
    #[serde(default)]
    pub purge_is_on: bool,
    #[serde(default)]
    pub purge_key: String,
    #[serde(default)]
    pub stale: Option<StaleConfig>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct StaleConfig {
    #[serde(default)]
    pub is_on: bool,
}

/// Site WebP rule. Eligibility additionally requires the client to accept
/// `image/webp`; the cache is assumed to already hold the WebP variant.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct WebPRule {
    #[serde(default)]
    pub is_on: bool,
    /// Extensions with their dot, e.g. ".png".
    #[serde(default)]
    pub extensions: Vec<String>,
}

impl WebPRule {
    pub fn match_path(&self, path: &str) -> bool {
        let ext = match path.rfind('.') {
            Some(i) => path[i..].to_ascii_lowercase(),
            None => return false,
        };
        self.extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext))
    }

    pub fn match_accept(&self, accept: &str) -> bool {
        accept
            .split(',')
            .any(|part| part.split(';').next().unwrap_or("").trim() == "image/webp")
    }
}

/// Site compression settings. Only negotiation happens on the read path.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct CompressionConfig {
    #[serde(default)]
    pub is_on: bool,
    /// Encodings this site stores; empty means every registry encoding.
    #[serde(default)]
    pub encodings: Vec<String>,
}

impl CompressionConfig {
    /// Negotiates the stored encoding a client accepts, if any.
    pub fn match_accept_encoding(&self, header: &str) -> Option<String> {
        if !self.is_on {
            return None;
        }
        if self.encodings.is_empty() {
            let all: Vec<String> = compressions::all_encodings()
                .iter()
                .map(|e| e.to_string())
                .collect();
            compressions::negotiate(header, &all)
        } else {
            compressions::negotiate(header, &self.encodings)
        }
    }
}

/// Extra response headers applied by the site after a hit is assembled.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct HeaderPolicyConfig {
    #[serde(default)]
    pub set: Vec<HeaderPair>,
    #[serde(default)]
    pub delete: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HeaderPair {
    pub name: String,
    pub value: String,
}

/// Root configuration document.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub policies: Vec<CachePolicy>,
    #[serde(default)]
    pub web: Option<WebConfig>,
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse TOML from '{path}'"))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if let Some(web) = &self.web
            && let Some(cache) = &web.cache
            && cache.purge_is_on
            && cache.purge_key.is_empty()
        {
            anyhow::bail!("purge is enabled but no purge key is configured");
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}
