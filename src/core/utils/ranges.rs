// src/core/utils/ranges.rs

//! Byte-range parsing and arithmetic for `Range` requests and partial
//! caches. Ranges are kept half-open (`[start, end)`) internally and only
//! converted to the inclusive on-wire form when composing `Content-Range`.

use serde::{Deserialize, Serialize};

/// A resolved, half-open byte range within a body of known (or partially
/// known) size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Composes the `Content-Range` value for this range, e.g.
    /// `bytes 0-9/100`. `total` is already formatted because partial caches
    /// with an unknown full length advertise `*`.
    pub fn compose_content_range(&self, total: &str) -> String {
        let mut start_buf = itoa::Buffer::new();
        let mut end_buf = itoa::Buffer::new();
        let mut out = String::with_capacity(16 + total.len());
        out.push_str("bytes ");
        out.push_str(start_buf.format(self.start));
        out.push('-');
        out.push_str(end_buf.format(self.end.saturating_sub(1)));
        out.push('/');
        out.push_str(total);
        out
    }
}

/// One range spec as it appears on the wire, before resolution against a
/// concrete body size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    /// `bytes=a-b` with an inclusive end.
    FromTo(u64, u64),
    /// `bytes=a-`
    From(u64),
    /// `bytes=-n`: the final `n` bytes.
    Suffix(u64),
}

impl RangeSpec {
    /// Resolves the raw range against a body of `total` bytes. Returns
    /// `None` when the range cannot be satisfied.
    pub fn convert(self, total: u64) -> Option<ByteRange> {
        match self {
            RangeSpec::FromTo(start, end) => {
                if start > end || start >= total {
                    return None;
                }
                let end = end.min(total - 1);
                Some(ByteRange::new(start, end + 1))
            }
            RangeSpec::From(start) => {
                if start >= total {
                    return None;
                }
                Some(ByteRange::new(start, total))
            }
            RangeSpec::Suffix(n) => {
                if n == 0 || total == 0 {
                    return None;
                }
                Some(ByteRange::new(total.saturating_sub(n), total))
            }
        }
    }
}

/// Parses a `Range` header value into its specs. Returns `None` on any
/// syntax error; callers answer such requests with 416.
pub fn parse_range_header(value: &str) -> Option<Vec<RangeSpec>> {
    let rest = value.trim().strip_prefix("bytes=")?;
    if rest.is_empty() {
        return None;
    }
    let mut specs = Vec::new();
    for part in rest.split(',') {
        let part = part.trim();
        let dash = part.find('-')?;
        let (first, last) = (&part[..dash], &part[dash + 1..]);
        let spec = match (first.is_empty(), last.is_empty()) {
            (true, true) => return None,
            (true, false) => RangeSpec::Suffix(last.parse().ok()?),
            (false, true) => RangeSpec::From(first.parse().ok()?),
            (false, false) => {
                let start: u64 = first.parse().ok()?;
                let end: u64 = last.parse().ok()?;
                if start > end {
                    return None;
                }
                RangeSpec::FromTo(start, end)
            }
        };
        specs.push(spec);
    }
    Some(specs)
}
