// src/core/compressions.rs

//! The encoding registry and `Accept-Encoding` negotiation. The read path
//! never transcodes; it only decides which already-stored compressed
//! variant a client can receive.

/// Known content encodings in preference order. Purges sweep the compressed
/// variant keys for every encoding listed here.
pub const ALL_ENCODINGS: [&str; 4] = ["br", "gzip", "zstd", "deflate"];

pub fn all_encodings() -> &'static [&'static str] {
    &ALL_ENCODINGS
}

/// One parsed `Accept-Encoding` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedEncoding {
    pub name: String,
    pub quality: f32,
}

/// Parses an `Accept-Encoding` header into its entries. Malformed q-values
/// fall back to 1.0; entries with `q=0` are excluded.
pub fn parse_accept_encoding(header: &str) -> Vec<AcceptedEncoding> {
    let mut out = Vec::new();
    for part in header.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let mut pieces = part.split(';');
        let name = match pieces.next() {
            Some(n) if !n.trim().is_empty() => n.trim().to_ascii_lowercase(),
            _ => continue,
        };
        let mut quality = 1.0f32;
        for param in pieces {
            let param = param.trim();
            if let Some(q) = param.strip_prefix("q=")
                && let Ok(v) = q.trim().parse::<f32>()
            {
                quality = v.clamp(0.0, 1.0);
            }
        }
        if quality > 0.0 {
            out.push(AcceptedEncoding { name, quality });
        }
    }
    out
}

/// Negotiates the best encoding among `candidates` (in preference order)
/// for the given `Accept-Encoding` header. `*` in the header accepts any
/// candidate not explicitly listed.
pub fn negotiate(header: &str, candidates: &[String]) -> Option<String> {
    if header.is_empty() || candidates.is_empty() {
        return None;
    }
    let accepted = parse_accept_encoding(header);
    if accepted.is_empty() {
        return None;
    }

    let mut best: Option<(f32, usize)> = None;
    for (index, candidate) in candidates.iter().enumerate() {
        let quality = accepted
            .iter()
            .find(|a| a.name == *candidate)
            .or_else(|| accepted.iter().find(|a| a.name == "*"))
            .map(|a| a.quality);
        if let Some(q) = quality {
            let better = match best {
                None => true,
                Some((best_q, _)) => q > best_q,
            };
            if better {
                best = Some((q, index));
            }
        }
    }
    best.map(|(_, index)| candidates[index].clone())
}
