use edgecache::config::CompressionConfig;
use edgecache::core::compressions::{negotiate, parse_accept_encoding};

fn candidates(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

#[test]
fn test_parse_accept_encoding_with_qualities() {
    let accepted = parse_accept_encoding("gzip;q=0.5, br;q=0.8, deflate");
    let names: Vec<&str> = accepted.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["gzip", "br", "deflate"]);
    assert_eq!(accepted[0].quality, 0.5);
    assert_eq!(accepted[2].quality, 1.0);
}

#[test]
fn test_parse_accept_encoding_drops_rejected_entries() {
    let accepted = parse_accept_encoding("gzip;q=0, br");
    assert_eq!(accepted.len(), 1);
    assert_eq!(accepted[0].name, "br");
}

#[test]
fn test_negotiate_prefers_higher_quality() {
    let enc = negotiate("gzip;q=0.5, br;q=0.8", &candidates(&["gzip", "br"]));
    assert_eq!(enc.as_deref(), Some("br"));
}

#[test]
fn test_negotiate_ties_break_by_candidate_order() {
    let enc = negotiate("gzip, br", &candidates(&["br", "gzip"]));
    assert_eq!(enc.as_deref(), Some("br"));
}

#[test]
fn test_negotiate_wildcard_accepts_unlisted_candidates() {
    let enc = negotiate("*", &candidates(&["zstd"]));
    assert_eq!(enc.as_deref(), Some("zstd"));
}

#[test]
fn test_negotiate_returns_none_without_overlap() {
    assert!(negotiate("identity", &candidates(&["gzip", "br"])).is_none());
    assert!(negotiate("", &candidates(&["gzip"])).is_none());
    assert!(negotiate("gzip", &[]).is_none());
}

#[test]
fn test_site_config_defaults_to_registry_encodings() {
    let config = CompressionConfig {
        is_on: true,
        encodings: Vec::new(),
    };
    assert_eq!(config.match_accept_encoding("gzip").as_deref(), Some("gzip"));
}

#[test]
fn test_site_config_disabled_never_matches() {
    let config = CompressionConfig {
        is_on: false,
        encodings: Vec::new(),
    };
    assert!(config.match_accept_encoding("gzip").is_none());
}

#[test]
fn test_site_config_limits_to_stored_encodings() {
    let config = CompressionConfig {
        is_on: true,
        encodings: vec!["gzip".to_string()],
    };
    assert!(config.match_accept_encoding("br").is_none());
    assert_eq!(config.match_accept_encoding("br, gzip").as_deref(), Some("gzip"));
}
