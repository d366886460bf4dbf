use edgecache::core::utils::ranges::{ByteRange, RangeSpec, parse_range_header};

#[test]
fn test_parse_single_bounded_range() {
    let specs = parse_range_header("bytes=0-9").unwrap();
    assert_eq!(specs, vec![RangeSpec::FromTo(0, 9)]);
}

#[test]
fn test_parse_multiple_ranges() {
    let specs = parse_range_header("bytes=0-9,20-29").unwrap();
    assert_eq!(specs, vec![RangeSpec::FromTo(0, 9), RangeSpec::FromTo(20, 29)]);
}

#[test]
fn test_parse_open_and_suffix_ranges() {
    let specs = parse_range_header("bytes=100-, -50").unwrap();
    assert_eq!(specs, vec![RangeSpec::From(100), RangeSpec::Suffix(50)]);
}

#[test]
fn test_parse_rejects_missing_unit() {
    assert!(parse_range_header("0-9").is_none());
    assert!(parse_range_header("items=0-9").is_none());
}

#[test]
fn test_parse_rejects_garbage() {
    assert!(parse_range_header("bytes=").is_none());
    assert!(parse_range_header("bytes=-").is_none());
    assert!(parse_range_header("bytes=a-b").is_none());
    assert!(parse_range_header("bytes=9-0").is_none());
    assert!(parse_range_header("bytes=0-9,").is_none());
}

#[test]
fn test_convert_bounded_range() {
    let r = RangeSpec::FromTo(0, 9).convert(100).unwrap();
    assert_eq!(r, ByteRange::new(0, 10));
    assert_eq!(r.len(), 10);
}

#[test]
fn test_convert_clamps_end_to_size() {
    let r = RangeSpec::FromTo(90, 200).convert(100).unwrap();
    assert_eq!(r, ByteRange::new(90, 100));
}

#[test]
fn test_convert_rejects_start_past_end_of_body() {
    assert!(RangeSpec::FromTo(100, 150).convert(100).is_none());
    assert!(RangeSpec::From(100).convert(100).is_none());
}

#[test]
fn test_convert_open_range_runs_to_end() {
    let r = RangeSpec::From(40).convert(100).unwrap();
    assert_eq!(r, ByteRange::new(40, 100));
}

#[test]
fn test_convert_suffix_range() {
    let r = RangeSpec::Suffix(10).convert(100).unwrap();
    assert_eq!(r, ByteRange::new(90, 100));
}

#[test]
fn test_convert_suffix_larger_than_body_takes_whole_body() {
    let r = RangeSpec::Suffix(500).convert(100).unwrap();
    assert_eq!(r, ByteRange::new(0, 100));
}

#[test]
fn test_convert_zero_suffix_is_unsatisfiable() {
    assert!(RangeSpec::Suffix(0).convert(100).is_none());
}

#[test]
fn test_compose_content_range_uses_inclusive_end() {
    let r = ByteRange::new(0, 10);
    assert_eq!(r.compose_content_range("100"), "bytes 0-9/100");
}

#[test]
fn test_compose_content_range_with_unknown_total() {
    let r = ByteRange::new(20, 30);
    assert_eq!(r.compose_content_range("*"), "bytes 20-29/*");
}

#[test]
fn test_last_byte_range() {
    let r = RangeSpec::FromTo(99, 99).convert(100).unwrap();
    assert_eq!(r, ByteRange::new(99, 100));
    assert_eq!(r.compose_content_range("100"), "bytes 99-99/100");
}
