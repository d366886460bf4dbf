use edgecache::core::utils::ranges::{RangeSpec, parse_range_header};
use proptest::prelude::*;

proptest! {
    /// The parser never panics, whatever arrives on the wire.
    #[test]
    fn test_parse_never_panics(header in "\\PC{0,64}") {
        let _ = parse_range_header(&header);
    }

    /// Anything the parser accepts and the converter resolves stays inside
    /// the body: `0 <= start < end <= total`.
    #[test]
    fn test_converted_ranges_stay_in_bounds(
        specs in prop::collection::vec((any::<u32>(), any::<u32>()), 1..5),
        total in 1u64..1_000_000,
    ) {
        let header = format!(
            "bytes={}",
            specs
                .iter()
                .map(|(a, b)| {
                    let (a, b) = (*a.min(b) as u64, *a.max(b) as u64);
                    format!("{a}-{b}")
                })
                .collect::<Vec<_>>()
                .join(",")
        );
        let parsed = parse_range_header(&header).expect("well-formed header");
        for spec in parsed {
            if let Some(r) = spec.convert(total) {
                prop_assert!(r.start < r.end);
                prop_assert!(r.end <= total);
            }
        }
    }

    /// Suffix ranges always cover the tail of the body.
    #[test]
    fn test_suffix_ranges_cover_tail(n in 1u64..1_000_000, total in 1u64..1_000_000) {
        if let Some(r) = RangeSpec::Suffix(n).convert(total) {
            prop_assert_eq!(r.end, total);
            prop_assert_eq!(r.len(), n.min(total));
        }
    }

    /// Conversion round-trips through the wire form of `Content-Range`.
    #[test]
    fn test_compose_matches_inclusive_wire_form(start in 0u64..1000, len in 1u64..1000, tail in 0u64..1000) {
        let total = start + len + tail;
        let r = RangeSpec::FromTo(start, start + len - 1).convert(total).unwrap();
        let composed = r.compose_content_range(&total.to_string());
        prop_assert_eq!(composed, format!("bytes {}-{}/{}", start, start + len - 1, total));
    }
}
