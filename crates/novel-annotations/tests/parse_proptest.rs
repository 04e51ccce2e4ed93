//! Property-based checks for the annotation parser.
//!
//! Inputs are drawn from an alphabet dense in markup delimiters so malformed,
//! nested and adjacent markers show up often.

use novel_annotations::{AnnotationParser, BoldPolicy, ParsedContent, Segment};
use proptest::prelude::*;

fn markup_soup() -> impl Strategy<Value = String> {
    "[ab狗猫 {}|*`()/\\-\n]{0,48}"
}

fn marker_prose() -> impl Strategy<Value = String> {
    let piece = prop_oneof![
        "[a-z ，。]{1,6}",
        ("[a-z]{1,5}", "[a-z狗猫]{1,4}").prop_map(|(w, m)| format!("{{{w}|{m}}}")),
        ("[a-z]{1,5}", "[狗猫]{1,3}").prop_map(|(w, m)| format!("`{{{w}|{m}}}`")),
        ("[a-z]{1,5}", "[狗猫]{1,3}").prop_map(|(w, m)| format!("**{m}** {{{w}|{m}}}")),
        "[a-z]{1,4}".prop_map(|b| format!("**{b}**")),
    ];
    prop::collection::vec(piece, 0..8).prop_map(|parts| parts.concat())
}

fn assert_tiles(parsed: &ParsedContent) {
    let mut cursor = 0;
    for segment in &parsed.segments {
        let span = segment.span();
        assert_eq!(span.start, cursor, "gap or overlap before {segment:?}");
        assert!(span.end > span.start, "empty segment {segment:?}");
        if let Segment::Bold { nested, .. } = segment {
            let inner_start = span.start + 2;
            let mut inner = inner_start;
            for child in nested {
                assert_eq!(child.span().start, inner);
                assert!(!matches!(child, Segment::Bold { .. }));
                inner = child.span().end;
            }
            assert_eq!(inner, span.end - 2);
        }
        cursor = span.end;
    }
    assert_eq!(cursor, parsed.normalized.len());
    assert_eq!(parsed.reconstruct(), parsed.normalized);
}

proptest! {
    #[test]
    fn strip_policy_reconstructs_normalized(input in markup_soup()) {
        let parsed = AnnotationParser::new(BoldPolicy::Strip).parse_content(&input);
        assert_tiles(&parsed);
    }

    #[test]
    fn keep_policy_reconstructs_normalized(input in markup_soup()) {
        let parsed = AnnotationParser::new(BoldPolicy::Keep).parse_content(&input);
        assert_tiles(&parsed);
    }

    #[test]
    fn generated_prose_keeps_every_marker(input in marker_prose()) {
        let parsed = AnnotationParser::default().parse_content(&input);
        assert_tiles(&parsed);
        prop_assert!(!parsed.normalized.contains('`'));
        prop_assert!(!parsed.normalized.contains("**"));
        for (word, _) in parsed.words() {
            prop_assert!(!word.is_empty());
        }
    }
}
