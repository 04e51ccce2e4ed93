use novel_annotations::{AnnotationParser, BoldPolicy, Segment, SegmentKind, parse, parse_content};

fn text(s: &str) -> (SegmentKind, String) {
    (SegmentKind::Text, s.to_string())
}

fn word(w: &str, m: &str) -> (SegmentKind, String) {
    (SegmentKind::Word, format!("{w}|{m}"))
}

fn shape(segments: &[Segment]) -> Vec<(SegmentKind, String)> {
    segments
        .iter()
        .map(|s| match s {
            Segment::Text { text, .. } => (SegmentKind::Text, text.clone()),
            Segment::Word { word, meaning, .. } => (SegmentKind::Word, format!("{word}|{meaning}")),
            Segment::Bold { text, .. } => (SegmentKind::Bold, text.clone()),
        })
        .collect()
}

#[test]
fn plain_word_marker() {
    assert_eq!(
        shape(&parse("a {dog|狗} b")),
        vec![text("a "), word("dog", "狗"), text(" b")]
    );
}

#[test]
fn backtick_wrapped_marker_is_unwrapped() {
    assert_eq!(shape(&parse("`{cat|猫}`")), vec![word("cat", "猫")]);
}

#[test]
fn redundant_bold_is_collapsed() {
    assert_eq!(shape(&parse("**狗** {dog|狗}")), vec![word("dog", "狗")]);
}

#[test]
fn redundant_bold_collapses_under_keep_policy_too() {
    let parser = AnnotationParser::new(BoldPolicy::Keep);
    assert_eq!(shape(&parser.parse("**狗** {dog|狗}")), vec![word("dog", "狗")]);
}

#[test]
fn meaning_prefers_parenthetical_gloss() {
    let segments = parse("{elaborate|elaborate (精心制作的)}");
    assert_eq!(segments[0].as_word(), Some(("elaborate", "精心制作的")));
}

#[test]
fn meaning_takes_first_alternative() {
    assert_eq!(parse("{x|a/b}")[0].as_word(), Some(("x", "a")));
}

#[test]
fn unclosed_brace_is_plain_text() {
    let input = "open {brace without close";
    assert_eq!(shape(&parse(input)), vec![text(input)]);
}

#[test]
fn empty_input_yields_no_segments() {
    assert!(parse("").is_empty());
}

#[test]
fn adjacent_markers_have_no_text_between() {
    assert_eq!(
        shape(&parse("{a|1}{b|2}")),
        vec![word("a", "1"), word("b", "2")]
    );
}

#[test]
fn empty_meaning_after_cleanup_is_still_a_word() {
    let segments = parse("{dog| / }");
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].as_word(), Some(("dog", "")));
}

#[test]
fn word_is_trimmed_and_whitespace_kept() {
    let input = "line one\n  { dog |  狗 }\n\nline two";
    assert_eq!(
        shape(&parse(input)),
        vec![text("line one\n  "), word("dog", "狗"), text("\n\nline two")]
    );
}

#[test]
fn mixed_legacy_variants_in_one_chapter() {
    let input = "她很**有野心的** `{ambitious|有野心的}`，也很{resilient|adj. 坚韧的}。**注意**";
    let parsed = parse_content(input);
    assert_eq!(parsed.normalized, "她很{ambitious|有野心的}，也很{resilient|adj. 坚韧的}。注意");
    assert_eq!(
        shape(&parsed.segments),
        vec![
            text("她很"),
            word("ambitious", "有野心的"),
            text("，也很"),
            word("resilient", "坚韧的"),
            text("。注意"),
        ]
    );
}

#[test]
fn spans_tile_the_normalized_text() {
    let parsed = parse_content("a `{b|c}` **d** {e|f}{g|h} tail");
    let mut cursor = 0;
    for segment in &parsed.segments {
        assert_eq!(segment.span().start, cursor);
        cursor = segment.span().end;
    }
    assert_eq!(cursor, parsed.normalized.len());
    assert_eq!(parsed.reconstruct(), parsed.normalized);
}
