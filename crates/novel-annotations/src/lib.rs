//! Inline vocabulary annotations: raw chapter text in, renderable segments out.
//!
//! Chapter text is prose with embedded markup:
//! - word markers `{word|meaning}`, optionally wrapped in backticks;
//! - bold spans `**text**`, which the generator sometimes uses to restate the
//!   gloss of the marker that follows.
//!
//! # How it works
//! 1. Normalize through an ordered [`Pipeline`] of pure passes (unwrap
//!    backticks, collapse redundant bold, strip or keep stray bold).
//! 2. Scan the normalized text for bold spans and for word markers.
//! 3. Merge both lists by position. Word markers inside a bold span are
//!    owned by that span and re-emitted as its nested segments.
//! 4. Fill the gaps with `Text` segments.
//!
//! Meanings are cleaned per marker by [`clean_meaning`]. Malformed markup is
//! never an error: it does not match the grammar and stays literal text.
//! The empty string parses to an empty list.
//!
//! # Example
//! ```rust
//! use novel_annotations::{parse, Segment};
//!
//! let segments = parse("a {dog|狗} b");
//! assert_eq!(segments.len(), 3);
//! assert_eq!(segments[1].as_word(), Some(("dog", "狗")));
//! assert!(matches!(&segments[2], Segment::Text { text, .. } if text == " b"));
//! ```

pub mod meaning;
pub mod normalize;
pub mod scan;
pub mod segment;

use std::borrow::Cow;

use once_cell::sync::Lazy;

pub use meaning::clean_meaning;
pub use normalize::{BoldPolicy, NormalizePass, Pipeline};
pub use scan::{MarkupKind, MarkupToken, ScanError, tokenize};
pub use segment::{Segment, SegmentKind};

static DEFAULT_PARSER: Lazy<AnnotationParser> = Lazy::new(AnnotationParser::default);

/// Parse with the default policy.
pub fn parse(content: &str) -> Vec<Segment> {
    DEFAULT_PARSER.parse(content)
}

/// Parse with the default policy, keeping the normalized text.
pub fn parse_content(content: &str) -> ParsedContent {
    DEFAULT_PARSER.parse_content(content)
}

/// Every `(word, cleaned meaning)` pair in `content`, nested ones included.
pub fn word_markers(content: &str) -> Vec<(String, String)> {
    DEFAULT_PARSER.word_markers(content)
}

/// Normalization pipeline plus the bold policy it was built from.
pub struct AnnotationParser {
    policy: BoldPolicy,
    pipeline: Pipeline,
}

impl AnnotationParser {
    pub fn new(policy: BoldPolicy) -> Self {
        Self {
            policy,
            pipeline: Pipeline::standard(policy),
        }
    }

    /// Use a custom pipeline, e.g. to add a pass for a new content variant.
    pub fn with_pipeline(policy: BoldPolicy, pipeline: Pipeline) -> Self {
        Self { policy, pipeline }
    }

    pub fn policy(&self) -> BoldPolicy {
        self.policy
    }

    pub fn normalize<'a>(&self, content: &'a str) -> Cow<'a, str> {
        self.pipeline.run(content)
    }

    pub fn parse(&self, content: &str) -> Vec<Segment> {
        self.parse_content(content).segments
    }

    /// Owned `(word, meaning)` pairs in document order, nested ones included.
    pub fn word_markers(&self, content: &str) -> Vec<(String, String)> {
        self.parse_content(content)
            .words()
            .map(|(w, m)| (w.to_string(), m.to_string()))
            .collect()
    }

    pub fn parse_content(&self, content: &str) -> ParsedContent {
        let normalized = self.normalize(content).into_owned();
        let tokens = scan::tokenize_lossy(&normalized);
        let segments = segment::emit(&normalized, 0..normalized.len(), tokens);
        ParsedContent {
            normalized,
            segments,
        }
    }
}

impl Default for AnnotationParser {
    fn default() -> Self {
        Self::new(BoldPolicy::default())
    }
}

/// Segments together with the normalized text their spans index into.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParsedContent {
    pub normalized: String,
    pub segments: Vec<Segment>,
}

impl ParsedContent {
    /// The slice of normalized text `segment` was derived from.
    pub fn literal(&self, segment: &Segment) -> &str {
        &self.normalized[segment.span()]
    }

    /// Concatenate every top-level literal span; equals `normalized`.
    pub fn reconstruct(&self) -> String {
        self.segments.iter().map(|s| self.literal(s)).collect()
    }

    pub fn words(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.segments
            .iter()
            .flat_map(|s| std::iter::once(s).chain(s.nested()))
            .filter_map(Segment::as_word)
    }

    pub fn word_count(&self) -> usize {
        self.words().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keep_policy_emits_bold_with_nested_words() {
        let parser = AnnotationParser::new(BoldPolicy::Keep);
        let parsed = parser.parse_content("x **see {dog|狗} now** y");
        let kinds: Vec<_> = parsed.segments.iter().map(Segment::kind).collect();
        assert_eq!(kinds, vec![SegmentKind::Text, SegmentKind::Bold, SegmentKind::Text]);

        let bold = &parsed.segments[1];
        assert_eq!(parsed.literal(bold), "**see {dog|狗} now**");
        let nested_kinds: Vec<_> = bold.nested().iter().map(Segment::kind).collect();
        assert_eq!(
            nested_kinds,
            vec![SegmentKind::Text, SegmentKind::Word, SegmentKind::Text]
        );
        assert_eq!(parsed.literal(&bold.nested()[1]), "{dog|狗}");
        assert_eq!(parsed.word_count(), 1);
    }

    #[test]
    fn strip_policy_flattens_bold() {
        let parsed = parse_content("x **see {dog|狗}** y");
        assert_eq!(parsed.normalized, "x see {dog|狗} y");
        assert!(parsed.segments.iter().all(|s| s.kind() != SegmentKind::Bold));
        assert_eq!(parsed.reconstruct(), parsed.normalized);
    }

    #[test]
    fn custom_pipeline_is_honoured() {
        let parser = AnnotationParser::with_pipeline(BoldPolicy::Keep, Pipeline::empty());
        let segments = parser.parse("`{cat|猫}`");
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[1].as_word(), Some(("cat", "猫")));
    }

    #[test]
    fn word_markers_include_nested() {
        let parser = AnnotationParser::new(BoldPolicy::Keep);
        let parsed = parser.parse_content("{a|1} **{b|2}**");
        let words: Vec<_> = parsed.words().collect();
        assert_eq!(words, vec![("a", "1"), ("b", "2")]);
        assert_eq!(word_markers("{a|1/x} z"), vec![("a".to_string(), "1".to_string())]);
        assert_eq!(
            parser.word_markers("**{b|2}** {c|c (三)}"),
            vec![("b".to_string(), "2".to_string()), ("c".to_string(), "三".to_string())]
        );
    }
}
