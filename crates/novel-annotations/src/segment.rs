use std::ops::Range;

use serde::Serialize;

use crate::scan::{MarkupKind, MarkupToken};

/// Discriminant of [`Segment`], handy for assertions and metrics.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SegmentKind {
    Text,
    Word,
    Bold,
}

/// One renderable unit of parsed content.
///
/// `span` is the byte range of the normalized content the segment was cut
/// from; nested spans are absolute too. Spans are not serialized.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Segment {
    Text {
        text: String,
        #[serde(skip)]
        span: Range<usize>,
    },
    Word {
        word: String,
        meaning: String,
        #[serde(skip)]
        span: Range<usize>,
    },
    /// Emphasis. `text` is the inner text; `nested` holds only `Text`/`Word`.
    Bold {
        text: String,
        nested: Vec<Segment>,
        #[serde(skip)]
        span: Range<usize>,
    },
}

impl Segment {
    pub fn kind(&self) -> SegmentKind {
        match self {
            Segment::Text { .. } => SegmentKind::Text,
            Segment::Word { .. } => SegmentKind::Word,
            Segment::Bold { .. } => SegmentKind::Bold,
        }
    }

    pub fn span(&self) -> Range<usize> {
        match self {
            Segment::Text { span, .. } | Segment::Word { span, .. } | Segment::Bold { span, .. } => {
                span.clone()
            }
        }
    }

    /// `(word, meaning)` for word segments.
    pub fn as_word(&self) -> Option<(&str, &str)> {
        match self {
            Segment::Word { word, meaning, .. } => Some((word.as_str(), meaning.as_str())),
            _ => None,
        }
    }

    pub fn nested(&self) -> &[Segment] {
        match self {
            Segment::Bold { nested, .. } => nested,
            _ => &[],
        }
    }
}

/// Cut `range` of `text` into segments, with `tokens` sorted and disjoint.
pub(crate) fn emit(text: &str, range: Range<usize>, tokens: Vec<MarkupToken>) -> Vec<Segment> {
    let mut segments = Vec::with_capacity(tokens.len() * 2 + 1);
    let mut last = range.start;
    for token in tokens {
        push_text(&mut segments, text, last..token.start);
        let span = token.span();
        last = token.end;
        segments.push(match token.kind {
            MarkupKind::Word { word, meaning } => Segment::Word { word, meaning, span },
            MarkupKind::Bold { inner, words } => Segment::Bold {
                text: text[inner.clone()].to_string(),
                nested: emit(text, inner, words),
                span,
            },
        });
    }
    push_text(&mut segments, text, last..range.end);
    segments
}

fn push_text(segments: &mut Vec<Segment>, text: &str, span: Range<usize>) {
    if span.is_empty() {
        return;
    }
    segments.push(Segment::Text {
        text: text[span.clone()].to_string(),
        span,
    });
}
