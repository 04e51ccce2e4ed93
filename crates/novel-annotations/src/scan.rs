use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::meaning::clean_meaning;
use crate::normalize::BOLD;

static WORD_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([^|]+)\|([^}]+)\}").unwrap());

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MarkupKind {
    /// `{word|meaning}` with the word trimmed and the meaning already cleaned.
    Word { word: String, meaning: String },
    /// `**inner**`. `words` holds the word markers found inside `inner`.
    Bold {
        inner: Range<usize>,
        words: Vec<MarkupToken>,
    },
}

/// A markup match with its half-open byte span in the scanned text.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MarkupToken {
    pub start: usize,
    pub end: usize,
    pub kind: MarkupKind,
}

impl MarkupToken {
    pub fn span(&self) -> Range<usize> {
        self.start..self.end
    }
}

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum ScanError {
    #[error("markup at {first:?} overlaps markup at {second:?}")]
    Overlap {
        first: Range<usize>,
        second: Range<usize>,
    },
}

/// Every well-formed word marker in `text`, offsets shifted by `base`.
///
/// A marker whose word is blank after trimming is not a marker and stays literal.
pub fn scan_words(text: &str, base: usize) -> Vec<MarkupToken> {
    WORD_MARKER
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let word = caps[1].trim();
            if word.is_empty() {
                return None;
            }
            Some(MarkupToken {
                start: base + whole.start(),
                end: base + whole.end(),
                kind: MarkupKind::Word {
                    word: word.to_string(),
                    meaning: clean_meaning(&caps[2]),
                },
            })
        })
        .collect()
}

/// Every bold span in `text`, each carrying its own word-only sub-scan.
pub fn scan_bold(text: &str) -> Vec<MarkupToken> {
    BOLD.captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let inner = caps.get(1)?;
            Some(MarkupToken {
                start: whole.start(),
                end: whole.end(),
                kind: MarkupKind::Bold {
                    inner: inner.range(),
                    words: scan_words(inner.as_str(), inner.start()),
                },
            })
        })
        .collect()
}

/// Merge both scans into one position-ordered, non-overlapping list.
///
/// Word markers lying wholly inside a bold span belong to that span and are
/// dropped from the top level. Any other overlap is reported.
pub fn tokenize(text: &str) -> Result<Vec<MarkupToken>, ScanError> {
    let tokens = merge(text);
    for pair in tokens.windows(2) {
        if pair[1].start < pair[0].end {
            return Err(ScanError::Overlap {
                first: pair[0].span(),
                second: pair[1].span(),
            });
        }
    }
    Ok(tokens)
}

/// Like [`tokenize`], but keeps the earlier token of any overlapping pair.
pub(crate) fn tokenize_lossy(text: &str) -> Vec<MarkupToken> {
    match tokenize(text) {
        Ok(tokens) => tokens,
        Err(err) => {
            tracing::warn!(%err, "overlapping markup survived normalization; keeping earlier span");
            let mut kept: Vec<MarkupToken> = Vec::new();
            for token in merge(text) {
                if kept.last().is_none_or(|prev| token.start >= prev.end) {
                    kept.push(token);
                }
            }
            kept
        }
    }
}

fn merge(text: &str) -> Vec<MarkupToken> {
    let bold = scan_bold(text);
    let words = scan_words(text, 0)
        .into_iter()
        .filter(|w| !bold.iter().any(|b| b.start <= w.start && w.end <= b.end));
    let mut tokens: Vec<MarkupToken> = bold.iter().cloned().chain(words).collect();
    tokens.sort_by_key(|t| (t.start, t.end));
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(token: &MarkupToken) -> (&str, &str) {
        match &token.kind {
            MarkupKind::Word { word, meaning } => (word.as_str(), meaning.as_str()),
            other => panic!("expected word, got {other:?}"),
        }
    }

    #[test]
    fn scans_words_with_offsets() {
        let tokens = scan_words("a {dog|狗} b", 0);
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].span(), 2..11);
        assert_eq!(word(&tokens[0]), ("dog", "狗"));
    }

    #[test]
    fn blank_word_is_not_a_marker() {
        assert!(scan_words("{  |狗}", 0).is_empty());
    }

    #[test]
    fn malformed_markers_are_ignored() {
        assert!(scan_words("open {brace without close", 0).is_empty());
        assert!(scan_words("{no pipe}", 0).is_empty());
        assert!(scan_bold("**unterminated").is_empty());
    }

    #[test]
    fn bold_owns_nested_words() {
        let text = "x **see {dog|狗}** y {cat|猫}";
        let tokens = tokenize(text).unwrap();
        assert_eq!(tokens.len(), 2);
        match &tokens[0].kind {
            MarkupKind::Bold { inner, words } => {
                assert_eq!(&text[inner.clone()], "see {dog|狗}");
                assert_eq!(words.len(), 1);
                assert_eq!(&text[words[0].span()], "{dog|狗}");
            }
            other => panic!("expected bold, got {other:?}"),
        }
        assert_eq!(word(&tokens[1]), ("cat", "猫"));
    }

    #[test]
    fn partial_overlap_is_reported() {
        let text = "**a {b** |c}";
        let err = tokenize(text).unwrap_err();
        assert!(matches!(err, ScanError::Overlap { .. }));

        let kept = tokenize_lossy(text);
        assert_eq!(kept.len(), 1);
        assert!(matches!(kept[0].kind, MarkupKind::Bold { .. }));
    }
}
