//! Shared records that mirror the JSON catalogs produced by the content pipeline.
//!
//! Chapters carry their text verbatim, including inline `{word|meaning}`
//! annotations; parsing those is left to `novel-annotations`. Field names
//! follow the generator's JSON (`book_id`, `chapter_num`, `exampleCn`) so the
//! files can be read without a translation layer.
//!
//! ```rust
//! use novel_types::{AccessCodeStatus, Vocabulary};
//!
//! let card = Vocabulary::from_inline("resilient", "坚韧的");
//! assert!(card.is_fallback());
//! assert_eq!(AccessCodeStatus::from_str_lossy("REVOKED"), AccessCodeStatus::Revoked);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Dictionary-style card shown when a reader taps an annotated word.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Vocabulary {
    pub word: String,
    pub meaning: String,
    #[serde(default)]
    pub phonetic: String,
    /// Root or mnemonic breakdown.
    #[serde(default)]
    pub root: String,
    #[serde(default)]
    pub example: String,
    #[serde(default, rename = "exampleCn")]
    pub example_cn: String,
}

impl Vocabulary {
    /// Minimal card built from the gloss embedded in the chapter text.
    pub fn from_inline(word: &str, meaning: &str) -> Self {
        Self {
            word: word.trim().to_string(),
            meaning: meaning.trim().to_string(),
            ..Self::default()
        }
    }

    /// True when only `word`/`meaning` are populated.
    pub fn is_fallback(&self) -> bool {
        self.phonetic.is_empty()
            && self.root.is_empty()
            && self.example.is_empty()
            && self.example_cn.is_empty()
    }
}

/// One chapter file (`book-*.json`).
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Raw annotated text.
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub book_id: Option<String>,
    #[serde(default)]
    pub chapter_num: Option<u32>,
}

impl Chapter {
    /// Sort key used everywhere chapters are ordered; missing numbers sort first.
    pub fn order_key(&self) -> (u32, &str) {
        (self.chapter_num.unwrap_or(0), self.id.as_str())
    }
}

/// Shelf entry from `library.json`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub cover_color: String,
    #[serde(default)]
    pub category: String,
    /// Usually empty in `library.json`; chapters live in their own files.
    #[serde(default)]
    pub chapters: Vec<Chapter>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color: String,
}

/// Lifecycle marker stored with each access code.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessCodeStatus {
    #[default]
    Active,
    Revoked,
    Expired,
}

impl AccessCodeStatus {
    /// Unknown values are treated as active, matching how the table is written.
    pub fn from_str_lossy(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "revoked" => AccessCodeStatus::Revoked,
            "expired" => AccessCodeStatus::Expired,
            _ => AccessCodeStatus::Active,
        }
    }
}

impl fmt::Display for AccessCodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AccessCodeStatus::Active => "active",
            AccessCodeStatus::Revoked => "revoked",
            AccessCodeStatus::Expired => "expired",
        })
    }
}

/// Row of the access-code table. Timestamps are unix seconds.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct AccessCode {
    pub id: String,
    pub code: String,
    #[serde(default)]
    pub status: AccessCodeStatus,
    pub expires_at: u64,
    #[serde(default)]
    pub usage_count: u64,
    #[serde(default)]
    pub last_used_at: Option<u64>,
    #[serde(default)]
    pub bound_user_email: Option<String>,
    #[serde(default)]
    pub bound_user_phone: Option<String>,
    #[serde(default)]
    pub bound_at: Option<u64>,
}

impl AccessCode {
    pub fn is_bound(&self) -> bool {
        has_text(&self.bound_user_email) || has_text(&self.bound_user_phone)
    }
}

fn has_text(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chapter_reads_generator_json() {
        let raw = r#"{"id":"c1","title":"第一章","content":"a {dog|狗}","book_id":"b1","chapter_num":3}"#;
        let chapter: Chapter = serde_json::from_str(raw).unwrap();
        assert_eq!(chapter.order_key(), (3, "c1"));
        assert_eq!(chapter.book_id.as_deref(), Some("b1"));
    }

    #[test]
    fn vocabulary_uses_camel_case_example() {
        let raw = r#"{"word":"dog","meaning":"狗","exampleCn":"一只狗"}"#;
        let vocab: Vocabulary = serde_json::from_str(raw).unwrap();
        assert_eq!(vocab.example_cn, "一只狗");
        assert!(!vocab.is_fallback());
        assert!(Vocabulary::from_inline(" dog ", "狗").is_fallback());
    }

    #[test]
    fn access_code_binding_ignores_blank_identity() {
        let mut code = AccessCode {
            bound_user_email: Some("  ".into()),
            ..AccessCode::default()
        };
        assert!(!code.is_bound());
        code.bound_user_phone = Some("13800000000".into());
        assert!(code.is_bound());
    }

    #[test]
    fn status_parses_lossily() {
        assert_eq!(AccessCodeStatus::from_str_lossy("expired"), AccessCodeStatus::Expired);
        assert_eq!(AccessCodeStatus::from_str_lossy("???"), AccessCodeStatus::Active);
        assert_eq!(AccessCodeStatus::Revoked.to_string(), "revoked");
    }
}
