//! Meaning cleanup: trims a marker's raw gloss down to its canonical form.
//!
//! Rules run in a fixed order and each only fires when its pattern matches:
//! 1. [`strip_trailing_aside`]: `精心的 - (formal)` → `精心的`
//! 2. [`prefer_parenthetical_gloss`]: `elaborate (精心制作的)` → `精心制作的`
//! 3. [`first_alternative`]: `a/b` → `a`
//! 4. [`strip_latin_prefix`]: `adj. 精心的` → `精心的`
//!
//! The rules are lossy by nature; a gloss that legitimately contains a slash
//! or a leading Latin abbreviation will be shortened.

use once_cell::sync::Lazy;
use regex::Regex;

static TRAILING_ASIDE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*[-–—]\s*[(（][^()（）]*[)）]\s*$").unwrap());

static PARENTHETICAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[(（]([^()（）]+)[)）]").unwrap());

static CJK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\p{Han}\p{Hiragana}\p{Katakana}\p{Hangul}]").unwrap()
});

/// Apply every rule in order.
pub fn clean_meaning(raw: &str) -> String {
    let meaning = strip_trailing_aside(raw.trim());
    let meaning = prefer_parenthetical_gloss(&meaning);
    let meaning = first_alternative(&meaning);
    strip_latin_prefix(&meaning)
}

/// Drop a trailing ` - (...)` aside.
pub fn strip_trailing_aside(meaning: &str) -> String {
    TRAILING_ASIDE.replace(meaning, "").trim().to_string()
}

/// Use the first parenthesised group that contains CJK text, if any.
pub fn prefer_parenthetical_gloss(meaning: &str) -> String {
    PARENTHETICAL
        .captures_iter(meaning)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .find(|inner| contains_cjk(inner))
        .unwrap_or(meaning)
        .trim()
        .to_string()
}

/// Keep the first non-empty slash-separated alternative.
pub fn first_alternative(meaning: &str) -> String {
    if !meaning.contains(['/', '／']) {
        return meaning.trim().to_string();
    }
    meaning
        .split(['/', '／'])
        .map(str::trim)
        .find(|part| !part.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// Remove a Latin-script lead-in (`adj.`, the English headword, ...) before a CJK gloss.
pub fn strip_latin_prefix(meaning: &str) -> String {
    let trimmed = meaning.trim();
    let Some(first_cjk) = CJK.find(trimmed) else {
        return trimmed.to_string();
    };
    let prefix = &trimmed[..first_cjk.start()];
    let latin_only = prefix
        .chars()
        .all(|c| c.is_ascii_alphabetic() || c.is_whitespace() || is_prefix_punct(c));
    if prefix.is_empty() || !latin_only || !prefix.chars().any(|c| c.is_ascii_alphabetic()) {
        return trimmed.to_string();
    }
    trimmed[first_cjk.start()..].trim().to_string()
}

pub fn contains_cjk(text: &str) -> bool {
    CJK.is_match(text)
}

fn is_prefix_punct(c: char) -> bool {
    matches!(c, '.' | ',' | ';' | ':' | '\'' | '’' | '-' | '：' | '，' | '；')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trailing_aside() {
        assert_eq!(strip_trailing_aside("精心的 - (formal)"), "精心的");
        assert_eq!(strip_trailing_aside("精心的 — （书面）"), "精心的");
        assert_eq!(strip_trailing_aside("well-made"), "well-made");
    }

    #[test]
    fn prefers_cjk_parenthetical() {
        assert_eq!(prefer_parenthetical_gloss("elaborate (精心制作的)"), "精心制作的");
        assert_eq!(prefer_parenthetical_gloss("elaborate（精心制作的）"), "精心制作的");
        assert_eq!(prefer_parenthetical_gloss("狗 (dog)"), "狗 (dog)");
    }

    #[test]
    fn splits_on_slash() {
        assert_eq!(first_alternative("a/b"), "a");
        assert_eq!(first_alternative("有野心的／雄心勃勃的"), "有野心的");
        assert_eq!(first_alternative(" / b"), "b");
        assert_eq!(first_alternative("plain"), "plain");
    }

    #[test]
    fn strips_latin_lead_in() {
        assert_eq!(strip_latin_prefix("adj. 精心的"), "精心的");
        assert_eq!(strip_latin_prefix("elaborate 精心的"), "精心的");
        assert_eq!(strip_latin_prefix("精心的"), "精心的");
        assert_eq!(strip_latin_prefix("a"), "a");
        assert_eq!(strip_latin_prefix("3D打印"), "3D打印");
    }

    #[test]
    fn rules_compose_in_order() {
        assert_eq!(clean_meaning("elaborate (精心制作的)"), "精心制作的");
        assert_eq!(clean_meaning("a/b"), "a");
        assert_eq!(clean_meaning("adj. 有野心的/雄心勃勃的 - (note)"), "有野心的");
        assert_eq!(clean_meaning("  "), "");
    }
}
