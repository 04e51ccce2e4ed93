use novel_db::NovelDb;
use novel_types::Vocabulary;
use serde::Serialize;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WordSource {
    Vocabulary,
    Inline,
}

/// A word card together with where its data came from.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResolvedWord {
    #[serde(flatten)]
    pub vocabulary: Vocabulary,
    pub source: WordSource,
}

/// Vocabulary table first, then the marker's own meaning; `None` when
/// neither yields anything.
pub fn resolve_word(db: &NovelDb, word: &str, inline_meaning: Option<&str>) -> Option<ResolvedWord> {
    if let Some(entry) = db.vocabulary(word) {
        return Some(ResolvedWord {
            vocabulary: entry.clone(),
            source: WordSource::Vocabulary,
        });
    }
    let word = word.trim();
    let meaning = inline_meaning.map(str::trim).filter(|m| !m.is_empty())?;
    if word.is_empty() {
        return None;
    }
    Some(ResolvedWord {
        vocabulary: Vocabulary::from_inline(word, meaning),
        source: WordSource::Inline,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> NovelDb {
        let entry = Vocabulary {
            word: "Resilient".into(),
            meaning: "坚韧的".into(),
            phonetic: "/rɪˈzɪliənt/".into(),
            ..Vocabulary::default()
        };
        NovelDb::from_parts(Vec::new(), Vec::new(), Vec::new(), vec![("Resilient".to_string(), entry)])
    }

    #[test]
    fn table_wins_case_insensitively() {
        let found = resolve_word(&db(), "RESILIENT", Some("ignored")).unwrap();
        assert_eq!(found.source, WordSource::Vocabulary);
        assert_eq!(found.vocabulary.phonetic, "/rɪˈzɪliənt/");
    }

    #[test]
    fn inline_meaning_is_the_fallback() {
        let found = resolve_word(&db(), "enigma", Some(" 谜 ")).unwrap();
        assert_eq!(found.source, WordSource::Inline);
        assert_eq!(found.vocabulary.word, "enigma");
        assert_eq!(found.vocabulary.meaning, "谜");
        assert!(found.vocabulary.is_fallback());
    }

    #[test]
    fn nothing_resolves_without_meaning() {
        assert!(resolve_word(&db(), "enigma", None).is_none());
        assert!(resolve_word(&db(), "enigma", Some("  ")).is_none());
        assert!(resolve_word(&db(), " ", Some("x")).is_none());
    }
}
