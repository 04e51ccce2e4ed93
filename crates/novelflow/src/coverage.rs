//! How much of the vocabulary table the chapters actually annotate.
//!
//! One bit per vocabulary word (in `NovelDb::vocabulary_words` order). A
//! chapter scan sets the bit of every annotated word found in the table and
//! collects the ones that are not; book scans are OR-ed into the library total.

use std::collections::BTreeSet;

use bitvec::prelude::*;
use novel_annotations::AnnotationParser;
use novel_db::NovelDb;
use novel_types::Chapter;
use serde::Serialize;

type BitSet = BitVec<usize, Lsb0>;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CoverageReport {
    pub chapters: usize,
    /// Every marker occurrence, repeats included.
    pub total_markers: usize,
    pub unique_words: usize,
    pub vocabulary_size: usize,
    pub covered: usize,
    /// `covered / vocabulary_size`, 0 for an empty table.
    pub coverage: f64,
    /// Annotated words with no vocabulary card.
    pub missing_from_vocabulary: Vec<String>,
    /// Vocabulary words never annotated in scope.
    pub unused_vocabulary: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub books: Vec<BookCoverage>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct BookCoverage {
    pub book_id: String,
    pub title: String,
    pub chapters: usize,
    pub unique_words: usize,
    pub covered: usize,
}

struct CoverageScan<'a> {
    vocab: &'a [String],
    covered: BitSet,
    words: BTreeSet<String>,
    markers: usize,
    chapters: usize,
}

impl<'a> CoverageScan<'a> {
    fn new(db: &'a NovelDb) -> Self {
        let vocab = db.vocabulary_words();
        Self {
            vocab,
            covered: bitvec![usize, Lsb0; 0; vocab.len()],
            words: BTreeSet::new(),
            markers: 0,
            chapters: 0,
        }
    }

    fn add_chapter(&mut self, parser: &AnnotationParser, chapter: &Chapter) {
        self.chapters += 1;
        for (word, _) in parser.word_markers(&chapter.content) {
            let key = word.trim().to_lowercase();
            if key.is_empty() {
                continue;
            }
            self.markers += 1;
            if let Ok(idx) = self.vocab.binary_search(&key) {
                self.covered.set(idx, true);
            }
            self.words.insert(key);
        }
    }

    fn merge(&mut self, other: &CoverageScan<'_>) {
        self.covered |= &other.covered;
        self.words.extend(other.words.iter().cloned());
        self.markers += other.markers;
        self.chapters += other.chapters;
    }

    fn report(self, books: Vec<BookCoverage>) -> CoverageReport {
        let covered = self.covered.count_ones();
        let vocabulary_size = self.vocab.len();
        let coverage = if vocabulary_size == 0 {
            0.0
        } else {
            covered as f64 / vocabulary_size as f64
        };
        let missing_from_vocabulary = self
            .words
            .iter()
            .filter(|w| self.vocab.binary_search(w).is_err())
            .cloned()
            .collect();
        let unused_vocabulary = self
            .covered
            .iter_zeros()
            .filter_map(|idx| self.vocab.get(idx).cloned())
            .collect();
        CoverageReport {
            chapters: self.chapters,
            total_markers: self.markers,
            unique_words: self.words.len(),
            vocabulary_size,
            covered,
            coverage,
            missing_from_vocabulary,
            unused_vocabulary,
            books,
        }
    }
}

/// Coverage of one book's own chapters; `None` for an unknown book.
pub fn book_coverage(db: &NovelDb, parser: &AnnotationParser, book_id: &str) -> Option<CoverageReport> {
    db.book(book_id)?;
    let mut scan = CoverageScan::new(db);
    for chapter in db.chapters_for_book(book_id) {
        scan.add_chapter(parser, chapter);
    }
    Some(scan.report(Vec::new()))
}

/// Whole-library coverage with a per-book breakdown. Chapters without a
/// known book count toward the total only.
pub fn library_coverage(db: &NovelDb, parser: &AnnotationParser) -> CoverageReport {
    let mut total = CoverageScan::new(db);
    let mut books = Vec::new();
    for book in db.books(None) {
        let mut scan = CoverageScan::new(db);
        for chapter in db.chapters_for_book(&book.id) {
            scan.add_chapter(parser, chapter);
        }
        books.push(BookCoverage {
            book_id: book.id.clone(),
            title: book.title.clone(),
            chapters: scan.chapters,
            unique_words: scan.words.len(),
            covered: scan.covered.count_ones(),
        });
        total.merge(&scan);
    }
    let orphans = db
        .all_chapters()
        .iter()
        .filter(|c| c.book_id.as_deref().is_none_or(|b| db.book(b).is_none()));
    for chapter in orphans {
        total.add_chapter(parser, chapter);
    }
    total.report(books)
}

#[cfg(test)]
mod tests {
    use novel_types::{Book, Vocabulary};

    use super::*;

    fn chapter(id: &str, book: Option<&str>, content: &str) -> Chapter {
        Chapter {
            id: id.into(),
            content: content.into(),
            book_id: book.map(str::to_string),
            ..Chapter::default()
        }
    }

    fn vocab(word: &str) -> (String, Vocabulary) {
        (word.to_string(), Vocabulary::from_inline(word, "x"))
    }

    fn db() -> NovelDb {
        let books = vec![
            Book {
                id: "b1".into(),
                title: "One".into(),
                ..Book::default()
            },
            Book {
                id: "b2".into(),
                title: "Two".into(),
                ..Book::default()
            },
        ];
        NovelDb::from_parts(
            Vec::new(),
            books,
            vec![
                chapter("c1", Some("b1"), "{Dog|狗} and {cat|猫} and {dog|狗}"),
                chapter("c2", Some("b2"), "{bird|鸟} {owl|猫头鹰}"),
                chapter("c3", None, "{fish|鱼}"),
            ],
            vec![vocab("dog"), vocab("cat"), vocab("bird"), vocab("fish"), vocab("horse")],
        )
    }

    #[test]
    fn book_report_counts_markers_and_gaps() {
        let report = book_coverage(&db(), &AnnotationParser::default(), "b1").unwrap();
        assert_eq!(report.chapters, 1);
        assert_eq!(report.total_markers, 3);
        assert_eq!(report.unique_words, 2);
        assert_eq!(report.covered, 2);
        assert_eq!(report.vocabulary_size, 5);
        assert!(report.missing_from_vocabulary.is_empty());
        assert_eq!(report.unused_vocabulary, vec!["bird", "fish", "horse"]);
        assert!((report.coverage - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_book_has_no_report() {
        assert!(book_coverage(&db(), &AnnotationParser::default(), "nope").is_none());
    }

    #[test]
    fn library_report_unions_books_and_orphans() {
        let report = library_coverage(&db(), &AnnotationParser::default());
        assert_eq!(report.chapters, 3);
        assert_eq!(report.total_markers, 6);
        assert_eq!(report.covered, 4);
        assert_eq!(report.missing_from_vocabulary, vec!["owl"]);
        assert_eq!(report.unused_vocabulary, vec!["horse"]);
        assert_eq!(report.books.len(), 2);
        assert_eq!(report.books[1].book_id, "b2");
        assert_eq!(report.books[1].covered, 1);
        assert_eq!(report.books[1].unique_words, 2);
    }
}
