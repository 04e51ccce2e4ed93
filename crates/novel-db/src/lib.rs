//! Load the static novel library and expose read-only lookup tables.
//!
//! A library directory holds the JSON produced by the content pipeline:
//! - `library.json`: `{ "categories": [...], "books": [...] }` (required);
//! - `book-*.json`: one chapter per file, tagged with `book_id` and `chapter_num`;
//! - `vocab_db.json`: `{ "word": Vocabulary, ... }` (optional).
//!
//! Files are read through memory maps or owned buffers, chosen at runtime via
//! [`LoadMode`], and decoded with `serde_json`. Once loaded the catalog is
//! immutable, so it can be shared behind an `Arc` without locking.
//!
//! # Example
//! ```no_run
//! use novel_db::{LoadMode, NovelDb};
//!
//! # fn main() -> anyhow::Result<()> {
//! let db = NovelDb::load_with_mode("/path/to/library", LoadMode::Mmap)?;
//! for book in db.books(Some("reborn")) {
//!     let first = db.first_chapter(&book.id);
//!     println!("{}: {:?}", book.title, first.map(|c| &c.title));
//! }
//! assert!(db.vocabulary("Ambitious").is_some() == db.vocabulary("ambitious").is_some());
//! # Ok(()) }
//! ```

use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use memmap2::Mmap;
use novel_types::{Book, Category, Chapter, Vocabulary};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{info, warn};

const LIBRARY_FILE: &str = "library.json";
const VOCAB_FILE: &str = "vocab_db.json";
const CHAPTER_PREFIX: &str = "book-";

/// Strategy for reading catalog files.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LoadMode {
    /// Memory-map each file.
    Mmap,
    /// Read each file into an owned buffer (portable fallback).
    Owned,
}

enum Buffer {
    Mmap(Mmap),
    Owned(Vec<u8>),
}

impl Buffer {
    fn as_slice(&self) -> &[u8] {
        match self {
            Buffer::Mmap(m) => m.as_ref(),
            Buffer::Owned(v) => v.as_slice(),
        }
    }
}

#[derive(Deserialize)]
struct LibraryFile {
    #[serde(default)]
    categories: Vec<Category>,
    #[serde(default)]
    books: Vec<Book>,
}

/// Where a chapter sits within its reading order.
#[derive(Clone, Copy, Debug)]
pub struct ChapterPosition<'a> {
    pub prev: Option<&'a Chapter>,
    pub next: Option<&'a Chapter>,
    /// 1-based.
    pub number: usize,
    pub total: usize,
}

/// Immutable catalog of categories, books, chapters and vocabulary.
#[derive(Debug, Default)]
pub struct NovelDb {
    categories: Vec<Category>,
    books: Vec<Book>,
    book_index: HashMap<String, usize>,
    chapters: Vec<Chapter>,
    chapter_index: HashMap<String, usize>,
    chapters_by_book: HashMap<String, Vec<usize>>,
    vocab: HashMap<String, Vocabulary>,
    vocab_words: Vec<String>,
}

impl NovelDb {
    /// Load a library directory using memory maps.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        Self::load_with_mode(dir, LoadMode::Mmap)
    }

    pub fn load_with_mode(dir: impl AsRef<Path>, mode: LoadMode) -> Result<Self> {
        let dir = dir.as_ref();
        let library_path = dir.join(LIBRARY_FILE);
        if !library_path.exists() {
            anyhow::bail!("missing required library file: {}", library_path.display());
        }
        let library: LibraryFile = decode(&load_file(library_path, mode)?, LIBRARY_FILE)?;

        let mut chapters = Vec::new();
        for path in chapter_files(dir)? {
            let name = path.display().to_string();
            let chapter: Chapter = decode(&load_file(path, mode)?, &name)?;
            chapters.push(chapter);
        }

        let vocab: HashMap<String, Vocabulary> =
            match load_optional_file(dir.join(VOCAB_FILE), mode)? {
                Some(buffer) => decode(&buffer, VOCAB_FILE)?,
                None => {
                    warn!("no {VOCAB_FILE} in {}; word lookups fall back to inline meanings", dir.display());
                    HashMap::new()
                }
            };

        let db = Self::from_parts(library.categories, library.books, chapters, vocab);
        info!(
            "library loaded: {} books, {} chapters, {} vocabulary entries",
            db.books.len(),
            db.chapters.len(),
            db.vocab.len()
        );
        Ok(db)
    }

    /// Build a catalog from already-decoded records.
    pub fn from_parts(
        categories: Vec<Category>,
        books: Vec<Book>,
        chapters: impl IntoIterator<Item = Chapter>,
        vocab: impl IntoIterator<Item = (String, Vocabulary)>,
    ) -> Self {
        let mut book_index = HashMap::new();
        for (idx, book) in books.iter().enumerate() {
            if book_index.insert(book.id.clone(), idx).is_some() {
                warn!("duplicate book id {}; keeping the last entry", book.id);
            }
        }

        let mut seen = HashSet::new();
        let mut chapters: Vec<Chapter> = chapters
            .into_iter()
            .filter(|ch| {
                if ch.id.trim().is_empty() {
                    warn!("skipping chapter without id (title: {:?})", ch.title);
                    return false;
                }
                if !seen.insert(ch.id.clone()) {
                    warn!("duplicate chapter id {}; keeping the first file", ch.id);
                    return false;
                }
                true
            })
            .collect();
        chapters.sort_by(|a, b| a.order_key().cmp(&b.order_key()));

        let mut chapter_index = HashMap::new();
        let mut chapters_by_book: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, chapter) in chapters.iter().enumerate() {
            chapter_index.insert(chapter.id.clone(), idx);
            if let Some(book_id) = &chapter.book_id {
                chapters_by_book.entry(book_id.clone()).or_default().push(idx);
            }
        }

        let vocab: HashMap<String, Vocabulary> = vocab
            .into_iter()
            .map(|(key, value)| (normalize_word(&key), value))
            .filter(|(key, _)| !key.is_empty())
            .collect();
        let mut vocab_words: Vec<String> = vocab.keys().cloned().collect();
        vocab_words.sort();

        Self {
            categories,
            books,
            book_index,
            chapters,
            chapter_index,
            chapters_by_book,
            vocab,
            vocab_words,
        }
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Books in shelf order, optionally restricted to one category.
    pub fn books<'a>(&'a self, category: Option<&'a str>) -> impl Iterator<Item = &'a Book> + 'a {
        self.books
            .iter()
            .filter(move |b| category.is_none_or(|c| b.category == c))
    }

    pub fn book(&self, id: &str) -> Option<&Book> {
        self.book_index.get(id).map(|idx| &self.books[*idx])
    }

    pub fn chapter(&self, id: &str) -> Option<&Chapter> {
        self.chapter_index.get(id).map(|idx| &self.chapters[*idx])
    }

    /// Every chapter, ordered by chapter number.
    pub fn all_chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    /// Chapters tagged with `book_id`, ordered by chapter number.
    pub fn chapters_for_book(&self, book_id: &str) -> Vec<&Chapter> {
        self.chapters_by_book
            .get(book_id)
            .map(|ids| ids.iter().map(|idx| &self.chapters[*idx]).collect())
            .unwrap_or_default()
    }

    /// The book's chapters, or the whole catalog when the book has none of its own.
    pub fn reading_order(&self, book_id: &str) -> Vec<&Chapter> {
        let own = self.chapters_for_book(book_id);
        if own.is_empty() {
            self.chapters.iter().collect()
        } else {
            own
        }
    }

    /// First chapter of the book, falling back to the catalog default.
    pub fn first_chapter(&self, book_id: &str) -> Option<&Chapter> {
        self.chapters_for_book(book_id)
            .first()
            .copied()
            .or_else(|| self.default_chapter())
    }

    pub fn default_chapter(&self) -> Option<&Chapter> {
        self.chapters.first()
    }

    pub fn position(&self, book_id: &str, chapter_id: &str) -> Option<ChapterPosition<'_>> {
        let order = self.reading_order(book_id);
        let idx = order.iter().position(|c| c.id == chapter_id)?;
        Some(ChapterPosition {
            prev: idx.checked_sub(1).map(|i| order[i]),
            next: order.get(idx + 1).copied(),
            number: idx + 1,
            total: order.len(),
        })
    }

    /// Case-insensitive vocabulary lookup.
    pub fn vocabulary(&self, word: &str) -> Option<&Vocabulary> {
        let key = normalize_word(word);
        if key.is_empty() {
            return None;
        }
        self.vocab.get(&key)
    }

    /// Lowercased vocabulary keys, sorted.
    pub fn vocabulary_words(&self) -> &[String] {
        &self.vocab_words
    }

    pub fn vocabulary_count(&self) -> usize {
        self.vocab.len()
    }
}

fn chapter_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("list {}", dir.display()))? {
        let entry = entry.with_context(|| format!("list {}", dir.display()))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(CHAPTER_PREFIX) && name.ends_with(".json") {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

fn decode<T: DeserializeOwned>(buffer: &Buffer, name: &str) -> Result<T> {
    serde_json::from_slice(buffer.as_slice()).with_context(|| format!("parse {name}"))
}

fn load_file(path: PathBuf, mode: LoadMode) -> Result<Buffer> {
    let mut file = File::open(&path).with_context(|| format!("open {}", path.display()))?;
    let len = file
        .metadata()
        .with_context(|| format!("stat {}", path.display()))?
        .len();
    match mode {
        // Zero-length maps are rejected by the OS.
        LoadMode::Mmap if len > 0 => unsafe { Mmap::map(&file) }
            .map(Buffer::Mmap)
            .with_context(|| format!("mmap {}", path.display())),
        _ => {
            let mut buf = Vec::with_capacity(len as usize);
            file.read_to_end(&mut buf)
                .with_context(|| format!("read {}", path.display()))?;
            Ok(Buffer::Owned(buf))
        }
    }
}

fn load_optional_file(path: PathBuf, mode: LoadMode) -> Result<Option<Buffer>> {
    if !path.exists() {
        return Ok(None);
    }
    load_file(path, mode).map(Some)
}

fn normalize_word(word: &str) -> String {
    word.trim().to_lowercase()
}
