//! Last-read chapter per reader and book.

use std::sync::Arc;

use dashmap::DashMap;
use novel_db::NovelDb;
use novel_types::Chapter;
use tracing::debug;

const KEY_PREFIX: &str = "novelflow:lastReadChapterId";

/// String key/value persistence; stands in for browser local storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
    fn remove(&self, key: &str) -> Option<String>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|v| v.clone())
    }

    fn set(&self, key: &str, value: String) {
        self.entries.insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) -> Option<String> {
        self.entries.remove(key).map(|(_, v)| v)
    }
}

pub fn progress_key(identity: &str, book_id: &str) -> String {
    format!("{KEY_PREFIX}:{identity}:{book_id}")
}

#[derive(Clone)]
pub struct ReadingProgress {
    store: Arc<dyn KeyValueStore>,
}

impl ReadingProgress {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Raw saved chapter id, unvalidated.
    pub fn saved(&self, identity: &str, book_id: &str) -> Option<String> {
        self.store.get(&progress_key(identity, book_id))
    }

    /// Saved chapter when it is still in the book's reading order, else the
    /// book's first chapter. A stale entry is dropped.
    pub fn current<'a>(&self, db: &'a NovelDb, identity: &str, book_id: &str) -> Option<&'a Chapter> {
        let key = progress_key(identity, book_id);
        if let Some(saved) = self.store.get(&key) {
            if db.position(book_id, &saved).is_some() {
                return db.chapter(&saved);
            }
            debug!("dropping stale progress {saved} for book {book_id}");
            self.store.remove(&key);
        }
        db.first_chapter(book_id)
    }

    pub fn save(&self, identity: &str, book_id: &str, chapter_id: &str) {
        self.store
            .set(&progress_key(identity, book_id), chapter_id.to_string());
    }

    pub fn clear(&self, identity: &str, book_id: &str) {
        self.store.remove(&progress_key(identity, book_id));
    }
}
