pub mod access;
pub mod coverage;
pub mod handlers;
pub mod progress;
pub mod rate_limit;
pub mod session;
pub mod words;

pub use access::{AccessCodeStore, MemoryAccessCodes};
pub use handlers::{AppState, router};
pub use progress::{KeyValueStore, MemoryStore, ReadingProgress};
pub use session::{AuthSession, Session, SessionStore};
pub use words::resolve_word;
