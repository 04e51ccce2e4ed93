use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use novel_annotations::{AnnotationParser, BoldPolicy, Segment};
use novel_db::NovelDb;
use novel_types::{Book, Category, Chapter};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::access::{self, AccessCodeStore, AccessError, ValidateRequest};
use crate::coverage::{self, CoverageReport};
use crate::progress::ReadingProgress;
use crate::session::{AuthSession, SessionStore};
use crate::words::resolve_word;

const CATALOG_CACHE: &str = "private, max-age=300";

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<NovelDb>,
    pub parser: Arc<AnnotationParser>,
    pub access_codes: Arc<dyn AccessCodeStore>,
    pub sessions: Arc<SessionStore>,
    pub progress: ReadingProgress,
    pub disable_cache: bool,
}

impl AppState {
    /// Default parser, fresh session table and in-memory progress.
    pub fn new(db: Arc<NovelDb>, access_codes: Arc<dyn AccessCodeStore>) -> Self {
        Self {
            db,
            parser: Arc::new(AnnotationParser::default()),
            access_codes,
            sessions: Arc::new(SessionStore::new()),
            progress: ReadingProgress::in_memory(),
            disable_cache: false,
        }
    }
}

#[derive(Deserialize)]
pub struct LibraryQuery {
    pub category: Option<String>,
}

#[derive(Deserialize)]
pub struct WordQuery {
    pub meaning: Option<String>,
}

#[derive(Deserialize)]
pub struct SaveProgress {
    pub chapter_id: String,
}

#[derive(Deserialize)]
pub struct ParseRequest {
    pub content: String,
    #[serde(default)]
    pub bold: Option<BoldPolicy>,
}

#[derive(Serialize)]
struct ValidateResponse {
    success: bool,
    message: &'static str,
    token: String,
    code: String,
    expires_at: u64,
    usage_count: u64,
    is_bound: bool,
    bound_user_email: Option<String>,
    bound_user_phone: Option<String>,
}

#[derive(Serialize)]
struct BookSummary<'a> {
    id: &'a str,
    title: &'a str,
    author: &'a str,
    cover_color: &'a str,
    category: &'a str,
    chapter_count: usize,
}

#[derive(Serialize)]
struct ChapterSummary<'a> {
    id: &'a str,
    title: &'a str,
    chapter_num: Option<u32>,
}

impl<'a> From<&'a Chapter> for ChapterSummary<'a> {
    fn from(chapter: &'a Chapter) -> Self {
        Self {
            id: &chapter.id,
            title: &chapter.title,
            chapter_num: chapter.chapter_num,
        }
    }
}

#[derive(Serialize)]
struct CategoriesResponse<'a> {
    categories: &'a [Category],
}

#[derive(Serialize)]
struct LibraryResponse<'a> {
    category: Option<&'a str>,
    books: Vec<BookSummary<'a>>,
}

#[derive(Serialize)]
struct BookResponse<'a> {
    book: BookSummary<'a>,
    chapters: Vec<ChapterSummary<'a>>,
}

#[derive(Serialize)]
struct PositionView<'a> {
    number: usize,
    total: usize,
    prev: Option<ChapterSummary<'a>>,
    next: Option<ChapterSummary<'a>>,
}

#[derive(Serialize)]
struct ChapterResponse<'a> {
    book_id: &'a str,
    chapter: ChapterSummary<'a>,
    segments: Vec<Segment>,
    word_count: usize,
    position: PositionView<'a>,
}

#[derive(Serialize)]
struct ProgressResponse<'a> {
    book_id: &'a str,
    chapter: Option<ChapterSummary<'a>>,
}

#[derive(Serialize)]
struct ParseResponse {
    normalized: String,
    segments: Vec<Segment>,
    word_count: usize,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    requires_user_info: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_bound: Option<bool>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/robots.txt", get(robots))
        .route("/healthz", get(healthz))
        .route("/v1/access/validate", post(validate_access))
        .route("/v1/session", delete(end_session))
        .route("/v1/annotations/parse", post(parse_annotations))
        .route("/v1/categories", get(categories))
        .route("/v1/library", get(library))
        .route("/v1/books/{book_id}", get(book))
        .route("/v1/books/{book_id}/chapters/{chapter_id}", get(chapter))
        .route(
            "/v1/books/{book_id}/progress",
            get(current_progress).put(save_progress).delete(clear_progress),
        )
        .route("/v1/books/{book_id}/coverage", get(book_coverage))
        .route("/v1/coverage", get(library_coverage))
        .route("/v1/words/{word}", get(lookup_word))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    "ok"
}

async fn robots(State(state): State<AppState>) -> Response {
    let body = "User-agent: *\nDisallow: /";
    if state.disable_cache {
        return body.into_response();
    }
    (
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            ),
            (
                header::CACHE_CONTROL,
                HeaderValue::from_static("public, max-age=86400, immutable"),
            ),
        ],
        body,
    )
        .into_response()
}

async fn validate_access(
    State(state): State<AppState>,
    payload: Result<Json<ValidateRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let now = access::unix_now();
    let validation = access::validate(state.access_codes.as_ref(), &request, now)?;
    let session = state.sessions.create(
        &validation.code.code,
        &validation.identity,
        validation.code.expires_at,
        now,
    );
    info!(
        "access code {} verified (newly bound: {})",
        validation.code.id, validation.newly_bound
    );

    let code = validation.code;
    let response = ValidateResponse {
        success: true,
        message: if validation.newly_bound {
            "access code bound to your account"
        } else {
            "access code verified"
        },
        token: session.token,
        code: code.code,
        expires_at: code.expires_at,
        usage_count: code.usage_count,
        is_bound: true,
        bound_user_email: code.bound_user_email,
        bound_user_phone: code.bound_user_phone,
    };
    Ok(Json(response).into_response())
}

async fn end_session(State(state): State<AppState>, AuthSession(session): AuthSession) -> StatusCode {
    state.sessions.revoke(&session.token);
    StatusCode::NO_CONTENT
}

async fn parse_annotations(
    State(state): State<AppState>,
    payload: Result<Json<ParseRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let parsed = match request.bold {
        Some(policy) if policy != state.parser.policy() => {
            AnnotationParser::new(policy).parse_content(&request.content)
        }
        _ => state.parser.parse_content(&request.content),
    };
    let word_count = parsed.word_count();
    Ok(Json(ParseResponse {
        normalized: parsed.normalized,
        segments: parsed.segments,
        word_count,
    })
    .into_response())
}

async fn categories(State(state): State<AppState>, _auth: AuthSession) -> Response {
    let response = CategoriesResponse {
        categories: state.db.categories(),
    };
    catalog_response(&state, response)
}

async fn library(
    State(state): State<AppState>,
    _auth: AuthSession,
    Query(params): Query<LibraryQuery>,
) -> Result<Response, ApiError> {
    let db = &state.db;
    let category = params
        .category
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());
    if let Some(category) = category
        && !db.categories().is_empty()
        && !db.categories().iter().any(|c| c.id == category)
    {
        return Err(ApiError::bad_request(format!("unknown category {category}")));
    }

    let books = db.books(category).map(|b| book_summary(db, b)).collect();
    Ok(catalog_response(&state, LibraryResponse { category, books }))
}

async fn book(
    State(state): State<AppState>,
    _auth: AuthSession,
    Path(book_id): Path<String>,
) -> Result<Response, ApiError> {
    let db = &state.db;
    let book = find_book(db, &book_id)?;
    let response = BookResponse {
        book: book_summary(db, book),
        chapters: db
            .reading_order(&book.id)
            .into_iter()
            .map(ChapterSummary::from)
            .collect(),
    };
    Ok(catalog_response(&state, response))
}

async fn chapter(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    Path((book_id, chapter_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let db = &state.db;
    find_book(db, &book_id)?;
    let not_found = || ApiError::not_found(format!("chapter {chapter_id} not found in book {book_id}"));
    let position = db.position(&book_id, &chapter_id).ok_or_else(not_found)?;
    let chapter = db.chapter(&chapter_id).ok_or_else(not_found)?;

    let parsed = state.parser.parse_content(&chapter.content);
    let word_count = parsed.word_count();
    state.progress.save(&session.identity, &book_id, &chapter.id);

    let response = ChapterResponse {
        book_id: &book_id,
        chapter: ChapterSummary::from(chapter),
        segments: parsed.segments,
        word_count,
        position: PositionView {
            number: position.number,
            total: position.total,
            prev: position.prev.map(ChapterSummary::from),
            next: position.next.map(ChapterSummary::from),
        },
    };
    Ok(Json(response).into_response())
}

async fn current_progress(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    Path(book_id): Path<String>,
) -> Result<Response, ApiError> {
    let db = &state.db;
    find_book(db, &book_id)?;
    let chapter = state.progress.current(db, &session.identity, &book_id);
    Ok(Json(ProgressResponse {
        book_id: &book_id,
        chapter: chapter.map(ChapterSummary::from),
    })
    .into_response())
}

async fn save_progress(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    Path(book_id): Path<String>,
    payload: Result<Json<SaveProgress>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let db = &state.db;
    find_book(db, &book_id)?;
    let chapter_id = request.chapter_id.trim();
    let chapter = db
        .position(&book_id, chapter_id)
        .and_then(|_| db.chapter(chapter_id))
        .ok_or_else(|| {
            ApiError::not_found(format!("chapter {chapter_id} not found in book {book_id}"))
        })?;
    state.progress.save(&session.identity, &book_id, &chapter.id);
    Ok(Json(ProgressResponse {
        book_id: &book_id,
        chapter: Some(ChapterSummary::from(chapter)),
    })
    .into_response())
}

async fn clear_progress(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    Path(book_id): Path<String>,
) -> StatusCode {
    state.progress.clear(&session.identity, &book_id);
    StatusCode::NO_CONTENT
}

async fn lookup_word(
    State(state): State<AppState>,
    _auth: AuthSession,
    Path(word): Path<String>,
    Query(params): Query<WordQuery>,
) -> Response {
    match resolve_word(&state.db, &word, params.meaning.as_deref()) {
        Some(found) => catalog_response(&state, found),
        None => {
            debug!("no vocabulary entry or inline meaning for {word:?}");
            StatusCode::NO_CONTENT.into_response()
        }
    }
}

async fn book_coverage(
    State(state): State<AppState>,
    _auth: AuthSession,
    Path(book_id): Path<String>,
) -> Result<Response, ApiError> {
    let db = Arc::clone(&state.db);
    let parser = Arc::clone(&state.parser);
    let report = run_blocking(move || coverage::book_coverage(&db, &parser, &book_id).ok_or(book_id))
        .await?
        .map_err(|book_id| ApiError::not_found(format!("book {book_id} not found")))?;
    Ok(catalog_response(&state, report))
}

async fn library_coverage(State(state): State<AppState>, _auth: AuthSession) -> Result<Response, ApiError> {
    let db = Arc::clone(&state.db);
    let parser = Arc::clone(&state.parser);
    let report: CoverageReport = run_blocking(move || coverage::library_coverage(&db, &parser)).await?;
    Ok(catalog_response(&state, report))
}

/// Whole-catalog scans parse every chapter; keep them off the async workers.
async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|err| {
        error!("blocking task failed: {err}");
        ApiError::Internal
    })
}

fn find_book<'a>(db: &'a NovelDb, book_id: &str) -> Result<&'a Book, ApiError> {
    db.book(book_id)
        .ok_or_else(|| ApiError::not_found(format!("book {book_id} not found")))
}

fn book_summary<'a>(db: &NovelDb, book: &'a Book) -> BookSummary<'a> {
    BookSummary {
        id: &book.id,
        title: &book.title,
        author: &book.author,
        cover_color: &book.cover_color,
        category: &book.category,
        chapter_count: db.reading_order(&book.id).len(),
    }
}

fn catalog_response<T: Serialize>(state: &AppState, body: T) -> Response {
    if state.disable_cache {
        return Json(body).into_response();
    }
    (
        [(header::CACHE_CONTROL, HeaderValue::from_static(CATALOG_CACHE))],
        Json(body),
    )
        .into_response()
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error("internal server error")]
    Internal,
}

impl ApiError {
    pub fn bad_request<T: Into<String>>(msg: T) -> Self {
        ApiError::BadRequest(msg.into())
    }

    pub fn unauthorized<T: Into<String>>(msg: T) -> Self {
        ApiError::Unauthorized(msg.into())
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        ApiError::NotFound(msg.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Access(err) => match err {
                AccessError::MissingCode | AccessError::MissingIdentity => StatusCode::BAD_REQUEST,
                AccessError::Invalid => StatusCode::UNAUTHORIZED,
                AccessError::Revoked | AccessError::Expired | AccessError::BoundToOther => {
                    StatusCode::FORBIDDEN
                }
                AccessError::Bind(_) | AccessError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("request failed: {self}");
            return (status, Json(json!({ "error": "internal server error" }))).into_response();
        }
        let body = match &self {
            ApiError::Access(err) => ErrorResponse {
                error: err.to_string(),
                requires_user_info: err.requires_user_info().then_some(true),
                is_bound: matches!(err, AccessError::BoundToOther).then_some(true),
            },
            other => ErrorResponse {
                error: other.to_string(),
                requires_user_info: None,
                is_bound: None,
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;

    use super::*;
    use crate::access::StoreError;

    async fn render(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn store_failures_render_without_detail() {
        let err = AccessError::Bind(StoreError::Unavailable("replica db-3 refused".into()));
        let (status, body) = render(ApiError::from(err)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "error": "internal server error" }));

        let (status, body) = render(ApiError::from(AccessError::Store(StoreError::NotFound("7".into())))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body["error"].as_str().unwrap_or_default().contains('7'));
    }

    #[tokio::test]
    async fn access_failures_carry_prompt_flags() {
        let (status, body) = render(ApiError::from(AccessError::BoundToOther)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["is_bound"], true);
        assert_eq!(body["requires_user_info"], true);

        let (status, body) = render(ApiError::from(AccessError::Invalid)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.get("is_bound").is_none());
    }
}
