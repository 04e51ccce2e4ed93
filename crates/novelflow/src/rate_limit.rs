use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::Json;
use axum::http::{HeaderName, Request, Response, StatusCode};
use axum::response::IntoResponse;
use dashmap::DashMap;
use serde_json::json;
use tower::{Layer, Service};
use tracing::warn;

const LOG_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_CLIENT_HEADER: &str = "fly-client-ip";

#[derive(Clone)]
pub struct RateLimiter<S> {
    inner: S,
    shared: Arc<Shared>,
    client_header: HeaderName,
    quota: Quota,
}

/// Refill rate and bucket capacity, in requests.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Quota {
    per_sec: f64,
    burst: f64,
}

struct Shared {
    buckets: DashMap<String, Bucket>,
    drops: DropCounter,
}

#[derive(Clone, Copy, Debug)]
struct Bucket {
    tokens: f64,
    seen: Instant,
}

impl Bucket {
    fn full(quota: Quota, now: Instant) -> Self {
        Self {
            tokens: quota.burst,
            seen: now,
        }
    }

    /// Credit the time since the last visit, then spend one token if available.
    fn take(&mut self, quota: Quota, now: Instant) -> bool {
        let idle = now.saturating_duration_since(self.seen).as_secs_f64();
        self.seen = self.seen.max(now);
        self.tokens = quota.burst.min(self.tokens + idle * quota.per_sec);
        let admitted = self.tokens >= 1.0;
        if admitted {
            self.tokens -= 1.0;
        }
        admitted
    }
}

/// Rejections are counted and reported at most once per `LOG_INTERVAL`.
struct DropCounter {
    pending: AtomicU64,
    reported_at: Mutex<Instant>,
}

impl DropCounter {
    fn new(now: Instant) -> Self {
        Self {
            pending: AtomicU64::new(0),
            reported_at: Mutex::new(now),
        }
    }

    fn record(&self, now: Instant) {
        self.pending.fetch_add(1, Ordering::Relaxed);
        // Another request is already reporting.
        let Ok(mut reported_at) = self.reported_at.try_lock() else {
            return;
        };
        if now.saturating_duration_since(*reported_at) < LOG_INTERVAL {
            return;
        }
        *reported_at = now;
        match self.pending.swap(0, Ordering::Relaxed) {
            0 => {}
            n => warn!("rate limiter rejected {n} requests since the last report"),
        }
    }
}

/// Per-client token bucket keyed by a proxy-supplied header. Requests
/// without the header are not limited.
#[derive(Clone)]
pub struct RateLimiterLayer {
    quota: Quota,
    client_header: HeaderName,
}

impl RateLimiterLayer {
    pub fn new(rate_per_sec: u32, burst: u32) -> Self {
        Self {
            quota: Quota {
                per_sec: f64::from(rate_per_sec),
                burst: f64::from(burst),
            },
            client_header: HeaderName::from_static(DEFAULT_CLIENT_HEADER),
        }
    }

    pub fn with_client_header(mut self, header: HeaderName) -> Self {
        self.client_header = header;
        self
    }
}

impl<S> Layer<S> for RateLimiterLayer {
    type Service = RateLimiter<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimiter {
            inner,
            shared: Arc::new(Shared {
                buckets: DashMap::new(),
                drops: DropCounter::new(Instant::now()),
            }),
            client_header: self.client_header.clone(),
            quota: self.quota,
        }
    }
}

impl<S, ReqBody> Service<Request<ReqBody>> for RateLimiter<S>
where
    S: Service<Request<ReqBody>, Response = Response<axum::body::Body>> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let now = Instant::now();
        let admitted = self
            .client_key(&req)
            .is_none_or(|client| self.admit(client, now));
        if !admitted {
            self.shared.drops.record(now);
            return Box::pin(async {
                let body = Json(json!({ "error": "rate limited" }));
                Ok((StatusCode::TOO_MANY_REQUESTS, body).into_response())
            });
        }
        Box::pin(self.inner.call(req))
    }
}

impl<S> RateLimiter<S> {
    fn client_key<'r, B>(&self, req: &'r Request<B>) -> Option<&'r str> {
        req.headers()
            .get(&self.client_header)?
            .to_str()
            .ok()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    fn admit(&self, client: &str, now: Instant) -> bool {
        if let Some(mut bucket) = self.shared.buckets.get_mut(client) {
            return bucket.take(self.quota, now);
        }
        self.shared
            .buckets
            .entry(client.to_owned())
            .or_insert_with(|| Bucket::full(self.quota, now))
            .take(self.quota, now)
    }
}
