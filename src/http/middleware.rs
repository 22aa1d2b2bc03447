//! Admission middleware.
//!
//! Runs before every rate-limited route: derives the quota key, asks the
//! limiter, and either forwards the request or answers 429 itself.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::HeaderName;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{error, info, warn};

use crate::config::FailurePolicy;
use crate::error::CheckError;
use crate::ratelimit::{Decision, KeyStrategy, MethodPath, RateLimiter};

static LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
static REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// Shared state for [`admit`].
#[derive(Clone)]
pub struct Admission {
    limiter: Arc<RateLimiter>,
    keys: Arc<dyn KeyStrategy>,
    failure_policy: FailurePolicy,
    expose_headers: bool,
}

impl Admission {
    /// Fail-closed admission keyed by method and path.
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self {
            limiter,
            keys: Arc::new(MethodPath),
            failure_policy: FailurePolicy::Closed,
            expose_headers: false,
        }
    }

    pub fn with_key_strategy(mut self, keys: Arc<dyn KeyStrategy>) -> Self {
        self.keys = keys;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Add `x-ratelimit-limit` and `x-ratelimit-remaining` to decided responses.
    pub fn with_headers(mut self, expose: bool) -> Self {
        self.expose_headers = expose;
        self
    }

    fn decorate(&self, headers: &mut HeaderMap, decision: &Decision) {
        if !self.expose_headers {
            return;
        }
        headers.insert(
            LIMIT_HEADER.clone(),
            HeaderValue::from(self.limiter.policy().limit()),
        );
        headers.insert(REMAINING_HEADER.clone(), HeaderValue::from(decision.remaining()));
    }
}

/// Gate one request on its quota.
///
/// Register with `axum::middleware::from_fn_with_state`. A check error is
/// returned to axum as a 5xx unless the failure policy is `Open`. A check
/// that was cancelled mid-flight leaves no decision behind; the next request
/// is always checked again.
pub async fn admit(
    State(admission): State<Admission>,
    request: Request,
    next: Next,
) -> Result<Response, CheckError> {
    let key = admission.keys.quota_key(&request);

    let decision = match admission.limiter.check(&key).await {
        Ok(decision) => decision,
        Err(err) => {
            error!(key = %key, error = %err, "Rate limit check failed");
            return match admission.failure_policy {
                FailurePolicy::Closed => Err(err),
                FailurePolicy::Open => Ok(next.run(request).await),
            };
        }
    };

    if decision.is_allowed() {
        info!(
            key = %key,
            allowed = true,
            remaining = decision.remaining(),
            "Request allowed by rate limiter"
        );

        let mut response = next.run(request).await;
        admission.decorate(response.headers_mut(), &decision);
        Ok(response)
    } else {
        warn!(
            key = %key,
            allowed = false,
            remaining = decision.remaining(),
            "Request not allowed by rate limiter"
        );

        let mut response = StatusCode::TOO_MANY_REQUESTS.into_response();
        admission.decorate(response.headers_mut(), &decision);
        Ok(response)
    }
}

impl IntoResponse for CheckError {
    fn into_response(self) -> Response {
        match self {
            CheckError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE.into_response(),
            CheckError::StoreProtocol(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{MatchedRoute, QuotaPolicy};
    use crate::store::{Acquisition, CounterStore, MemoryStore};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Method;
    use axum::middleware::from_fn_with_state;
    use axum::routing::get;
    use axum::Router;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    struct UnreachableStore;

    #[async_trait]
    impl CounterStore for UnreachableStore {
        async fn acquire(&self, _key: &str, _policy: &QuotaPolicy) -> Result<Acquisition, CheckError> {
            Err(CheckError::StoreUnavailable("connection refused".into()))
        }
    }

    struct GarbageStore;

    #[async_trait]
    impl CounterStore for GarbageStore {
        async fn acquire(&self, _key: &str, _policy: &QuotaPolicy) -> Result<Acquisition, CheckError> {
            Err(CheckError::StoreProtocol("unexpected reply".into()))
        }
    }

    fn memory_admission(limit: u64) -> Admission {
        let limiter = RateLimiter::new(Arc::new(MemoryStore::new()), QuotaPolicy::per_minute(limit));
        Admission::new(Arc::new(limiter))
    }

    fn failing_admission(store: Arc<dyn CounterStore>) -> Admission {
        Admission::new(Arc::new(RateLimiter::new(store, QuotaPolicy::default())))
    }

    /// A router whose handlers count how often they run.
    fn app(admission: Admission, hits: Arc<AtomicUsize>) -> Router {
        let handler = move || {
            let hits = hits.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                "handled"
            }
        };

        Router::new()
            .route("/todos", get(handler.clone()).post(handler.clone()))
            .route("/todos/", get(handler.clone()))
            .route("/todos/{id}", get(handler))
            .layer(from_fn_with_state(admission, admit))
    }

    fn request(method: Method, uri: &str) -> Request {
        axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn send(app: &Router, method: Method, uri: &str) -> Response {
        app.clone().oneshot(request(method, uri)).await.unwrap()
    }

    #[tokio::test]
    async fn test_allowed_request_passes_through_unmodified() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = app(memory_admission(10), hits.clone());

        let response = send(&app, Method::GET, "/todos").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(&REMAINING_HEADER).is_none());
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"handled");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_eleventh_request_is_rejected_with_empty_body() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = app(memory_admission(10), hits.clone());

        for _ in 0..10 {
            assert_eq!(send(&app, Method::GET, "/todos").await.status(), StatusCode::OK);
        }

        let response = send(&app, Method::GET, "/todos").await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().get(&LIMIT_HEADER).is_none());
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body.is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_method_and_path_are_separate_quotas() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = app(memory_admission(2), hits.clone());

        for _ in 0..3 {
            send(&app, Method::GET, "/todos").await;
        }
        assert_eq!(
            send(&app, Method::GET, "/todos").await.status(),
            StatusCode::TOO_MANY_REQUESTS
        );

        assert_eq!(send(&app, Method::POST, "/todos").await.status(), StatusCode::OK);
        assert_eq!(send(&app, Method::GET, "/todos/").await.status(), StatusCode::OK);
        assert_eq!(send(&app, Method::GET, "/todos?page=2").await.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_closed() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = app(failing_admission(Arc::new(UnreachableStore)), hits.clone());

        let response = send(&app, Method::GET, "/todos").await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.status().is_server_error());
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body.is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_protocol_error_fails_closed() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = app(failing_admission(Arc::new(GarbageStore)), hits.clone());

        let response = send(&app, Method::POST, "/todos").await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fail_open_forwards_on_store_error() {
        let hits = Arc::new(AtomicUsize::new(0));
        let admission = failing_admission(Arc::new(UnreachableStore))
            .with_failure_policy(FailurePolicy::Open)
            .with_headers(true);
        let app = app(admission, hits.clone());

        let response = send(&app, Method::GET, "/todos").await;

        assert_eq!(response.status(), StatusCode::OK);
        // No decision was made, so there is nothing to report.
        assert!(response.headers().get(&REMAINING_HEADER).is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_headers_when_enabled() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = app(memory_admission(2).with_headers(true), hits);

        let first = send(&app, Method::GET, "/todos").await;
        assert_eq!(first.headers()[&LIMIT_HEADER], "2");
        assert_eq!(first.headers()[&REMAINING_HEADER], "1");

        send(&app, Method::GET, "/todos").await;

        let rejected = send(&app, Method::GET, "/todos").await;
        assert_eq!(rejected.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(rejected.headers()[&REMAINING_HEADER], "0");
    }

    #[tokio::test]
    async fn test_matched_route_shares_quota_across_ids() {
        let hits = Arc::new(AtomicUsize::new(0));
        let handler = {
            let hits = hits.clone();
            move || {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                }
            }
        };
        let admission = memory_admission(2).with_key_strategy(Arc::new(MatchedRoute));
        let app = Router::new()
            .route("/todos/{id}", get(handler))
            .route_layer(from_fn_with_state(admission, admit));

        assert_eq!(send(&app, Method::GET, "/todos/1").await.status(), StatusCode::OK);
        assert_eq!(send(&app, Method::GET, "/todos/2").await.status(), StatusCode::OK);
        assert_eq!(
            send(&app, Method::GET, "/todos/3").await.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
