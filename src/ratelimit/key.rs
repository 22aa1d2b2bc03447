//! Quota key derivation from inbound requests.
//!
//! None of the built-in strategies look at caller identity: every client
//! shares one quota per endpoint. Strategies that mix in an API key or peer
//! address can be supplied by implementing [`KeyStrategy`].

use axum::extract::{MatchedPath, Request};

use crate::config::KeyStrategyKind;

/// Maps a request to the key its quota is tracked under.
pub trait KeyStrategy: Send + Sync {
    fn quota_key(&self, request: &Request) -> String;
}

/// `method + path`, exactly as received.
///
/// The path is case-sensitive and not normalised, so `/todos` and `/todos/`
/// are different keys. The query string is not part of the key.
#[derive(Debug, Clone, Copy, Default)]
pub struct MethodPath;

impl KeyStrategy for MethodPath {
    fn quota_key(&self, request: &Request) -> String {
        format!("{}{}", request.method(), request.uri().path())
    }
}

/// `method + route template`, e.g. `GET/todos/{id}`.
///
/// The template is only known when the middleware runs after routing
/// (`Router::route_layer`). Otherwise this behaves like [`MethodPath`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchedRoute;

impl KeyStrategy for MatchedRoute {
    fn quota_key(&self, request: &Request) -> String {
        let path = request
            .extensions()
            .get::<MatchedPath>()
            .map(MatchedPath::as_str)
            .unwrap_or_else(|| request.uri().path());
        format!("{}{}", request.method(), path)
    }
}

impl KeyStrategyKind {
    /// Build the strategy this configuration value names.
    pub fn build(self) -> Box<dyn KeyStrategy> {
        match self {
            KeyStrategyKind::MethodPath => Box::new(MethodPath),
            KeyStrategyKind::MatchedRoute => Box::new(MatchedRoute),
        }
    }
}
