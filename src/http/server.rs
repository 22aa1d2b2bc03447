//! HTTP server wiring.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::{error, info};

use super::middleware::{admit, Admission};
use super::todos::{self, TodoStore};
use crate::error::Result;

/// Build the application router.
///
/// Only routed requests pass the admission middleware (it is a route layer,
/// so the matched route template is visible to key strategies). `/health`
/// and unknown paths never touch the counter store.
pub fn router(admission: Admission, todos: Arc<TodoStore>) -> Router {
    let limited = todos::routes(todos).route_layer(from_fn_with_state(admission, admit));

    recover(
        Router::new()
            .route("/health", get(|| async { "OK" }))
            .merge(limited),
    )
}

/// Turn a panic anywhere below into a 500 instead of a dropped connection.
fn recover(app: Router) -> Router {
    app.layer(CatchPanicLayer::new())
}

/// HTTP server for the rate-limited application.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    app: Router,
}

impl HttpServer {
    pub fn new(addr: SocketAddr, admission: Admission, todos: Arc<TodoStore>) -> Self {
        Self {
            addr,
            app: router(admission, todos),
        }
    }

    /// Serve until `signal` resolves, then drain in-flight requests.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve_listener(listener, signal).await
    }

    /// Like [`serve_with_shutdown`](Self::serve_with_shutdown) on an
    /// already bound listener.
    pub async fn serve_listener<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!(addr = %listener.local_addr()?, "HTTP server listening");

        axum::serve(listener, self.app)
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                e.into()
            })
    }
}
