//! HTTP interface.
//!
//! # Routes
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | POST | `/api/todos` | create |
//! | GET | `/api/todos` | list, newest first |
//! | PUT | `/api/todos/{id}` | partial update |
//! | DELETE | `/api/todos/{id}` | delete |
//! | GET | `/health` | liveness and active store |
//! | GET | `/metrics` | Prometheus text, only when metrics are enabled |
//! | GET | anything else | static file, else `index.html` |

mod error;
mod extract;
mod handlers;

pub use error::{ApiError, ErrorBody};
pub use extract::Payload;
pub use handlers::{DeleteResponse, HealthResponse};

use crate::observability::MetricsHandle;
use crate::services::TodoService;
use crate::{Error, Result};
use axum::Router;
use axum::handler::HandlerWithoutStateExt;
use axum::http::{HeaderValue, Method, header};
use axum::routing::{get, post, put};
use std::future::Future;
use std::path::Path;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The todo service.
    pub service: TodoService,
    /// Recorder rendered at `/metrics`.
    pub metrics: Option<MetricsHandle>,
}

impl AppState {
    /// Wraps a service.
    #[must_use]
    pub const fn new(service: TodoService) -> Self {
        Self {
            service,
            metrics: None,
        }
    }

    /// Serves `metrics` at `/metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Option<MetricsHandle>) -> Self {
        self.metrics = metrics;
        self
    }
}

/// Builds the full application router.
///
/// `public_dir` is served as static files; unmatched GETs get its
/// `index.html`.
pub fn router(service: TodoService, public_dir: &Path) -> Router {
    app(AppState::new(service), public_dir)
}

/// Builds the router over an existing state.
pub fn app(state: AppState, public_dir: &Path) -> Router {
    let index = public_dir.join("index.html");
    let spa = move |method: Method| {
        let index = index.clone();
        async move { handlers::spa_fallback(method, index).await }
    };
    let static_files = ServeDir::new(public_dir)
        .call_fallback_on_method_not_allowed(true)
        .fallback(spa.into_service());

    let mut router = Router::new()
        .route(
            "/api/todos",
            post(handlers::create_todo).get(handlers::list_todos),
        )
        .route(
            "/api/todos/{id}",
            put(handlers::update_todo).delete(handlers::delete_todo),
        )
        .route("/health", get(handlers::health));
    if state.metrics.is_some() {
        router = router.route("/metrics", get(handlers::metrics));
    }

    router
        .fallback_service(static_files)
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves `app` on `listener` until `shutdown` resolves.
///
/// In-flight requests are allowed to finish.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(addr = %addr, "HTTP server listening");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::operation("serve", e))
}
