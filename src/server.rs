//! HTTP surface.
//!
//! Two routes under the configured path prefix: `GET /` lists the tables
//! the user's domains may see, `GET /table` runs the view pipeline for the
//! URL's query string. The engine work is synchronous CPU-bound code, so
//! handlers push it onto the blocking pool; panics inside a pipeline stage
//! are trapped at the request boundary and render as 500.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::RawQuery,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Extension, Router,
};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::cancel::CancelHandle;
use crate::config::Config;
use crate::error::EngineError;
use crate::pipeline::Engine;
use crate::query::Query;
use crate::render;

/// External user registry. The engine only asks one question: does this
/// user belong to any of the given domains?
pub trait UserStore: Send + Sync {
    fn has_any_domain(&self, user: &str, domains: &[String]) -> bool;
}

/// Default store: everyone sees everything.
pub struct AllowAll;

impl UserStore for AllowAll {
    fn has_any_domain(&self, _user: &str, _domains: &[String]) -> bool {
        true
    }
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub users: Arc<dyn UserStore>,
    pub config: Arc<Config>,
}

pub fn router(state: AppState) -> Router {
    let prefix = state.config.server.path_prefix.clone();
    let routes = Router::new()
        .route("/", get(landing))
        .route("/table", get(table_view))
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(CatchPanicLayer::new());

    if prefix.is_empty() || prefix == "/" {
        routes
    } else {
        Router::new().nest(&prefix, routes)
    }
}

/// Serve until the process is stopped.
pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let addr = state.config.server.addr.clone();
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn landing(
    Extension(state): Extension<AppState>,
    RawQuery(raw): RawQuery,
) -> Html<String> {
    let raw = raw.unwrap_or_default();
    let user = url::form_urlencoded::parse(raw.as_bytes())
        .find(|(k, _)| k == "user")
        .map(|(_, v)| v.into_owned())
        .unwrap_or_default();

    let tables: Vec<(String, usize, usize)> = state
        .engine
        .model()
        .tables()
        .iter()
        .filter(|t| t.domains().is_empty() || state.users.has_any_domain(&user, t.domains()))
        .map(|t| (t.name().to_string(), t.len(), t.column_count()))
        .collect();
    Html(render::landing_page(&tables, &state.config.server.path_prefix))
}

async fn table_view(
    Extension(state): Extension<AppState>,
    RawQuery(raw): RawQuery,
) -> Response {
    let started = Instant::now();
    let raw = raw.unwrap_or_default();
    let query = match Query::parse(&raw) {
        Ok(query) => query,
        Err(err) => return (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
    };
    let parse_us = started.elapsed().as_micros() as u64;

    let cancel = CancelHandle::new();
    let timeout_ms = state.config.engine.query_timeout_ms;
    if timeout_ms > 0 {
        let watchdog = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(timeout_ms)).await;
            watchdog.cancel();
        });
    }

    let engine = Arc::clone(&state.engine);
    let result = tokio::task::spawn_blocking(move || {
        engine.handle(&query, parse_us, Some(&cancel))
    })
    .await;

    match result {
        Ok(Ok(model)) => Html(render::table_page(&model)).into_response(),
        Ok(Err(EngineError::UnknownTable(name))) => {
            (StatusCode::NOT_FOUND, format!("unknown table: {name}")).into_response()
        }
        Ok(Err(err)) => {
            error!(%err, "pipeline failed");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
        Err(join_err) => {
            error!(%join_err, "pipeline panicked");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string()).into_response()
        }
    }
}
