//! Router setup
//!
//! Pages and other assets are served from the configured public directory;
//! anything not matched by a route falls through to it.

use crate::controller::RadioController;
use crate::state::SharedState;
use axum::{
    routing::{get, get_service},
    Router,
};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub state: Arc<SharedState>,
    pub controller: RadioController,
    pub public_dir: PathBuf,
}

pub fn create_router(ctx: AppContext) -> Router {
    let home_page = ServeFile::new(ctx.public_dir.join("home").join("index.html"));
    let controller_page = ServeFile::new(ctx.public_dir.join("controller").join("index.html"));
    let assets = ServeDir::new(&ctx.public_dir);

    Router::new()
        .route("/", get(super::handlers::root_redirect))
        .route_service("/home", home_page)
        .route(
            "/controller",
            get_service(controller_page).post(super::handlers::handle_command),
        )
        .route("/stream", get(super::handlers::stream))
        .route("/health", get(super::handlers::health))
        .route("/status", get(super::handlers::status))
        .route("/effects", get(super::handlers::list_effects))
        .route("/events", get(super::sse::event_stream))
        .fallback_service(assets)
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
