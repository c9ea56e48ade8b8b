//! HTTP surface of the gateway.
//!
//! Endpoints:
//! - GET /health - Health check
//! - POST /api/generate - Validate, admit and forward a generation request
//! - POST /api/upload - Store an image or audio upload
//! - GET /api/quota - Current quota usage per model class
//! - GET /uploads/{name} - Stored uploads
//! - GET / - Embedded web page

mod handlers;
mod types;

use axum::{
    extract::DefaultBodyLimit,
    handler::HandlerWithoutStateExt,
    http::{header, Method, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use rust_embed::Embed;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::GatewayError;
use crate::media::{MediaStore, MAX_UPLOAD_BYTES};
use crate::quota::{LimitPolicies, QuotaTracker};
use crate::router::GenerationRouter;
use crate::upstream::UpstreamClient;

pub use handlers::public_base_url;
pub use types::*;

/// Room for multipart framing on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Embed)]
#[folder = "static/"]
struct StaticAssets;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<GenerationRouter>,
    pub media: MediaStore,
    pub public_base_url: Option<String>,
}

impl AppState {
    /// Wire every component from configuration.
    ///
    /// Fails on an incomplete limit table or an unusable HTTP client; both
    /// are fatal at startup.
    pub fn from_config(config: &Config) -> Result<Self, GatewayError> {
        let policies = Arc::new(LimitPolicies::from_entries(&config.limits)?);
        let tracker = Arc::new(QuotaTracker::new(policies, Utc::now()));
        let upstream = UpstreamClient::new(
            config.provider.base_url.clone(),
            config.provider.api_key.clone(),
        )?;
        let media = MediaStore::new(config.gateway.upload_dir.clone());

        Ok(Self {
            router: Arc::new(GenerationRouter::new(
                tracker,
                config.models.clone(),
                upstream,
                media.clone(),
            )),
            media,
            public_base_url: config.gateway.public_base_url.clone(),
        })
    }
}

/// Create the API router with the given state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let uploads = ServeDir::new(state.media.dir()).not_found_service(handlers::not_found.into_service());

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/generate", post(handlers::generate))
        .route(
            "/api/upload",
            post(handlers::upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + MULTIPART_OVERHEAD)),
        )
        .route("/api/quota", get(handlers::quota_status))
        .nest_service("/uploads", uploads)
        .fallback(static_handler)
        .with_state(Arc::new(state))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
}

/// Serve embedded static files; anything else is a JSON 404.
async fn static_handler(method: Method, uri: Uri) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return handlers::not_found().await;
    }

    let path = uri.path().trim_start_matches('/');
    let path = if path.is_empty() { "index.html" } else { path };

    match StaticAssets::get(path) {
        Some(content) => {
            let mime = mime_guess::from_path(path)
                .first_or_octet_stream()
                .to_string();
            ([(header::CONTENT_TYPE, mime)], content.data.into_owned()).into_response()
        }
        None => handlers::not_found().await,
    }
}
