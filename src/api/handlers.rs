//! HTTP handlers for the gateway API.

use super::types::*;
use super::AppState;
use crate::error::GatewayError;
use crate::model::ModelClass;
use crate::router::{GenerationRequest, GenerationResult};
use axum::{
    extract::{rejection::JsonRejection, Multipart, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use std::sync::Arc;

// ============================================================================
// Health and quota handlers
// ============================================================================

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().to_rfc3339(),
    })
}

pub async fn quota_status(State(state): State<Arc<AppState>>) -> Json<QuotaStatusResponse> {
    let now = Utc::now();
    let tracker = state.router.tracker();

    let models = tracker
        .snapshot_all(now)
        .into_iter()
        .map(|usage| QuotaEntry {
            model: state.router.models().model_for(usage.model_type).to_string(),
            ceiling: tracker.policies().policy_for(usage.model_type).ceiling,
            usage,
        })
        .collect();

    Json(QuotaStatusResponse { models })
}

pub async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(NotFoundResponse { error: "Not found" })).into_response()
}

// ============================================================================
// Generation handler
// ============================================================================

pub async fn generate(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<GenerationRequest>, JsonRejection>,
) -> Result<Json<GenerationResult>, GatewayError> {
    let Json(request) = payload.map_err(|e| GatewayError::InvalidBody(e.body_text()))?;

    state.router.handle(request, Utc::now()).await.map(Json)
}

// ============================================================================
// Upload handler
// ============================================================================

pub async fn upload(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, GatewayError> {
    let form = read_upload_form(multipart).await?;

    let stored = state
        .media
        .store(
            &form.data,
            &form.file_name,
            form.content_type.as_deref(),
            form.target,
        )
        .await?;

    let base = public_base_url(state.public_base_url.as_deref(), &headers);
    Ok(Json(UploadResponse {
        media_url: stored.public_url(&base),
    }))
}

/// Collect the `media` file and the optional `model_type` selector.
///
/// Fields may arrive in any order.
async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, GatewayError> {
    let mut file: Option<(String, Option<String>, Vec<u8>)> = None;
    let mut target = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        GatewayError::InvalidRequest(format!("Failed to read upload: {}", e.body_text()))
    })? {
        match field.name().unwrap_or("") {
            "media" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await.map_err(|e| {
                    GatewayError::InvalidRequest(format!("Failed to read file: {}", e.body_text()))
                })?;
                file = Some((file_name, content_type, data.to_vec()));
            }
            "model_type" => {
                let text = field.text().await.unwrap_or_default();
                // Unknown tags only disable the content-type filter.
                target = text.parse::<ModelClass>().ok();
            }
            _ => {}
        }
    }

    let (file_name, content_type, data) =
        file.ok_or_else(|| GatewayError::InvalidRequest("No file uploaded".to_string()))?;

    Ok(UploadForm {
        file_name,
        content_type,
        data,
        target,
    })
}

/// Base for upload references: the configured one, else derived from `Host`.
pub fn public_base_url(configured: Option<&str>, headers: &HeaderMap) -> String {
    if let Some(base) = configured {
        return base.trim_end_matches('/').to_string();
    }
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");
    format!("http://{}", host)
}
