//! Request and response types for the HTTP API.

use crate::model::ModelClass;
use crate::quota::{Ceiling, QuotaSnapshot};
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
}

#[derive(Serialize)]
pub struct UploadResponse {
    #[serde(rename = "mediaUrl")]
    pub media_url: String,
}

#[derive(Serialize)]
pub struct QuotaStatusResponse {
    pub models: Vec<QuotaEntry>,
}

#[derive(Serialize)]
pub struct QuotaEntry {
    pub model: String,
    pub ceiling: Ceiling,
    #[serde(flatten)]
    pub usage: QuotaSnapshot,
}

#[derive(Serialize)]
pub struct NotFoundResponse {
    pub error: &'static str,
}

/// Parsed multipart upload before it is handed to the media store.
pub struct UploadForm {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
    pub target: Option<ModelClass>,
}
