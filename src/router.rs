//! Request routing: validation, admission and dispatch.
//!
//! [`GenerationRouter::handle`] runs the checks in a fixed order and stops
//! at the first failure. Quota consumed by an admitted request stays
//! consumed, even when a later check or the upstream call fails.

use crate::config::ModelsConfig;
use crate::error::GatewayError;
use crate::media::{MediaStore, MAX_UPLOAD_BYTES, UPLOADS_PREFIX};
use crate::model::ModelClass;
use crate::quota::{Admission, QuotaTracker};
use crate::upstream::{UpstreamClient, REMOTE_AUDIO_FILENAME};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Number;
use std::sync::Arc;

/// `max_tokens` used when the request does not set one.
pub const DEFAULT_MAX_TOKENS: u32 = 256;

/// A generation request as received from the client.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GenerationRequest {
    #[serde(default)]
    pub model_type: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    /// Kept as a raw JSON number so out-of-range values still reach the
    /// ceiling check.
    #[serde(default)]
    pub max_tokens: Option<Number>,
    #[serde(default)]
    pub media_url: Option<String>,
}

/// Normalized upstream result returned to the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationResult {
    pub model: String,
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcription: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Resolve the requested `max_tokens` against the class ceiling.
///
/// Anything above the ceiling is a token-limit error whatever its width;
/// a value under it must still fit a `u32` and be integral.
fn resolve_max_tokens(requested: Option<&Number>, ceiling: Option<u32>) -> Result<u32, GatewayError> {
    let Some(number) = requested else {
        return Ok(DEFAULT_MAX_TOKENS);
    };

    if let (Some(limit), Some(value)) = (ceiling, number.as_f64()) {
        if value > f64::from(limit) {
            return Err(GatewayError::TokenLimitExceeded {
                requested: number.to_string(),
                limit,
            });
        }
    }

    number
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| {
            GatewayError::InvalidRequest("max_tokens must be a non-negative integer".to_string())
        })
}

/// Validates generation requests and forwards admitted ones upstream.
#[derive(Debug, Clone)]
pub struct GenerationRouter {
    tracker: Arc<QuotaTracker>,
    models: ModelsConfig,
    upstream: UpstreamClient,
    media: MediaStore,
}

impl GenerationRouter {
    pub fn new(
        tracker: Arc<QuotaTracker>,
        models: ModelsConfig,
        upstream: UpstreamClient,
        media: MediaStore,
    ) -> Self {
        Self {
            tracker,
            models,
            upstream,
            media,
        }
    }

    pub fn tracker(&self) -> &QuotaTracker {
        &self.tracker
    }

    pub fn models(&self) -> &ModelsConfig {
        &self.models
    }

    /// Run validation and admission, then dispatch to the provider.
    pub async fn handle(
        &self,
        request: GenerationRequest,
        now: DateTime<Utc>,
    ) -> Result<GenerationResult, GatewayError> {
        let (class, prompt, max_tokens) = self.admit(&request, now)?;
        let model_id = self.models.model_for(class);

        match class {
            ModelClass::General | ModelClass::Coding => {
                let completion = self.upstream.complete_text(model_id, prompt, max_tokens).await?;
                Ok(GenerationResult {
                    model: model_id.to_string(),
                    response: completion.text,
                    usage: completion.usage,
                    transcription: None,
                })
            }
            ModelClass::Vision => {
                let media_url = non_empty(&request.media_url).unwrap_or_default();
                let completion = self
                    .upstream
                    .complete_vision(model_id, prompt, max_tokens, media_url)
                    .await?;
                Ok(GenerationResult {
                    model: model_id.to_string(),
                    response: completion.text,
                    usage: completion.usage,
                    transcription: None,
                })
            }
            ModelClass::Audio => {
                let media_url = non_empty(&request.media_url).unwrap_or_default();
                // One deadline covers both the download and the transcription.
                let deadline = self.upstream.timeouts().audio;
                let text = tokio::time::timeout(deadline, self.transcribe(model_id, prompt, media_url))
                    .await
                    .unwrap_or_else(|_| {
                        Err(GatewayError::upstream_failure(format!(
                            "Upstream request timed out: audio deadline of {:?} elapsed",
                            deadline
                        )))
                    })
                    .map_err(|e| e.with_upstream_context("Audio processing error: "))?;
                Ok(GenerationResult {
                    model: model_id.to_string(),
                    response: text.clone(),
                    usage: None,
                    transcription: Some(text),
                })
            }
        }
    }

    /// Every check up to, but excluding, the upstream call.
    fn admit<'r>(
        &self,
        request: &'r GenerationRequest,
        now: DateTime<Utc>,
    ) -> Result<(ModelClass, &'r str, u32), GatewayError> {
        let (Some(tag), Some(prompt)) = (non_empty(&request.model_type), non_empty(&request.prompt))
        else {
            return Err(GatewayError::MissingFields);
        };

        let class: ModelClass = tag
            .parse()
            .map_err(|_| GatewayError::InvalidModelType(tag.to_string()))?;

        if let Admission::Denied(denial) = self.tracker.check_and_consume(class, now) {
            tracing::warn!(model_type = %class, reason = %denial, "Request denied by quota");
            return Err(GatewayError::RateLimited(denial));
        }

        let max_tokens = resolve_max_tokens(
            request.max_tokens.as_ref(),
            self.tracker.policies().policy_for(class).max_tokens(),
        )?;

        if class.requires_media() && non_empty(&request.media_url).is_none() {
            return Err(GatewayError::MediaRequired(class));
        }

        tracing::info!(model_type = %class, max_tokens, "Request admitted");
        Ok((class, prompt, max_tokens))
    }

    /// Load the referenced audio, from the network or from local uploads,
    /// and transcribe it.
    async fn transcribe(
        &self,
        model_id: &str,
        prompt: &str,
        media_url: &str,
    ) -> Result<String, GatewayError> {
        let (audio, filename) = if media_url.starts_with("http://") || media_url.starts_with("https://") {
            let bytes = self.upstream.fetch_media(media_url, MAX_UPLOAD_BYTES).await?;
            (bytes, REMOTE_AUDIO_FILENAME.to_string())
        } else if media_url.starts_with(UPLOADS_PREFIX) {
            self.media.read(media_url).await?
        } else {
            return Err(GatewayError::InvalidRequest("Invalid media URL format".to_string()));
        };

        let transcription = self
            .upstream
            .transcribe_audio(model_id, audio, &filename, Some(prompt))
            .await?;
        Ok(transcription.text)
    }
}
