//! Adapter for the single upstream inference provider.
//!
//! Speaks the OpenAI-compatible wire format: chat completions for text and
//! vision, multipart transcriptions for audio. Every call carries a fixed
//! timeout; failures come back as [`GatewayError::Upstream`] and are never
//! retried.

use crate::error::GatewayError;
use crate::http::{create_client, UpstreamTimeouts};
use reqwest::{multipart, Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};

/// Filename sent upstream for audio fetched from a remote URL.
pub const REMOTE_AUDIO_FILENAME: &str = "audio.mp3";

/// Normalized completion output.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: Option<serde_json::Value>,
}

/// Normalized transcription output.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcription {
    pub text: String,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: MessageContent<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum MessageContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Serialize)]
struct ImageUrl<'a> {
    url: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Client for the configured provider.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeouts: UpstreamTimeouts,
}

impl UpstreamClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, GatewayError> {
        let client = create_client()
            .map_err(|e| GatewayError::Configuration(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            timeouts: UpstreamTimeouts::default(),
        })
    }

    pub fn with_timeouts(mut self, timeouts: UpstreamTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Single-message chat completion for general and coding classes.
    pub async fn complete_text(
        &self,
        model_id: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<Completion, GatewayError> {
        self.chat(&ChatCompletionRequest {
            model: model_id,
            messages: vec![ChatMessage {
                role: "user",
                content: MessageContent::Text(prompt),
            }],
            max_tokens,
        })
        .await
    }

    /// Chat completion whose single user message carries the prompt and the
    /// image reference side by side.
    pub async fn complete_vision(
        &self,
        model_id: &str,
        prompt: &str,
        max_tokens: u32,
        media_url: &str,
    ) -> Result<Completion, GatewayError> {
        self.chat(&ChatCompletionRequest {
            model: model_id,
            messages: vec![ChatMessage {
                role: "user",
                content: MessageContent::Parts(vec![
                    ContentPart::Text { text: prompt },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: media_url },
                    },
                ]),
            }],
            max_tokens,
        })
        .await
    }

    async fn chat(&self, payload: &ChatCompletionRequest<'_>) -> Result<Completion, GatewayError> {
        let request = self
            .client
            .post(self.endpoint("/chat/completions"))
            .timeout(self.timeouts.text)
            .json(payload);

        tracing::debug!(model = payload.model, "Sending chat completion upstream");
        let response = self.authorize(request).send().await.map_err(transport_error)?;
        let body: ChatCompletionResponse = read_json(response).await?;

        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| malformed("missing choices[0].message.content"))?;

        Ok(Completion {
            text,
            usage: body.usage,
        })
    }

    /// Multipart transcription of already-loaded audio bytes.
    pub async fn transcribe_audio(
        &self,
        model_id: &str,
        audio: Vec<u8>,
        filename: &str,
        prompt: Option<&str>,
    ) -> Result<Transcription, GatewayError> {
        let mut form = multipart::Form::new()
            .part("file", multipart::Part::bytes(audio).file_name(filename.to_string()))
            .text("model", model_id.to_string());
        if let Some(prompt) = prompt.filter(|p| !p.is_empty()) {
            form = form.text("prompt", prompt.to_string());
        }

        let request = self
            .client
            .post(self.endpoint("/audio/transcriptions"))
            .timeout(self.timeouts.audio)
            .multipart(form);

        tracing::debug!(model = model_id, filename, "Sending transcription upstream");
        let response = self.authorize(request).send().await.map_err(transport_error)?;
        let body: TranscriptionResponse = read_json(response).await?;

        Ok(Transcription { text: body.text })
    }

    pub fn timeouts(&self) -> UpstreamTimeouts {
        self.timeouts
    }

    /// Download remote media, bounded by the audio timeout and by
    /// `max_bytes`. The body is read chunk by chunk and abandoned as soon
    /// as it grows past the limit.
    pub async fn fetch_media(&self, url: &str, max_bytes: usize) -> Result<Vec<u8>, GatewayError> {
        let mut response = self
            .client
            .get(url)
            .timeout(self.timeouts.audio)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::upstream_status(status.as_u16(), &body));
        }

        if response.content_length().is_some_and(|len| len > max_bytes as u64) {
            return Err(media_too_large(max_bytes));
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(transport_error)? {
            if bytes.len() + chunk.len() > max_bytes {
                return Err(media_too_large(max_bytes));
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }
}

fn transport_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::upstream_failure(format!("Upstream request timed out: {}", e))
    } else {
        GatewayError::upstream_failure(format!("Request failed: {}", e))
    }
}

fn media_too_large(max_bytes: usize) -> GatewayError {
    GatewayError::InvalidRequest(format!(
        "Remote media exceeds the {} byte limit",
        max_bytes
    ))
}

fn malformed(reason: &str) -> GatewayError {
    GatewayError::upstream_failure(format!("Malformed upstream response: {}", reason))
}

async fn read_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
    let status = response.status();
    let text = response.text().await.map_err(transport_error)?;

    if !status.is_success() {
        tracing::warn!(status = status.as_u16(), "Upstream returned an error status");
        return Err(GatewayError::upstream_status(status.as_u16(), &text));
    }

    serde_json::from_str(&text).map_err(|e| {
        malformed(&format!(
            "{} | Response: {}",
            e,
            text.chars().take(500).collect::<String>()
        ))
    })
}
