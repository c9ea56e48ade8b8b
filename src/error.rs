//! Unified error handling for the gateway.
//!
//! Every per-request failure is rendered as JSON with an `error` field and
//! optional `message`/`details`; none of them bring the process down.

use crate::model::ModelClass;
use crate::quota::Denial;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;

/// Unified error type for gateway operations.
#[derive(Debug, Clone)]
pub enum GatewayError {
    /// `model_type` or `prompt` absent or empty.
    MissingFields,
    /// `model_type` names no known class.
    InvalidModelType(String),
    /// Requested `max_tokens` is above the class ceiling.
    TokenLimitExceeded { requested: String, limit: u32 },
    /// Vision and audio requests need a `media_url`.
    MediaRequired(ModelClass),
    /// Request body is not valid JSON of the expected shape.
    InvalidBody(String),
    /// Any other malformed client input.
    InvalidRequest(String),
    /// Quota for the class is exhausted.
    RateLimited(Denial),
    /// Provider returned non-success, timed out, or sent an unreadable body.
    Upstream {
        status: Option<u16>,
        message: String,
        details: serde_json::Value,
    },
    /// Startup configuration is unusable.
    Configuration(String),
    /// Internal error.
    Internal(String),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingFields => write!(f, "Missing required fields"),
            Self::InvalidModelType(_) => write!(f, "Invalid model type"),
            Self::TokenLimitExceeded { limit, .. } => {
                write!(f, "Token limit exceeded. Maximum allowed: {}", limit)
            }
            Self::MediaRequired(class) => write!(f, "{} model requires a media_url", class),
            Self::InvalidBody(msg) => write!(f, "Invalid request body: {}", msg),
            Self::InvalidRequest(msg) => write!(f, "{}", msg),
            Self::RateLimited(denial) => write!(f, "{}", denial),
            Self::Upstream { message, .. } => write!(f, "{}", message),
            Self::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for GatewayError {}

/// Error response structure for JSON serialization.
#[derive(Debug, Serialize)]
struct ErrorResponseBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    required: Option<Vec<&'static str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    valid_types: Option<Vec<&'static str>>,
}

impl ErrorResponseBody {
    fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: None,
            details: None,
            required: None,
            valid_types: None,
        }
    }
}

fn alias_hint() -> String {
    let aliases: Vec<String> = ModelClass::ALIASES
        .iter()
        .map(|(alias, class)| format!("'{}' is accepted as '{}'", alias, class))
        .collect();
    format!("Also accepted: {}", aliases.join(", "))
}

impl GatewayError {
    /// Build an upstream error from a non-success provider response.
    pub fn upstream_status(status: u16, body: &str) -> Self {
        let details = serde_json::from_str(body)
            .unwrap_or_else(|_| serde_json::Value::String(body.to_string()));
        Self::Upstream {
            status: Some(status),
            message: format!("Upstream returned status {}", status),
            details,
        }
    }

    /// Build an upstream error for failures that carry no provider status.
    pub fn upstream_failure(message: impl Into<String>) -> Self {
        Self::Upstream {
            status: None,
            message: message.into(),
            details: serde_json::json!({}),
        }
    }

    /// Prefix the message of an upstream error, leaving other variants intact.
    pub fn with_upstream_context(self, prefix: &str) -> Self {
        match self {
            Self::Upstream {
                status,
                message,
                details,
            } => Self::Upstream {
                status,
                message: format!("{}{}", prefix, message),
                details,
            },
            other => other,
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingFields
            | Self::InvalidModelType(_)
            | Self::TokenLimitExceeded { .. }
            | Self::MediaRequired(_)
            | Self::InvalidBody(_)
            | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Upstream { status, .. } => status
                .and_then(|s| StatusCode::from_u16(s).ok())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Self::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error type string.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::MissingFields
            | Self::InvalidModelType(_)
            | Self::TokenLimitExceeded { .. }
            | Self::MediaRequired(_)
            | Self::InvalidBody(_)
            | Self::InvalidRequest(_) => "invalid_request",
            Self::RateLimited(_) => "rate_limited",
            Self::Upstream { .. } => "upstream_error",
            Self::Configuration(_) => "configuration_error",
            Self::Internal(_) => "internal_error",
        }
    }

    fn body(&self) -> ErrorResponseBody {
        match self {
            Self::MissingFields => ErrorResponseBody {
                required: Some(vec!["model_type", "prompt"]),
                ..ErrorResponseBody::new(self.to_string())
            },
            Self::InvalidModelType(_) => ErrorResponseBody {
                message: Some(alias_hint()),
                valid_types: Some(ModelClass::valid_types()),
                ..ErrorResponseBody::new(self.to_string())
            },
            Self::InvalidBody(msg) => ErrorResponseBody {
                message: Some(msg.clone()),
                ..ErrorResponseBody::new("Invalid request body")
            },
            Self::Upstream {
                message, details, ..
            } => ErrorResponseBody {
                message: Some(message.clone()),
                details: Some(details.clone()),
                ..ErrorResponseBody::new("Error processing your request")
            },
            Self::Internal(msg) => ErrorResponseBody {
                message: Some(msg.clone()),
                ..ErrorResponseBody::new("Server error")
            },
            _ => ErrorResponseBody::new(self.to_string()),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error_type = self.error_type(), status = status.as_u16(), "{}", self);
        } else {
            tracing::debug!(error_type = self.error_type(), status = status.as_u16(), "{}", self);
        }
        (status, Json(self.body())).into_response()
    }
}
