//! Shared HTTP client factory and upstream timeouts.

use reqwest::Client;
use std::time::Duration;

/// Timeout for text and vision completions (60 seconds).
pub const TEXT_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for audio downloads and transcriptions (120 seconds).
pub const AUDIO_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout for establishing a connection to the provider.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-call-shape timeouts applied to each upstream request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpstreamTimeouts {
    pub text: Duration,
    pub audio: Duration,
}

impl Default for UpstreamTimeouts {
    fn default() -> Self {
        Self {
            text: TEXT_TIMEOUT,
            audio: AUDIO_TIMEOUT,
        }
    }
}

/// Create the upstream HTTP client.
///
/// No overall timeout is set here; each request carries the timeout of its
/// call shape.
pub fn create_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(concat!("modelgate/", env!("CARGO_PKG_VERSION")))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_client_returns_valid_client() {
        let client = create_client();
        assert!(client.is_ok());
    }

    #[test]
    fn text_timeout_is_60_seconds() {
        assert_eq!(TEXT_TIMEOUT, Duration::from_secs(60));
    }

    #[test]
    fn audio_timeout_is_120_seconds() {
        assert_eq!(AUDIO_TIMEOUT, Duration::from_secs(120));
    }

    #[test]
    fn default_timeouts_use_the_fixed_values() {
        let timeouts = UpstreamTimeouts::default();
        assert_eq!(timeouts.text, TEXT_TIMEOUT);
        assert_eq!(timeouts.audio, AUDIO_TIMEOUT);
    }
}
