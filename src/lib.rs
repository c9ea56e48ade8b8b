//! modelgate - Rate-limited HTTP gateway for hosted model classes.
//!
//! Features:
//! - Four model classes (general, coding, vision, audio) mapped to upstream models
//! - Fixed per-minute and per-day windows with a per-request token ceiling
//! - Image and audio uploads served back for vision and transcription requests
//! - OpenAI-compatible upstream provider (Groq by default)

pub mod api;
pub mod config;
pub mod error;
pub mod http;
pub mod media;
pub mod model;
pub mod quota;
pub mod router;
pub mod upstream;
