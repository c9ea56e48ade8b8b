//! Model classes accepted by the gateway.
//!
//! Each request targets exactly one class; limits, model identifiers and
//! upstream call shapes are all keyed by it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the four supported request categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelClass {
    /// General-purpose text.
    #[serde(alias = "balanced")]
    General,
    /// Code-specialized text.
    Coding,
    /// Multimodal prompt with an image reference.
    Vision,
    /// Audio transcription.
    Audio,
}

impl ModelClass {
    /// Every class, in declaration order.
    pub const ALL: [ModelClass; 4] = [
        ModelClass::General,
        ModelClass::Coding,
        ModelClass::Vision,
        ModelClass::Audio,
    ];

    /// Wire tag for this class.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Coding => "coding",
            Self::Vision => "vision",
            Self::Audio => "audio",
        }
    }

    /// Wire tags of every class, for error hints.
    pub fn valid_types() -> Vec<&'static str> {
        Self::ALL.iter().map(|c| c.as_str()).collect()
    }

    /// Legacy tags still accepted on input, with the class they map to.
    pub const ALIASES: [(&'static str, ModelClass); 1] = [("balanced", ModelClass::General)];

    /// Stable slot for per-class arrays.
    pub(crate) fn index(&self) -> usize {
        match self {
            Self::General => 0,
            Self::Coding => 1,
            Self::Vision => 2,
            Self::Audio => 3,
        }
    }

    /// Whether requests of this class must carry a `media_url`.
    pub fn requires_media(&self) -> bool {
        matches!(self, Self::Vision | Self::Audio)
    }

    /// MIME top-level type accepted by uploads targeting this class.
    pub fn accepted_media_prefix(&self) -> Option<&'static str> {
        match self {
            Self::Vision => Some("image/"),
            Self::Audio => Some("audio/"),
            Self::General | Self::Coding => None,
        }
    }
}

impl fmt::Display for ModelClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a tag names no known class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownModelClass(pub String);

impl fmt::Display for UnknownModelClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown model type '{}'", self.0)
    }
}

impl std::error::Error for UnknownModelClass {}

impl FromStr for ModelClass {
    type Err = UnknownModelClass;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "general" => Ok(Self::General),
            "coding" => Ok(Self::Coding),
            "vision" => Ok(Self::Vision),
            "audio" => Ok(Self::Audio),
            other => Self::ALIASES
                .iter()
                .find(|(alias, _)| *alias == other)
                .map(|(_, class)| *class)
                .ok_or_else(|| UnknownModelClass(other.to_string())),
        }
    }
}
