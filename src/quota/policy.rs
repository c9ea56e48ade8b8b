//! Static limit policy per model class.

use crate::config::LimitEntry;
use crate::error::GatewayError;
use crate::model::ModelClass;
use serde::Serialize;
use std::collections::BTreeMap;

/// Per-request size ceiling of a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Ceiling {
    /// Maximum `max_tokens` a text or vision request may ask for.
    MaxTokens(u32),
    /// Maximum audio length. Reserved; not checked at request time.
    MaxSeconds(u32),
}

/// Thresholds for one model class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LimitPolicy {
    pub max_per_minute: u32,
    pub max_per_day: u32,
    pub ceiling: Ceiling,
}

impl LimitPolicy {
    pub const fn new(max_per_minute: u32, max_per_day: u32, ceiling: Ceiling) -> Self {
        Self {
            max_per_minute,
            max_per_day,
            ceiling,
        }
    }

    /// Token ceiling, if this class is bounded by tokens.
    pub fn max_tokens(&self) -> Option<u32> {
        match self.ceiling {
            Ceiling::MaxTokens(n) => Some(n),
            Ceiling::MaxSeconds(_) => None,
        }
    }

    /// Built-in thresholds for a class.
    pub fn default_for(class: ModelClass) -> Self {
        match class {
            ModelClass::General => Self::new(30, 14_400, Ceiling::MaxTokens(6_000)),
            ModelClass::Coding => Self::new(30, 1_000, Ceiling::MaxTokens(6_000)),
            ModelClass::Vision => Self::new(30, 7_000, Ceiling::MaxTokens(7_000)),
            ModelClass::Audio => Self::new(20, 2_000, Ceiling::MaxSeconds(7_200)),
        }
    }

    fn from_entry(class: ModelClass, entry: &LimitEntry) -> Result<Self, GatewayError> {
        let ceiling = match (entry.max_tokens, entry.max_seconds) {
            (Some(tokens), None) => Ceiling::MaxTokens(tokens),
            (None, Some(seconds)) => Ceiling::MaxSeconds(seconds),
            _ => {
                return Err(GatewayError::Configuration(format!(
                    "limits.{} must set exactly one of max_tokens or max_seconds",
                    class
                )))
            }
        };
        Ok(Self::new(entry.per_minute, entry.per_day, ceiling))
    }
}

/// Complete, immutable class → policy table.
///
/// Construction guarantees every class has exactly one policy, so lookups
/// never fail afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitPolicies {
    policies: [LimitPolicy; 4],
}

impl Default for LimitPolicies {
    fn default() -> Self {
        Self {
            policies: ModelClass::ALL.map(LimitPolicy::default_for),
        }
    }
}

impl LimitPolicies {
    /// Build the table from configured entries keyed by class tag.
    ///
    /// Fails when a key names no class, when a class has no entry, or when
    /// an entry does not carry exactly one ceiling.
    pub fn from_entries(entries: &BTreeMap<String, LimitEntry>) -> Result<Self, GatewayError> {
        let mut slots: [Option<LimitPolicy>; 4] = [None; 4];

        for (key, entry) in entries {
            let class: ModelClass = key.parse().map_err(|e| {
                GatewayError::Configuration(format!("limits.{}: {}", key, e))
            })?;
            if slots[class.index()].is_some() {
                return Err(GatewayError::Configuration(format!(
                    "duplicate limit policy for {}",
                    class
                )));
            }
            slots[class.index()] = Some(LimitPolicy::from_entry(class, entry)?);
        }

        let mut policies = [LimitPolicy::default_for(ModelClass::General); 4];
        for class in ModelClass::ALL {
            policies[class.index()] = slots[class.index()].ok_or_else(|| {
                GatewayError::Configuration(format!("no limit policy configured for {}", class))
            })?;
        }

        Ok(Self { policies })
    }

    pub fn policy_for(&self, class: ModelClass) -> &LimitPolicy {
        &self.policies[class.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entry(per_minute: u32, max_tokens: Option<u32>, max_seconds: Option<u32>) -> LimitEntry {
        LimitEntry {
            per_minute,
            per_day: 100,
            max_tokens,
            max_seconds,
        }
    }

    fn full_entries() -> BTreeMap<String, LimitEntry> {
        ModelClass::ALL
            .iter()
            .map(|c| (c.as_str().to_string(), LimitEntry::from(LimitPolicy::default_for(*c))))
            .collect()
    }

    #[test]
    fn defaults_match_published_limits() {
        let policies = LimitPolicies::default();
        assert_eq!(
            *policies.policy_for(ModelClass::Coding),
            LimitPolicy::new(30, 1_000, Ceiling::MaxTokens(6_000))
        );
        assert_eq!(
            *policies.policy_for(ModelClass::Audio),
            LimitPolicy::new(20, 2_000, Ceiling::MaxSeconds(7_200))
        );
        assert_eq!(policies.policy_for(ModelClass::Vision).max_tokens(), Some(7_000));
        assert_eq!(policies.policy_for(ModelClass::Audio).max_tokens(), None);
    }

    #[test]
    fn lookup_is_idempotent() {
        let policies = LimitPolicies::default();
        for class in ModelClass::ALL {
            assert_eq!(policies.policy_for(class), policies.policy_for(class));
        }
    }

    #[test]
    fn builds_from_complete_entries() {
        let mut entries = full_entries();
        entries.insert("coding".to_string(), entry(5, Some(100), None));

        let policies = LimitPolicies::from_entries(&entries).unwrap();

        assert_eq!(policies.policy_for(ModelClass::Coding).max_per_minute, 5);
        assert_eq!(policies.policy_for(ModelClass::Coding).max_tokens(), Some(100));
        assert_eq!(
            policies.policy_for(ModelClass::General),
            LimitPolicies::default().policy_for(ModelClass::General)
        );
    }

    #[test]
    fn missing_class_is_a_configuration_error() {
        let mut entries = full_entries();
        entries.remove("audio");

        let err = LimitPolicies::from_entries(&entries).unwrap_err();
        assert_eq!(err.error_type(), "configuration_error");
        assert!(err.to_string().contains("audio"));
    }

    #[test]
    fn unknown_class_is_a_configuration_error() {
        let mut entries = full_entries();
        entries.insert("foo".to_string(), entry(1, Some(1), None));

        let err = LimitPolicies::from_entries(&entries).unwrap_err();
        assert!(err.to_string().contains("foo"));
    }

    #[test]
    fn balanced_alias_collides_with_general() {
        let mut entries = full_entries();
        entries.insert("balanced".to_string(), entry(1, Some(1), None));

        assert!(LimitPolicies::from_entries(&entries).is_err());
    }

    #[test]
    fn entry_needs_exactly_one_ceiling() {
        for (tokens, seconds) in [(None, None), (Some(1), Some(1))] {
            let mut entries = full_entries();
            entries.insert("vision".to_string(), entry(1, tokens, seconds));
            let err = LimitPolicies::from_entries(&entries).unwrap_err();
            assert!(err.to_string().contains("exactly one"));
        }
    }
}
