//! Engine configuration.

use tidy_core::defaults::{
    DEFAULT_DESTINATION, HISTORY_CAPACITY, RULES_MAX_CHARS, SOURCE_EXCERPT_CHARS,
};
use tidy_inference::ClassifierConfig;

use crate::routing::RoutingConfig;
use crate::trigger::TriggerConfig;

/// Configuration of the organization engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganizerConfig {
    pub routing: RoutingConfig,
    pub trigger: TriggerConfig,
    /// Number of revertable changes kept per profile.
    pub history_capacity: usize,
}

impl Default for OrganizerConfig {
    fn default() -> Self {
        Self {
            routing: RoutingConfig::default(),
            trigger: TriggerConfig::default(),
            history_capacity: HISTORY_CAPACITY,
        }
    }
}

impl OrganizerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `TIDY_HISTORY_CAPACITY` | `10` | Revertable changes kept |
    /// | `TIDY_EXCERPT_CHARS` | `2000` | Source excerpt shown to the classifier |
    /// | `TIDY_DEFAULT_DESTINATION` | `/Inbox` | Catch-all destination |
    /// | `TIDY_PRIMARY_MODEL` | `gpt-oss:20b` | First classifier model |
    /// | `TIDY_FALLBACK_MODEL` | `granite4:3b` | Retry model |
    ///
    /// Trigger timing is read by [`TriggerConfig::from_env`].
    pub fn from_env() -> Self {
        let classifier = ClassifierConfig::from_env();
        Self::from_env_with(&classifier)
    }

    /// Like [`OrganizerConfig::from_env`], taking models from an existing
    /// classifier configuration.
    pub fn from_env_with(classifier: &ClassifierConfig) -> Self {
        let history_capacity = std::env::var("TIDY_HISTORY_CAPACITY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(HISTORY_CAPACITY)
            .max(1);
        let excerpt_chars = std::env::var("TIDY_EXCERPT_CHARS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(SOURCE_EXCERPT_CHARS);
        let default_destination = std::env::var("TIDY_DEFAULT_DESTINATION")
            .ok()
            .map(|v| tidy_core::normalize_path(&v))
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_DESTINATION.to_string());

        Self {
            routing: RoutingConfig {
                primary_model: classifier.primary_model.clone(),
                fallback_model: classifier.fallback_model.clone(),
                excerpt_chars,
                rules_max_chars: RULES_MAX_CHARS,
                default_destination,
            },
            trigger: TriggerConfig::from_env(),
            history_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OrganizerConfig::default();
        assert_eq!(config.history_capacity, 10);
        assert_eq!(config.routing.default_destination, "/Inbox");
        assert_eq!(config.routing.excerpt_chars, 2_000);
    }

    #[test]
    fn test_models_come_from_classifier_config() {
        let classifier = ClassifierConfig {
            primary_model: "big".into(),
            fallback_model: "small".into(),
            ..Default::default()
        };
        let config = OrganizerConfig::from_env_with(&classifier);
        assert_eq!(config.routing.primary_model, "big");
        assert_eq!(config.routing.fallback_model, "small");
    }
}
