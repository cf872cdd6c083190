use serde::Deserialize;

/// Engine limits. Every field has a default so partial config documents deserialize.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Maximum macro call depth before execution is aborted.
    pub max_depth: usize,
    /// Capacity of the parsed-script and parsed-pipeline caches.
    pub cache_capacity: usize,
    /// Upper bound on the strings produced by `multiple_evaluate`.
    pub max_combinations: usize,
    /// Total characters allowed across the items in flight.
    pub max_chars: usize,
    /// Largest amount accepted by `{N name}`.
    pub max_repeat: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            max_depth: 16,
            cache_capacity: 40,
            max_combinations: 1000,
            max_chars: 10_000,
            max_repeat: 100,
        }
    }
}

impl Settings {
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        use anyhow::Context as _;
        serde_json::from_str(text).context("Failed to parse settings")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_documents_keep_defaults() {
        let settings = Settings::from_json(r#"{ "max_depth": 4 }"#).unwrap();
        assert_eq!(settings.max_depth, 4);
        assert_eq!(settings.cache_capacity, 40);
        assert_eq!(settings.max_chars, 10_000);
        assert_eq!(settings.max_repeat, 100);
    }

    #[test]
    fn rejects_malformed_documents() {
        assert!(Settings::from_json("{ max_depth: }").is_err());
    }
}
