use serde::{Deserialize, Serialize};

/// Aggregate functions the builder can append to a query.
pub const FUNCTIONS: &[&str] = &[
    "mean", "median", "max", "min", "sum", "count", "first", "last", "spread", "stddev",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteDataState {
    #[default]
    NotStarted,
    Loading,
    Done,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupKind {
    Keys,
    Values,
}

/// One key/values pairing in the predicate chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagSelector {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub values: Vec<String>,
}

impl TagSelector {
    pub fn has_key(&self) -> bool {
        self.key.as_deref().is_some_and(|key| !key.is_empty())
    }
}

/// A resolved selector from an earlier slot, used to scope later lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagPredicate {
    pub key: String,
    pub values: Vec<String>,
}

/// The persisted shape of a builder query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    pub buckets: Vec<String>,
    pub tags: Vec<TagSelector>,
    pub functions: Vec<String>,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            buckets: Vec::new(),
            tags: vec![TagSelector::default()],
            functions: Vec::new(),
        }
    }
}

impl BuilderConfig {
    pub fn bucket(&self) -> Option<&str> {
        self.buckets
            .first()
            .map(String::as_str)
            .filter(|bucket| !bucket.is_empty())
    }

    /// Predicates from slots `0..slot`. Slots without a key or without any
    /// selected value do not constrain anything and are skipped.
    pub fn predicates_before(&self, slot: usize) -> Vec<TagPredicate> {
        self.tags
            .iter()
            .take(slot)
            .filter(|tag| tag.has_key() && !tag.values.is_empty())
            .filter_map(|tag| {
                tag.key.as_ref().map(|key| TagPredicate {
                    key: key.clone(),
                    values: tag.values.clone(),
                })
            })
            .collect()
    }

    pub fn predicates(&self) -> Vec<TagPredicate> {
        self.predicates_before(self.tags.len())
    }
}

/// Ephemeral per-slot lookup state; never persisted with the query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TagSelectorState {
    pub keys: Vec<String>,
    pub keys_status: RemoteDataState,
    pub keys_search_term: String,
    pub values: Vec<String>,
    pub values_status: RemoteDataState,
    pub values_search_term: String,
}

impl TagSelectorState {
    pub fn search_term(&self, kind: LookupKind) -> &str {
        match kind {
            LookupKind::Keys => &self.keys_search_term,
            LookupKind::Values => &self.values_search_term,
        }
    }
}

/// Everything one editing session knows about its query.
///
/// `tags` runs parallel to `config.tags`: index `i` in both describes slot `i`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuilderState {
    pub config: BuilderConfig,
    pub buckets: Vec<String>,
    pub buckets_status: RemoteDataState,
    pub tags: Vec<TagSelectorState>,
}

impl Default for BuilderState {
    fn default() -> Self {
        Self::from_config(BuilderConfig::default())
    }
}

impl BuilderState {
    /// Start a session from a saved config. An empty tag list is given one
    /// empty selector so slot 0 always exists.
    pub fn from_config(mut config: BuilderConfig) -> Self {
        if config.tags.is_empty() {
            config.tags.push(TagSelector::default());
        }
        let tags = vec![TagSelectorState::default(); config.tags.len()];
        Self {
            config,
            buckets: Vec::new(),
            buckets_status: RemoteDataState::NotStarted,
            tags,
        }
    }

    pub fn slot_count(&self) -> usize {
        self.config.tags.len()
    }

    pub fn selected_key(&self, slot: usize) -> Option<&str> {
        self.config
            .tags
            .get(slot)
            .and_then(|tag| tag.key.as_deref())
            .filter(|key| !key.is_empty())
    }

    pub fn selected_values(&self, slot: usize) -> &[String] {
        self.config
            .tags
            .get(slot)
            .map(|tag| tag.values.as_slice())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector(key: &str, values: &[&str]) -> TagSelector {
        TagSelector {
            key: Some(key.to_string()),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    #[test]
    fn predicates_skip_unkeyed_and_empty_slots() {
        let config = BuilderConfig {
            buckets: vec!["telegraf".into()],
            tags: vec![
                selector("host", &["a"]),
                TagSelector::default(),
                selector("region", &[]),
                selector("cpu", &["cpu0", "cpu1"]),
            ],
            functions: Vec::new(),
        };

        let predicates = config.predicates_before(4);
        assert_eq!(predicates.len(), 2);
        assert_eq!(predicates[0].key, "host");
        assert_eq!(predicates[1].values, vec!["cpu0", "cpu1"]);
        assert!(config.predicates_before(0).is_empty());
    }

    #[test]
    fn empty_bucket_name_is_not_a_selection() {
        let config = BuilderConfig {
            buckets: vec![String::new()],
            ..Default::default()
        };
        assert_eq!(config.bucket(), None);
    }

    #[test]
    fn state_from_empty_config_has_one_slot() {
        let state = BuilderState::from_config(BuilderConfig {
            tags: Vec::new(),
            ..Default::default()
        });
        assert_eq!(state.slot_count(), 1);
        assert_eq!(state.tags.len(), 1);
    }

    #[test]
    fn config_deserializes_without_optional_fields() {
        let config: BuilderConfig =
            serde_json::from_str(r#"{"buckets":["b"],"tags":[{"key":"host"}]}"#).unwrap();
        assert_eq!(config.bucket(), Some("b"));
        assert_eq!(config.tags[0].key.as_deref(), Some("host"));
        assert!(config.tags[0].values.is_empty());
        assert!(config.functions.is_empty());
    }
}
