//! Pure state transitions for the query builder.
//!
//! Every change to a [`BuilderState`] is expressed as a [`BuilderAction`] and
//! applied by [`BuilderState::apply`]. Transitions never perform I/O and are
//! total: an action naming a slot that does not exist is ignored.

use super::types::{
    BuilderState, LookupKind, RemoteDataState, TagSelector, TagSelectorState, FUNCTIONS,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuilderAction {
    SetBucketsStatus(RemoteDataState),
    SetBuckets(Vec<String>),
    SelectBucket(String),
    SetKeysStatus {
        slot: usize,
        status: RemoteDataState,
    },
    SetKeys {
        slot: usize,
        keys: Vec<String>,
    },
    SetValuesStatus {
        slot: usize,
        status: RemoteDataState,
    },
    SetValues {
        slot: usize,
        values: Vec<String>,
    },
    SelectKey {
        slot: usize,
        key: Option<String>,
    },
    SetValuesSelection {
        slot: usize,
        values: Vec<String>,
    },
    ToggleValue {
        slot: usize,
        value: String,
    },
    AddSelector,
    RemoveSelector {
        slot: usize,
    },
    SetSearchTerm {
        slot: usize,
        kind: LookupKind,
        term: String,
    },
    SelectFunction(String),
}

/// Apply `action` to `state` and return the result.
pub fn reduce(mut state: BuilderState, action: BuilderAction) -> BuilderState {
    state.apply(action);
    state
}

impl BuilderState {
    pub fn apply(&mut self, action: BuilderAction) {
        match action {
            BuilderAction::SetBucketsStatus(status) => self.buckets_status = status,
            BuilderAction::SetBuckets(buckets) => {
                self.buckets = buckets;
                self.buckets_status = RemoteDataState::Done;
            }
            BuilderAction::SelectBucket(bucket) => {
                self.config.buckets = vec![bucket];
                for tag in &mut self.tags {
                    tag.keys_status = RemoteDataState::NotStarted;
                    tag.values_status = RemoteDataState::NotStarted;
                }
            }
            BuilderAction::SetKeysStatus { slot, status } => {
                if let Some(tag) = self.tags.get_mut(slot) {
                    tag.keys_status = status;
                }
            }
            BuilderAction::SetKeys { slot, keys } => self.set_keys(slot, keys),
            BuilderAction::SetValuesStatus { slot, status } => {
                if let Some(tag) = self.tags.get_mut(slot) {
                    tag.values_status = status;
                }
            }
            BuilderAction::SetValues { slot, values } => self.set_values(slot, values),
            BuilderAction::SelectKey { slot, key } => {
                if let Some(tag) = self.config.tags.get_mut(slot) {
                    tag.key = key.filter(|key| !key.is_empty());
                }
            }
            BuilderAction::SetValuesSelection { slot, values } => {
                if let Some(tag) = self.config.tags.get_mut(slot) {
                    tag.values = values;
                }
            }
            BuilderAction::ToggleValue { slot, value } => self.toggle_value(slot, value),
            BuilderAction::AddSelector => self.push_selector(),
            BuilderAction::RemoveSelector { slot } => self.remove_selector(slot),
            BuilderAction::SetSearchTerm { slot, kind, term } => {
                if let Some(tag) = self.tags.get_mut(slot) {
                    match kind {
                        LookupKind::Keys => tag.keys_search_term = term,
                        LookupKind::Values => tag.values_search_term = term,
                    }
                }
            }
            BuilderAction::SelectFunction(name) => self.toggle_function(name),
        }
    }

    /// Store fetched keys. A selected key missing from the results is put in
    /// front so the selection stays visible.
    fn set_keys(&mut self, slot: usize, mut keys: Vec<String>) {
        let Some(tag) = self.tags.get_mut(slot) else {
            return;
        };
        if let Some(selected) = self.config.tags.get(slot).and_then(|t| t.key.as_ref()) {
            if !selected.is_empty() && !keys.contains(selected) {
                keys.insert(0, selected.clone());
            }
        }
        tag.keys = keys;
        tag.keys_status = RemoteDataState::Done;
    }

    /// Store fetched values, keeping every selected value in the list.
    fn set_values(&mut self, slot: usize, mut values: Vec<String>) {
        let Some(tag) = self.tags.get_mut(slot) else {
            return;
        };
        if let Some(selector) = self.config.tags.get(slot) {
            for selected in &selector.values {
                if !values.contains(selected) {
                    values.insert(0, selected.clone());
                }
            }
        }
        tag.values = values;
        tag.values_status = RemoteDataState::Done;
    }

    fn toggle_value(&mut self, slot: usize, value: String) {
        let is_last = slot + 1 == self.config.tags.len();
        let Some(tag) = self.config.tags.get_mut(slot) else {
            return;
        };
        if let Some(pos) = tag.values.iter().position(|v| *v == value) {
            tag.values.remove(pos);
        } else {
            tag.values.push(value);
        }
        if is_last && !tag.values.is_empty() {
            self.push_selector();
        }
    }

    fn push_selector(&mut self) {
        self.config.tags.push(TagSelector::default());
        self.tags.push(TagSelectorState::default());
    }

    fn remove_selector(&mut self, slot: usize) {
        if slot >= self.config.tags.len() {
            return;
        }
        self.config.tags.remove(slot);
        if slot < self.tags.len() {
            self.tags.remove(slot);
        }
        if self.config.tags.is_empty() {
            self.push_selector();
        }
    }

    fn toggle_function(&mut self, name: String) {
        if !FUNCTIONS.contains(&name.as_str()) {
            return;
        }
        let functions = &mut self.config.functions;
        if let Some(pos) = functions.iter().position(|f| *f == name) {
            functions.remove(pos);
        } else {
            functions.push(name);
        }
    }
}
