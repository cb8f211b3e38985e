//! Sequencing of lookups in response to builder input.
//!
//! Loads run as a pipeline down the dependency chain: keys of slot `i`, then
//! values of slot `i`, then keys of slot `i + 1`, and so on until a slot is
//! missing, a lookup fails, or a lookup is superseded.

use std::sync::Arc;

use tracing::{debug, error, warn};

use super::fetcher::{FetchError, QueryBuilderFetcher};
use super::gateway::MetadataGateway;
use super::state::BuilderAction;
use super::store::BuilderStore;
use super::types::{BuilderState, LookupKind, RemoteDataState, TagPredicate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CascadeStep {
    Keys(usize),
    Values(usize),
}

struct KeysRequest {
    bucket: String,
    predicates: Vec<TagPredicate>,
    search_term: String,
}

struct ValuesRequest {
    bucket: String,
    predicates: Vec<TagPredicate>,
    key: Option<String>,
    search_term: String,
}

fn keys_request(state: &BuilderState, slot: usize) -> Option<KeysRequest> {
    let bucket = state.config.bucket()?;
    let ui = state.tags.get(slot)?;
    state.config.tags.get(slot)?;
    Some(KeysRequest {
        bucket: bucket.to_string(),
        predicates: state.config.predicates_before(slot),
        search_term: ui.keys_search_term.clone(),
    })
}

fn values_request(state: &BuilderState, slot: usize) -> Option<ValuesRequest> {
    let bucket = state.config.bucket()?;
    let ui = state.tags.get(slot)?;
    Some(ValuesRequest {
        bucket: bucket.to_string(),
        predicates: state.config.predicates_before(slot),
        key: state.selected_key(slot).map(str::to_string),
        search_term: ui.values_search_term.clone(),
    })
}

pub struct Coordinator {
    store: BuilderStore,
    fetcher: QueryBuilderFetcher,
}

impl Coordinator {
    pub fn new(gateway: Arc<dyn MetadataGateway>, initial: BuilderState) -> Self {
        Self {
            store: BuilderStore::new(initial),
            fetcher: QueryBuilderFetcher::new(gateway),
        }
    }

    pub fn store(&self) -> &BuilderStore {
        &self.store
    }

    pub fn snapshot(&self) -> BuilderState {
        self.store.snapshot()
    }

    fn dispatch(&self, action: BuilderAction) {
        self.store.dispatch(action);
    }

    /// Fetch the bucket list and re-select the current bucket if it still
    /// exists, else the first one.
    pub async fn load_buckets(&self) {
        self.dispatch(BuilderAction::SetBucketsStatus(RemoteDataState::Loading));

        let buckets = match self.fetcher.find_buckets().await {
            Ok(buckets) => buckets,
            Err(FetchError::Cancelled) => return,
            Err(FetchError::Failed(err)) => {
                error!(error = %err, "failed to load buckets");
                self.dispatch(BuilderAction::SetBucketsStatus(RemoteDataState::Error));
                return;
            }
        };

        let selected = self.store.read(|s| s.config.bucket().map(str::to_string));
        let bucket = match selected {
            Some(selected) if buckets.contains(&selected) => Some(selected),
            _ => buckets.first().cloned(),
        };
        self.dispatch(BuilderAction::SetBuckets(buckets));

        match bucket {
            Some(bucket) => self.select_bucket(&bucket).await,
            None => debug!("no buckets available"),
        }
    }

    pub async fn select_bucket(&self, bucket: &str) {
        self.fetcher.cancel_slots_from(0);
        self.dispatch(BuilderAction::SelectBucket(bucket.to_string()));
        self.load_tag_selector(0).await;
    }

    /// Load candidate keys for `slot`, then cascade down the chain.
    pub async fn load_tag_selector(&self, slot: usize) {
        self.run_cascade(CascadeStep::Keys(slot)).await;
    }

    /// Load candidate values for `slot`, then cascade down the chain.
    pub async fn load_tag_selector_values(&self, slot: usize) {
        self.run_cascade(CascadeStep::Values(slot)).await;
    }

    pub async fn select_tag_key(&self, slot: usize, key: &str) {
        let Some(previous) = self
            .store
            .read(|s| (slot < s.slot_count()).then(|| s.selected_key(slot).map(str::to_string)))
        else {
            return;
        };

        self.fetcher.cancel_slots_from(slot + 1);
        self.dispatch(BuilderAction::SelectKey {
            slot,
            key: Some(key.to_string()),
        });
        if previous.as_deref() != Some(key) {
            self.dispatch(BuilderAction::SetValuesSelection {
                slot,
                values: Vec::new(),
            });
        }
        self.load_tag_selector_values(slot).await;
    }

    /// Toggle `value` in the selection of `slot`, then reload the next slot.
    /// Selecting the first value on the last slot appends a new one.
    pub async fn select_tag_value(&self, slot: usize, value: &str) {
        let Some(before) = self
            .store
            .read(|s| (slot < s.slot_count()).then(|| s.slot_count()))
        else {
            return;
        };

        self.fetcher.cancel_slots_from(slot + 1);
        self.dispatch(BuilderAction::ToggleValue {
            slot,
            value: value.to_string(),
        });
        if self.store.read(BuilderState::slot_count) > before {
            debug!(slot = slot + 1, "appended tag selector");
        }
        self.load_tag_selector(slot + 1).await;
    }

    pub async fn add_tag_selector(&self) {
        self.dispatch(BuilderAction::AddSelector);
        let last = self.store.read(BuilderState::slot_count) - 1;
        self.load_tag_selector(last).await;
    }

    pub async fn remove_tag_selector(&self, slot: usize) {
        if slot >= self.store.read(BuilderState::slot_count) {
            return;
        }
        self.fetcher.cancel_find_values(slot);
        self.fetcher.cancel_find_keys(slot);
        self.fetcher.cancel_slots_from(slot + 1);

        self.dispatch(BuilderAction::RemoveSelector { slot });
        self.load_tag_selector(slot).await;
    }

    pub fn set_keys_search_term(&self, slot: usize, term: &str) {
        self.dispatch(BuilderAction::SetSearchTerm {
            slot,
            kind: LookupKind::Keys,
            term: term.to_string(),
        });
    }

    pub fn set_values_search_term(&self, slot: usize, term: &str) {
        self.dispatch(BuilderAction::SetSearchTerm {
            slot,
            kind: LookupKind::Values,
            term: term.to_string(),
        });
    }

    pub async fn search_tag_keys(&self, slot: usize) {
        self.load_tag_selector(slot).await;
    }

    pub async fn search_tag_values(&self, slot: usize) {
        self.load_tag_selector_values(slot).await;
    }

    pub fn select_function(&self, name: &str) {
        self.dispatch(BuilderAction::SelectFunction(name.to_string()));
    }

    async fn run_cascade(&self, first: CascadeStep) {
        let mut step = Some(first);
        while let Some(current) = step {
            step = match current {
                CascadeStep::Keys(slot) => self.load_keys(slot).await,
                CascadeStep::Values(slot) => self.load_values(slot).await,
            };
        }
    }

    async fn load_keys(&self, slot: usize) -> Option<CascadeStep> {
        let request = self.store.read(|s| keys_request(s, slot))?;
        self.dispatch(BuilderAction::SetKeysStatus {
            slot,
            status: RemoteDataState::Loading,
        });

        let result = self
            .fetcher
            .find_keys(
                slot,
                &request.bucket,
                &request.predicates,
                &request.search_term,
            )
            .await;

        match result {
            Ok(keys) => {
                if self.store.read(|s| s.selected_key(slot).is_none()) {
                    self.dispatch(BuilderAction::SelectKey {
                        slot,
                        key: keys.first().cloned(),
                    });
                }
                self.dispatch(BuilderAction::SetKeys { slot, keys });
                Some(CascadeStep::Values(slot))
            }
            Err(FetchError::Cancelled) => {
                debug!(slot, "key lookup superseded");
                None
            }
            Err(FetchError::Failed(err)) => {
                warn!(slot, error = %err, "failed to load tag keys");
                self.dispatch(BuilderAction::SetKeysStatus {
                    slot,
                    status: RemoteDataState::Error,
                });
                None
            }
        }
    }

    async fn load_values(&self, slot: usize) -> Option<CascadeStep> {
        let request = self.store.read(|s| values_request(s, slot))?;
        let Some(key) = request.key else {
            // Nothing to look up without a key; the next slot may still exist.
            self.fetcher.cancel_find_values(slot);
            self.dispatch(BuilderAction::SetValues {
                slot,
                values: Vec::new(),
            });
            return Some(CascadeStep::Keys(slot + 1));
        };

        self.dispatch(BuilderAction::SetValuesStatus {
            slot,
            status: RemoteDataState::Loading,
        });

        let result = self
            .fetcher
            .find_values(
                slot,
                &request.bucket,
                &request.predicates,
                &key,
                &request.search_term,
            )
            .await;

        match result {
            Ok(values) => {
                self.dispatch(BuilderAction::SetValues { slot, values });
                Some(CascadeStep::Keys(slot + 1))
            }
            Err(FetchError::Cancelled) => {
                debug!(slot, "value lookup superseded");
                None
            }
            Err(FetchError::Failed(err)) => {
                warn!(slot, key = %key, error = %err, "failed to load tag values");
                self.dispatch(BuilderAction::SetValuesStatus {
                    slot,
                    status: RemoteDataState::Error,
                });
                None
            }
        }
    }
}
