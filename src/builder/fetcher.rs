//! Lookups with "latest wins" semantics per slot.
//!
//! Each (slot, kind) pair has at most one pending lookup. Starting a new one
//! cancels the previous one, whose caller then sees [`FetchError::Cancelled`]
//! instead of its result.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::gateway::{GatewayError, MetadataGateway};
use super::types::{LookupKind, TagPredicate};

#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("lookup superseded")]
    Cancelled,
    #[error(transparent)]
    Failed(#[from] GatewayError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lookup {
    Buckets,
    Slot(usize, LookupKind),
}

impl Lookup {
    fn slot(self) -> Option<usize> {
        match self {
            Self::Buckets => None,
            Self::Slot(slot, _) => Some(slot),
        }
    }
}

struct PendingLookup {
    id: u64,
    token: CancellationToken,
}

pub struct QueryBuilderFetcher {
    gateway: Arc<dyn MetadataGateway>,
    pending: Mutex<HashMap<Lookup, PendingLookup>>,
    next_id: AtomicU64,
}

impl QueryBuilderFetcher {
    pub fn new(gateway: Arc<dyn MetadataGateway>) -> Self {
        Self {
            gateway,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<Lookup, PendingLookup>> {
        self.pending.lock().unwrap_or_else(|err| err.into_inner())
    }

    pub async fn find_buckets(&self) -> Result<Vec<String>, FetchError> {
        self.track(Lookup::Buckets, self.gateway.find_buckets())
            .await
    }

    pub async fn find_keys(
        &self,
        slot: usize,
        bucket: &str,
        predicates: &[TagPredicate],
        search_term: &str,
    ) -> Result<Vec<String>, FetchError> {
        self.track(
            Lookup::Slot(slot, LookupKind::Keys),
            self.gateway.find_keys(bucket, predicates, search_term),
        )
        .await
    }

    pub async fn find_values(
        &self,
        slot: usize,
        bucket: &str,
        predicates: &[TagPredicate],
        key: &str,
        search_term: &str,
    ) -> Result<Vec<String>, FetchError> {
        self.track(
            Lookup::Slot(slot, LookupKind::Values),
            self.gateway.find_values(bucket, predicates, key, search_term),
        )
        .await
    }

    pub fn cancel_find_keys(&self, slot: usize) {
        self.cancel(Lookup::Slot(slot, LookupKind::Keys));
    }

    pub fn cancel_find_values(&self, slot: usize) {
        self.cancel(Lookup::Slot(slot, LookupKind::Values));
    }

    /// Cancel every pending key and value lookup for slots `>= first`.
    pub fn cancel_slots_from(&self, first: usize) {
        let mut pending = self.pending();
        pending.retain(|lookup, entry| match lookup.slot() {
            Some(slot) if slot >= first => {
                debug!(?lookup, "cancelling lookup");
                entry.token.cancel();
                false
            }
            _ => true,
        });
    }

    #[cfg(test)]
    pub fn is_pending(&self, lookup: Lookup) -> bool {
        self.pending().contains_key(&lookup)
    }

    fn cancel(&self, lookup: Lookup) {
        if let Some(entry) = self.pending().remove(&lookup) {
            debug!(?lookup, "cancelling lookup");
            entry.token.cancel();
        }
    }

    fn begin(&self, lookup: Lookup) -> (u64, CancellationToken) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let previous = self.pending().insert(
            lookup,
            PendingLookup {
                id,
                token: token.clone(),
            },
        );
        if let Some(previous) = previous {
            debug!(?lookup, "superseding pending lookup");
            previous.token.cancel();
        }
        (id, token)
    }

    fn finish(&self, lookup: Lookup, id: u64) {
        let mut pending = self.pending();
        if pending.get(&lookup).is_some_and(|entry| entry.id == id) {
            pending.remove(&lookup);
        }
    }

    async fn track<F>(&self, lookup: Lookup, request: F) -> Result<Vec<String>, FetchError>
    where
        F: Future<Output = Result<Vec<String>, GatewayError>>,
    {
        let (id, token) = self.begin(lookup);

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => Err(FetchError::Cancelled),
            result = request => result.map_err(FetchError::from),
        };

        self.finish(lookup, id);
        if token.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::builder::testing::MockGateway;

    fn fetcher(gateway: &Arc<MockGateway>) -> QueryBuilderFetcher {
        QueryBuilderFetcher::new(gateway.clone())
    }

    #[tokio::test(start_paused = true)]
    async fn newer_lookup_supersedes_older_one() {
        let gateway = Arc::new(MockGateway::new());
        gateway.push_keys(Duration::from_millis(10), Ok(vec!["stale".into()]));
        gateway.push_keys(Duration::from_millis(50), Ok(vec!["fresh".into()]));
        let fetcher = fetcher(&gateway);

        let (first, second) = tokio::join!(
            fetcher.find_keys(0, "telegraf", &[], ""),
            fetcher.find_keys(0, "telegraf", &[], ""),
        );

        assert!(matches!(first, Err(FetchError::Cancelled)));
        assert_eq!(second.unwrap(), vec!["fresh"]);
        assert!(!fetcher.is_pending(Lookup::Slot(0, LookupKind::Keys)));
    }

    #[tokio::test(start_paused = true)]
    async fn lookups_for_other_slots_and_kinds_are_independent() {
        let gateway = Arc::new(MockGateway::new());
        gateway.push_keys(Duration::from_millis(20), Ok(vec!["host".into()]));
        gateway.push_keys(Duration::from_millis(20), Ok(vec!["cpu".into()]));
        gateway.push_values(Duration::from_millis(20), Ok(vec!["a".into()]));
        let fetcher = fetcher(&gateway);

        let (slot0, slot1, values0) = tokio::join!(
            fetcher.find_keys(0, "telegraf", &[], ""),
            fetcher.find_keys(1, "telegraf", &[], ""),
            fetcher.find_values(0, "telegraf", &[], "host", ""),
        );

        assert_eq!(slot0.unwrap(), vec!["host"]);
        assert_eq!(slot1.unwrap(), vec!["cpu"]);
        assert_eq!(values0.unwrap(), vec!["a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_cancel_yields_cancelled() {
        let gateway = Arc::new(MockGateway::new());
        gateway.push_values(Duration::from_millis(30), Ok(vec!["a".into()]));
        let fetcher = fetcher(&gateway);

        let lookup = fetcher.find_values(2, "telegraf", &[], "host", "");
        let cancel = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            assert!(fetcher.is_pending(Lookup::Slot(2, LookupKind::Values)));
            fetcher.cancel_find_values(2);
        };
        let (result, ()) = tokio::join!(lookup, cancel);

        assert!(matches!(result, Err(FetchError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_slots_from_spares_earlier_slots() {
        let gateway = Arc::new(MockGateway::new());
        gateway.push_keys(Duration::from_millis(30), Ok(vec!["host".into()]));
        gateway.push_keys(Duration::from_millis(30), Ok(vec!["cpu".into()]));
        let fetcher = fetcher(&gateway);

        let cancel = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            fetcher.cancel_slots_from(1);
        };
        let (slot0, slot1, ()) = tokio::join!(
            fetcher.find_keys(0, "telegraf", &[], ""),
            fetcher.find_keys(1, "telegraf", &[], ""),
            cancel,
        );

        assert_eq!(slot0.unwrap(), vec!["host"]);
        assert!(matches!(slot1, Err(FetchError::Cancelled)));
    }

    #[tokio::test]
    async fn gateway_failures_are_not_cancellations() {
        let gateway = Arc::new(MockGateway::new());
        gateway.push_keys(
            Duration::ZERO,
            Err(GatewayError::Request("connection refused".into())),
        );
        let fetcher = fetcher(&gateway);

        let result = fetcher.find_keys(0, "telegraf", &[], "").await;
        assert!(matches!(
            result,
            Err(FetchError::Failed(GatewayError::Request(_)))
        ));
    }
}
