//! Scripted in-memory gateway for builder tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::gateway::{GatewayError, MetadataGateway};
use super::types::TagPredicate;

type Reply = (Duration, Result<Vec<String>, GatewayError>);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Buckets,
    Keys {
        bucket: String,
        predicates: Vec<TagPredicate>,
        search_term: String,
    },
    Values {
        bucket: String,
        predicates: Vec<TagPredicate>,
        key: String,
        search_term: String,
    },
}

/// Replays queued replies in call order, after each reply's delay. An empty
/// queue answers immediately with an empty list.
#[derive(Default)]
pub struct MockGateway {
    buckets: Mutex<VecDeque<Reply>>,
    keys: Mutex<VecDeque<Reply>>,
    values: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<Call>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_buckets(&self, delay: Duration, reply: Result<Vec<String>, GatewayError>) {
        self.buckets.lock().unwrap().push_back((delay, reply));
    }

    pub fn push_keys(&self, delay: Duration, reply: Result<Vec<String>, GatewayError>) {
        self.keys.lock().unwrap().push_back((delay, reply));
    }

    pub fn push_values(&self, delay: Duration, reply: Result<Vec<String>, GatewayError>) {
        self.values.lock().unwrap().push_back((delay, reply));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    async fn reply(&self, queue: &Mutex<VecDeque<Reply>>, call: Call) -> Result<Vec<String>, GatewayError> {
        self.calls.lock().unwrap().push(call);
        let next = queue.lock().unwrap().pop_front();
        match next {
            Some((delay, reply)) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                reply
            }
            None => Ok(Vec::new()),
        }
    }
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

pub fn predicate(key: &str, values: &[&str]) -> TagPredicate {
    TagPredicate {
        key: key.to_string(),
        values: strings(values),
    }
}

#[async_trait]
impl MetadataGateway for MockGateway {
    async fn find_buckets(&self) -> Result<Vec<String>, GatewayError> {
        self.reply(&self.buckets, Call::Buckets).await
    }

    async fn find_keys(
        &self,
        bucket: &str,
        predicates: &[TagPredicate],
        search_term: &str,
    ) -> Result<Vec<String>, GatewayError> {
        let call = Call::Keys {
            bucket: bucket.to_string(),
            predicates: predicates.to_vec(),
            search_term: search_term.to_string(),
        };
        self.reply(&self.keys, call).await
    }

    async fn find_values(
        &self,
        bucket: &str,
        predicates: &[TagPredicate],
        key: &str,
        search_term: &str,
    ) -> Result<Vec<String>, GatewayError> {
        let call = Call::Values {
            bucket: bucket.to_string(),
            predicates: predicates.to_vec(),
            key: key.to_string(),
            search_term: search_term.to_string(),
        };
        self.reply(&self.values, call).await
    }
}
