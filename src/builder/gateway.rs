//! Remote lookups of buckets, tag keys and tag values.

use async_trait::async_trait;
use csv::ReaderBuilder;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use urlencoding::encode;

use super::flux;
use super::types::TagPredicate;
use crate::http::ApiClient;

const BUCKET_LIST_LIMIT: usize = 100;

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("query error: {0}")]
    Query(String),
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl From<anyhow::Error> for GatewayError {
    fn from(err: anyhow::Error) -> Self {
        Self::Request(format!("{err:#}"))
    }
}

/// Read-only metadata lookups the builder depends on.
///
/// `predicates` are the resolved selections of earlier slots, in order; the
/// results only contain keys/values that co-occur with them.
#[async_trait]
pub trait MetadataGateway: Send + Sync {
    async fn find_buckets(&self) -> Result<Vec<String>, GatewayError>;

    async fn find_keys(
        &self,
        bucket: &str,
        predicates: &[TagPredicate],
        search_term: &str,
    ) -> Result<Vec<String>, GatewayError>;

    async fn find_values(
        &self,
        bucket: &str,
        predicates: &[TagPredicate],
        key: &str,
        search_term: &str,
    ) -> Result<Vec<String>, GatewayError>;
}

#[derive(Debug, Deserialize)]
struct BucketListResponse {
    #[serde(default)]
    buckets: Vec<Bucket>,
}

#[derive(Debug, Deserialize)]
struct Bucket {
    name: String,
}

/// Gateway backed by the HTTP bucket and Flux query endpoints.
pub struct FluxGateway {
    client: ApiClient,
}

impl FluxGateway {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    fn query_path(&self) -> String {
        if self.client.org().is_empty() {
            "/api/v2/query".to_string()
        } else {
            format!("/api/v2/query?org={}", encode(self.client.org()))
        }
    }

    async fn run_script(&self, script: String) -> Result<Vec<String>, GatewayError> {
        let body = json!({
            "query": script,
            "type": "flux",
            "dialect": {"header": true, "annotations": []},
        });
        let csv = self.client.post_text(&self.query_path(), &body).await?;
        parse_value_column(&csv)
    }
}

#[async_trait]
impl MetadataGateway for FluxGateway {
    async fn find_buckets(&self) -> Result<Vec<String>, GatewayError> {
        let path = if self.client.org().is_empty() {
            format!("/api/v2/buckets?limit={BUCKET_LIST_LIMIT}")
        } else {
            format!(
                "/api/v2/buckets?org={}&limit={BUCKET_LIST_LIMIT}",
                encode(self.client.org())
            )
        };
        let body = self.client.get_text(&path).await?;
        parse_bucket_list(&body)
    }

    async fn find_keys(
        &self,
        bucket: &str,
        predicates: &[TagPredicate],
        search_term: &str,
    ) -> Result<Vec<String>, GatewayError> {
        self.run_script(flux::find_keys_script(bucket, predicates, search_term))
            .await
    }

    async fn find_values(
        &self,
        bucket: &str,
        predicates: &[TagPredicate],
        key: &str,
        search_term: &str,
    ) -> Result<Vec<String>, GatewayError> {
        self.run_script(flux::find_values_script(
            bucket,
            predicates,
            key,
            search_term,
        ))
        .await
    }
}

pub fn parse_bucket_list(body: &str) -> Result<Vec<String>, GatewayError> {
    let list: BucketListResponse = serde_json::from_str(body)
        .map_err(|err| GatewayError::Decode(format!("bucket list: {err}")))?;
    Ok(list.buckets.into_iter().map(|b| b.name).collect())
}

/// Split a response into its tables. Tables are separated by blank lines
/// and each one starts with its own header row.
fn split_tables(body: &str) -> Vec<String> {
    let mut tables = Vec::new();
    let mut current = String::new();
    for line in body.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                tables.push(std::mem::take(&mut current));
            }
            continue;
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.is_empty() {
        tables.push(current);
    }
    tables
}

fn decode_error(err: csv::Error) -> GatewayError {
    GatewayError::Decode(err.to_string())
}

/// Collect the `_value` column of every table in a Flux CSV response.
///
/// Annotation rows start with `#`. A table whose header starts with an
/// `error` column is a query failure. Duplicates are dropped, first
/// occurrence wins.
pub fn parse_value_column(body: &str) -> Result<Vec<String>, GatewayError> {
    let mut values: Vec<String> = Vec::new();

    for table in split_tables(body) {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .comment(Some(b'#'))
            .from_reader(table.as_bytes());
        let header = reader.headers().map_err(decode_error)?.clone();

        if header.get(0) == Some("error") {
            let message = match reader.records().next() {
                Some(record) => record
                    .map_err(decode_error)?
                    .get(0)
                    .unwrap_or_default()
                    .to_string(),
                None => "query failed".to_string(),
            };
            return Err(GatewayError::Query(message));
        }

        let Some(value_idx) = header.iter().position(|field| field == "_value") else {
            continue;
        };
        for record in reader.records() {
            let record = record.map_err(decode_error)?;
            if let Some(value) = record.get(value_idx) {
                if !values.iter().any(|existing| existing == value) {
                    values.push(value.to_string());
                }
            }
        }
    }

    Ok(values)
}
