use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use backoff::future::retry_notify;
use backoff::{Error as BackoffError, ExponentialBackoffBuilder};
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use tracing::{debug, warn};

use crate::login::LoginContext;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const QUERY_MAX_ATTEMPTS: usize = 4;
const QUERY_RETRY_BASE_DELAY_MS: u64 = 250;
const QUERY_MAX_BACKOFF_SECS: u64 = 4;

/// Thin wrapper over the platform's HTTP API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    token: Option<String>,
    org: String,
}

impl ApiClient {
    pub fn new(ctx: &LoginContext) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("fluxqb/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: ctx.host.trim_end_matches('/').to_string(),
            token: ctx.token.clone(),
            org: ctx.org.clone().unwrap_or_default(),
        })
    }

    pub fn org(&self) -> &str {
        &self.org
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.header("Authorization", format!("Token {token}")),
            None => request,
        }
    }

    /// GET `path` and return the raw response body.
    pub async fn get_text(&self, path: &str) -> Result<String> {
        let url = self.url(path);
        debug!(%url, "GET");
        let response = self
            .authorize(self.http.get(&url))
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("failed to read response from {path}"))?;
        if !status.is_success() {
            return Err(anyhow!("GET {path} failed ({status}): {body}"));
        }
        Ok(body)
    }

    /// POST a JSON body and return the raw response text. Server errors and
    /// network failures are retried with exponential backoff.
    pub async fn post_text<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<String> {
        let url = self.url(path);
        let body = serde_json::to_value(body).context("failed to encode request body")?;
        let attempt_counter = Arc::new(AtomicUsize::new(0));

        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(QUERY_RETRY_BASE_DELAY_MS))
            .with_multiplier(2.0)
            .with_randomization_factor(0.2)
            .with_max_interval(Duration::from_secs(QUERY_MAX_BACKOFF_SECS))
            .with_max_elapsed_time(None)
            .build();

        retry_notify(
            backoff,
            || {
                let request = self
                    .authorize(self.http.post(&url))
                    .header("content-type", "application/json")
                    .header("accept", "application/csv")
                    .json(&body);
                let attempt_counter = Arc::clone(&attempt_counter);

                async move {
                    let attempt = attempt_counter.fetch_add(1, Ordering::Relaxed) + 1;
                    match request.send().await {
                        Ok(response) => {
                            let status = response.status();
                            let text = response.text().await.unwrap_or_default();
                            if status.is_success() {
                                return Ok(text);
                            }
                            if status.is_server_error() && attempt < QUERY_MAX_ATTEMPTS {
                                Err(BackoffError::transient(anyhow!(
                                    "POST {path} failed ({status}) on attempt {attempt}/{QUERY_MAX_ATTEMPTS}: {text}"
                                )))
                            } else {
                                Err(BackoffError::permanent(anyhow!(
                                    "POST {path} failed ({status}): {text}"
                                )))
                            }
                        }
                        Err(err) if attempt < QUERY_MAX_ATTEMPTS => Err(BackoffError::transient(
                            anyhow!("network error on attempt {attempt}/{QUERY_MAX_ATTEMPTS}: {err}"),
                        )),
                        Err(err) => Err(BackoffError::permanent(anyhow!(
                            "POST {path} failed after {attempt} attempt(s): {err}"
                        ))),
                    }
                }
            },
            |err: anyhow::Error, wait: Duration| {
                warn!(error = %err, ?wait, "retrying query request");
            },
        )
        .await
    }
}
