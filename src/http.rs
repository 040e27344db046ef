// JSON-over-HTTP client for the third-party game APIs, with retries.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::retry::{Failure, RetryError, RetryPolicy};

/// Per-request timeout for every third-party call.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub const USER_AGENT: &str = concat!("clan-helper/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build http client: {0}")]
    Client(reqwest::Error),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(StatusCode),
    #[error("malformed response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("cancelled")]
    Cancelled,
    #[error("gave up after {attempts} attempts: {last}")]
    GaveUp { attempts: u32, last: Box<FetchError> },
}

/// Fetches and decodes JSON documents. Network errors and non-2xx statuses
/// are retried per the policy; a body that fails to decode is not.
#[derive(Clone)]
pub struct JsonFetcher {
    client: Client,
    policy: RetryPolicy,
}

impl JsonFetcher {
    pub fn new(policy: RetryPolicy) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self { client, policy })
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<T, FetchError> {
        let client = &self.client;
        let result = self
            .policy
            .run(cancel, |attempt| async move {
                let response = match client.get(url).send().await {
                    Ok(response) => response,
                    Err(e) => {
                        tracing::warn!(attempt, url, "Fetch attempt failed: {e}");
                        return Err(Failure::Transient(FetchError::Request(e)));
                    }
                };

                let status = response.status();
                if !status.is_success() {
                    tracing::warn!(attempt, url, status = status.as_u16(), "Fetch attempt returned error status");
                    return Err(Failure::Transient(FetchError::Status(status)));
                }

                let body = match response.bytes().await {
                    Ok(body) => body,
                    Err(e) => return Err(Failure::Transient(FetchError::Request(e))),
                };
                serde_json::from_slice::<T>(&body)
                    .map_err(|e| Failure::Permanent(FetchError::Decode(e)))
            })
            .await;

        result.map_err(|e| match e {
            RetryError::Cancelled => FetchError::Cancelled,
            RetryError::Exhausted { attempts, last } => FetchError::GaveUp {
                attempts,
                last: Box::new(last),
            },
            RetryError::Aborted(e) => e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FAST: RetryPolicy = RetryPolicy::exponential(3, Duration::from_millis(5), 2);

    #[tokio::test]
    async fn test_retries_server_errors_then_gives_up() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/logs"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let fetcher = JsonFetcher::new(FAST).unwrap();
        let result: Result<Vec<i32>, _> = fetcher
            .get_json(&format!("{}/logs", server.uri()), &CancellationToken::new())
            .await;

        match result {
            Err(FetchError::GaveUp { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, FetchError::Status(StatusCode::SERVICE_UNAVAILABLE)));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/logs"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = JsonFetcher::new(FAST).unwrap();
        let result: Result<Vec<i32>, _> = fetcher
            .get_json(&format!("{}/logs", server.uri()), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(FetchError::Decode(_))));
    }

    #[tokio::test]
    async fn test_decodes_success_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([1, 2, 3])))
            .mount(&server)
            .await;

        let fetcher = JsonFetcher::new(FAST).unwrap();
        let values: Vec<i32> = fetcher
            .get_json(&server.uri(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let fetcher = JsonFetcher::new(FAST).unwrap();
        let result: Result<Vec<i32>, _> = fetcher.get_json("http://127.0.0.1:9/never", &cancel).await;
        assert!(matches!(result, Err(FetchError::Cancelled)));
    }
}
