//! HTTP event-stream client.
//!
//! Posts records to a REST proxy in front of the distributed log:
//! `POST {base_url}/topics/{destination}` with `{ "records": [{ "key", "value" }] }`.
//! Retries belong to the publisher; this client makes exactly one request.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::application::ports::{EventStreamPort, StreamSendError};

#[derive(Debug, Serialize)]
struct ProduceRequest<'a> {
    records: [ProduceRecord<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ProduceRecord<'a> {
    key: &'a str,
    value: &'a str,
}

/// REST-proxy event stream client.
#[derive(Debug, Clone)]
pub struct HttpEventStreamClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpEventStreamClient {
    /// Create a client for `base_url` with a per-request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, StreamSendError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StreamSendError::Connection {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    /// URL records for `destination` are posted to.
    #[must_use]
    pub fn topic_url(&self, destination: &str) -> String {
        format!("{}/topics/{destination}", self.base_url)
    }
}

#[async_trait]
impl EventStreamPort for HttpEventStreamClient {
    async fn send(
        &self,
        destination: &str,
        key: &str,
        payload: &str,
    ) -> Result<(), StreamSendError> {
        let body = ProduceRequest {
            records: [ProduceRecord {
                key,
                value: payload,
            }],
        };

        let response = self
            .client
            .post(self.topic_url(destination))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    StreamSendError::Timeout {
                        timeout_ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    StreamSendError::Connection {
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        Err(StreamSendError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}
