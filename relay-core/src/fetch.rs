use std::{fmt::Debug, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, Method};

use crate::error::RelayError;

/// Issues a bodiless request and hands back the full response body.
#[async_trait]
pub trait Fetcher: Send + Sync + Debug {
    async fn fetch(&self, method: Method, url: &str) -> Result<String, RelayError>;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: Client,
}

impl HttpFetcher {
    /// Client without a request timeout.
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }

    pub fn with_timeout(timeout: Option<Duration>) -> Result<Self, RelayError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
        })
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, method: Method, url: &str) -> Result<String, RelayError> {
        let res = self
            .http
            .request(method, url)
            .send()
            .await
            .map_err(|e| RelayError::Transport(format!("Failed to send request to {url}: {e}")))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| RelayError::Transport(format!("Failed to read response body: {e}")))?;

        if !status.is_success() {
            return Err(RelayError::Status {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        tracing::debug!(%url, body = %body, "looked up");
        Ok(body)
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}
