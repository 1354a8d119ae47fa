//! Structured JSON endpoint behind the ASX rate tracker.
//!
//! The endpoint is undocumented. Responses are kept as raw JSON and the
//! outcome extractor decides which record layout they follow.

use std::time::Duration;

use async_trait::async_trait;

use super::{AcquireError, AcquireResult, AcquisitionStrategy, RawDocument, SourceKind};

pub struct ApiStrategy {
    http: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl ApiStrategy {
    pub fn new(http: reqwest::Client, url: String, timeout: Duration) -> Self {
        Self { http, url, timeout }
    }
}

#[async_trait]
impl AcquisitionStrategy for ApiStrategy {
    fn name(&self) -> &'static str {
        "api"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::LivePrimary
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn fetch(&self) -> AcquireResult<RawDocument> {
        let resp = self
            .http
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(self.timeout)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AcquireError::HttpStatus { status, body });
        }

        let bytes = resp.bytes().await?;
        let value: serde_json::Value = serde_json::from_slice(&bytes)?;
        Ok(RawDocument::Json(value))
    }
}
