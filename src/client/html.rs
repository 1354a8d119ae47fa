use std::time::Duration;

use async_trait::async_trait;

use super::{AcquireError, AcquireResult, AcquisitionStrategy, RawDocument, SourceKind};

/// Server-rendered rate tracker page fetched over plain HTTP.
pub struct HtmlPageStrategy {
    http: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HtmlPageStrategy {
    pub fn new(http: reqwest::Client, url: String, timeout: Duration) -> Self {
        Self { http, url, timeout }
    }
}

#[async_trait]
impl AcquisitionStrategy for HtmlPageStrategy {
    fn name(&self) -> &'static str {
        "html"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::LiveFallback
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn fetch(&self) -> AcquireResult<RawDocument> {
        let resp = self
            .http
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "text/html")
            .timeout(self.timeout)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AcquireError::HttpStatus { status, body });
        }

        Ok(RawDocument::Html(resp.text().await?))
    }
}
