use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::monitoring::metrics::METRICS;
use crate::types::{AppConfig, StrategyKind};

pub mod api;
pub mod html;
pub mod render;

pub use render::RenderError;

#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status}: {body}")]
    HttpStatus {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("serialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("render error: {0}")]
    Render(#[from] RenderError),

    #[error("{strategy} timed out after {timeout:?}")]
    Timeout {
        strategy: &'static str,
        timeout: Duration,
    },

    #[error("{0} returned a document without usable outcomes")]
    Unusable(&'static str),

    #[error("all acquisition strategies failed")]
    Exhausted,
}

pub type AcquireResult<T> = Result<T, AcquireError>;

/// Raw upstream document before extraction.
#[derive(Clone, Debug, PartialEq)]
pub enum RawDocument {
    Html(String),
    Json(serde_json::Value),
}

/// Which acquisition path a snapshot came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    LivePrimary,
    LiveFallback,
    Cached,
}

impl SourceKind {
    /// Human-readable `source` label built on the configured base label.
    pub fn label(self, base: &str) -> String {
        match self {
            SourceKind::LivePrimary => format!("{base} API"),
            SourceKind::LiveFallback => base.to_string(),
            SourceKind::Cached => format!("{base} (Cached)"),
        }
    }
}

/// One way of obtaining a raw document from upstream.
#[async_trait]
pub trait AcquisitionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn kind(&self) -> SourceKind;

    /// Upper bound for a single `fetch`, enforced by the [`Acquirer`].
    fn timeout(&self) -> Duration;

    async fn fetch(&self) -> AcquireResult<RawDocument>;
}

/// Document obtained by the first strategy that succeeded.
#[derive(Clone, Debug)]
pub struct Acquired {
    pub document: RawDocument,
    pub source: String,
    pub strategy: &'static str,
}

/// Tries strategies in priority order until one yields an accepted document.
pub struct Acquirer {
    strategies: Vec<Box<dyn AcquisitionStrategy>>,
    source_label: String,
}

impl Acquirer {
    /// `strategies` are tried in the order given.
    pub fn new(strategies: Vec<Box<dyn AcquisitionStrategy>>, source_label: impl Into<String>) -> Self {
        Self {
            strategies,
            source_label: source_label.into(),
        }
    }

    pub fn from_config(cfg: &AppConfig) -> AcquireResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(cfg.source.user_agent.as_str())
            .build()
            .map_err(AcquireError::Http)?;

        let mut kinds = cfg.source.strategies.clone();
        kinds.sort();
        kinds.dedup();

        let strategies = kinds
            .into_iter()
            .map(|kind| -> Box<dyn AcquisitionStrategy> {
                match kind {
                    StrategyKind::Api => Box::new(api::ApiStrategy::new(
                        http.clone(),
                        cfg.source.api_url.clone(),
                        Duration::from_secs(cfg.source.api_timeout_secs),
                    )),
                    StrategyKind::Html => Box::new(html::HtmlPageStrategy::new(
                        http.clone(),
                        cfg.source.html_url.clone(),
                        Duration::from_secs(cfg.source.html_timeout_secs),
                    )),
                    StrategyKind::Rendered => Box::new(render::RenderedPageStrategy::new(
                        Box::new(render::CommandRenderer::from_config(&cfg.render)),
                        cfg.source.render_url.clone(),
                        cfg.render.ready_selector.clone(),
                        Duration::from_secs(cfg.render.timeout_secs),
                    )),
                }
            })
            .collect();

        Ok(Self::new(strategies, cfg.market.source_label.clone()))
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Return the first document for which `accept` holds.
    ///
    /// A strategy fails on transport errors, non-2xx responses, its timeout
    /// or a rejected document. If every fetched document was rejected, the
    /// highest-priority one is still returned so the caller can diagnose it;
    /// `Exhausted` means nothing was fetched at all.
    pub async fn acquire<F>(&self, accept: F) -> AcquireResult<Acquired>
    where
        F: Fn(&RawDocument) -> bool,
    {
        let mut rejected: Option<Acquired> = None;

        for strategy in &self.strategies {
            let name = strategy.name();
            let limit = strategy.timeout();
            info!(target: "acquire", strategy = name, timeout_ms = limit.as_millis() as u64, "trying strategy");

            let result = match tokio::time::timeout(limit, strategy.fetch()).await {
                Ok(res) => res,
                Err(_) => Err(AcquireError::Timeout {
                    strategy: name,
                    timeout: limit,
                }),
            };

            match result {
                Ok(document) => {
                    let acquired = Acquired {
                        document,
                        source: strategy.kind().label(&self.source_label),
                        strategy: name,
                    };
                    if accept(&acquired.document) {
                        info!(target: "acquire", strategy = name, "document acquired");
                        return Ok(acquired);
                    }
                    let err = AcquireError::Unusable(name);
                    warn!(target: "acquire", strategy = name, error = %err, "strategy failed");
                    METRICS.record_strategy_failure(name, "unusable");
                    rejected.get_or_insert(acquired);
                }
                Err(err) => {
                    warn!(target: "acquire", strategy = name, error = %err, "strategy failed");
                    METRICS.record_strategy_failure(name, failure_reason(&err));
                }
            }
        }

        rejected.ok_or(AcquireError::Exhausted)
    }
}

fn failure_reason(err: &AcquireError) -> &'static str {
    match err {
        AcquireError::Http(_) => "transport",
        AcquireError::HttpStatus { .. } => "status",
        AcquireError::SerdeJson(_) => "decode",
        AcquireError::Render(_) => "render",
        AcquireError::Timeout { .. } => "timeout",
        AcquireError::Unusable(_) => "unusable",
        AcquireError::Exhausted => "exhausted",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Fixed {
        name: &'static str,
        kind: SourceKind,
        delay: Duration,
        result: Option<RawDocument>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl AcquisitionStrategy for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }
        fn kind(&self) -> SourceKind {
            self.kind
        }
        fn timeout(&self) -> Duration {
            Duration::from_millis(50)
        }
        async fn fetch(&self) -> AcquireResult<RawDocument> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.result.clone().ok_or(AcquireError::HttpStatus {
                status: reqwest::StatusCode::BAD_GATEWAY,
                body: String::new(),
            })
        }
    }

    fn fixed(
        name: &'static str,
        kind: SourceKind,
        delay_ms: u64,
        result: Option<RawDocument>,
    ) -> (Box<dyn AcquisitionStrategy>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let s = Fixed {
            name,
            kind,
            delay: Duration::from_millis(delay_ms),
            result,
            calls: calls.clone(),
        };
        (Box::new(s), calls)
    }

    #[test]
    fn source_labels() {
        assert_eq!(SourceKind::LivePrimary.label("ASX"), "ASX API");
        assert_eq!(SourceKind::LiveFallback.label("ASX"), "ASX");
        assert_eq!(SourceKind::Cached.label("ASX"), "ASX (Cached)");
    }

    #[tokio::test]
    async fn falls_through_errors_and_timeouts_in_order() {
        let (api, api_calls) = fixed("api", SourceKind::LivePrimary, 0, None);
        let (slow, slow_calls) = fixed(
            "html",
            SourceKind::LiveFallback,
            500,
            Some(RawDocument::Html("<p>late</p>".into())),
        );
        let (rendered, rendered_calls) = fixed(
            "rendered",
            SourceKind::LiveFallback,
            0,
            Some(RawDocument::Html("<table></table>".into())),
        );
        let acquirer = Acquirer::new(vec![api, slow, rendered], "ASX RBA Rate Tracker");

        let acquired = acquirer.acquire(|_| true).await.unwrap();
        assert_eq!(acquired.strategy, "rendered");
        assert_eq!(acquired.source, "ASX RBA Rate Tracker");
        assert_eq!(api_calls.load(Ordering::SeqCst), 1);
        assert_eq!(slow_calls.load(Ordering::SeqCst), 1);
        assert_eq!(rendered_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stops_at_first_success() {
        let (api, _) = fixed(
            "api",
            SourceKind::LivePrimary,
            0,
            Some(RawDocument::Json(serde_json::json!({"outcomes": []}))),
        );
        let (html, html_calls) = fixed("html", SourceKind::LiveFallback, 0, None);
        let acquirer = Acquirer::new(vec![api, html], "ASX RBA Rate Tracker");

        let acquired = acquirer.acquire(|_| true).await.unwrap();
        assert_eq!(acquired.source, "ASX RBA Rate Tracker API");
        assert_eq!(html_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejected_documents_fall_through_but_are_kept() {
        let first = RawDocument::Html("<p>nothing here</p>".into());
        let (api, _) = fixed("api", SourceKind::LivePrimary, 0, Some(first.clone()));
        let (html, _) = fixed(
            "html",
            SourceKind::LiveFallback,
            0,
            Some(RawDocument::Html("<p>nor here</p>".into())),
        );
        let acquirer = Acquirer::new(vec![api, html], "ASX RBA Rate Tracker");

        let acquired = acquirer.acquire(|_| false).await.unwrap();
        assert_eq!(acquired.strategy, "api");
        assert_eq!(acquired.document, first);
    }

    #[tokio::test]
    async fn exhausted_when_nothing_fetched() {
        let (api, _) = fixed("api", SourceKind::LivePrimary, 200, None);
        let (html, _) = fixed("html", SourceKind::LiveFallback, 0, None);
        let acquirer = Acquirer::new(vec![api, html], "ASX RBA Rate Tracker");

        let err = acquirer.acquire(|_| true).await.unwrap_err();
        assert!(matches!(err, AcquireError::Exhausted));
    }
}
