//! JavaScript-rendered page acquisition.
//!
//! Rendering is delegated to an external headless browser. Each attempt
//! spawns its own process, which is killed when the attempt finishes or is
//! dropped, so no browser outlives the request that started it.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};
use thiserror::Error;
use tokio::process::Command;

use crate::types::RenderConfig;

use super::{AcquireResult, AcquisitionStrategy, RawDocument, SourceKind};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to start renderer: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("renderer exited with {status}: {stderr}")]
    Exit {
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("renderer timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid ready selector {0:?}")]
    Selector(String),

    #[error("rendered page has no element matching {0:?}")]
    NotReady(String),
}

/// Narrow "render and return HTML" capability.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Render `url` and return its DOM once `ready_selector` matches.
    async fn render(&self, url: &str, ready_selector: &str) -> Result<String, RenderError>;
}

/// Renderer that shells out to a headless browser printing the DOM to stdout.
pub struct CommandRenderer {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandRenderer {
    pub fn new(command: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            args,
            timeout,
        }
    }

    pub fn from_config(cfg: &RenderConfig) -> Self {
        Self::new(
            cfg.command.clone(),
            cfg.args.clone(),
            Duration::from_secs(cfg.timeout_secs),
        )
    }
}

#[async_trait]
impl Renderer for CommandRenderer {
    async fn render(&self, url: &str, ready_selector: &str) -> Result<String, RenderError> {
        let child = Command::new(&self.command)
            .args(&self.args)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // On timeout the wait future is dropped along with the child.
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| RenderError::Timeout(self.timeout))??;

        if !output.status.success() {
            return Err(RenderError::Exit {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let html = String::from_utf8_lossy(&output.stdout).into_owned();
        ensure_ready(&html, ready_selector)?;
        Ok(html)
    }
}

/// Check that the rendered DOM contains the element the page needs.
pub fn ensure_ready(html: &str, ready_selector: &str) -> Result<(), RenderError> {
    let selector =
        Selector::parse(ready_selector).map_err(|_| RenderError::Selector(ready_selector.to_string()))?;
    let doc = Html::parse_document(html);
    if doc.select(&selector).next().is_none() {
        return Err(RenderError::NotReady(ready_selector.to_string()));
    }
    Ok(())
}

pub struct RenderedPageStrategy {
    renderer: Box<dyn Renderer>,
    url: String,
    ready_selector: String,
    timeout: Duration,
}

impl RenderedPageStrategy {
    pub fn new(
        renderer: Box<dyn Renderer>,
        url: String,
        ready_selector: String,
        timeout: Duration,
    ) -> Self {
        Self {
            renderer,
            url,
            ready_selector,
            timeout,
        }
    }
}

#[async_trait]
impl AcquisitionStrategy for RenderedPageStrategy {
    fn name(&self) -> &'static str {
        "rendered"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::LiveFallback
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn fetch(&self) -> AcquireResult<RawDocument> {
        let html = self.renderer.render(&self.url, &self.ready_selector).await?;
        Ok(RawDocument::Html(html))
    }
}
