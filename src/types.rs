use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Acquisition strategies, declared in fixed priority order.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Api,
    Html,
    Rendered,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub api_url: String,
    pub html_url: String,
    pub render_url: String,
    pub user_agent: String,
    pub api_timeout_secs: u64,
    pub html_timeout_secs: u64,
    /// Strategies to try. Order here is ignored; priority is fixed by `StrategyKind`.
    pub strategies: Vec<StrategyKind>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            api_url: "https://www.asx.com.au/asx/api/v1/derivatives/rate-tracker".to_string(),
            html_url: "https://www.asx.com.au/markets/trade-our-derivatives-market/futures-market/rba-rate-tracker"
                .to_string(),
            render_url: "https://www.asx.com.au/markets/trade-our-derivatives-market/futures-market/rba-rate-tracker"
                .to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string(),
            api_timeout_secs: 10,
            html_timeout_secs: 15,
            strategies: vec![StrategyKind::Api, StrategyKind::Html, StrategyKind::Rendered],
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Headless browser executable. The target URL is appended as the last argument.
    pub command: String,
    pub args: Vec<String>,
    /// CSS selector that must be present in the rendered DOM.
    pub ready_selector: String,
    pub timeout_secs: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            command: "chromium".to_string(),
            args: vec![
                "--headless".to_string(),
                "--no-sandbox".to_string(),
                "--disable-dev-shm-usage".to_string(),
                "--disable-gpu".to_string(),
                "--window-size=1920,1080".to_string(),
                "--dump-dom".to_string(),
            ],
            ready_selector: "table.rate-probability-table, #rate-tracker-data".to_string(),
            timeout_secs: 45,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    pub timezone: Tz,
    /// Prevailing cash rate, used to infer target rates from keyword-only rows.
    pub current_rate: f64,
    pub source_label: String,
    /// Used when no calendar date is on or after today.
    pub default_next_meeting: NaiveDate,
    pub meeting_calendar: Vec<NaiveDate>,
}

impl Default for MarketConfig {
    fn default() -> Self {
        let calendar = [
            (2025, 7, 8),
            (2025, 8, 12),
            (2025, 9, 30),
            (2025, 11, 18),
            (2025, 12, 16),
            (2026, 2, 17),
            (2026, 3, 31),
            (2026, 5, 19),
        ];
        Self {
            timezone: chrono_tz::Australia::Sydney,
            current_rate: 3.85,
            source_label: "ASX RBA Rate Tracker".to_string(),
            default_next_meeting: NaiveDate::from_ymd_opt(2025, 7, 8).unwrap_or_default(),
            meeting_calendar: calendar
                .iter()
                .filter_map(|&(y, m, d)| NaiveDate::from_ymd_opt(y, m, d))
                .collect(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FallbackOutcome {
    pub description: String,
    pub rate: f64,
    pub probability: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub outcomes: Vec<FallbackOutcome>,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            outcomes: vec![
                FallbackOutcome {
                    description: "Hold (3.85%)".to_string(),
                    rate: 3.85,
                    probability: 3.0,
                },
                FallbackOutcome {
                    description: "-0.25% (3.60%)".to_string(),
                    rate: 3.60,
                    probability: 97.0,
                },
            ],
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub state_path: PathBuf,
    pub history_dir: PathBuf,
    pub lease_timeout_secs: u64,
    /// Leases older than this are assumed abandoned by a crashed run.
    pub stale_lease_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from("data/market-odds.json"),
            history_dir: PathBuf::from("data/history"),
            lease_timeout_secs: 10,
            stale_lease_secs: 300,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// `/health` reports stale once the last pipeline run is older than this.
    pub max_staleness_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".to_string(),
            max_staleness_secs: 2 * 24 * 60 * 60,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub render: RenderConfig,
    pub market: MarketConfig,
    pub fallback: FallbackConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
}

impl AppConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file at {path}"))?;
        let cfg: Self = toml::from_str(&contents)
            .with_context(|| format!("failed to deserialize TOML config at {path}"))?;
        cfg.validate()
            .with_context(|| format!("invalid configuration in {path}"))?;
        Ok(cfg)
    }

    fn validate(&self) -> anyhow::Result<()> {
        for o in &self.fallback.outcomes {
            if !(0.0..=100.0).contains(&o.probability) {
                anyhow::bail!(
                    "fallback outcome {:?} has probability {} outside [0, 100]",
                    o.description,
                    o.probability
                );
            }
        }
        if self.fallback.outcomes.is_empty() {
            anyhow::bail!("at least one fallback outcome is required");
        }
        Ok(())
    }
}
