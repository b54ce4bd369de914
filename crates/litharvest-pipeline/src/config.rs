use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Everything the pipeline is allowed to tune, decided once at construction.
/// Components receive the values they need through constructors; nothing
/// reads configuration at call time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub merge: MergeConfig,
    pub scihub: SciHubConfig,
    pub translation: TranslationConfig,
    /// Required by the Unpaywall API; the strategy stays inert without it.
    pub unpaywall_email: Option<String>,
    /// Contact address for the Crossref polite pool, folded into the User-Agent.
    pub polite_email: Option<String>,
    /// Directory downloaded PDFs land in.
    pub output_dir: PathBuf,
    /// Response cache location; `None` picks a per-user default.
    pub cache_dir: Option<PathBuf>,
    pub cache_ttl_secs: u64,
    /// Attempt log destination; `None` puts `audit.jsonl` next to the PDFs.
    pub audit_log: Option<PathBuf>,
    /// Records acquired concurrently.
    pub max_workers: usize,
    /// Extra executions of one strategy after a retryable failure.
    pub max_retries: u32,
    /// Ceiling for the exponential retry backoff, in seconds.
    pub backoff_cap_secs: u64,
    /// Minimum spacing between requests to the same host.
    pub min_request_interval_ms: u64,
    /// Look up missing DOIs by title before running the chain.
    pub backfill_dois: bool,
    /// Minimum Crossref relevance score an accepted backfill match needs.
    pub backfill_min_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Sources whose records win primary selection outright, compared
    /// case-insensitively.
    pub priority_sources: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SciHubConfig {
    pub enabled: bool,
    /// Mirror list tried in order; empty means the built-in list.
    pub mirrors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TranslationConfig {
    /// Base URL of a running Zotero translation server, e.g.
    /// `http://localhost:1969`. The strategy is skipped when unset.
    pub server_url: Option<String>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            priority_sources: vec!["pubmed".to_string()],
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            merge: MergeConfig::default(),
            scihub: SciHubConfig::default(),
            translation: TranslationConfig::default(),
            unpaywall_email: None,
            polite_email: None,
            output_dir: PathBuf::from("pdfs"),
            cache_dir: None,
            cache_ttl_secs: 7 * 24 * 3600,
            audit_log: None,
            max_workers: 4,
            max_retries: 3,
            backoff_cap_secs: 10,
            min_request_interval_ms: 250,
            backfill_dois: false,
            backfill_min_score: 50.0,
        }
    }
}

impl PipelineConfig {
    /// Defaults plus optional credentials and toggles from the environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.polite_email = env_first([
            "LITHARVEST_POLITE_EMAIL",
            "POLITE_POOL_EMAIL",
            "CROSSREF_EMAIL",
        ]);
        config.unpaywall_email = env_first(["LITHARVEST_UNPAYWALL_EMAIL", "UNPAYWALL_EMAIL"])
            .or_else(|| config.polite_email.clone());
        if let Some(dir) = env_first(["LITHARVEST_OUTPUT_DIR"]) {
            config.output_dir = PathBuf::from(dir);
        }
        if let Some(flag) = env_first(["LITHARVEST_SCIHUB"]) {
            config.scihub.enabled = matches!(flag.as_str(), "1" | "true" | "yes");
        }
        config.translation.server_url = env_first(["LITHARVEST_TRANSLATION_SERVER"]);
        if let Some(flag) = env_first(["LITHARVEST_BACKFILL_DOIS"]) {
            config.backfill_dois = matches!(flag.as_str(), "1" | "true" | "yes");
        }
        config
    }
}

fn env_first<const N: usize>(keys: [&str; N]) -> Option<String> {
    keys.into_iter()
        .find_map(|key| std::env::var(key).ok())
        .filter(|value| !value.trim().is_empty())
}
