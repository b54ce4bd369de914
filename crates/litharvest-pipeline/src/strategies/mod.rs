use std::sync::Arc;

use async_trait::async_trait;
use litharvest_core::CanonicalRecord;

use crate::cache::ResponseCache;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::http::RateLimitedClient;

/// Outcome of one strategy execution for one record.
#[derive(Debug)]
pub enum AttemptResult {
    Success {
        bytes: Vec<u8>,
        content_type: Option<String>,
    },
    NotFound,
    TransientError {
        retryable: bool,
        detail: String,
    },
    InvalidContent {
        reason: String,
    },
}

/// One rung of the fallback chain. `applicable` is a cheap local check so
/// irrelevant strategies never cost a network call; `attempt` does the work.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn applicable(&self, record: &CanonicalRecord) -> bool;

    async fn attempt(&self, record: &CanonicalRecord) -> AttemptResult;
}

impl From<PipelineError> for AttemptResult {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Api {
                status: 404 | 410, ..
            } => AttemptResult::NotFound,
            PipelineError::Api { status, .. } if status == 429 || status >= 500 => {
                AttemptResult::TransientError {
                    retryable: true,
                    detail: format!("HTTP {status}"),
                }
            }
            PipelineError::Api { status, .. } => AttemptResult::TransientError {
                retryable: false,
                detail: format!("HTTP {status}"),
            },
            PipelineError::RateLimit(host, secs) => AttemptResult::TransientError {
                retryable: true,
                detail: format!("{host} rate limited, retry after {secs}s"),
            },
            PipelineError::Http(e) => AttemptResult::TransientError {
                retryable: e.is_timeout() || e.is_connect(),
                detail: e.to_string(),
            },
            other => AttemptResult::TransientError {
                retryable: false,
                detail: other.to_string(),
            },
        }
    }
}

/// Builds the chain in its canonical order: free and structured sources
/// first, heuristic scraping later, opt-in strategies last.
pub fn default_chain(
    config: &PipelineConfig,
    client: Arc<RateLimitedClient>,
    cache: Arc<ResponseCache>,
) -> Vec<Box<dyn Strategy>> {
    let mut chain: Vec<Box<dyn Strategy>> = vec![
        Box::new(direct::DirectStrategy::new(client.clone())),
        Box::new(arxiv::ArxivStrategy::new(client.clone())),
        Box::new(biorxiv::BiorxivStrategy::new(client.clone())),
        Box::new(unpaywall::UnpaywallStrategy::new(
            client.clone(),
            cache.clone(),
            config.unpaywall_email.clone(),
        )),
        Box::new(crossref::CrossrefStrategy::new(
            client.clone(),
            cache.clone(),
            config.polite_email.clone(),
        )),
        Box::new(pmc::PmcStrategy::new(client.clone(), cache)),
        Box::new(publisher::PublisherStrategy::new(client.clone())),
        Box::new(academic_social::ResearchGateStrategy::new(client.clone())),
        Box::new(scrape::ScrapeStrategy::new(client.clone())),
    ];
    if config.scihub.enabled {
        chain.push(Box::new(scihub::SciHubStrategy::new(
            client.clone(),
            config.scihub.mirrors.clone(),
        )));
    }
    if let Some(server) = &config.translation.server_url {
        chain.push(Box::new(translation::TranslationStrategy::new(
            client,
            server.clone(),
        )));
    }
    chain
}

pub mod academic_social;
pub mod arxiv;
pub mod biorxiv;
pub mod crossref;
pub mod direct;
pub mod pmc;
pub mod publisher;
pub mod scihub;
pub mod scrape;
pub mod translation;
pub mod unpaywall;

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn missing_statuses_convert_to_not_found() {
        let err = PipelineError::Api {
            host: "x".into(),
            status: 404,
        };
        assert!(matches!(AttemptResult::from(err), AttemptResult::NotFound));
    }

    #[test]
    fn rate_limit_converts_to_retryable() {
        let err = PipelineError::RateLimit("api.crossref.org".into(), 30);
        assert!(matches!(
            AttemptResult::from(err),
            AttemptResult::TransientError {
                retryable: true,
                ..
            }
        ));
    }

    #[test]
    fn forbidden_converts_to_permanent() {
        let err = PipelineError::Api {
            host: "x".into(),
            status: 403,
        };
        assert!(matches!(
            AttemptResult::from(err),
            AttemptResult::TransientError {
                retryable: false,
                ..
            }
        ));
    }

    #[test]
    fn parse_failure_converts_to_permanent() {
        let err = PipelineError::Parse("bad json".into());
        assert!(matches!(
            AttemptResult::from(err),
            AttemptResult::TransientError {
                retryable: false,
                ..
            }
        ));
    }

    fn chain_names(config: &PipelineConfig) -> Vec<&'static str> {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(RateLimitedClient::new(Duration::ZERO, "litharvest-test/0.1"));
        let cache = Arc::new(ResponseCache::open(dir.path(), Duration::from_secs(60)).unwrap());
        default_chain(config, client, cache)
            .iter()
            .map(|s| s.name())
            .collect()
    }

    #[test]
    fn default_chain_runs_free_sources_before_scraping() {
        let names = chain_names(&PipelineConfig::default());
        assert_eq!(
            names,
            vec![
                "direct",
                "arxiv",
                "biorxiv",
                "unpaywall",
                "crossref",
                "pmc",
                "publisher",
                "researchgate",
                "scrape",
            ]
        );
    }

    #[test]
    fn opt_in_strategies_append_at_the_end() {
        let mut config = PipelineConfig::default();
        config.scihub.enabled = true;
        config.translation.server_url = Some("http://localhost:1969".to_string());
        let names = chain_names(&config);
        assert_eq!(&names[names.len() - 2..], &["scihub", "translation"]);
    }
}
