use std::sync::Arc;

use async_trait::async_trait;
use litharvest_core::CanonicalRecord;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::fetch::download_pdf;
use crate::http::RateLimitedClient;
use crate::strategies::{AttemptResult, Strategy};

const BIORXIV_BASE: &str = "https://www.biorxiv.org";
const MEDRXIV_BASE: &str = "https://www.medrxiv.org";

/// Both servers mint DOIs under the shared 10.1101 prefix; landing URLs
/// carry an optional revision suffix like `v2`.
static CONTENT_DOI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(10\.1101/[0-9.]*[0-9])(v\d+)?").unwrap());

/// Fetches bioRxiv and medRxiv preprints via their stable content URLs.
pub struct BiorxivStrategy {
    client: Arc<RateLimitedClient>,
    biorxiv_base: String,
    medrxiv_base: String,
}

impl BiorxivStrategy {
    pub fn new(client: Arc<RateLimitedClient>) -> Self {
        Self {
            client,
            biorxiv_base: BIORXIV_BASE.to_string(),
            medrxiv_base: MEDRXIV_BASE.to_string(),
        }
    }

    #[cfg(test)]
    fn with_base_urls(
        client: Arc<RateLimitedClient>,
        biorxiv: impl Into<String>,
        medrxiv: impl Into<String>,
    ) -> Self {
        Self {
            client,
            biorxiv_base: biorxiv.into(),
            medrxiv_base: medrxiv.into(),
        }
    }

    fn host_base(&self, record: &CanonicalRecord) -> &str {
        let mentions_medrxiv = record
            .url
            .as_deref()
            .is_some_and(|u| u.to_ascii_lowercase().contains("medrxiv"))
            || record
                .journal
                .as_deref()
                .is_some_and(|j| j.to_ascii_lowercase().contains("medrxiv"));
        if mentions_medrxiv {
            &self.medrxiv_base
        } else {
            &self.biorxiv_base
        }
    }

    fn content_url(&self, record: &CanonicalRecord) -> Option<String> {
        let caps = record
            .url
            .as_deref()
            .and_then(|u| CONTENT_DOI.captures(u))
            .or_else(|| record.doi.as_deref().and_then(|d| CONTENT_DOI.captures(d)))?;
        let version = caps.get(2).map_or("v1", |m| m.as_str());
        Some(format!(
            "{}/content/{}{version}.full.pdf",
            self.host_base(record),
            &caps[1]
        ))
    }
}

#[async_trait]
impl Strategy for BiorxivStrategy {
    fn name(&self) -> &'static str {
        "biorxiv"
    }

    fn applicable(&self, record: &CanonicalRecord) -> bool {
        self.content_url(record).is_some()
    }

    async fn attempt(&self, record: &CanonicalRecord) -> AttemptResult {
        let Some(url) = self.content_url(record) else {
            return AttemptResult::NotFound;
        };
        download_pdf(&self.client, &url).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn strategy() -> BiorxivStrategy {
        BiorxivStrategy::new(Arc::new(RateLimitedClient::new(
            Duration::ZERO,
            "litharvest-test/0.1",
        )))
    }

    #[test]
    fn preprint_doi_defaults_to_first_version() {
        let record = CanonicalRecord {
            doi: Some("10.1101/2020.03.24.20042937".to_string()),
            ..Default::default()
        };
        assert_eq!(
            strategy().content_url(&record).unwrap(),
            "https://www.biorxiv.org/content/10.1101/2020.03.24.20042937v1.full.pdf"
        );
    }

    #[test]
    fn revision_is_recovered_from_the_landing_url() {
        let record = CanonicalRecord {
            url: Some("https://www.biorxiv.org/content/10.1101/2024.01.05.574401v3".to_string()),
            ..Default::default()
        };
        assert_eq!(
            strategy().content_url(&record).unwrap(),
            "https://www.biorxiv.org/content/10.1101/2024.01.05.574401v3.full.pdf"
        );
    }

    #[test]
    fn medrxiv_papers_stay_on_their_own_host() {
        let record = CanonicalRecord {
            doi: Some("10.1101/2021.07.19.21260139".to_string()),
            journal: Some("medRxiv".to_string()),
            ..Default::default()
        };
        assert!(
            strategy()
                .content_url(&record)
                .unwrap()
                .starts_with("https://www.medrxiv.org/")
        );
    }

    #[test]
    fn other_publishers_are_not_applicable() {
        let record = CanonicalRecord {
            doi: Some("10.1038/s41586-021-03819-2".to_string()),
            ..Default::default()
        };
        assert!(!strategy().applicable(&record));
    }

    #[tokio::test]
    async fn fetches_full_text_pdf() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/content/10.1101/2020.03.24.20042937v1.full.pdf")
            .with_status(200)
            .with_header("content-type", "application/pdf")
            .with_body("%PDF-1.6 preprint")
            .create_async()
            .await;

        let client = Arc::new(RateLimitedClient::new(
            Duration::ZERO,
            "litharvest-test/0.1",
        ));
        let strategy = BiorxivStrategy::with_base_urls(client, server.url(), server.url());
        let record = CanonicalRecord {
            doi: Some("10.1101/2020.03.24.20042937".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            strategy.attempt(&record).await,
            AttemptResult::Success { .. }
        ));
    }
}
