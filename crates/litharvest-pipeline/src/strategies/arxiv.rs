use std::sync::Arc;

use async_trait::async_trait;
use litharvest_core::CanonicalRecord;

use crate::fetch::download_pdf;
use crate::http::RateLimitedClient;
use crate::identifiers::ArxivId;
use crate::strategies::{AttemptResult, Strategy};

const BASE_URL: &str = "https://arxiv.org";

/// Fetches preprints straight from arXiv's PDF endpoint.
pub struct ArxivStrategy {
    client: Arc<RateLimitedClient>,
    base_url: String,
}

impl ArxivStrategy {
    pub fn new(client: Arc<RateLimitedClient>) -> Self {
        Self {
            client,
            base_url: BASE_URL.to_string(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(client: Arc<RateLimitedClient>, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn pdf_url(&self, id: &ArxivId) -> String {
        match id.version {
            Some(v) => format!("{}/pdf/{}v{v}", self.base_url, id.id),
            None => format!("{}/pdf/{}", self.base_url, id.id),
        }
    }
}

#[async_trait]
impl Strategy for ArxivStrategy {
    fn name(&self) -> &'static str {
        "arxiv"
    }

    fn applicable(&self, record: &CanonicalRecord) -> bool {
        ArxivId::for_record(record).is_some()
    }

    async fn attempt(&self, record: &CanonicalRecord) -> AttemptResult {
        let Some(id) = ArxivId::for_record(record) else {
            return AttemptResult::NotFound;
        };
        download_pdf(&self.client, &self.pdf_url(&id)).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn client() -> Arc<RateLimitedClient> {
        Arc::new(RateLimitedClient::new(
            Duration::ZERO,
            "litharvest-test/0.1",
        ))
    }

    #[test]
    fn applicable_when_doi_is_an_arxiv_alias() {
        let record = CanonicalRecord {
            doi: Some("10.48550/arXiv.2301.00001".to_string()),
            ..Default::default()
        };
        assert!(ArxivStrategy::new(client()).applicable(&record));
    }

    #[test]
    fn pdf_url_keeps_the_version() {
        let strategy = ArxivStrategy::new(client());
        let id = ArxivId::parse("2301.00001v3").unwrap();
        assert_eq!(strategy.pdf_url(&id), "https://arxiv.org/pdf/2301.00001v3");
    }

    #[tokio::test]
    async fn fetches_pdf_for_listed_identifier() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/pdf/2301.00001")
            .with_status(200)
            .with_header("content-type", "application/pdf")
            .with_body("%PDF-1.4 preprint")
            .create_async()
            .await;

        let strategy = ArxivStrategy::with_base_url(client(), server.url());
        let record = CanonicalRecord {
            arxiv_id: Some("2301.00001".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            strategy.attempt(&record).await,
            AttemptResult::Success { .. }
        ));
    }

    #[tokio::test]
    async fn withdrawn_paper_maps_to_not_found() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/pdf/2301.99999")
            .with_status(404)
            .create_async()
            .await;

        let strategy = ArxivStrategy::with_base_url(client(), server.url());
        let record = CanonicalRecord {
            arxiv_id: Some("2301.99999".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            strategy.attempt(&record).await,
            AttemptResult::NotFound
        ));
    }
}
