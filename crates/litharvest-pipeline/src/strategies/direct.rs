use std::sync::Arc;

use async_trait::async_trait;
use litharvest_core::CanonicalRecord;

use crate::fetch::download_pdf;
use crate::http::RateLimitedClient;
use crate::strategies::{AttemptResult, Strategy};

/// Tries the PDF link the record arrived with.
pub struct DirectStrategy {
    client: Arc<RateLimitedClient>,
}

impl DirectStrategy {
    pub fn new(client: Arc<RateLimitedClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Strategy for DirectStrategy {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn applicable(&self, record: &CanonicalRecord) -> bool {
        record
            .pdf_url
            .as_deref()
            .is_some_and(|url| !url.trim().is_empty())
    }

    async fn attempt(&self, record: &CanonicalRecord) -> AttemptResult {
        let Some(url) = record.pdf_url.as_deref() else {
            return AttemptResult::NotFound;
        };
        download_pdf(&self.client, url.trim()).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn strategy() -> DirectStrategy {
        DirectStrategy::new(Arc::new(RateLimitedClient::new(
            Duration::ZERO,
            "litharvest-test/0.1",
        )))
    }

    #[test]
    fn applicable_only_with_a_declared_link() {
        let mut record = CanonicalRecord::default();
        assert!(!strategy().applicable(&record));
        record.pdf_url = Some("  ".to_string());
        assert!(!strategy().applicable(&record));
        record.pdf_url = Some("https://example.org/paper.pdf".to_string());
        assert!(strategy().applicable(&record));
    }

    #[tokio::test]
    async fn fetches_the_declared_link() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/paper.pdf")
            .with_status(200)
            .with_header("content-type", "application/pdf")
            .with_body("%PDF-1.5 content")
            .create_async()
            .await;

        let record = CanonicalRecord {
            pdf_url: Some(format!("{}/paper.pdf", server.url())),
            ..Default::default()
        };
        let result = strategy().attempt(&record).await;
        assert!(matches!(result, AttemptResult::Success { .. }));
    }

    #[tokio::test]
    async fn dead_link_maps_to_not_found() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/gone.pdf")
            .with_status(404)
            .create_async()
            .await;

        let record = CanonicalRecord {
            pdf_url: Some(format!("{}/gone.pdf", server.url())),
            ..Default::default()
        };
        let result = strategy().attempt(&record).await;
        assert!(matches!(result, AttemptResult::NotFound));
    }
}
