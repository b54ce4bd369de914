use std::sync::Arc;

use async_trait::async_trait;
use litharvest_core::CanonicalRecord;
use serde_json::Value;

use crate::cache::{ResponseCache, response_key};
use crate::error::Result;
use crate::fetch::download_pdf;
use crate::http::RateLimitedClient;
use crate::identifiers::{Doi, doi_for};
use crate::strategies::{AttemptResult, Strategy};

const BASE_URL: &str = "https://api.crossref.org";

/// Follows publisher-deposited full-text links from the Crossref works API.
pub struct CrossrefStrategy {
    client: Arc<RateLimitedClient>,
    cache: Arc<ResponseCache>,
    mailto: Option<String>,
    base_url: String,
}

impl CrossrefStrategy {
    pub fn new(
        client: Arc<RateLimitedClient>,
        cache: Arc<ResponseCache>,
        mailto: Option<String>,
    ) -> Self {
        Self::with_base_url(client, cache, mailto, BASE_URL)
    }

    fn with_base_url(
        client: Arc<RateLimitedClient>,
        cache: Arc<ResponseCache>,
        mailto: Option<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            cache,
            mailto,
            base_url: base_url.into(),
        }
    }

    async fn resolve(&self, doi: &Doi) -> Result<Option<String>> {
        let key = response_key("crossref", &doi.normalized);
        if let Some(cached) = self.cache.get::<Option<String>>(&key).await {
            return Ok(cached);
        }
        let mut url = format!("{}/works/{}", self.base_url, doi.normalized);
        if let Some(mailto) = &self.mailto {
            url.push_str(&format!("?mailto={}", urlencoding::encode(mailto)));
        }
        let val: Value = self.client.get_json(&url).await?;
        let resolved = pdf_link_from(&val["message"]);
        self.cache.set(&key, &resolved).await;
        Ok(resolved)
    }
}

/// Deposited `link` entries declared as PDF win; the primary resource URL
/// only counts when it plainly points at one.
fn pdf_link_from(message: &Value) -> Option<String> {
    if let Some(links) = message["link"].as_array() {
        for link in links {
            if link["content-type"].as_str() == Some("application/pdf")
                && let Some(url) = link["URL"].as_str().filter(|u| !u.trim().is_empty())
            {
                return Some(url.to_string());
            }
        }
    }
    message["resource"]["primary"]["URL"]
        .as_str()
        .filter(|url| url.to_ascii_lowercase().contains(".pdf"))
        .map(ToOwned::to_owned)
}

#[async_trait]
impl Strategy for CrossrefStrategy {
    fn name(&self) -> &'static str {
        "crossref"
    }

    fn applicable(&self, record: &CanonicalRecord) -> bool {
        doi_for(record).is_some()
    }

    async fn attempt(&self, record: &CanonicalRecord) -> AttemptResult {
        let Some(doi) = doi_for(record) else {
            return AttemptResult::NotFound;
        };
        match self.resolve(&doi).await {
            Ok(Some(url)) => download_pdf(&self.client, &url).await,
            Ok(None) => AttemptResult::NotFound,
            Err(e) => e.into(),
        }
    }
}

// ─── CrossrefLookup ───────────────────────────────────────────────────────────

/// Title-to-DOI lookup for records that arrive without one. Returns the top
/// match and its relevance score; the caller decides what is good enough.
pub struct CrossrefLookup {
    client: Arc<RateLimitedClient>,
    mailto: Option<String>,
    base_url: String,
}

impl CrossrefLookup {
    pub fn new(client: Arc<RateLimitedClient>, mailto: Option<String>) -> Self {
        Self {
            client,
            mailto,
            base_url: BASE_URL.to_string(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(
        client: Arc<RateLimitedClient>,
        mailto: Option<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            mailto,
            base_url: base_url.into(),
        }
    }

    pub async fn doi_for_title(&self, title: &str) -> Result<Option<(Doi, f64)>> {
        let mut url = format!(
            "{}/works?query.bibliographic={}&rows=1&select=DOI,title,score",
            self.base_url,
            urlencoding::encode(title)
        );
        if let Some(mailto) = &self.mailto {
            url.push_str(&format!("&mailto={}", urlencoding::encode(mailto)));
        }
        let val: Value = self.client.get_json(&url).await?;
        let Some(item) = val["message"]["items"]
            .as_array()
            .and_then(|items| items.first())
        else {
            return Ok(None);
        };
        let score = item["score"].as_f64().unwrap_or(0.0);
        let doi = item["DOI"]
            .as_str()
            .and_then(|raw| Doi::parse(raw).ok());
        Ok(doi.map(|doi| (doi, score)))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    #[test]
    fn deposited_pdf_link_wins_over_resource_url() {
        let message = json!({
            "link": [
                {"URL": "https://example.org/xml", "content-type": "application/xml"},
                {"URL": "https://example.org/full.pdf", "content-type": "application/pdf"}
            ],
            "resource": {"primary": {"URL": "https://example.org/landing"}}
        });
        assert_eq!(
            pdf_link_from(&message),
            Some("https://example.org/full.pdf".to_string())
        );
    }

    #[test]
    fn resource_url_counts_only_when_it_names_a_pdf() {
        let landing = json!({"resource": {"primary": {"URL": "https://example.org/article/1"}}});
        assert_eq!(pdf_link_from(&landing), None);

        let direct = json!({"resource": {"primary": {"URL": "https://example.org/article/1.PDF"}}});
        assert_eq!(
            pdf_link_from(&direct),
            Some("https://example.org/article/1.PDF".to_string())
        );
    }

    fn parts() -> (Arc<RateLimitedClient>, Arc<ResponseCache>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(RateLimitedClient::new(
            Duration::ZERO,
            "litharvest-test/0.1",
        ));
        let cache = Arc::new(ResponseCache::open(dir.path(), Duration::from_secs(60)).unwrap());
        (client, cache, dir)
    }

    #[tokio::test]
    async fn attempt_downloads_the_deposited_link() {
        let mut server = mockito::Server::new_async().await;
        let _api = server
            .mock("GET", "/works/10.1234/abc")
            .with_status(200)
            .with_body(
                json!({
                    "message": {
                        "link": [{
                            "URL": format!("{}/full.pdf", server.url()),
                            "content-type": "application/pdf"
                        }]
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;
        let _pdf = server
            .mock("GET", "/full.pdf")
            .with_status(200)
            .with_header("content-type", "application/pdf")
            .with_body("%PDF-1.7 deposited")
            .create_async()
            .await;

        let (client, cache, _dir) = parts();
        let strategy = CrossrefStrategy::with_base_url(client, cache, None, server.url());
        let record = CanonicalRecord {
            doi: Some("10.1234/abc".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            strategy.attempt(&record).await,
            AttemptResult::Success { .. }
        ));
    }

    #[tokio::test]
    async fn title_lookup_returns_doi_and_score() {
        let mut server = mockito::Server::new_async().await;
        let _api = server
            .mock("GET", "/works")
            .match_query(mockito::Matcher::UrlEncoded(
                "query.bibliographic".into(),
                "Attention is all you need".into(),
            ))
            .with_status(200)
            .with_body(
                json!({
                    "message": {
                        "items": [{"DOI": "10.5555/3295222", "score": 87.5}]
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let (client, _cache, _dir) = parts();
        let lookup = CrossrefLookup::with_base_url(client, None, server.url());
        let (doi, score) = lookup
            .doi_for_title("Attention is all you need")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doi.normalized, "10.5555/3295222");
        assert_eq!(score, 87.5);
    }

    #[tokio::test]
    async fn title_lookup_with_no_items_is_none() {
        let mut server = mockito::Server::new_async().await;
        let _api = server
            .mock("GET", "/works")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(json!({"message": {"items": []}}).to_string())
            .create_async()
            .await;

        let (client, _cache, _dir) = parts();
        let lookup = CrossrefLookup::with_base_url(client, None, server.url());
        assert!(
            lookup
                .doi_for_title("unknown title")
                .await
                .unwrap()
                .is_none()
        );
    }
}
