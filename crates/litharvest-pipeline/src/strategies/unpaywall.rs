use std::sync::Arc;

use async_trait::async_trait;
use litharvest_core::CanonicalRecord;
use serde::{Deserialize, Serialize};

use crate::cache::{ResponseCache, response_key};
use crate::error::Result;
use crate::fetch::download_pdf;
use crate::http::RateLimitedClient;
use crate::identifiers::{Doi, doi_for};
use crate::strategies::{AttemptResult, Strategy};

const BASE_URL: &str = "https://api.unpaywall.org/v2";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct OaLocation {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    url_for_pdf: Option<String>,
}

impl OaLocation {
    fn pdf_or_page(&self) -> Option<&str> {
        self.url_for_pdf
            .as_deref()
            .or(self.url.as_deref())
            .filter(|url| !url.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct OaRecord {
    #[serde(default)]
    is_oa: bool,
    #[serde(default)]
    best_oa_location: Option<OaLocation>,
    #[serde(default)]
    oa_locations: Vec<OaLocation>,
}

impl OaRecord {
    fn best_pdf_url(&self) -> Option<&str> {
        self.best_oa_location
            .as_ref()
            .and_then(OaLocation::pdf_or_page)
            .or_else(|| self.oa_locations.iter().find_map(OaLocation::pdf_or_page))
    }
}

/// Resolves open-access copies through the Unpaywall API. Inert without a
/// contact email, which the API requires.
pub struct UnpaywallStrategy {
    client: Arc<RateLimitedClient>,
    cache: Arc<ResponseCache>,
    email: Option<String>,
    base_url: String,
}

impl UnpaywallStrategy {
    pub fn new(
        client: Arc<RateLimitedClient>,
        cache: Arc<ResponseCache>,
        email: Option<String>,
    ) -> Self {
        Self {
            client,
            cache,
            email,
            base_url: BASE_URL.to_string(),
        }
    }

    #[cfg(test)]
    fn with_base_url(
        client: Arc<RateLimitedClient>,
        cache: Arc<ResponseCache>,
        email: Option<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            cache,
            email,
            base_url: base_url.into(),
        }
    }

    async fn resolve(&self, doi: &Doi, email: &str) -> Result<Option<String>> {
        let key = response_key("unpaywall", &doi.normalized);
        if let Some(cached) = self.cache.get::<Option<String>>(&key).await {
            return Ok(cached);
        }
        let url = format!(
            "{}/{}?email={}",
            self.base_url,
            doi.normalized,
            urlencoding::encode(email)
        );
        let oa: OaRecord = self.client.get_json(&url).await?;
        let resolved = oa.best_pdf_url().map(ToOwned::to_owned);
        self.cache.set(&key, &resolved).await;
        Ok(resolved)
    }
}

#[async_trait]
impl Strategy for UnpaywallStrategy {
    fn name(&self) -> &'static str {
        "unpaywall"
    }

    fn applicable(&self, record: &CanonicalRecord) -> bool {
        self.email.is_some() && doi_for(record).is_some()
    }

    async fn attempt(&self, record: &CanonicalRecord) -> AttemptResult {
        let (Some(doi), Some(email)) = (doi_for(record), self.email.as_deref()) else {
            return AttemptResult::NotFound;
        };
        match self.resolve(&doi, email).await {
            Ok(Some(url)) => download_pdf(&self.client, &url).await,
            Ok(None) => AttemptResult::NotFound,
            Err(e) => e.into(),
        }
    }
}
