use std::sync::Arc;

use async_trait::async_trait;
use litharvest_core::CanonicalRecord;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::fetch::download_pdf;
use crate::http::RateLimitedClient;
use crate::strategies::{AttemptResult, Strategy};

const BASE_URL: &str = "https://www.researchgate.net";
/// Long titles add noise without improving the top hit.
const QUERY_CHAR_LIMIT: usize = 80;

static FULL_TEXT_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""fullText"\s*:\s*"(https?:[^"]+)""#).unwrap());
static DOWNLOAD_HREF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"href="([^"]*/publication/[^"]+/download[^"]*)""#).unwrap());
static PDF_HREF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"href="([^"]+\.pdf(?:\?[^"]*)?)""#).unwrap());

/// Author-uploaded mirror hunt via ResearchGate's publication search. Best
/// effort; the site aggressively blocks non-browser traffic.
pub struct ResearchGateStrategy {
    client: Arc<RateLimitedClient>,
    base_url: String,
}

impl ResearchGateStrategy {
    pub fn new(client: Arc<RateLimitedClient>) -> Self {
        Self {
            client,
            base_url: BASE_URL.to_string(),
        }
    }

    #[cfg(test)]
    fn with_base_url(client: Arc<RateLimitedClient>, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

fn truncated(title: &str, limit: usize) -> &str {
    match title.char_indices().nth(limit) {
        Some((idx, _)) => &title[..idx],
        None => title,
    }
}

/// First plausible full-text link out of the search results page. URLs in
/// embedded JSON keep their escaped slashes, so unescape before use.
fn extract_candidate(html: &str, base_url: &str) -> Option<String> {
    let raw = FULL_TEXT_FIELD
        .captures(html)
        .or_else(|| DOWNLOAD_HREF.captures(html))
        .or_else(|| PDF_HREF.captures(html))
        .map(|caps| caps[1].to_string())?;
    let unescaped = raw.replace("\\/", "/");
    if unescaped.starts_with("http://") || unescaped.starts_with("https://") {
        Some(unescaped)
    } else if unescaped.starts_with('/') {
        Some(format!("{}{unescaped}", base_url.trim_end_matches('/')))
    } else {
        None
    }
}

#[async_trait]
impl Strategy for ResearchGateStrategy {
    fn name(&self) -> &'static str {
        "researchgate"
    }

    fn applicable(&self, record: &CanonicalRecord) -> bool {
        !record.title.trim().is_empty()
    }

    async fn attempt(&self, record: &CanonicalRecord) -> AttemptResult {
        let title = record.title.trim();
        if title.is_empty() {
            return AttemptResult::NotFound;
        }
        let search_url = format!(
            "{}/search/publication?q={}",
            self.base_url,
            urlencoding::encode(truncated(title, QUERY_CHAR_LIMIT))
        );
        let html = match self.client.get_text(&search_url).await {
            Ok(html) => html,
            Err(e) => return e.into(),
        };
        match extract_candidate(&html, &self.base_url) {
            Some(url) => download_pdf(&self.client, &url).await,
            None => AttemptResult::NotFound,
        }
    }
}
