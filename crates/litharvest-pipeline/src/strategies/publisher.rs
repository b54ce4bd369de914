use std::sync::Arc;

use async_trait::async_trait;
use litharvest_core::CanonicalRecord;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::fetch::download_pdf;
use crate::http::RateLimitedClient;
use crate::strategies::{AttemptResult, Strategy};

static IEEE_DOCUMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"/document/(\d+)").unwrap());

/// Rewrites known publishers' landing URLs into their PDF endpoints. Only
/// records carrying both a landing URL and a DOI qualify; the patterns are
/// too loose for arbitrary links.
pub struct PublisherStrategy {
    client: Arc<RateLimitedClient>,
}

impl PublisherStrategy {
    pub fn new(client: Arc<RateLimitedClient>) -> Self {
        Self { client }
    }
}

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

fn without_query(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

pub(crate) fn pdf_candidate(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();

    if host_matches(&host, "mdpi.com") {
        return Some(format!("{}/pdf", url.trim_end_matches('/')));
    }
    if host_matches(&host, "frontiersin.org") && url.contains("/full") {
        return Some(url.replace("/full", "/pdf"));
    }
    if host_matches(&host, "nature.com") && url.contains("/articles/") {
        return Some(format!("{}.pdf", url.trim_end_matches('/')));
    }
    if host_matches(&host, "ieeexplore.ieee.org")
        && let Some(caps) = IEEE_DOCUMENT.captures(url)
    {
        return Some(format!(
            "https://ieeexplore.ieee.org/stampPDF/getPDF.jsp?tp=&arnumber={}",
            &caps[1]
        ));
    }
    if host_matches(&host, "sciencedirect.com") && url.contains("/pii/") {
        return Some(format!(
            "{}/pdfft?isDTMRedir=true&download=true",
            without_query(url).trim_end_matches('/')
        ));
    }
    if host_matches(&host, "link.springer.com")
        && (url.contains("/chapter/") || url.contains("/article/"))
    {
        return Some(format!("{}.pdf", without_query(url).trim_end_matches('/')));
    }
    if host_matches(&host, "journals.plos.org") && url.contains("/article?") {
        return Some(format!(
            "{}&type=printable",
            url.replace("/article?", "/article/file?")
        ));
    }
    None
}

#[async_trait]
impl Strategy for PublisherStrategy {
    fn name(&self) -> &'static str {
        "publisher"
    }

    fn applicable(&self, record: &CanonicalRecord) -> bool {
        record.doi.is_some()
            && record
                .url
                .as_deref()
                .is_some_and(|url| pdf_candidate(url).is_some())
    }

    async fn attempt(&self, record: &CanonicalRecord) -> AttemptResult {
        let Some(url) = record.url.as_deref().and_then(pdf_candidate) else {
            return AttemptResult::NotFound;
        };
        download_pdf(&self.client, &url).await
    }
}
