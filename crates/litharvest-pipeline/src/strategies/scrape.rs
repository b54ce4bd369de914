use std::sync::Arc;

use async_trait::async_trait;
use litharvest_core::CanonicalRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

use crate::error::{PipelineError, Result};
use crate::fetch::download_pdf;
use crate::http::RateLimitedClient;
use crate::strategies::{AttemptResult, Strategy, publisher};

/// Network cost ceiling per page; most real hits are the first candidate.
const MAX_CANDIDATES: usize = 4;

static JS_PDF_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^"'\s<>]+\.pdf"#).unwrap());
static JS_URL_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""url"\s*:\s*"([^"]+\.pdf[^"]*)""#).unwrap());
static JS_PDF_VAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"pdfUrl["']?\s*[:=]\s*["']([^"']+\.pdf[^"']*)["']"#).unwrap());
static ACM_DOI_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/doi/(?:abs/|full/)?(10\.\d+/[^/?#]+)").unwrap());

const REPO_PAGE_MARKERS: &[&str] = &["repository", "eprints", "dspace", "/handle/", "handle.net"];
const REPO_LINK_MARKERS: &[&str] = &["download", "bitstream", "fulltext", "viewcontent"];

pub(crate) fn parse_selector(input: &str) -> Result<Selector> {
    Selector::parse(input).map_err(|e| PipelineError::Parse(format!("invalid selector {input}: {e}")))
}

/// Last non-opt-in rung: fetch the landing page and hunt for a PDF link in
/// metadata, anchors, and inline scripts.
pub struct ScrapeStrategy {
    client: Arc<RateLimitedClient>,
}

impl ScrapeStrategy {
    pub fn new(client: Arc<RateLimitedClient>) -> Self {
        Self { client }
    }
}

fn push_resolved(candidates: &mut Vec<String>, base: Option<&reqwest::Url>, raw: &str) {
    let raw = raw.trim().replace("\\/", "/");
    if raw.is_empty() || raw.starts_with('#') || raw.starts_with("javascript:") {
        return;
    }
    let resolved = if raw.starts_with("http://") || raw.starts_with("https://") {
        Some(raw)
    } else {
        base.and_then(|base| base.join(&raw).ok()).map(|u| u.to_string())
    };
    if let Some(url) = resolved
        && !candidates.contains(&url)
    {
        candidates.push(url);
    }
}

fn is_repository_page(url: &str) -> bool {
    let lowered = url.to_ascii_lowercase();
    REPO_PAGE_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

fn site_rewrite(page_url: &str) -> Option<String> {
    let host = reqwest::Url::parse(page_url)
        .ok()?
        .host_str()?
        .to_ascii_lowercase();
    if host.ends_with("dl.acm.org")
        && let Some(caps) = ACM_DOI_PATH.captures(page_url)
    {
        return Some(format!("https://dl.acm.org/doi/pdf/{}", &caps[1]));
    }
    // Publisher rewrites double as scrape fallbacks for DOI-less records.
    publisher::pdf_candidate(page_url)
}

/// Candidate links in descending order of trust: scholarly meta tags, then
/// visible anchors, then URLs buried in scripts, then URL rewrites.
fn extract_candidates(html: &str, page_url: &str) -> Result<Vec<String>> {
    let base = reqwest::Url::parse(page_url).ok();
    let mut candidates = Vec::new();
    let mut repo_links = Vec::new();

    let meta_selector =
        parse_selector(r#"meta[name="citation_pdf_url"], meta[property="og:pdf"]"#)?;
    let anchor_selector = parse_selector("a[href]")?;

    {
        let document = Html::parse_document(html);
        for element in document.select(&meta_selector) {
            if let Some(content) = element.value().attr("content") {
                push_resolved(&mut candidates, base.as_ref(), content);
            }
        }
        for element in document.select(&anchor_selector) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let lowered = href.to_ascii_lowercase();
            if lowered.ends_with(".pdf") || lowered.contains(".pdf?") {
                push_resolved(&mut candidates, base.as_ref(), href);
            } else if is_repository_page(page_url)
                && REPO_LINK_MARKERS
                    .iter()
                    .any(|marker| lowered.contains(marker))
            {
                push_resolved(&mut repo_links, base.as_ref(), href);
            }
        }
    }

    for regex in [&JS_PDF_URL, &JS_URL_FIELD, &JS_PDF_VAR] {
        for caps in regex.captures_iter(html) {
            let found = caps.get(1).map_or(&caps[0], |m| m.as_str());
            push_resolved(&mut candidates, base.as_ref(), found);
        }
    }

    if let Some(rewrite) = site_rewrite(page_url)
        && !candidates.contains(&rewrite)
    {
        candidates.push(rewrite);
    }
    for link in repo_links {
        if !candidates.contains(&link) {
            candidates.push(link);
        }
    }
    Ok(candidates)
}

#[async_trait]
impl Strategy for ScrapeStrategy {
    fn name(&self) -> &'static str {
        "scrape"
    }

    fn applicable(&self, record: &CanonicalRecord) -> bool {
        record
            .url
            .as_deref()
            .is_some_and(|url| !url.trim().is_empty())
    }

    async fn attempt(&self, record: &CanonicalRecord) -> AttemptResult {
        let Some(page_url) = record.url.as_deref() else {
            return AttemptResult::NotFound;
        };
        let html = match self.client.get_text(page_url).await {
            Ok(html) => html,
            Err(e) => return e.into(),
        };
        let candidates = match extract_candidates(&html, page_url) {
            Ok(candidates) => candidates,
            Err(e) => return e.into(),
        };
        let mut last = AttemptResult::NotFound;
        for url in candidates.into_iter().take(MAX_CANDIDATES) {
            match download_pdf(&self.client, &url).await {
                success @ AttemptResult::Success { .. } => return success,
                other => last = other,
            }
        }
        last
    }
}
