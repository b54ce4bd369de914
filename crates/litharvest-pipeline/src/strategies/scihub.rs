use std::sync::Arc;

use async_trait::async_trait;
use litharvest_core::CanonicalRecord;
use scraper::Html;
use tokio::sync::RwLock;

use crate::error::{PipelineError, Result};
use crate::fetch::download_pdf;
use crate::http::RateLimitedClient;
use crate::identifiers::doi_for;
use crate::strategies::scrape::parse_selector;
use crate::strategies::{AttemptResult, Strategy};

const KNOWN_MIRRORS: &[&str] = &[
    "https://sci-hub.se",
    "https://sci-hub.st",
    "https://sci-hub.ru",
    "https://sci-hub.ren",
    "https://sci-hub.mksa.top",
];

/// Shadow-library fallback, disabled unless explicitly opted in. Mirrors
/// rotate; the last one that answered is tried first next time.
pub struct SciHubStrategy {
    client: Arc<RateLimitedClient>,
    mirrors: Vec<String>,
    working_mirror: RwLock<Option<String>>,
}

impl SciHubStrategy {
    pub fn new(client: Arc<RateLimitedClient>, mirrors: Vec<String>) -> Self {
        let mirrors = if mirrors.is_empty() {
            KNOWN_MIRRORS.iter().map(|m| (*m).to_string()).collect()
        } else {
            mirrors
        };
        Self {
            client,
            mirrors,
            working_mirror: RwLock::new(None),
        }
    }

    async fn mirror_order(&self) -> Vec<String> {
        let active = self.working_mirror.read().await.clone();
        let mut order = Vec::new();
        if let Some(active) = active {
            order.push(active);
        }
        for mirror in &self.mirrors {
            if !order.contains(mirror) {
                order.push(mirror.clone());
            }
        }
        order
    }

    async fn fetch_with_mirror_rotation(&self, target: &str) -> Result<(String, String)> {
        let mut last_error: Option<PipelineError> = None;
        for mirror in self.mirror_order().await {
            let url = format!(
                "{}/{}",
                mirror.trim_end_matches('/'),
                target.trim_start_matches('/')
            );
            match self.client.get_text(&url).await {
                Ok(body) => {
                    *self.working_mirror.write().await = Some(mirror.clone());
                    return Ok((body, mirror));
                }
                Err(err) => {
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| PipelineError::NoMirror("scihub".to_string())))
    }

    fn lookup_target(record: &CanonicalRecord) -> Option<String> {
        doi_for(record)
            .map(|doi| doi.normalized)
            .or_else(|| record.url.clone())
    }
}

/// The paper sits in an iframe or embed; its src may be protocol-relative
/// or mirror-relative.
fn pdf_url_from_page(html: &str, mirror: &str) -> Result<Option<String>> {
    let iframe_selector = parse_selector("iframe#pdf, iframe[src*='.pdf']")?;
    let embed_selector = parse_selector("embed[type='application/pdf'], embed[src*='.pdf']")?;

    let document = Html::parse_document(html);
    Ok(document
        .select(&iframe_selector)
        .next()
        .and_then(|el| el.value().attr("src"))
        .or_else(|| {
            document
                .select(&embed_selector)
                .next()
                .and_then(|el| el.value().attr("src"))
        })
        .map(|src| absolute_pdf_url(src, mirror)))
}

fn absolute_pdf_url(src: &str, mirror: &str) -> String {
    if src.starts_with("//") {
        return format!("https:{src}");
    }
    if src.starts_with("http://") || src.starts_with("https://") {
        return src.to_string();
    }
    if src.starts_with('/') {
        return format!("{}{}", mirror.trim_end_matches('/'), src);
    }
    format!("{}/{}", mirror.trim_end_matches('/'), src)
}

#[async_trait]
impl Strategy for SciHubStrategy {
    fn name(&self) -> &'static str {
        "scihub"
    }

    fn applicable(&self, record: &CanonicalRecord) -> bool {
        Self::lookup_target(record).is_some()
    }

    async fn attempt(&self, record: &CanonicalRecord) -> AttemptResult {
        let Some(target) = Self::lookup_target(record) else {
            return AttemptResult::NotFound;
        };
        let (html, mirror) = match self.fetch_with_mirror_rotation(&target).await {
            Ok(pair) => pair,
            Err(e) => return e.into(),
        };
        match pdf_url_from_page(&html, &mirror) {
            Ok(Some(url)) => download_pdf(&self.client, &url).await,
            Ok(None) => AttemptResult::NotFound,
            Err(e) => e.into(),
        }
    }
}
