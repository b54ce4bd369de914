use std::time::Duration;

use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, REFERER, USER_AGENT};

use crate::http::{FetchedPayload, RateLimitedClient};
use crate::strategies::AttemptResult;

/// Payloads smaller than this are treated as error pages, not papers.
pub const MIN_PDF_BYTES: usize = 5_000;

/// Several publishers refuse the default client string outright.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const PDF_ACCEPT: &str = "application/pdf,application/octet-stream,*/*;q=0.8";
const PDF_REFERER: &str = "https://www.google.com/";

pub fn pdf_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(ACCEPT, HeaderValue::from_static(PDF_ACCEPT));
    headers.insert(REFERER, HeaderValue::from_static(PDF_REFERER));
    headers
}

fn timeout_for(url: &str) -> Duration {
    // arXiv serves fast or not at all; give everyone else more slack.
    if url.contains("arxiv.org") {
        Duration::from_secs(15)
    } else {
        Duration::from_secs(30)
    }
}

/// Fetch a candidate PDF URL and classify the response by status. Payload
/// content is not inspected here; the chain driver validates it.
pub async fn download_pdf(client: &RateLimitedClient, url: &str) -> AttemptResult {
    let payload = match client.fetch_bytes(url, pdf_headers(), timeout_for(url)).await {
        Ok(p) => p,
        Err(e) => return AttemptResult::from(e),
    };
    classify_payload(payload)
}

fn classify_payload(payload: FetchedPayload) -> AttemptResult {
    match payload.status {
        200..=299 => AttemptResult::Success {
            bytes: payload.body,
            content_type: payload.content_type,
        },
        404 | 410 => AttemptResult::NotFound,
        403 => AttemptResult::TransientError {
            retryable: false,
            detail: "HTTP 403".into(),
        },
        429 => AttemptResult::TransientError {
            retryable: true,
            detail: "HTTP 429".into(),
        },
        s if s >= 500 => AttemptResult::TransientError {
            retryable: true,
            detail: format!("HTTP {s}"),
        },
        s => AttemptResult::TransientError {
            retryable: false,
            detail: format!("HTTP {s}"),
        },
    }
}

/// A valid payload is big enough to be a paper and identifies as PDF by
/// declared content type or magic bytes.
pub fn validate_payload(bytes: &[u8], content_type: Option<&str>) -> Result<(), String> {
    if bytes.len() < MIN_PDF_BYTES {
        return Err(format!("payload too small ({} bytes)", bytes.len()));
    }
    let declared_pdf = content_type.is_some_and(|ct| ct.contains("application/pdf"));
    if declared_pdf || bytes.starts_with(b"%PDF") {
        Ok(())
    } else {
        Err(match content_type {
            Some(ct) => format!("not a PDF (content-type {ct})"),
            None => "not a PDF (no content type, no %PDF header)".to_string(),
        })
    }
}
