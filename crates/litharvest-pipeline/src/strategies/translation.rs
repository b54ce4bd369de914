use std::sync::Arc;

use async_trait::async_trait;
use litharvest_core::CanonicalRecord;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::fetch::download_pdf;
use crate::http::RateLimitedClient;
use crate::strategies::{AttemptResult, Strategy};

const SESSION_ID: &str = "litharvest";

#[derive(Serialize)]
struct WebRequest<'a> {
    url: &'a str,
    session: &'a str,
}

#[derive(Debug, Deserialize)]
struct TranslatedItem {
    #[serde(default)]
    attachments: Vec<Attachment>,
}

#[derive(Debug, Deserialize)]
struct Attachment {
    #[serde(default)]
    url: Option<String>,
    #[serde(default, rename = "mimeType")]
    mime_type: Option<String>,
    #[serde(default, rename = "contentType")]
    content_type: Option<String>,
}

/// Asks a local Zotero translation server to work out full-text attachments
/// for a landing URL. Only in the chain when a server URL is configured.
pub struct TranslationStrategy {
    client: Arc<RateLimitedClient>,
    server_url: String,
}

impl TranslationStrategy {
    pub fn new(client: Arc<RateLimitedClient>, server_url: impl Into<String>) -> Self {
        Self {
            client,
            server_url: server_url.into(),
        }
    }
}

fn pdf_attachment(items: &[TranslatedItem]) -> Option<&str> {
    items
        .iter()
        .flat_map(|item| item.attachments.iter())
        .find_map(|att| {
            let mime = att.mime_type.as_deref().or(att.content_type.as_deref())?;
            if mime.eq_ignore_ascii_case("application/pdf") {
                att.url.as_deref().filter(|url| !url.trim().is_empty())
            } else {
                None
            }
        })
}

#[async_trait]
impl Strategy for TranslationStrategy {
    fn name(&self) -> &'static str {
        "translation"
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
        let endpoint = format!("{}/web", self.server_url.trim_end_matches('/'));
        let request = WebRequest {
            url: page_url,
            session: SESSION_ID,
        };
        // 501 is the server's "no translator for this site".
        let items: Vec<TranslatedItem> = match self.client.post_json(&endpoint, &request).await {
            Ok(items) => items,
            Err(PipelineError::Api { status: 501, .. }) => return AttemptResult::NotFound,
            Err(e) => return e.into(),
        };
        match pdf_attachment(&items) {
            Some(url) => download_pdf(&self.client, url).await,
            None => AttemptResult::NotFound,
        }
    }
}
