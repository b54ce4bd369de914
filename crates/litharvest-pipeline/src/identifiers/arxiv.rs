use litharvest_core::CanonicalRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

// Post-2007 ids: YYMM.NNNNN with an optional version suffix.
static NEW_FORMAT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4}\.\d{4,5})(v(\d+))?$").unwrap());

// Pre-2007 ids: category/YYMMNNN.
static OLD_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([a-zA-Z\-]+(?:\.[A-Z]{2})?/\d{7})(v(\d+))?$").unwrap());

static URL_FORM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"arxiv\.org/(?:abs|pdf)/([^?#\s]+)").unwrap());

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArxivId {
    pub raw: String,
    /// Bare id without version, e.g. `2301.04567` or `cs.AI/0601001`.
    pub id: String,
    pub version: Option<u8>,
}

impl ArxivId {
    /// Accepts bare ids, `arXiv:` prefixed ids, and abs/pdf URLs.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();

        let candidate = match URL_FORM.captures(input) {
            Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or(input),
            None => input,
        };
        let candidate = candidate
            .trim_start_matches("arXiv:")
            .trim_start_matches("arxiv:")
            .trim_end_matches(".pdf")
            .trim_end_matches('/');

        for format in [&NEW_FORMAT, &OLD_FORMAT] {
            if let Some(caps) = format.captures(candidate) {
                return Ok(Self {
                    raw: input.to_string(),
                    id: caps[1].to_string(),
                    version: caps.get(3).and_then(|v| v.as_str().parse().ok()),
                });
            }
        }

        Err(PipelineError::InvalidArxivId(input.to_string()))
    }

    /// arXiv registers its DOIs under the 10.48550 prefix with the id embedded.
    pub fn from_doi(doi: &str) -> Option<Self> {
        let trimmed = doi.trim();
        let lower = trimmed.to_ascii_lowercase();
        let tail = lower.strip_prefix("10.48550/arxiv.")?;
        // Reuse the original casing; old-format ids carry a cased category.
        Self::parse(&trimmed[trimmed.len() - tail.len()..]).ok()
    }

    /// Best-effort arXiv id for a record: the explicit field, then the DOI,
    /// then the landing URL.
    pub fn for_record(record: &CanonicalRecord) -> Option<Self> {
        if let Some(raw) = record.arxiv_id.as_deref()
            && let Ok(id) = Self::parse(raw)
        {
            return Some(id);
        }
        if let Some(doi) = record.doi.as_deref()
            && let Some(id) = Self::from_doi(doi)
        {
            return Some(id);
        }
        record.url.as_deref().and_then(|url| Self::parse(url).ok())
    }
}
