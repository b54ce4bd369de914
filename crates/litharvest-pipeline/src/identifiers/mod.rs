use litharvest_core::CanonicalRecord;
use once_cell::sync::Lazy;
use regex::Regex;

pub mod arxiv;
pub mod doi;

pub use arxiv::ArxivId;
pub use doi::Doi;

static PUBMED_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"pubmed\.ncbi\.nlm\.nih\.gov/(\d+)").unwrap());

/// Parsed DOI for a record, if its `doi` field holds one.
pub fn doi_for(record: &CanonicalRecord) -> Option<Doi> {
    record.doi.as_deref().and_then(|raw| Doi::parse(raw).ok())
}

/// PMID from the record field, or recovered from a PubMed landing URL.
pub fn pmid_for(record: &CanonicalRecord) -> Option<String> {
    if let Some(pmid) = record.pmid.as_deref() {
        let trimmed = pmid.trim();
        if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
            return Some(trimmed.to_string());
        }
    }
    let url = record.url.as_deref()?;
    PUBMED_URL.captures(url).map(|caps| caps[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pmid_from_field() {
        let record = CanonicalRecord {
            pmid: Some(" 31452104 ".to_string()),
            ..Default::default()
        };
        assert_eq!(pmid_for(&record), Some("31452104".to_string()));
    }

    #[test]
    fn pmid_from_pubmed_url() {
        let record = CanonicalRecord {
            url: Some("https://pubmed.ncbi.nlm.nih.gov/31452104/".to_string()),
            ..Default::default()
        };
        assert_eq!(pmid_for(&record), Some("31452104".to_string()));
    }

    #[test]
    fn non_numeric_pmid_field_ignored() {
        let record = CanonicalRecord {
            pmid: Some("PMC7096066".to_string()),
            ..Default::default()
        };
        assert_eq!(pmid_for(&record), None);
    }

    #[test]
    fn doi_for_parses_resolver_urls() {
        let record = CanonicalRecord {
            doi: Some("https://doi.org/10.1038/S41586-021-03819-2".to_string()),
            ..Default::default()
        };
        assert_eq!(
            doi_for(&record).unwrap().normalized,
            "10.1038/s41586-021-03819-2"
        );
    }
}
