use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::date::PublicationDate;

/// One search result exactly as a single source reported it, before any
/// deduplication. Field values are taken at face value; normalization
/// happens downstream.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RawRecord {
    /// Name of the source that produced this record ("pubmed", "scopus", ...).
    pub source: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default, rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pmid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arxiv_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<PublicationDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Direct PDF link, when the source already knows one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation_count: Option<u32>,
}

impl RawRecord {
    pub fn new(source: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            title: title.into(),
            ..Default::default()
        }
    }
}

/// The surviving record for one publication after a cluster of raw records
/// has been merged. Carries the same bibliographic fields as [`RawRecord`]
/// plus merge provenance.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CanonicalRecord {
    /// Source of the primary record the merge started from.
    pub source: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default, rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pmid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arxiv_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<PublicationDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    #[serde(default)]
    pub keywords: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation_count: Option<u32>,
    /// Every source that contributed a record to the cluster.
    #[serde(default)]
    pub sources: BTreeSet<String>,
    /// Cluster size this record was merged from; 1 means no duplicate found.
    pub merged_from_count: u32,
    /// Set when the record carried no usable identity key and was passed
    /// through unmerged.
    #[serde(default)]
    pub needs_review: bool,
}
